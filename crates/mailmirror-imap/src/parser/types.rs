//! Response data types.

use crate::types::{Flags, ResponseCode, SeqNum, Uid};

/// FETCH response item.
///
/// Only the items the synchronization dialog consumes are represented;
/// anything else in a FETCH list is skipped by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// Message flags.
    Flags(Flags),
    /// UID.
    Uid(Uid),
    /// MODSEQ (CONDSTORE).
    ModSeq(u64),
}

/// Untagged response data.
#[derive(Debug, Clone, PartialEq)]
pub enum UntaggedResponse {
    /// OK response with optional code.
    Ok {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// NO response.
    No {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BAD response.
    Bad {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// PREAUTH greeting.
    PreAuth {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BYE response.
    Bye {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// CAPABILITY response.
    Capability(Vec<crate::types::Capability>),
    /// FLAGS response (flags applicable to the mailbox).
    Flags(Flags),
    /// EXISTS response (message count).
    Exists(u32),
    /// RECENT response.
    Recent(u32),
    /// EXPUNGE response (message removed at this sequence number).
    Expunge(SeqNum),
    /// FETCH response.
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// Fetch data items.
        items: Vec<FetchItem>,
    },
    /// SEARCH response. Raw numbers; whether they are sequence numbers or
    /// UIDs depends on the command that solicited them.
    Search(Vec<u32>),
    /// ESEARCH response (RFC 4731), restricted to the ALL result.
    ESearch {
        /// Command tag named by the TAG correlator, if present.
        tag: Option<String>,
        /// Whether the UID indicator was present.
        uid: bool,
        /// Expanded ALL set, ascending. Empty when the result was empty.
        all: Vec<u32>,
    },
    /// VANISHED response (RFC 7162).
    Vanished {
        /// Whether the (EARLIER) modifier was present.
        earlier: bool,
        /// Expanded UID set, ascending.
        uids: Vec<u32>,
    },
    /// ARRIVED response (QRESYNC-ARRIVED draft): UIDs of new arrivals.
    Arrived(Vec<u32>),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Flag;

    #[test]
    fn fetch_item_flags() {
        let item = FetchItem::Flags(Flags::from_vec(vec![Flag::Seen]));
        assert!(matches!(item, FetchItem::Flags(f) if f.is_seen()));
    }

    #[test]
    fn fetch_item_uid() {
        let item = FetchItem::Uid(Uid::new(42).unwrap());
        assert!(matches!(item, FetchItem::Uid(u) if u.get() == 42));
    }

    #[test]
    fn fetch_item_modseq() {
        let item = FetchItem::ModSeq(98765);
        assert!(matches!(item, FetchItem::ModSeq(98765)));
    }

    #[test]
    fn vanished_response() {
        let resp = UntaggedResponse::Vanished {
            earlier: true,
            uids: vec![1, 2, 3],
        };
        assert!(matches!(resp, UntaggedResponse::Vanished { earlier: true, .. }));
    }
}
