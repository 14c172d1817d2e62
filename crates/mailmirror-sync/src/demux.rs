//! Classification of untagged responses into mailbox-scoped events.

use mailmirror_imap::{FetchItem, ResponseCode, UntaggedResponse};

/// A mailbox-scoped server event, in arrival order.
///
/// The projection of an untagged response onto what the synchronizer cares
/// about. Response codes riding on untagged `OK` lines (UIDVALIDITY,
/// UIDNEXT, HIGHESTMODSEQ, ...) surface as their own events.
#[derive(Debug, Clone, PartialEq)]
pub enum MailboxEvent {
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE` (1-based sequence number)
    Expunge(u32),
    /// `* n FETCH (...)`, reduced to the sync-relevant items.
    Fetch {
        /// 1-based sequence number.
        seq: u32,
        /// FLAGS item, normalized to sorted atoms, when present.
        flags: Option<Vec<String>>,
        /// UID item when present.
        uid: Option<u32>,
        /// MODSEQ item when present.
        mod_seq: Option<u64>,
    },
    /// `* FLAGS (...)` — applicable flags, server order.
    Flags(Vec<String>),
    /// `[PERMANENTFLAGS (...)]`
    PermanentFlags(Vec<String>),
    /// `[UIDVALIDITY n]`
    UidValidity(u32),
    /// `[UIDNEXT n]`
    UidNext(u32),
    /// `[HIGHESTMODSEQ n]`
    HighestModSeq(u64),
    /// `[NOMODSEQ]`
    NoModSeq,
    /// `[READ-ONLY]`
    ReadOnly,
    /// `[READ-WRITE]`
    ReadWrite,
    /// `[UNSEEN n]`
    Unseen(u32),
    /// `* SEARCH n...` — raw numbers; UIDs for the UID SEARCHes we issue.
    Search(Vec<u32>),
    /// `* ESEARCH ... ALL <set>` with the correlated command tag.
    ESearch {
        /// Tag named in the correlator, if any.
        tag: Option<String>,
        /// Expanded ALL set, ascending.
        uids: Vec<u32>,
    },
    /// `* VANISHED [(EARLIER)] <set>`
    Vanished {
        /// Whether `(EARLIER)` was present.
        earlier: bool,
        /// Expanded UID set, ascending.
        uids: Vec<u32>,
    },
    /// `* ARRIVED <set>` (QRESYNC-ARRIVED draft).
    Arrived(Vec<u32>),
}

/// Classifies an untagged response, returning `None` for responses that are
/// not scoped to the selected mailbox (CAPABILITY, BYE, bare status lines).
#[must_use]
pub fn classify(response: &UntaggedResponse) -> Option<MailboxEvent> {
    match response {
        UntaggedResponse::Exists(n) => Some(MailboxEvent::Exists(*n)),
        UntaggedResponse::Recent(n) => Some(MailboxEvent::Recent(*n)),
        UntaggedResponse::Expunge(seq) => Some(MailboxEvent::Expunge(seq.get())),
        UntaggedResponse::Flags(flags) => Some(MailboxEvent::Flags(flags.to_atoms())),
        UntaggedResponse::Fetch { seq, items } => {
            let mut flags = None;
            let mut uid = None;
            let mut mod_seq = None;
            for item in items {
                match item {
                    FetchItem::Flags(f) => flags = Some(f.to_sorted_atoms()),
                    FetchItem::Uid(u) => uid = Some(u.get()),
                    FetchItem::ModSeq(m) => mod_seq = Some(*m),
                }
            }
            Some(MailboxEvent::Fetch {
                seq: seq.get(),
                flags,
                uid,
                mod_seq,
            })
        }
        UntaggedResponse::Search(nums) => Some(MailboxEvent::Search(nums.clone())),
        UntaggedResponse::ESearch { tag, all, .. } => Some(MailboxEvent::ESearch {
            tag: tag.clone(),
            uids: all.clone(),
        }),
        UntaggedResponse::Vanished { earlier, uids } => Some(MailboxEvent::Vanished {
            earlier: *earlier,
            uids: uids.clone(),
        }),
        UntaggedResponse::Arrived(uids) => Some(MailboxEvent::Arrived(uids.clone())),
        UntaggedResponse::Ok { code, .. } | UntaggedResponse::No { code, .. } => {
            classify_code(code.as_ref())
        }
        _ => None,
    }
}

fn classify_code(code: Option<&ResponseCode>) -> Option<MailboxEvent> {
    match code? {
        ResponseCode::UidValidity(v) => Some(MailboxEvent::UidValidity(v.get())),
        ResponseCode::UidNext(u) => Some(MailboxEvent::UidNext(u.get())),
        ResponseCode::HighestModSeq(n) => Some(MailboxEvent::HighestModSeq(*n)),
        ResponseCode::NoModSeq => Some(MailboxEvent::NoModSeq),
        ResponseCode::ReadOnly => Some(MailboxEvent::ReadOnly),
        ResponseCode::ReadWrite => Some(MailboxEvent::ReadWrite),
        ResponseCode::Unseen(seq) => Some(MailboxEvent::Unseen(seq.get())),
        ResponseCode::PermanentFlags(flags) => Some(MailboxEvent::PermanentFlags(
            flags.iter().map(|f| f.as_str().to_string()).collect(),
        )),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mailmirror_imap::ResponseParser;

    fn classify_line(line: &[u8]) -> Option<MailboxEvent> {
        match ResponseParser::parse(line).unwrap() {
            mailmirror_imap::Response::Untagged(untagged) => classify(&untagged),
            _ => panic!("expected untagged response"),
        }
    }

    #[test]
    fn exists_and_recent() {
        assert_eq!(classify_line(b"* 3 EXISTS\r\n"), Some(MailboxEvent::Exists(3)));
        assert_eq!(classify_line(b"* 0 RECENT\r\n"), Some(MailboxEvent::Recent(0)));
    }

    #[test]
    fn expunge() {
        assert_eq!(classify_line(b"* 4 EXPUNGE\r\n"), Some(MailboxEvent::Expunge(4)));
    }

    #[test]
    fn fetch_flags_normalized() {
        let event = classify_line(b"* 2 FETCH (UID 9 FLAGS (x2 \\Seen))\r\n").unwrap();
        assert_eq!(
            event,
            MailboxEvent::Fetch {
                seq: 2,
                flags: Some(vec!["\\Seen".to_string(), "x2".to_string()]),
                uid: Some(9),
                mod_seq: None,
            }
        );
    }

    #[test]
    fn select_codes() {
        assert_eq!(
            classify_line(b"* OK [UIDVALIDITY 666] .\r\n"),
            Some(MailboxEvent::UidValidity(666))
        );
        assert_eq!(
            classify_line(b"* OK [UIDNEXT 15] .\r\n"),
            Some(MailboxEvent::UidNext(15))
        );
        assert_eq!(
            classify_line(b"* OK [HIGHESTMODSEQ 33] .\r\n"),
            Some(MailboxEvent::HighestModSeq(33))
        );
        assert_eq!(
            classify_line(b"* OK [NOMODSEQ] .\r\n"),
            Some(MailboxEvent::NoModSeq)
        );
    }

    #[test]
    fn permanent_flags_keep_server_order() {
        let event =
            classify_line(b"* OK [PERMANENTFLAGS (\\Answered \\Seen \\*)] ok\r\n").unwrap();
        assert_eq!(
            event,
            MailboxEvent::PermanentFlags(vec![
                "\\Answered".to_string(),
                "\\Seen".to_string(),
                "\\*".to_string(),
            ])
        );
    }

    #[test]
    fn vanished_earlier() {
        assert_eq!(
            classify_line(b"* VANISHED (EARLIER) 1:3\r\n"),
            Some(MailboxEvent::Vanished {
                earlier: true,
                uids: vec![1, 2, 3]
            })
        );
    }

    #[test]
    fn connection_scoped_responses_are_not_events() {
        assert_eq!(classify_line(b"* CAPABILITY IMAP4rev1\r\n"), None);
        assert_eq!(classify_line(b"* BYE going down\r\n"), None);
        assert_eq!(classify_line(b"* NO a random no in inserted here\r\n"), None);
        assert_eq!(classify_line(b"* OK [URLMECH INTERNAL] Ok\r\n"), None);
    }
}
