//! Response codes.

use super::{Capability, Flag, SeqNum, Uid, UidValidity};

/// Response code carried in a status response.
///
/// These provide additional information about command completion or,
/// during SELECT, about the state of the selected mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: Human-readable message that MUST be shown to user.
    Alert,
    /// CAPABILITY response.
    Capability(Vec<Capability>),
    /// PERMANENTFLAGS: Flags that can be changed permanently.
    PermanentFlags(Vec<Flag>),
    /// READ-ONLY: Mailbox selected as read-only.
    ReadOnly,
    /// READ-WRITE: Mailbox selected as read-write.
    ReadWrite,
    /// UIDNEXT: Next UID to be assigned.
    UidNext(Uid),
    /// UIDVALIDITY: Unique identifier validity value.
    UidValidity(UidValidity),
    /// UNSEEN: First unseen message sequence number.
    Unseen(SeqNum),
    /// HIGHESTMODSEQ: Highest mod-sequence value (CONDSTORE).
    HighestModSeq(u64),
    /// NOMODSEQ: Server doesn't support mod-sequences for this mailbox.
    NoModSeq,
    /// CLOSED: Previously selected mailbox is now closed (RFC 7162).
    Closed,
    /// Unknown response code.
    Unknown(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn uid_next() {
        let code = ResponseCode::UidNext(Uid::new(100).unwrap());
        if let ResponseCode::UidNext(u) = code {
            assert_eq!(u.get(), 100);
        } else {
            panic!("Expected UidNext variant");
        }
    }

    #[test]
    fn uid_validity() {
        let code = ResponseCode::UidValidity(UidValidity::new(666).unwrap());
        assert!(matches!(code, ResponseCode::UidValidity(v) if v.get() == 666));
    }

    #[test]
    fn highest_mod_seq() {
        let code = ResponseCode::HighestModSeq(987_654_321);
        assert!(matches!(code, ResponseCode::HighestModSeq(987_654_321)));
    }

    #[test]
    fn no_mod_seq() {
        assert!(matches!(ResponseCode::NoModSeq, ResponseCode::NoModSeq));
    }

    #[test]
    fn permanent_flags() {
        let code =
            ResponseCode::PermanentFlags(vec![Flag::Seen, Flag::Deleted, Flag::Wildcard]);
        if let ResponseCode::PermanentFlags(f) = code {
            assert_eq!(f.len(), 3);
        } else {
            panic!("Expected PermanentFlags variant");
        }
    }

    #[test]
    fn unknown() {
        let code = ResponseCode::Unknown("URLMECH".to_string());
        assert!(matches!(code, ResponseCode::Unknown(s) if s == "URLMECH"));
    }
}
