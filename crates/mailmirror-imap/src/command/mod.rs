//! IMAP command builder.
//!
//! Command types and serialization for the synchronization dialog.

mod tag_generator;

pub use tag_generator::TagGenerator;

use crate::qresync::QresyncParams;
use crate::types::{Mailbox, SequenceSet, Uid, UidSet};

/// SELECT parameter variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectParam {
    /// Plain SELECT.
    Plain,
    /// SELECT with `(CONDSTORE)`.
    CondStore,
    /// SELECT with `(QRESYNC (...))`.
    QResync(QresyncParams),
    /// SELECT with `(QRESYNC-ARRIVED (...))` (draft extension).
    QResyncArrived(QresyncParams),
}

/// What a UID SEARCH should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UidSearchQuery {
    /// Every message: `UID SEARCH ALL`.
    All,
    /// Messages with UID at or above the given one: `UID SEARCH UID n:*`.
    Since(Uid),
}

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,
    /// SELECT command with optional resynchronization parameter.
    Select {
        /// Mailbox to select.
        mailbox: Mailbox,
        /// Resynchronization parameter.
        param: SelectParam,
    },
    /// UID SEARCH command, optionally in the ESEARCH `RETURN ()` form.
    UidSearch {
        /// Search coverage.
        query: UidSearchQuery,
        /// Use `RETURN ()` (RFC 4731) so results arrive as ESEARCH.
        esearch: bool,
    },
    /// FETCH of flags over a sequence-number range.
    FetchFlags {
        /// Sequence range.
        range: SequenceSet,
        /// Optional `(CHANGEDSINCE n)` modifier (CONDSTORE).
        changed_since: Option<u64>,
    },
    /// UID FETCH of flags over a UID set.
    UidFetchFlags {
        /// UID set.
        uids: UidSet,
    },
}

impl Command {
    /// Serializes the command to wire bytes with the given tag.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),

            Self::Select { mailbox, param } => {
                buf.extend_from_slice(b"SELECT ");
                write_mailbox(&mut buf, mailbox);
                match param {
                    SelectParam::Plain => {}
                    SelectParam::CondStore => buf.extend_from_slice(b" (CONDSTORE)"),
                    SelectParam::QResync(params) => {
                        buf.extend_from_slice(b" (QRESYNC ");
                        buf.extend_from_slice(params.serialize().as_bytes());
                        buf.push(b')');
                    }
                    SelectParam::QResyncArrived(params) => {
                        buf.extend_from_slice(b" (QRESYNC-ARRIVED ");
                        buf.extend_from_slice(params.serialize().as_bytes());
                        buf.push(b')');
                    }
                }
            }

            Self::UidSearch { query, esearch } => {
                buf.extend_from_slice(b"UID SEARCH ");
                if *esearch {
                    buf.extend_from_slice(b"RETURN () ");
                }
                match query {
                    UidSearchQuery::All => buf.extend_from_slice(b"ALL"),
                    UidSearchQuery::Since(uid) => {
                        buf.extend_from_slice(format!("UID {uid}:*").as_bytes());
                    }
                }
            }

            Self::FetchFlags {
                range,
                changed_since,
            } => {
                buf.extend_from_slice(b"FETCH ");
                buf.extend_from_slice(range.to_string().as_bytes());
                buf.extend_from_slice(b" (FLAGS)");
                if let Some(mod_seq) = changed_since {
                    buf.extend_from_slice(format!(" (CHANGEDSINCE {mod_seq})").as_bytes());
                }
            }

            Self::UidFetchFlags { uids } => {
                buf.extend_from_slice(b"UID FETCH ");
                buf.extend_from_slice(uids.to_string().as_bytes());
                buf.extend_from_slice(b" (FLAGS)");
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }
}

/// Writes a mailbox name, quoting it when it is not a bare atom.
fn write_mailbox(buf: &mut Vec<u8>, mailbox: &Mailbox) {
    use crate::parser::cursor::atom_byte;

    let name = mailbox.as_str();
    let needs_quoting = name.is_empty()
        || name.bytes().any(|b| !atom_byte(b) || b == b'\\');
    if needs_quoting {
        buf.push(b'"');
        for b in name.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(name.as_bytes());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::qresync::{ModSeq, SeqUidMatch};
    use crate::types::UidValidity;

    #[test]
    fn select_plain() {
        let cmd = Command::Select {
            mailbox: Mailbox::new("a"),
            param: SelectParam::Plain,
        };
        assert_eq!(cmd.serialize("A0000"), b"A0000 SELECT a\r\n");
    }

    #[test]
    fn select_quotes_special_names() {
        let cmd = Command::Select {
            mailbox: Mailbox::new("Sent Items"),
            param: SelectParam::Plain,
        };
        assert_eq!(cmd.serialize("A0000"), b"A0000 SELECT \"Sent Items\"\r\n");
    }

    #[test]
    fn select_condstore() {
        let cmd = Command::Select {
            mailbox: Mailbox::new("a"),
            param: SelectParam::CondStore,
        };
        assert_eq!(cmd.serialize("A0000"), b"A0000 SELECT a (CONDSTORE)\r\n");
    }

    #[test]
    fn select_qresync() {
        let params = QresyncParams::new(
            UidValidity::new(666).unwrap(),
            ModSeq::from_u64(33).unwrap(),
        )
        .with_sample(SeqUidMatch::from_uid_map(&[6, 9, 10]).unwrap());
        let cmd = Command::Select {
            mailbox: Mailbox::new("a"),
            param: SelectParam::QResync(params),
        };
        assert_eq!(
            cmd.serialize("A0000"),
            b"A0000 SELECT a (QRESYNC (666 33 (2 9)))\r\n"
        );
    }

    #[test]
    fn select_qresync_arrived() {
        let params = QresyncParams::new(
            UidValidity::new(666).unwrap(),
            ModSeq::from_u64(10).unwrap(),
        )
        .with_sample(SeqUidMatch::from_uid_map(&[1, 2, 3, 4, 5]).unwrap());
        let cmd = Command::Select {
            mailbox: Mailbox::new("a"),
            param: SelectParam::QResyncArrived(params),
        };
        assert_eq!(
            cmd.serialize("A0000"),
            b"A0000 SELECT a (QRESYNC-ARRIVED (666 10 (3,5 3,5)))\r\n"
        );
    }

    #[test]
    fn uid_search_all() {
        let cmd = Command::UidSearch {
            query: UidSearchQuery::All,
            esearch: false,
        };
        assert_eq!(cmd.serialize("A0001"), b"A0001 UID SEARCH ALL\r\n");
    }

    #[test]
    fn uid_search_all_esearch() {
        let cmd = Command::UidSearch {
            query: UidSearchQuery::All,
            esearch: true,
        };
        assert_eq!(cmd.serialize("A0001"), b"A0001 UID SEARCH RETURN () ALL\r\n");
    }

    #[test]
    fn uid_search_since() {
        let cmd = Command::UidSearch {
            query: UidSearchQuery::Since(Uid::new(15).unwrap()),
            esearch: false,
        };
        assert_eq!(cmd.serialize("A0001"), b"A0001 UID SEARCH UID 15:*\r\n");
    }

    #[test]
    fn uid_search_since_esearch() {
        let cmd = Command::UidSearch {
            query: UidSearchQuery::Since(Uid::new(15).unwrap()),
            esearch: true,
        };
        assert_eq!(
            cmd.serialize("A0001"),
            b"A0001 UID SEARCH RETURN () UID 15:*\r\n"
        );
    }

    #[test]
    fn fetch_flags() {
        let cmd = Command::FetchFlags {
            range: SequenceSet::range(1, 4).unwrap(),
            changed_since: None,
        };
        assert_eq!(cmd.serialize("A0002"), b"A0002 FETCH 1:4 (FLAGS)\r\n");
    }

    #[test]
    fn fetch_flags_changedsince() {
        let cmd = Command::FetchFlags {
            range: SequenceSet::range(1, 3).unwrap(),
            changed_since: Some(33),
        };
        assert_eq!(
            cmd.serialize("A0002"),
            b"A0002 FETCH 1:3 (FLAGS) (CHANGEDSINCE 33)\r\n"
        );
    }

    #[test]
    fn uid_fetch_flags_open_range() {
        let cmd = Command::UidFetchFlags {
            uids: UidSet::RangeFrom(Uid::new(43).unwrap()),
        };
        assert_eq!(cmd.serialize("A0003"), b"A0003 UID FETCH 43:* (FLAGS)\r\n");
    }

    #[test]
    fn uid_fetch_flags_closed_range() {
        let cmd = Command::UidFetchFlags {
            uids: UidSet::range(Uid::new(15).unwrap(), Uid::new(20).unwrap()),
        };
        assert_eq!(cmd.serialize("A0003"), b"A0003 UID FETCH 15:20 (FLAGS)\r\n");
    }

    #[test]
    fn noop_and_logout() {
        assert_eq!(Command::Noop.serialize("A0004"), b"A0004 NOOP\r\n");
        assert_eq!(Command::Logout.serialize("A0005"), b"A0005 LOGOUT\r\n");
    }
}
