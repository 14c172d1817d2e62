//! Core IMAP types.

mod capability;
mod flags;
mod identifiers;
mod mailbox;
mod response_code;
mod sequence;

pub use capability::{Capability, Status};
pub use flags::{Flag, Flags};
pub use identifiers::{SeqNum, Tag, Uid, UidValidity};
pub use mailbox::Mailbox;
pub use response_code::ResponseCode;
pub use sequence::{expand_number_set, SequenceSet, UidSet};
