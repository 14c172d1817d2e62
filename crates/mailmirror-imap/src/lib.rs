//! # mailmirror-imap
//!
//! Sans-I/O wire layer for the mailmirror IMAP4rev1 synchronization engine:
//! protocol types, a response parser, and command builders. No sockets,
//! no TLS, no runtime — bytes in, typed values out.
//!
//! The surface is deliberately limited to the mailbox-synchronization dialog:
//! SELECT (plain, CONDSTORE, QRESYNC, and the QRESYNC-ARRIVED draft),
//! UID SEARCH (plain and ESEARCH `RETURN ()` forms), flag FETCHes (including
//! `CHANGEDSINCE`), and the untagged responses those commands solicit —
//! together with the unsolicited EXISTS/EXPUNGE/FETCH/VANISHED/ARRIVED
//! traffic a server may interleave at any time.
//!
//! ## Modules
//!
//! - [`command`]: command builders, serialization, tag generation
//! - [`parser`]: recursive-descent response parser
//! - [`qresync`]: QRESYNC/CONDSTORE parameter types
//! - [`types`]: core IMAP types (flags, UIDs, sequence sets, capabilities)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
mod error;
pub mod parser;
pub mod qresync;
pub mod types;

pub use command::{Command, SelectParam, TagGenerator, UidSearchQuery};
pub use error::{Error, Result};
pub use parser::{FetchItem, Response, ResponseParser, UntaggedResponse};
pub use qresync::{ModSeq, QresyncParams, SeqUidMatch};
pub use types::{
    expand_number_set, Capability, Flag, Flags, Mailbox, ResponseCode, SeqNum, SequenceSet,
    Status, Tag, Uid, UidSet, UidValidity,
};
