//! # mailmirror-sync
//!
//! The mailbox synchronization engine of an IMAP4rev1 client: given a named
//! remote mailbox and a persistent cache of its previous state, it drives a
//! server dialog to a consistent, ordered list of message UIDs and flags,
//! exploiting CONDSTORE, QRESYNC, ESEARCH, and the QRESYNC-ARRIVED draft
//! when the server advertises them.
//!
//! The engine is sans-I/O and single-threaded: feed server bytes into a
//! [`Session`], drain command bytes out, and observe progress through a
//! [`MailboxListener`]. The cache is updated atomically at well-defined
//! checkpoints — flags first, then the UID map, then the sync state — so a
//! crash or disconnection at any point leaves the previous committed
//! snapshot intact.
//!
//! ```no_run
//! use mailmirror_imap::Capability;
//! use mailmirror_sync::{MemoryCache, NoopListener, Session};
//!
//! let mut session = Session::new(MemoryCache::new(), NoopListener);
//! session.set_capabilities(vec![Capability::Imap4Rev1, Capability::QResync]);
//! session.synchronize("INBOX");
//! while let Some(bytes) = session.poll_transmit() {
//!     // write bytes to the connection
//! }
//! // feed everything the server sends into session.handle_input(..)
//! ```
//!
//! ## Modules
//!
//! - [`cache`]: the persistent-store contract and the in-memory cache
//! - [`demux`]: untagged-response classification
//! - [`listener`]: observer callbacks
//! - [`model`]: the observable row mirror
//! - [`session`]: framing and routing
//! - [`state`]: the per-mailbox scalar snapshot
//! - [`sync`]: the synchronizer task itself
//! - [`uidmap`]: the ordered UID sequence

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod demux;
pub mod listener;
pub mod model;
pub mod session;
pub mod state;
pub mod sync;
pub mod uidmap;

pub use cache::{Cache, CacheError, CacheResult, MemoryCache};
pub use demux::{classify, MailboxEvent};
pub use listener::{CollectingListener, ListenerEvent, MailboxListener, NoopListener};
pub use model::{MailboxModel, MessageRow};
pub use session::Session;
pub use state::SyncState;
pub use sync::{Phase, Strategy, SyncContext, Synchronizer};
pub use uidmap::UidMap;
