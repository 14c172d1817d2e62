//! # mailmirror-store
//!
//! SQLite-backed persistence for the mailmirror synchronization engine.
//!
//! The engine itself works against a process-local, synchronous cache; this
//! crate stores the committed snapshots durably between sessions. A typical
//! embedder hydrates a [`mailmirror_sync::MemoryCache`] from the repository
//! at startup, runs the engine, and persists the committed snapshot after
//! each successful synchronization. Store failures are surfaced as values
//! and treated as non-fatal: the in-memory view stays authoritative for the
//! session.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
mod repository;

pub use error::{Error, Result};
pub use repository::SyncRepository;
