//! Per-mailbox synchronization state.

use serde::{Deserialize, Serialize};

/// Scalar snapshot of a mailbox as reported by SELECT.
///
/// Every field distinguishes "never observed" from "observed to be zero or
/// empty"; accessors return the observed value or a zero/empty default.
/// This is the payload the cache keys by mailbox path, and the value the
/// synchronizer stages while a sync is in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    exists: Option<u32>,
    recent: Option<u32>,
    uid_next: Option<u32>,
    uid_validity: Option<u32>,
    unseen_count: Option<u32>,
    unseen_offset: Option<u32>,
    highest_mod_seq: Option<u64>,
    flags: Option<Vec<String>>,
    permanent_flags: Option<Vec<String>>,
}

impl SyncState {
    /// Creates a state with nothing observed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages, 0 when unobserved.
    #[must_use]
    pub fn exists(&self) -> u32 {
        self.exists.unwrap_or(0)
    }

    /// Sets the message count.
    pub fn set_exists(&mut self, n: u32) {
        self.exists = Some(n);
    }

    /// Whether EXISTS has been observed at all.
    #[must_use]
    pub fn has_exists(&self) -> bool {
        self.exists.is_some()
    }

    /// Number of recent messages, 0 when unobserved.
    #[must_use]
    pub fn recent(&self) -> u32 {
        self.recent.unwrap_or(0)
    }

    /// Sets the recent count.
    pub fn set_recent(&mut self, n: u32) {
        self.recent = Some(n);
    }

    /// Predicted next UID, 0 when unobserved.
    #[must_use]
    pub fn uid_next(&self) -> u32 {
        self.uid_next.unwrap_or(0)
    }

    /// Sets the predicted next UID.
    pub fn set_uid_next(&mut self, n: u32) {
        self.uid_next = Some(n);
    }

    /// UIDVALIDITY epoch, 0 when unobserved.
    #[must_use]
    pub fn uid_validity(&self) -> u32 {
        self.uid_validity.unwrap_or(0)
    }

    /// Sets the UIDVALIDITY epoch.
    pub fn set_uid_validity(&mut self, n: u32) {
        self.uid_validity = Some(n);
    }

    /// Count of unseen messages, 0 when unobserved.
    #[must_use]
    pub fn unseen_count(&self) -> u32 {
        self.unseen_count.unwrap_or(0)
    }

    /// Sets the unseen count.
    pub fn set_unseen_count(&mut self, n: u32) {
        self.unseen_count = Some(n);
    }

    /// Sequence offset of the first unseen message, 0 when unobserved.
    #[must_use]
    pub fn unseen_offset(&self) -> u32 {
        self.unseen_offset.unwrap_or(0)
    }

    /// Sets the first-unseen offset.
    pub fn set_unseen_offset(&mut self, n: u32) {
        self.unseen_offset = Some(n);
    }

    /// HIGHESTMODSEQ, 0 when unobserved or when the mailbox has none.
    #[must_use]
    pub fn highest_mod_seq(&self) -> u64 {
        self.highest_mod_seq.unwrap_or(0)
    }

    /// Sets the HIGHESTMODSEQ. Zero records a NOMODSEQ mailbox.
    pub fn set_highest_mod_seq(&mut self, n: u64) {
        self.highest_mod_seq = Some(n);
    }

    /// Applicable flags in server order, empty when unobserved.
    #[must_use]
    pub fn flags(&self) -> &[String] {
        self.flags.as_deref().unwrap_or(&[])
    }

    /// Sets the applicable flags.
    pub fn set_flags(&mut self, flags: Vec<String>) {
        self.flags = Some(flags);
    }

    /// Permanent flags in server order, empty when unobserved.
    #[must_use]
    pub fn permanent_flags(&self) -> &[String] {
        self.permanent_flags.as_deref().unwrap_or(&[])
    }

    /// Sets the permanent flags.
    pub fn set_permanent_flags(&mut self, flags: Vec<String>) {
        self.permanent_flags = Some(flags);
    }

    /// True when EXISTS, UIDNEXT, and UIDVALIDITY have all been observed,
    /// so cached sequence numbers and UIDs can be reasoned about.
    #[must_use]
    pub fn is_usable_for_numbers(&self) -> bool {
        self.exists.is_some() && self.uid_next.is_some() && self.uid_validity.is_some()
    }

    /// True when the state additionally carries flags, permanent flags, and
    /// the recent count, i.e. a full SELECT response has been absorbed.
    #[must_use]
    pub fn is_usable_for_syncing(&self) -> bool {
        self.is_usable_for_numbers()
            && self.flags.is_some()
            && self.permanent_flags.is_some()
            && self.recent.is_some()
    }
}
