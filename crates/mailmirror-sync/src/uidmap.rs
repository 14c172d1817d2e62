//! Ordered UID sequence for a mailbox.

use serde::{Deserialize, Serialize};

/// The UIDs of a mailbox in sequence-number order.
///
/// Entry `i` is the message whose sequence number is `i + 1`. A zero entry
/// is a placeholder for a message whose UID has not been learned yet; no
/// placeholder survives to a committed checkpoint. EXPUNGE renumbering is
/// plain index arithmetic: removing index `k` shifts every later entry down
/// by one, exactly as the server renumbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UidMap(Vec<u32>);

impl UidMap {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates a map from UIDs in sequence order.
    #[must_use]
    pub fn from_uids(uids: Vec<u32>) -> Self {
        Self(uids)
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the mailbox is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// UID at a 0-based index; 0 means not yet known.
    #[must_use]
    pub fn uid_at(&self, index: usize) -> Option<u32> {
        self.0.get(index).copied()
    }

    /// Assigns the UID at a 0-based index.
    pub fn set_uid_at(&mut self, index: usize, uid: u32) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = uid;
        }
    }

    /// Appends a message at the end of the sequence.
    pub fn push(&mut self, uid: u32) {
        self.0.push(uid);
    }

    /// Removes the entry at a 0-based index, returning its UID.
    pub fn remove_index(&mut self, index: usize) -> Option<u32> {
        if index < self.0.len() {
            Some(self.0.remove(index))
        } else {
            None
        }
    }

    /// Removes the first entry carrying the given UID. Returns whether an
    /// entry was removed.
    pub fn remove_uid(&mut self, uid: u32) -> bool {
        if let Some(index) = self.position_of(uid) {
            self.0.remove(index);
            true
        } else {
            false
        }
    }

    /// 0-based index of a UID.
    #[must_use]
    pub fn position_of(&self, uid: u32) -> Option<usize> {
        if uid == 0 {
            return None;
        }
        self.0.iter().position(|&u| u == uid)
    }

    /// True when the UID is present.
    #[must_use]
    pub fn contains(&self, uid: u32) -> bool {
        self.position_of(uid).is_some()
    }

    /// Largest known UID, 0 for an empty or all-placeholder map.
    #[must_use]
    pub fn max_uid(&self) -> u32 {
        self.0.iter().copied().max().unwrap_or(0)
    }

    /// Number of placeholder (UID not yet known) entries.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.0.iter().filter(|&&u| u == 0).count()
    }

    /// Iterates over the UIDs in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    /// The UIDs as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// Checks the committed-checkpoint invariants against a state: length
    /// equals EXISTS, every UID strictly positive and below UIDNEXT, no
    /// duplicates. Returns the first violation as text.
    ///
    /// # Errors
    ///
    /// Returns a description of the violated invariant.
    pub fn check_against(&self, exists: u32, uid_next: u32) -> Result<(), String> {
        if self.0.len() != exists as usize {
            return Err(format!(
                "length {} does not match EXISTS {exists}",
                self.0.len()
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for &uid in &self.0 {
            if uid == 0 {
                return Err("placeholder UID at a committed checkpoint".to_string());
            }
            if uid >= uid_next {
                return Err(format!("UID {uid} not below UIDNEXT {uid_next}"));
            }
            if !seen.insert(uid) {
                return Err(format!("duplicate UID {uid}"));
            }
        }
        Ok(())
    }
}

impl From<Vec<u32>> for UidMap {
    fn from(uids: Vec<u32>) -> Self {
        Self(uids)
    }
}
