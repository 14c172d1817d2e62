//! Persistent per-mailbox cache contract and the in-memory implementation.

use std::collections::HashMap;

use thiserror::Error;

use crate::state::SyncState;
use crate::uidmap::UidMap;

/// Cache I/O failure.
///
/// The synchronizer never treats these as fatal: failures are logged and
/// the in-memory view stays authoritative for the session.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store rejected or failed an operation.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Result alias for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Store of everything the engine knows about mailboxes between sessions.
///
/// Keyed by mailbox path; UID-keyed entries belong to the UIDVALIDITY epoch
/// recorded in the sync state. Readers observe either the previous committed
/// state in its entirety or the new one; the engine guarantees this by
/// writing flags first, then the UID map, then the sync state.
pub trait Cache {
    /// Returns the committed sync state, default when none is stored.
    fn sync_state(&self, path: &str) -> CacheResult<SyncState>;

    /// Stores the sync state. Last write of a commit sequence.
    fn set_sync_state(&mut self, path: &str, state: SyncState) -> CacheResult<()>;

    /// Returns the committed UID map, empty when none is stored.
    fn uid_map(&self, path: &str) -> CacheResult<UidMap>;

    /// Stores the UID map.
    fn set_uid_map(&mut self, path: &str, map: UidMap) -> CacheResult<()>;

    /// Returns the flags of a message, empty for unknown UIDs.
    fn msg_flags(&self, path: &str, uid: u32) -> CacheResult<Vec<String>>;

    /// Stores the flags of a message. An empty set removes the entry, so an
    /// absent message and a flagless one are indistinguishable, as intended.
    fn set_msg_flags(&mut self, path: &str, uid: u32, flags: Vec<String>) -> CacheResult<()>;

    /// Returns opaque message metadata (envelope etc.), written by higher
    /// layers. Empty when absent.
    fn message_metadata(&self, path: &str, uid: u32) -> CacheResult<Vec<u8>>;

    /// Stores opaque message metadata.
    fn set_message_metadata(&mut self, path: &str, uid: u32, data: Vec<u8>) -> CacheResult<()>;

    /// Returns an opaque message part blob. Empty when absent.
    fn message_part(&self, path: &str, uid: u32, part: &str) -> CacheResult<Vec<u8>>;

    /// Stores an opaque message part blob.
    fn set_message_part(
        &mut self,
        path: &str,
        uid: u32,
        part: &str,
        data: Vec<u8>,
    ) -> CacheResult<()>;

    /// Erases every UID-keyed entry for the path: UID map, flags, metadata,
    /// parts. Used when UIDVALIDITY changes.
    fn clear_uid_space(&mut self, path: &str) -> CacheResult<()>;
}

/// In-memory cache.
///
/// The process-local store the engine works against during a session, and
/// the test double for the scenario suite.
#[derive(Debug, Default)]
pub struct MemoryCache {
    states: HashMap<String, SyncState>,
    uid_maps: HashMap<String, UidMap>,
    flags: HashMap<(String, u32), Vec<String>>,
    metadata: HashMap<(String, u32), Vec<u8>>,
    parts: HashMap<(String, u32, String), Vec<u8>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn sync_state(&self, path: &str) -> CacheResult<SyncState> {
        Ok(self.states.get(path).cloned().unwrap_or_default())
    }

    fn set_sync_state(&mut self, path: &str, state: SyncState) -> CacheResult<()> {
        self.states.insert(path.to_string(), state);
        Ok(())
    }

    fn uid_map(&self, path: &str) -> CacheResult<UidMap> {
        Ok(self.uid_maps.get(path).cloned().unwrap_or_default())
    }

    fn set_uid_map(&mut self, path: &str, map: UidMap) -> CacheResult<()> {
        self.uid_maps.insert(path.to_string(), map);
        Ok(())
    }

    fn msg_flags(&self, path: &str, uid: u32) -> CacheResult<Vec<String>> {
        Ok(self
            .flags
            .get(&(path.to_string(), uid))
            .cloned()
            .unwrap_or_default())
    }

    fn set_msg_flags(&mut self, path: &str, uid: u32, flags: Vec<String>) -> CacheResult<()> {
        let key = (path.to_string(), uid);
        if flags.is_empty() {
            self.flags.remove(&key);
        } else {
            self.flags.insert(key, flags);
        }
        Ok(())
    }

    fn message_metadata(&self, path: &str, uid: u32) -> CacheResult<Vec<u8>> {
        Ok(self
            .metadata
            .get(&(path.to_string(), uid))
            .cloned()
            .unwrap_or_default())
    }

    fn set_message_metadata(&mut self, path: &str, uid: u32, data: Vec<u8>) -> CacheResult<()> {
        self.metadata.insert((path.to_string(), uid), data);
        Ok(())
    }

    fn message_part(&self, path: &str, uid: u32, part: &str) -> CacheResult<Vec<u8>> {
        Ok(self
            .parts
            .get(&(path.to_string(), uid, part.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn set_message_part(
        &mut self,
        path: &str,
        uid: u32,
        part: &str,
        data: Vec<u8>,
    ) -> CacheResult<()> {
        self.parts
            .insert((path.to_string(), uid, part.to_string()), data);
        Ok(())
    }

    fn clear_uid_space(&mut self, path: &str) -> CacheResult<()> {
        self.uid_maps.remove(path);
        self.flags.retain(|(p, _), _| p != path);
        self.metadata.retain(|(p, _), _| p != path);
        self.parts.retain(|(p, _, _), _| p != path);
        Ok(())
    }
}
