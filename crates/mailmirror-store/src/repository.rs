//! SQLite repository for per-mailbox synchronization state.

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use mailmirror_sync::{Cache, MemoryCache, SyncState, UidMap};

use crate::Result;

/// Persistent store of everything the engine commits per mailbox: the
/// sync-state blob, the UID map, the UID→flags map, and the opaque
/// envelope/part blobs written by higher layers.
///
/// UID-keyed rows belong to the UIDVALIDITY epoch recorded in the stored
/// sync state; [`SyncRepository::clear_uid_space`] drops all of them in one
/// transaction when the epoch changes.
pub struct SyncRepository {
    pool: SqlitePool,
}

impl SyncRepository {
    /// Opens (creating if needed) the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Creates an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mailbox_sync_state (
                path TEXT NOT NULL PRIMARY KEY,
                state_json TEXT NOT NULL,
                cached_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mailbox_uid_map (
                path TEXT NOT NULL PRIMARY KEY,
                uids_json TEXT NOT NULL,
                cached_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS message_flags (
                path TEXT NOT NULL,
                uid INTEGER NOT NULL,
                flags_json TEXT NOT NULL,
                UNIQUE(path, uid)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS message_metadata (
                path TEXT NOT NULL,
                uid INTEGER NOT NULL,
                data BLOB NOT NULL,
                UNIQUE(path, uid)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS message_parts (
                path TEXT NOT NULL,
                uid INTEGER NOT NULL,
                part TEXT NOT NULL,
                data BLOB NOT NULL,
                UNIQUE(path, uid, part)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_flags_path ON message_flags(path)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the stored sync state, default when none is stored.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure or a corrupt blob.
    pub async fn sync_state(&self, path: &str) -> Result<SyncState> {
        let row = sqlx::query("SELECT state_json FROM mailbox_sync_state WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.get("state_json");
                Ok(serde_json::from_str(&json)?)
            }
            None => Ok(SyncState::new()),
        }
    }

    /// Stores the sync state. The last write of a commit sequence.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn set_sync_state(&self, path: &str, state: &SyncState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        sqlx::query(
            r"
            INSERT INTO mailbox_sync_state (path, state_json, cached_at)
            VALUES (?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                state_json = excluded.state_json,
                cached_at = excluded.cached_at
            ",
        )
        .bind(path)
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the stored UID map, empty when none is stored.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure or a corrupt blob.
    pub async fn uid_map(&self, path: &str) -> Result<UidMap> {
        let row = sqlx::query("SELECT uids_json FROM mailbox_uid_map WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.get("uids_json");
                let uids: Vec<u32> = serde_json::from_str(&json)?;
                Ok(UidMap::from_uids(uids))
            }
            None => Ok(UidMap::new()),
        }
    }

    /// Stores the UID map.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn set_uid_map(&self, path: &str, map: &UidMap) -> Result<()> {
        let json = serde_json::to_string(map.as_slice())?;
        sqlx::query(
            r"
            INSERT INTO mailbox_uid_map (path, uids_json, cached_at)
            VALUES (?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                uids_json = excluded.uids_json,
                cached_at = excluded.cached_at
            ",
        )
        .bind(path)
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the stored flags for a message, empty for unknown UIDs.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure or a corrupt blob.
    pub async fn msg_flags(&self, path: &str, uid: u32) -> Result<Vec<String>> {
        let row = sqlx::query("SELECT flags_json FROM message_flags WHERE path = ? AND uid = ?")
            .bind(path)
            .bind(i64::from(uid))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.get("flags_json");
                Ok(serde_json::from_str(&json)?)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Stores the flags of a message; an empty set removes the row.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn set_msg_flags(&self, path: &str, uid: u32, flags: &[String]) -> Result<()> {
        if flags.is_empty() {
            sqlx::query("DELETE FROM message_flags WHERE path = ? AND uid = ?")
                .bind(path)
                .bind(i64::from(uid))
                .execute(&self.pool)
                .await?;
            return Ok(());
        }
        let json = serde_json::to_string(flags)?;
        sqlx::query(
            r"
            INSERT INTO message_flags (path, uid, flags_json)
            VALUES (?, ?, ?)
            ON CONFLICT(path, uid) DO UPDATE SET flags_json = excluded.flags_json
            ",
        )
        .bind(path)
        .bind(i64::from(uid))
        .bind(json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the opaque metadata blob of a message, empty when absent.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn message_metadata(&self, path: &str, uid: u32) -> Result<Vec<u8>> {
        let row = sqlx::query("SELECT data FROM message_metadata WHERE path = ? AND uid = ?")
            .bind(path)
            .bind(i64::from(uid))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("data")).unwrap_or_default())
    }

    /// Stores the opaque metadata blob of a message.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn set_message_metadata(&self, path: &str, uid: u32, data: &[u8]) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO message_metadata (path, uid, data)
            VALUES (?, ?, ?)
            ON CONFLICT(path, uid) DO UPDATE SET data = excluded.data
            ",
        )
        .bind(path)
        .bind(i64::from(uid))
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns an opaque message part blob, empty when absent.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn message_part(&self, path: &str, uid: u32, part: &str) -> Result<Vec<u8>> {
        let row =
            sqlx::query("SELECT data FROM message_parts WHERE path = ? AND uid = ? AND part = ?")
                .bind(path)
                .bind(i64::from(uid))
                .bind(part)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.get("data")).unwrap_or_default())
    }

    /// Stores an opaque message part blob.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn set_message_part(
        &self,
        path: &str,
        uid: u32,
        part: &str,
        data: &[u8],
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO message_parts (path, uid, part, data)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(path, uid, part) DO UPDATE SET data = excluded.data
            ",
        )
        .bind(path)
        .bind(i64::from(uid))
        .bind(part)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Erases every UID-keyed row for the path in one transaction: the UID
    /// map, flags, metadata, and parts. Used when UIDVALIDITY changes.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure; nothing is deleted then.
    pub async fn clear_uid_space(&self, path: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM mailbox_uid_map WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM message_flags WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM message_metadata WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM message_parts WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Loads the committed snapshot of one mailbox into an in-memory cache
    /// the engine can work against for a session.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure or a corrupt blob.
    pub async fn hydrate(&self, path: &str, cache: &mut MemoryCache) -> Result<()> {
        let state = self.sync_state(path).await?;
        let map = self.uid_map(path).await?;

        for uid in map.iter() {
            let flags = self.msg_flags(path, uid).await?;
            if !flags.is_empty() {
                let _ = cache.set_msg_flags(path, uid, flags);
            }
        }
        let _ = cache.set_uid_map(path, map);
        let _ = cache.set_sync_state(path, state);
        Ok(())
    }

    /// Persists the committed snapshot of one mailbox from an in-memory
    /// cache, in the engine's commit order: flags, then the map, then the
    /// state.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure. A failed write leaves the
    /// store on its previous snapshot for the affected key only; callers
    /// treat this as a logged, non-fatal condition.
    pub async fn persist(&self, path: &str, cache: &MemoryCache) -> Result<()> {
        let state = cache.sync_state(path).unwrap_or_default();
        let map = cache.uid_map(path).unwrap_or_default();

        let stored = self.uid_map(path).await?;
        for uid in stored.iter() {
            if !map.contains(uid) {
                self.set_msg_flags(path, uid, &[]).await?;
            }
        }
        for uid in map.iter() {
            let flags = cache.msg_flags(path, uid).unwrap_or_default();
            self.set_msg_flags(path, uid, &flags).await?;
        }
        self.set_uid_map(path, &map).await?;
        self.set_sync_state(path, &state).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn state(exists: u32, uv: u32, un: u32) -> SyncState {
        let mut s = SyncState::new();
        s.set_exists(exists);
        s.set_uid_validity(uv);
        s.set_uid_next(un);
        s
    }

    #[tokio::test]
    async fn sync_state_round_trip() {
        let repo = SyncRepository::in_memory().await.unwrap();
        assert_eq!(repo.sync_state("a").await.unwrap(), SyncState::new());

        let s = state(3, 666, 15);
        repo.set_sync_state("a", &s).await.unwrap();
        assert_eq!(repo.sync_state("a").await.unwrap(), s);
    }

    #[tokio::test]
    async fn observed_zero_survives_storage() {
        let repo = SyncRepository::in_memory().await.unwrap();
        let mut s = SyncState::new();
        s.set_exists(0);
        repo.set_sync_state("a", &s).await.unwrap();
        let loaded = repo.sync_state("a").await.unwrap();
        assert!(loaded.has_exists());
        assert_ne!(loaded, SyncState::new());
    }

    #[tokio::test]
    async fn uid_map_round_trip() {
        let repo = SyncRepository::in_memory().await.unwrap();
        assert!(repo.uid_map("a").await.unwrap().is_empty());

        let map = UidMap::from_uids(vec![6, 9, 10]);
        repo.set_uid_map("a", &map).await.unwrap();
        assert_eq!(repo.uid_map("a").await.unwrap(), map);

        let map = UidMap::from_uids(vec![6, 10]);
        repo.set_uid_map("a", &map).await.unwrap();
        assert_eq!(repo.uid_map("a").await.unwrap(), map);
    }

    #[tokio::test]
    async fn flags_round_trip_and_removal() {
        let repo = SyncRepository::in_memory().await.unwrap();
        repo.set_msg_flags("a", 9, &["\\Seen".to_string(), "y".to_string()])
            .await
            .unwrap();
        assert_eq!(
            repo.msg_flags("a", 9).await.unwrap(),
            vec!["\\Seen".to_string(), "y".to_string()]
        );

        repo.set_msg_flags("a", 9, &[]).await.unwrap();
        assert!(repo.msg_flags("a", 9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blobs_round_trip() {
        let repo = SyncRepository::in_memory().await.unwrap();
        repo.set_message_metadata("a", 6, b"envelope").await.unwrap();
        repo.set_message_part("a", 6, "1", b"body").await.unwrap();

        assert_eq!(repo.message_metadata("a", 6).await.unwrap(), b"envelope");
        assert_eq!(repo.message_part("a", 6, "1").await.unwrap(), b"body");
        assert!(repo.message_part("a", 6, "2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_uid_space_drops_everything_but_state() {
        let repo = SyncRepository::in_memory().await.unwrap();
        repo.set_sync_state("a", &state(1, 333, 7)).await.unwrap();
        repo.set_uid_map("a", &UidMap::from_uids(vec![6])).await.unwrap();
        repo.set_msg_flags("a", 6, &["x".to_string()]).await.unwrap();
        repo.set_message_metadata("a", 6, b"m").await.unwrap();
        repo.set_message_part("a", 6, "1", b"p").await.unwrap();
        repo.set_msg_flags("b", 1, &["z".to_string()]).await.unwrap();

        repo.clear_uid_space("a").await.unwrap();

        assert!(repo.uid_map("a").await.unwrap().is_empty());
        assert!(repo.msg_flags("a", 6).await.unwrap().is_empty());
        assert!(repo.message_metadata("a", 6).await.unwrap().is_empty());
        assert!(repo.message_part("a", 6, "1").await.unwrap().is_empty());
        // Other mailboxes and the state row survive.
        assert_eq!(repo.msg_flags("b", 1).await.unwrap(), vec!["z".to_string()]);
        assert_eq!(repo.sync_state("a").await.unwrap(), state(1, 333, 7));
    }

    #[tokio::test]
    async fn hydrate_and_persist_mirror_the_memory_cache() {
        let repo = SyncRepository::in_memory().await.unwrap();

        let mut cache = MemoryCache::new();
        let _ = cache.set_msg_flags("a", 6, vec!["x".to_string()]);
        let _ = cache.set_msg_flags("a", 9, vec!["y".to_string()]);
        let _ = cache.set_uid_map("a", UidMap::from_uids(vec![6, 9]));
        let _ = cache.set_sync_state("a", state(2, 666, 15));
        repo.persist("a", &cache).await.unwrap();

        let mut restored = MemoryCache::new();
        repo.hydrate("a", &mut restored).await.unwrap();
        assert_eq!(restored.sync_state("a").unwrap(), state(2, 666, 15));
        assert_eq!(restored.uid_map("a").unwrap().as_slice(), &[6, 9]);
        assert_eq!(restored.msg_flags("a", 9).unwrap(), vec!["y".to_string()]);

        // A later snapshot without UID 9 reaps its flags on persist.
        let _ = cache.set_uid_map("a", UidMap::from_uids(vec![6]));
        let _ = cache.set_msg_flags("a", 9, Vec::new());
        repo.persist("a", &cache).await.unwrap();
        assert!(repo.msg_flags("a", 9).await.unwrap().is_empty());
        assert_eq!(repo.uid_map("a").await.unwrap().as_slice(), &[6]);
    }
}
