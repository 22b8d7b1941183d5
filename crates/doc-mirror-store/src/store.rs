use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use doc_mirror::{
    CacheRecord, ContentStore, EntryId, MetadataStore, StoreEntry, StoreError, SyncWatermark,
};
use rusqlite::{OptionalExtension, params};

use crate::schema;

/// How fresh a source's last sync is.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    NeverSynced,
    Stale { days_old: u64 },
    Fresh { days_old: u64 },
}

/// Threshold in days before a source is considered stale.
const STALE_THRESHOLD_DAYS: u64 = 7;

/// A SQLite-backed store holding both the mirrored entries and the engine's
/// private metadata (cache validators and watermarks).
pub struct MirrorStore {
    conn: Mutex<rusqlite::Connection>,
}

impl MirrorStore {
    /// Open a store backed by a file on disk.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        tracing::debug!(path = %path.display(), "opening store");
        let conn = rusqlite::Connection::open(path).map_err(db_error)?;

        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db_error)?;

        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&mut self) -> Result<(), StoreError> {
        let conn = self
            .conn
            .get_mut()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))?;
        schema::migrations()
            .to_latest(conn)
            .map_err(|e| StoreError::Migration(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    /// Check how fresh the last sync of `source_key` is.
    pub fn sync_status(&self, source_key: &str) -> Result<SyncStatus, StoreError> {
        let Some(watermark) = MetadataStore::watermark(self, source_key)? else {
            return Ok(SyncStatus::NeverSynced);
        };

        let days_old = days_since(&watermark.synced_at).unwrap_or(0);
        if days_old >= STALE_THRESHOLD_DAYS {
            Ok(SyncStatus::Stale { days_old })
        } else {
            Ok(SyncStatus::Fresh { days_old })
        }
    }

    /// Every recorded watermark, ordered by source key.
    pub fn watermarks(&self) -> Result<Vec<(String, SyncWatermark)>, StoreError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT source_key, last_synced_sha, synced_at, config_digest
                 FROM watermarks
                 ORDER BY source_key",
            )
            .map_err(db_error)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    SyncWatermark {
                        last_synced_sha: row.get(1)?,
                        synced_at: row.get(2)?,
                        config_digest: row.get(3)?,
                    },
                ))
            })
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;

        Ok(rows)
    }

    /// Number of stored entries.
    pub fn entry_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(db_error)?;
        Ok(count.max(0) as u64)
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<(StoreEntry, String)> {
        let id: String = row.get(0)?;
        let data_json: String = row.get(1)?;

        Ok((
            StoreEntry {
                id: EntryId::new(id),
                data: serde_json::Map::new(),
                body: row.get(2)?,
                digest: row.get(3)?,
                file_path: row.get(4)?,
                rendered: row.get(5)?,
            },
            data_json,
        ))
    }
}

const ENTRY_COLUMNS: &str = "id, data_json, body, digest, file_path, rendered";

fn decode_entry((mut entry, data_json): (StoreEntry, String)) -> Result<StoreEntry, StoreError> {
    entry.data = serde_json::from_str(&data_json)
        .map_err(|e| StoreError::Serialization(format!("{}: {e}", entry.id)))?;
    Ok(entry)
}

fn insert_entry(conn: &rusqlite::Connection, entry: &StoreEntry) -> Result<(), StoreError> {
    let data_json =
        serde_json::to_string(&entry.data).map_err(|e| StoreError::Serialization(e.to_string()))?;

    conn.execute(
        "INSERT OR REPLACE INTO entries (id, data_json, body, digest, file_path, rendered)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.id.as_str(),
            data_json,
            entry.body,
            entry.digest,
            entry.file_path,
            entry.rendered,
        ],
    )
    .map_err(db_error)?;

    Ok(())
}

impl ContentStore for MirrorStore {
    fn get(&self, id: &EntryId) -> Result<Option<StoreEntry>, StoreError> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
                [id.as_str()],
                Self::row_to_entry,
            )
            .optional()
            .map_err(db_error)?;

        row.map(decode_entry).transpose()
    }

    fn set(&self, entry: StoreEntry) -> Result<(), StoreError> {
        let conn = self.conn()?;
        insert_entry(&conn, &entry)
    }

    fn delete(&self, id: &EntryId) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM entries WHERE id = ?1", [id.as_str()])
            .map_err(db_error)?;
        Ok(removed > 0)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM entries", []).map_err(db_error)?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<EntryId>, StoreError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT id FROM entries ORDER BY id")
            .map_err(db_error)?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_error)?
            .map(|r| r.map(EntryId::new))
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;

        Ok(ids)
    }

    fn entries(&self) -> Result<Vec<StoreEntry>, StoreError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!("SELECT {ENTRY_COLUMNS} FROM entries ORDER BY id"))
            .map_err(db_error)?;

        let rows = stmt
            .query_map([], Self::row_to_entry)
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;

        rows.into_iter().map(decode_entry).collect()
    }

    fn replace(&self, entry: StoreEntry) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_error)?;

        tx.execute("DELETE FROM entries WHERE id = ?1", [entry.id.as_str()])
            .map_err(db_error)?;
        insert_entry(&tx, &entry)?;

        tx.commit().map_err(db_error)
    }
}

impl MetadataStore for MirrorStore {
    fn cache_record(&self, id: &EntryId) -> Result<Option<CacheRecord>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT etag, last_modified FROM cache_records WHERE id = ?1",
            [id.as_str()],
            |row| {
                Ok(CacheRecord {
                    etag: row.get(0)?,
                    last_modified: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(db_error)
    }

    fn put_cache_record(&self, id: &EntryId, record: &CacheRecord) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_records (id, etag, last_modified)
             VALUES (?1, ?2, ?3)",
            params![id.as_str(), record.etag, record.last_modified],
        )
        .map_err(db_error)?;
        Ok(())
    }

    fn remove_cache_record(&self, id: &EntryId) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM cache_records WHERE id = ?1", [id.as_str()])
            .map_err(db_error)?;
        Ok(())
    }

    fn watermark(&self, source_key: &str) -> Result<Option<SyncWatermark>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT last_synced_sha, synced_at, config_digest
             FROM watermarks WHERE source_key = ?1",
            [source_key],
            |row| {
                Ok(SyncWatermark {
                    last_synced_sha: row.get(0)?,
                    synced_at: row.get(1)?,
                    config_digest: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(db_error)
    }

    fn put_watermark(
        &self,
        source_key: &str,
        watermark: &SyncWatermark,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO watermarks
                 (source_key, last_synced_sha, synced_at, config_digest)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                source_key,
                watermark.last_synced_sha,
                watermark.synced_at,
                watermark.config_digest,
            ],
        )
        .map_err(db_error)?;
        Ok(())
    }
}

fn db_error(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn days_since(timestamp: &str) -> Option<u64> {
    let then: u64 = timestamp.parse().ok()?;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    Some((now.saturating_sub(then)) / 86400)
}
