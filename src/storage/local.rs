//! Local SQLite storage
//!
//! Holds both the character table and the named sequence counters in one
//! database file. Counter increments are a single upsert statement, so two
//! allocations can never observe the same value.

use super::{RecordStore, Result, StorageError};
use crate::catalog::{CatalogRecord, CharacterId, ExternalRef, Rarity, RecordField};
use crate::sequence::{SequenceAllocator, FIRST_SEQUENCE_VALUE};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sequences (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS characters (
    id TEXT PRIMARY KEY,
    img_url TEXT NOT NULL,
    name TEXT NOT NULL,
    anime TEXT NOT NULL,
    rarity TEXT NOT NULL,
    message_id TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_characters_anime ON characters(anime);
"#;

const RECORD_COLUMNS: &str = "id, img_url, name, anime, rarity, message_id";

/// Columns as read from a row, before the rarity label is checked
struct RawRecord {
    id: String,
    img_url: String,
    name: String,
    anime: String,
    rarity: String,
    message_id: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            img_url: row.get(1)?,
            name: row.get(2)?,
            anime: row.get(3)?,
            rarity: row.get(4)?,
            message_id: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<CatalogRecord> {
        let rarity = Rarity::from_label(&self.rarity).ok_or_else(|| {
            StorageError::InvalidData(format!(
                "unknown rarity '{}' for character {}",
                self.rarity, self.id
            ))
        })?;
        Ok(CatalogRecord {
            id: CharacterId::new(self.id),
            image_url: self.img_url,
            display_name: self.name,
            group_name: self.anime,
            rarity,
            external_ref: self.message_id.map(ExternalRef::new),
        })
    }
}

fn column_value(field: &RecordField) -> Option<String> {
    match field {
        RecordField::ImageUrl(s) | RecordField::Name(s) | RecordField::Anime(s) => Some(s.clone()),
        RecordField::Rarity(r) => Some(r.label().to_string()),
        RecordField::ExternalRef(ext) => ext.as_ref().map(|e| e.as_str().to_string()),
    }
}

#[derive(Clone)]
pub struct LocalStorage {
    conn: Arc<Mutex<Connection>>,
}

impl LocalStorage {
    /// Open (or create) the database at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Database(format!("Failed to create {:?}: {}", parent, e))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| StorageError::Database(format!("Failed to open database: {}", e)))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StorageError::Database(format!("Failed to set pragmas: {}", e)))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StorageError::Database(format!("Failed to create tables: {}", e)))?;

        info!("Local storage initialized at {:?}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create in-memory storage (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Current value of a counter without advancing it
    pub fn sequence_value(&self, name: &str) -> Result<Option<u64>> {
        let conn = self.conn.lock();
        let value: Option<i64> = conn
            .query_row(
                "SELECT value FROM sequences WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        value.map(to_sequence_value).transpose()
    }
}

fn to_sequence_value(raw: i64) -> Result<u64> {
    u64::try_from(raw)
        .map_err(|_| StorageError::InvalidData(format!("negative sequence value {}", raw)))
}

#[async_trait]
impl SequenceAllocator for LocalStorage {
    async fn allocate(&self, name: &str) -> Result<u64> {
        let first = i64::try_from(FIRST_SEQUENCE_VALUE)
            .map_err(|_| StorageError::InvalidData("first sequence value overflows".to_string()))?;

        let conn = self.conn.lock();
        let value: i64 = conn.query_row(
            "INSERT INTO sequences (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = value + 1
             RETURNING value",
            params![name, first],
            |row| row.get(0),
        )?;

        debug!("Allocated {} = {}", name, value);
        to_sequence_value(value)
    }
}

#[async_trait]
impl RecordStore for LocalStorage {
    async fn insert(&self, record: &CatalogRecord) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO characters
                (id, img_url, name, anime, rarity, message_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                record.id.as_str(),
                record.image_url,
                record.display_name,
                record.group_name,
                record.rarity.label(),
                record.external_ref.as_ref().map(|e| e.as_str()),
                now,
            ],
        )?;

        if inserted == 0 {
            return Err(StorageError::Duplicate(record.id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, id: &CharacterId) -> Result<Option<CatalogRecord>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM characters WHERE id = ?1", RECORD_COLUMNS),
                params![id.as_str()],
                RawRecord::from_row,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    async fn update_field(
        &self,
        id: &CharacterId,
        field: &RecordField,
    ) -> Result<Option<CatalogRecord>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let previous = tx
            .query_row(
                &format!("SELECT {} FROM characters WHERE id = ?1", RECORD_COLUMNS),
                params![id.as_str()],
                RawRecord::from_row,
            )
            .optional()?;

        let Some(previous) = previous else {
            return Ok(None);
        };
        let previous = previous.into_record()?;

        // column names come from a closed enum, never from caller input
        tx.execute(
            &format!(
                "UPDATE characters SET {} = ?1, updated_at = ?2 WHERE id = ?3",
                field.field_name()
            ),
            params![column_value(field), chrono::Utc::now().timestamp(), id.as_str()],
        )?;
        tx.commit()?;

        Ok(Some(previous))
    }

    async fn delete_by_id(&self, id: &CharacterId) -> Result<Option<CatalogRecord>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!(
                    "DELETE FROM characters WHERE id = ?1 RETURNING {}",
                    RECORD_COLUMNS
                ),
                params![id.as_str()],
                RawRecord::from_row,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }
}
