//! SQLite implementation of [`BlobStore`].

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use chatsync_core::now_millis;

use crate::error::StorageError;
use crate::schema::SchemaKind;
use crate::traits::BlobStore;
use crate::types::NamedBlob;

/// Named JSON blobs in one table, keyed by name.
pub struct SqliteBlobStore {
    conn: Connection,
}

impl SqliteBlobStore {
    /// Opens (or creates) the blob database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path, SchemaKind::Blobs)?;
        Ok(SqliteBlobStore { conn })
    }

    /// Opens an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory(SchemaKind::Blobs)?;
        Ok(SqliteBlobStore { conn })
    }

    fn row_to_blob(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, u32, i64, i64)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    fn decode(raw: (String, String, u32, i64, i64)) -> Result<NamedBlob, StorageError> {
        let (name, data_json, version, created_at, updated_at) = raw;
        Ok(NamedBlob {
            name,
            data: serde_json::from_str(&data_json)?,
            version,
            created_at,
            updated_at,
        })
    }
}

impl BlobStore for SqliteBlobStore {
    fn get(&self, name: &str) -> Result<Option<NamedBlob>, StorageError> {
        let raw = self
            .conn
            .query_row(
                "SELECT name, data_json, version, created_at, updated_at FROM named_blobs WHERE name = ?1",
                params![name],
                Self::row_to_blob,
            )
            .optional()?;
        raw.map(Self::decode).transpose()
    }

    fn put(&mut self, name: &str, data: &Value, version: u32) -> Result<NamedBlob, StorageError> {
        let data_json = serde_json::to_string(data)?;
        let now = now_millis();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO named_blobs (name, data_json, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(name) DO UPDATE SET
                data_json = excluded.data_json,
                version = excluded.version,
                updated_at = excluded.updated_at",
            params![name, data_json, version, now],
        )?;
        let raw = tx.query_row(
            "SELECT name, data_json, version, created_at, updated_at FROM named_blobs WHERE name = ?1",
            params![name],
            Self::row_to_blob,
        )?;
        tx.commit()?;
        tracing::debug!(blob = name, version, bytes = data_json.len(), "stored blob");
        Self::decode(raw)
    }

    fn delete(&mut self, name: &str) -> Result<bool, StorageError> {
        let removed = self
            .conn
            .execute("DELETE FROM named_blobs WHERE name = ?1", params![name])?;
        Ok(removed > 0)
    }

    fn list_all(&self) -> Result<Vec<NamedBlob>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT name, data_json, version, created_at, updated_at FROM named_blobs ORDER BY name",
        )?;
        let rows = stmt.query_map([], Self::row_to_blob)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(Self::decode(row?)?);
        }
        Ok(result)
    }
}
