//! SQLite implementation of [`ConversationStore`].
//!
//! [`SqliteConversationStore`] persists the conversation aggregate across one
//! root table and five dependent tables. Every save replaces the whole
//! dependent tree inside a single transaction; every load rebuilds it via
//! [`recompose`].

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use chatsync_core::{now_millis, Conversation, ConversationId};

use crate::convert::{
    decompose, recompose, ConversationRow, DecomposedConversation, FlagRow, FragmentRow,
    GeneratorRow, MessageRow, MetadataRow,
};
use crate::error::StorageError;
use crate::schema::SchemaKind;
use crate::traits::ConversationStore;
use crate::types::ConversationSummary;

/// SQLite-backed implementation of [`ConversationStore`].
pub struct SqliteConversationStore {
    conn: Connection,
}

impl SqliteConversationStore {
    /// Opens (or creates) the conversation database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path, SchemaKind::Conversations)?;
        Ok(SqliteConversationStore { conn })
    }

    /// Opens an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory(SchemaKind::Conversations)?;
        Ok(SqliteConversationStore { conn })
    }

    /// Raw connection, for row-level assertions in tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Writes all decomposed rows within one transaction.
    fn save_decomposed(&mut self, decomposed: &DecomposedConversation) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        let cid = decomposed.root.id.as_str();

        upsert_root(&tx, &decomposed.root)?;

        // Cascades to fragments, metadata, generators and flags.
        tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![cid],
        )?;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO messages (conversation_id, id, seq, role, purpose_id, token_count, created, updated) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for m in &decomposed.messages {
                stmt.execute(params![
                    cid,
                    m.id,
                    m.seq,
                    m.role,
                    m.purpose_id,
                    m.token_count,
                    m.created,
                    m.updated,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO message_fragments (conversation_id, message_id, id, fragment_type, order_idx, title, part_type, part_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for f in &decomposed.fragments {
                stmt.execute(params![
                    cid,
                    f.message_id,
                    f.id,
                    f.fragment_type,
                    f.order_idx,
                    f.title,
                    f.part_type,
                    f.part_json,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO message_metadata (conversation_id, message_id, in_reference_to_json, entangled_json) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for m in &decomposed.metadata {
                stmt.execute(params![
                    cid,
                    m.message_id,
                    m.in_reference_to_json,
                    m.entangled_json
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO message_generators (conversation_id, message_id, label, model_id, output_tokens, metrics_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for g in &decomposed.generators {
                stmt.execute(params![
                    cid,
                    g.message_id,
                    g.label,
                    g.model_id,
                    g.output_tokens,
                    g.metrics_json,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO message_user_flags (conversation_id, message_id, seq, flag, value) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for f in &decomposed.flags {
                stmt.execute(params![cid, f.message_id, f.seq, f.flag, f.value])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn load_root(&self, id: &str) -> Result<Option<ConversationRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, user_title, auto_title, is_archived, is_incognito, user_symbol, system_purpose_id, created, updated, token_count FROM conversations WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        user_title: row.get(1)?,
                        auto_title: row.get(2)?,
                        is_archived: row.get(3)?,
                        is_incognito: row.get(4)?,
                        user_symbol: row.get(5)?,
                        system_purpose_id: row.get(6)?,
                        created: row.get(7)?,
                        updated: row.get(8)?,
                        token_count: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Loads all rows of one conversation.
    fn load_decomposed(&self, root: ConversationRow) -> Result<DecomposedConversation, StorageError> {
        let cid = root.id.clone();

        let messages: Vec<MessageRow> = {
            let mut stmt = self.conn.prepare_cached(
                "SELECT id, seq, role, purpose_id, token_count, created, updated FROM messages WHERE conversation_id = ?1 ORDER BY created, seq",
            )?;
            let rows = stmt.query_map(params![cid], |row| {
                Ok(MessageRow {
                    id: row.get(0)?,
                    seq: row.get(1)?,
                    role: row.get(2)?,
                    purpose_id: row.get(3)?,
                    token_count: row.get(4)?,
                    created: row.get(5)?,
                    updated: row.get(6)?,
                })
            })?;
            let mut result = Vec::new();
            for row in rows {
                result.push(row?);
            }
            result
        };

        let fragments: Vec<FragmentRow> = {
            let mut stmt = self.conn.prepare_cached(
                "SELECT message_id, id, fragment_type, order_idx, title, part_type, part_json FROM message_fragments WHERE conversation_id = ?1 ORDER BY message_id, order_idx",
            )?;
            let rows = stmt.query_map(params![cid], |row| {
                Ok(FragmentRow {
                    message_id: row.get(0)?,
                    id: row.get(1)?,
                    fragment_type: row.get(2)?,
                    order_idx: row.get(3)?,
                    title: row.get(4)?,
                    part_type: row.get(5)?,
                    part_json: row.get(6)?,
                })
            })?;
            let mut result = Vec::new();
            for row in rows {
                result.push(row?);
            }
            result
        };

        let metadata: Vec<MetadataRow> = {
            let mut stmt = self.conn.prepare_cached(
                "SELECT message_id, in_reference_to_json, entangled_json FROM message_metadata WHERE conversation_id = ?1",
            )?;
            let rows = stmt.query_map(params![cid], |row| {
                Ok(MetadataRow {
                    message_id: row.get(0)?,
                    in_reference_to_json: row.get(1)?,
                    entangled_json: row.get(2)?,
                })
            })?;
            let mut result = Vec::new();
            for row in rows {
                result.push(row?);
            }
            result
        };

        let generators: Vec<GeneratorRow> = {
            let mut stmt = self.conn.prepare_cached(
                "SELECT message_id, label, model_id, output_tokens, metrics_json FROM message_generators WHERE conversation_id = ?1",
            )?;
            let rows = stmt.query_map(params![cid], |row| {
                Ok(GeneratorRow {
                    message_id: row.get(0)?,
                    label: row.get(1)?,
                    model_id: row.get(2)?,
                    output_tokens: row.get(3)?,
                    metrics_json: row.get(4)?,
                })
            })?;
            let mut result = Vec::new();
            for row in rows {
                result.push(row?);
            }
            result
        };

        let flags: Vec<FlagRow> = {
            let mut stmt = self.conn.prepare_cached(
                "SELECT message_id, seq, flag, value FROM message_user_flags WHERE conversation_id = ?1 ORDER BY message_id, seq",
            )?;
            let rows = stmt.query_map(params![cid], |row| {
                Ok(FlagRow {
                    message_id: row.get(0)?,
                    seq: row.get(1)?,
                    flag: row.get(2)?,
                    value: row.get(3)?,
                })
            })?;
            let mut result = Vec::new();
            for row in rows {
                result.push(row?);
            }
            result
        };

        Ok(DecomposedConversation {
            root,
            messages,
            fragments,
            metadata,
            generators,
            flags,
        })
    }
}

/// Inserts or updates the root row in place. An update never deletes the
/// row, so no cascade fires from it.
fn upsert_root(tx: &Transaction<'_>, root: &ConversationRow) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO conversations (id, user_title, auto_title, is_archived, is_incognito, user_symbol, system_purpose_id, created, updated, token_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
            user_title = excluded.user_title,
            auto_title = excluded.auto_title,
            is_archived = excluded.is_archived,
            is_incognito = excluded.is_incognito,
            user_symbol = excluded.user_symbol,
            system_purpose_id = excluded.system_purpose_id,
            created = excluded.created,
            updated = excluded.updated,
            token_count = excluded.token_count",
        params![
            root.id,
            root.user_title,
            root.auto_title,
            root.is_archived,
            root.is_incognito,
            root.user_symbol,
            root.system_purpose_id,
            root.created,
            root.updated,
            root.token_count,
        ],
    )?;
    Ok(())
}

impl ConversationStore for SqliteConversationStore {
    fn save(&mut self, conversation: &Conversation) -> Result<(), StorageError> {
        let decomposed = decompose(conversation)?;
        self.save_decomposed(&decomposed)?;
        tracing::debug!(
            conversation = %conversation.id,
            messages = decomposed.messages.len(),
            fragments = decomposed.fragments.len(),
            "saved conversation"
        );
        Ok(())
    }

    fn load(&self, id: &ConversationId) -> Result<Option<Conversation>, StorageError> {
        let Some(root) = self.load_root(id.as_str())? else {
            return Ok(None);
        };
        let decomposed = self.load_decomposed(root)?;
        recompose(decomposed).map(Some)
    }

    fn load_all(&self) -> Result<Vec<Conversation>, StorageError> {
        let ids = self.list_ids()?;
        let mut result = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(conversation) = self.load(id)? {
                result.push(conversation);
            }
        }
        Ok(result)
    }

    fn delete(&mut self, id: &ConversationId) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM conversations WHERE id = ?1", params![id.0])?;
        tx.commit()?;
        if removed > 0 {
            tracing::debug!(conversation = %id, "deleted conversation");
        }
        Ok(())
    }

    fn exists(&self, id: &ConversationId) -> Result<bool, StorageError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
            params![id.0],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn list_ids(&self) -> Result<Vec<ConversationId>, StorageError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM conversations ORDER BY created, id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(ConversationId(row?));
        }
        Ok(result)
    }

    fn list_summaries(&self) -> Result<Vec<ConversationSummary>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT c.id, COALESCE(c.user_title, c.auto_title), c.is_archived, c.created, c.updated,
                    (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id)
             FROM conversations c ORDER BY c.created, c.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ConversationSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                is_archived: row.get(2)?,
                created: row.get(3)?,
                updated: row.get(4)?,
                message_count: row.get(5)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn state_version(&self, name: &str) -> Result<Option<u32>, StorageError> {
        let version = self
            .conn
            .query_row(
                "SELECT version FROM store_meta WHERE name = ?1",
                params![name],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(version)
    }

    fn set_state_version(&mut self, name: &str, version: u32) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO store_meta (name, version, updated) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET version = excluded.version, updated = excluded.updated",
            params![name, version, now_millis()],
        )?;
        Ok(())
    }
}
