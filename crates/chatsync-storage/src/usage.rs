//! SQLite implementation of [`UsageStore`].
//!
//! [`SqliteUsageStore`] holds only the database path and opens a connection
//! per call, so it can be shared across threads without a lock. Each
//! statement runs in its own autocommit transaction.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use chatsync_core::{UsageAggregate, UsageEvent};

use crate::error::StorageError;
use crate::schema::SchemaKind;
use crate::traits::UsageStore;

const AGGREGATE_COLUMNS: &str = "service_id, total_cost, total_savings, total_input_tokens, total_output_tokens, usage_count, first_usage, last_usage, free_usages, no_pricing_usages, no_token_usages, partial_message_usages, partial_price_usages";

#[derive(Debug, Clone)]
pub struct SqliteUsageStore {
    db_path: String,
}

impl SqliteUsageStore {
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        // Creates the file and applies migrations up front.
        let _conn = store.open_conn()?;
        Ok(store)
    }

    /// A store on a fresh temporary file. A plain `:memory:` database would
    /// not survive across the per-call connections.
    pub fn in_memory() -> Result<Self, StorageError> {
        let temp_path = std::env::temp_dir()
            .join(format!("chatsync_usage_{}.db", Uuid::new_v4()))
            .to_string_lossy()
            .to_string();
        Self::new(&temp_path)
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    fn open_conn(&self) -> Result<Connection, StorageError> {
        crate::schema::open_database(&self.db_path, SchemaKind::Usage)
    }

    fn row_to_aggregate(row: &rusqlite::Row<'_>) -> rusqlite::Result<UsageAggregate> {
        Ok(UsageAggregate {
            service_id: row.get(0)?,
            total_cost: row.get(1)?,
            total_savings: row.get(2)?,
            total_input_tokens: row.get(3)?,
            total_output_tokens: row.get(4)?,
            usage_count: row.get(5)?,
            first_usage: row.get(6)?,
            last_usage: row.get(7)?,
            free_usages: row.get(8)?,
            no_pricing_usages: row.get(9)?,
            no_token_usages: row.get(10)?,
            partial_message_usages: row.get(11)?,
            partial_price_usages: row.get(12)?,
        })
    }

    fn read_aggregate(
        conn: &Connection,
        service_id: &str,
    ) -> Result<Option<UsageAggregate>, StorageError> {
        let aggregate = conn
            .query_row(
                &format!(
                    "SELECT {} FROM usage_aggregates WHERE service_id = ?1",
                    AGGREGATE_COLUMNS
                ),
                params![service_id],
                Self::row_to_aggregate,
            )
            .optional()?;
        Ok(aggregate)
    }

    fn write_aggregate(conn: &Connection, a: &UsageAggregate) -> Result<(), StorageError> {
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO usage_aggregates ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                AGGREGATE_COLUMNS
            ),
            params![
                a.service_id,
                a.total_cost,
                a.total_savings,
                a.total_input_tokens,
                a.total_output_tokens,
                a.usage_count,
                a.first_usage,
                a.last_usage,
                a.free_usages,
                a.no_pricing_usages,
                a.no_token_usages,
                a.partial_message_usages,
                a.partial_price_usages,
            ],
        )?;
        Ok(())
    }
}

impl UsageStore for SqliteUsageStore {
    fn record_event(&self, event: &UsageEvent) -> Result<UsageAggregate, StorageError> {
        let conn = self.open_conn()?;

        conn.execute(
            "INSERT INTO usage_events (service_id, model_id, cost, savings, input_tokens, output_tokens, category, created) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.service_id,
                event.model_id,
                event.cost,
                event.savings,
                event.input_tokens,
                event.output_tokens,
                event.category.as_str(),
                event.timestamp,
            ],
        )?;

        // Read, fold, write: three separate statements.
        let mut aggregate = Self::read_aggregate(&conn, &event.service_id)?
            .unwrap_or_else(|| UsageAggregate::empty(event.service_id.clone()));
        aggregate.accumulate(event);
        Self::write_aggregate(&conn, &aggregate)?;

        tracing::debug!(
            service = %event.service_id,
            category = event.category.as_str(),
            usage_count = aggregate.usage_count,
            "recorded usage event"
        );
        Ok(aggregate)
    }

    fn get_aggregate(&self, service_id: &str) -> Result<Option<UsageAggregate>, StorageError> {
        let conn = self.open_conn()?;
        Self::read_aggregate(&conn, service_id)
    }

    fn get_all_aggregates(&self) -> Result<Vec<UsageAggregate>, StorageError> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM usage_aggregates ORDER BY service_id",
            AGGREGATE_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::row_to_aggregate)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn delete_aggregate(&self, service_id: &str) -> Result<bool, StorageError> {
        let conn = self.open_conn()?;
        let removed = conn.execute(
            "DELETE FROM usage_aggregates WHERE service_id = ?1",
            params![service_id],
        )?;
        Ok(removed > 0)
    }

    fn replace_all(&self, aggregates: &[UsageAggregate]) -> Result<(), StorageError> {
        let mut conn = self.open_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM usage_aggregates", [])?;
        for aggregate in aggregates {
            Self::write_aggregate(&tx, aggregate)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        let mut conn = self.open_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM usage_events", [])?;
        tx.execute("DELETE FROM usage_aggregates", [])?;
        tx.commit()?;
        tracing::info!("cleared usage log and aggregates");
        Ok(())
    }

    fn event_count(&self, service_id: Option<&str>) -> Result<i64, StorageError> {
        let conn = self.open_conn()?;
        let count = match service_id {
            Some(id) => conn.query_row(
                "SELECT COUNT(*) FROM usage_events WHERE service_id = ?1",
                params![id],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM usage_events", [], |row| row.get(0))?,
        };
        Ok(count)
    }
}
