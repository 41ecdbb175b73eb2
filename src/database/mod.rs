pub mod schema;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use crate::audit::entry::AuditEntry;
use crate::error::{LedgerError, Result};

/// SQLite-backed ledger journal.
///
/// The pool is pinned to a single connection so that `sqlite::memory:`
/// databases survive for the lifetime of the journal.
pub struct SqliteJournal {
    pool: SqlitePool,
}

impl SqliteJournal {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let journal = SqliteJournal { pool };
        journal.run_migrations().await?;
        info!("Connected to SQLite journal at {}", database_url);
        Ok(journal)
    }

    pub async fn new_in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(schema::AUDIT_LEDGER_SCHEMA)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn append(&self, entry: &AuditEntry) -> Result<()> {
        let payload = serde_json::to_string(entry)?;

        let result = sqlx::query(
            r#"
            INSERT INTO audit_entries (idx, id, event_type, timestamp, hash, previous_hash, payload)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.chain.index as i64)
        .bind(&entry.id)
        .bind(&entry.event_type)
        .bind(entry.canonical_timestamp())
        .bind(&entry.chain.hash)
        .bind(&entry.chain.previous_hash)
        .bind(payload)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Journaled entry {} to SQLite", entry.chain.index);
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(LedgerError::LedgerWriteConflict(format!(
                "chain position {} already written",
                entry.chain.index
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn load_all(&self) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query("SELECT idx, payload FROM audit_entries ORDER BY idx ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let idx: i64 = row.try_get("idx")?;
            let payload: String = row.try_get("payload")?;
            let entry: AuditEntry = serde_json::from_str(&payload).map_err(|e| {
                LedgerError::Recovery(format!("Failed to parse journal row {}: {}", idx, e))
            })?;
            entries.push(entry);
        }

        info!("Replayed {} journal entries from SQLite", entries.len());
        Ok(entries)
    }

    pub async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM audit_entries")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}
