//! Database handle — libSQL connection, migrations, write serialization.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::{DatabaseError, Result};
use crate::store::migrations;

/// Default bound for a single write transaction.
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared store handle.
///
/// A single `libsql::Connection` is reused for all operations; it is
/// `Send + Sync` and safe for concurrent async reads. Write transactions
/// additionally serialize through `tx_lock` so two requests never try to
/// nest BEGIN on the same connection — waiting for the slot is bounded by
/// `tx_timeout` and surfaces as a distinct timeout error.
pub struct Store {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    tx_timeout: Duration,
    tx_lock: Mutex<()>,
}

impl Store {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path, tx_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;

        let store = Self::from_database(db, tx_timeout).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db, Duration::from_secs(5)).await
    }

    async fn from_database(db: LibSqlDatabase, tx_timeout: Duration) -> Result<Self> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        conn.execute("PRAGMA foreign_keys = ON", ()).await?;

        let store = Self {
            db: Arc::new(db),
            conn,
            tx_timeout,
            tx_lock: Mutex::new(()),
        };
        migrations::run_migrations(store.conn()).await?;
        Ok(store)
    }

    /// Get the shared connection.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run a write operation holding the transaction slot.
    ///
    /// Both the wait for the slot and the operation itself are bounded by
    /// the configured transaction timeout. A timed-out operation is dropped
    /// mid-flight; libsql rolls the open transaction back on drop.
    pub(crate) async fn with_write_slot<T, Fut>(&self, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let _guard = tokio::time::timeout(self.tx_timeout, self.tx_lock.lock())
            .await
            .map_err(|_| DatabaseError::Timeout {
                after: self.tx_timeout,
            })?;
        match tokio::time::timeout(self.tx_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DatabaseError::Timeout {
                after: self.tx_timeout,
            }
            .into()),
        }
    }

    /// Run a COUNT-style query returning a single integer.
    pub(crate) async fn count(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<u64> {
        count_on(self.conn(), sql, params).await
    }
}

/// Run a COUNT-style query on an arbitrary connection (or transaction).
pub(crate) async fn count_on(
    conn: &Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<u64> {
    let mut rows = conn.query(sql, params).await?;
    let row = rows
        .next()
        .await?
        .ok_or_else(|| DatabaseError::Query("COUNT query returned no rows".into()))?;
    let n: i64 = row.get(0)?;
    Ok(n.max(0) as u64)
}

// ── Row mapping helpers ─────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

pub(crate) fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_datetime)
}

/// Parse a stored UUID, falling back to nil for corrupt rows.
pub(crate) fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

pub(crate) fn parse_optional_uuid(s: &Option<String>) -> Option<Uuid> {
    s.as_deref().map(|v| parse_uuid(v))
}

/// Parse a JSON column, tolerating legacy plain-text rows as None.
pub(crate) fn parse_optional_json(s: &Option<String>) -> Option<serde_json::Value> {
    s.as_deref().and_then(|v| serde_json::from_str(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_runs_migrations() {
        let store = Store::new_memory().await.unwrap();
        let tables = store
            .count(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='pipelines'",
                (),
            )
            .await
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[tokio::test]
    async fn open_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("crm.db");
        let store = Store::new_local(&db_path, DEFAULT_TX_TIMEOUT).await.unwrap();
        assert!(db_path.exists());
        drop(store);
    }

    #[test]
    fn parse_datetime_formats() {
        let rfc = parse_datetime("2026-08-30T10:00:00+00:00");
        assert_eq!(rfc.to_rfc3339(), "2026-08-30T10:00:00+00:00");

        let sqlite = parse_datetime("2026-08-30 10:00:00");
        assert_eq!(sqlite, rfc);

        let garbage = parse_datetime("not a date");
        assert_eq!(garbage, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn parse_uuid_fallback() {
        assert_eq!(parse_uuid("garbage"), Uuid::nil());
        let id = Uuid::new_v4();
        assert_eq!(parse_uuid(&id.to_string()), id);
    }

    #[tokio::test]
    async fn write_slot_serializes() {
        let store = Store::new_memory().await.unwrap();
        // Two sequential write-slot operations must both succeed.
        store
            .with_write_slot(async { Ok::<_, crate::error::Error>(1u32) })
            .await
            .unwrap();
        store
            .with_write_slot(async { Ok::<_, crate::error::Error>(2u32) })
            .await
            .unwrap();
    }
}
