//! Recovery log repository

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{RecoveryLogEntry, STATUS_RECOVERED};
use crate::util::{compact_text, sql_timestamp_now};

/// Trait for the append-only recovery audit log (async)
#[allow(async_fn_in_trait)]
pub trait RecoveryLogRepository {
    /// Append one attempt
    async fn append(
        &self,
        collection: &str,
        mongo_id: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<()>;

    /// Number of successful recoveries, optionally for one collection
    async fn count_recovered(&self, collection: Option<&str>) -> Result<u64>;

    /// Most recent entries, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<RecoveryLogEntry>>;
}

/// libSQL implementation of `RecoveryLogRepository`
pub struct LibSqlRecoveryLogRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRecoveryLogRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl RecoveryLogRepository for LibSqlRecoveryLogRepository<'_> {
    async fn append(
        &self,
        collection: &str,
        mongo_id: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO recovery_log (collection_name, mongo_id, status, error_message, recovered_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    collection,
                    mongo_id,
                    status,
                    error.map(compact_text),
                    sql_timestamp_now()
                ],
            )
            .await?;
        Ok(())
    }

    async fn count_recovered(&self, collection: Option<&str>) -> Result<u64> {
        let mut rows = match collection {
            Some(name) => {
                self.conn
                    .query(
                        "SELECT COUNT(*) FROM recovery_log WHERE status = ? AND collection_name = ?",
                        params![STATUS_RECOVERED, name],
                    )
                    .await?
            }
            None => {
                self.conn
                    .query(
                        "SELECT COUNT(*) FROM recovery_log WHERE status = ?",
                        params![STATUS_RECOVERED],
                    )
                    .await?
            }
        };

        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RecoveryLogEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, collection_name, mongo_id, status, error_message, recovered_at
                 FROM recovery_log
                 ORDER BY id DESC
                 LIMIT ?",
                params![limit as i64],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(RecoveryLogEntry {
                id: row.get(0)?,
                collection: row.get(1)?,
                mongo_id: row.get(2)?,
                status: row.get(3)?,
                error_message: row.get(4)?,
                recovered_at: row.get(5)?,
            });
        }
        Ok(entries)
    }
}
