//! Backup run ledger repository

#![allow(clippy::cast_possible_wrap)] // SQLite stores counters as i64

use libsql::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{BackupRun, CollectionReport, RunStatus};
use crate::util::{compact_text, sql_timestamp_now};

/// Trait for backup run ledger operations (async)
#[allow(async_fn_in_trait)]
pub trait BackupRunRepository {
    /// Open a new run in `running` state, returning its id
    async fn start(&self) -> Result<i64>;

    /// Record one collection's outcome within a run
    async fn record_collection(&self, run_id: i64, report: &CollectionReport) -> Result<()>;

    /// Close a run as completed
    async fn complete(&self, run_id: i64, collections_synced: u64, total_documents: u64)
        -> Result<()>;

    /// Close a run as failed
    async fn fail(
        &self,
        run_id: i64,
        collections_synced: u64,
        total_documents: u64,
        error: &str,
    ) -> Result<()>;

    /// Get a run by id
    async fn get(&self, run_id: i64) -> Result<Option<BackupRun>>;

    /// Most recent runs, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<BackupRun>>;

    /// Per-collection reports of a run, in processing order
    async fn collection_reports(&self, run_id: i64) -> Result<Vec<CollectionReport>>;
}

/// libSQL implementation of `BackupRunRepository`
pub struct LibSqlBackupRunRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlBackupRunRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a run from a database row
    fn parse_run(row: &libsql::Row) -> Result<BackupRun> {
        let status: String = row.get(2)?;
        Ok(BackupRun {
            id: row.get(0)?,
            started_at: row.get(1)?,
            status: status.parse().map_err(Error::Database)?,
            collections_synced: row.get(3)?,
            total_documents: row.get(4)?,
            error_message: row.get(5)?,
            completed_at: row.get(6)?,
        })
    }

    async fn finish(
        &self,
        run_id: i64,
        status: RunStatus,
        collections_synced: u64,
        total_documents: u64,
        error: Option<&str>,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE backup_runs
                 SET status = ?, collections_synced = ?, total_documents = ?,
                     error_message = ?, completed_at = ?
                 WHERE id = ?",
                params![
                    status.as_str(),
                    collections_synced as i64,
                    total_documents as i64,
                    error.map(compact_text),
                    sql_timestamp_now(),
                    run_id
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("backup run {run_id}")));
        }
        Ok(())
    }
}

impl BackupRunRepository for LibSqlBackupRunRepository<'_> {
    async fn start(&self) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO backup_runs (started_at, status) VALUES (?, ?)",
                params![sql_timestamp_now(), RunStatus::Running.as_str()],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    async fn record_collection(&self, run_id: i64, report: &CollectionReport) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO collection_sync_stats (
                    run_id, collection_name, status, documents_total, documents_synced,
                    duplicates, rows_failed, error_message, recorded_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    run_id,
                    report.collection.as_str(),
                    report.status.as_str(),
                    report.documents_total as i64,
                    report.documents_synced as i64,
                    report.duplicates as i64,
                    report.rows_failed as i64,
                    report.error.as_deref().map(compact_text),
                    sql_timestamp_now()
                ],
            )
            .await?;
        Ok(())
    }

    async fn complete(
        &self,
        run_id: i64,
        collections_synced: u64,
        total_documents: u64,
    ) -> Result<()> {
        self.finish(
            run_id,
            RunStatus::Completed,
            collections_synced,
            total_documents,
            None,
        )
        .await
    }

    async fn fail(
        &self,
        run_id: i64,
        collections_synced: u64,
        total_documents: u64,
        error: &str,
    ) -> Result<()> {
        self.finish(
            run_id,
            RunStatus::Failed,
            collections_synced,
            total_documents,
            Some(error),
        )
        .await
    }

    async fn get(&self, run_id: i64) -> Result<Option<BackupRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, started_at, status, collections_synced, total_documents,
                        error_message, completed_at
                 FROM backup_runs WHERE id = ?",
                params![run_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_run(&row)?)),
            None => Ok(None),
        }
    }

    async fn recent(&self, limit: usize) -> Result<Vec<BackupRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, started_at, status, collections_synced, total_documents,
                        error_message, completed_at
                 FROM backup_runs
                 ORDER BY id DESC
                 LIMIT ?",
                params![limit as i64],
            )
            .await?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await? {
            runs.push(Self::parse_run(&row)?);
        }
        Ok(runs)
    }

    async fn collection_reports(&self, run_id: i64) -> Result<Vec<CollectionReport>> {
        let mut rows = self
            .conn
            .query(
                "SELECT collection_name, status, documents_total, documents_synced,
                        duplicates, rows_failed, error_message
                 FROM collection_sync_stats
                 WHERE run_id = ?
                 ORDER BY id ASC",
                params![run_id],
            )
            .await?;

        let mut reports = Vec::new();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(1)?;
            reports.push(CollectionReport {
                collection: row.get(0)?,
                status: status.parse().map_err(Error::Database)?,
                documents_total: u64::try_from(row.get::<i64>(2)?).unwrap_or_default(),
                documents_synced: u64::try_from(row.get::<i64>(3)?).unwrap_or_default(),
                duplicates: u64::try_from(row.get::<i64>(4)?).unwrap_or_default(),
                rows_failed: u64::try_from(row.get::<i64>(5)?).unwrap_or_default(),
                error: row.get(6)?,
            });
        }
        Ok(reports)
    }
}
