//! Snapshot sync of document collections into mirror tables
//!
//! Each run walks the configured collections one at a time: fetch every
//! document, infer a schema from a leading sample, rebuild the mirror table
//! and insert rows one by one so a bad row only costs itself.

use crate::db::{BackupRunRepository, LibSqlBackupRunRepository, MirrorDatabase, MirrorTables};
use crate::error::Result;
use crate::flatten::flatten;
use crate::models::{
    BackupRunSummary, CollectionReport, CollectionStatus, Document, RunStatus,
    SOURCE_ID_FIELD,
};
use crate::schema::infer_schema;
use crate::source::DocumentStore;

/// Documents inspected for schema inference
pub const DEFAULT_SAMPLE_SIZE: usize = 100;
/// Rows inserted between progress reports
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Tuning knobs for a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub sample_size: usize,
    pub batch_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Runs backup snapshots from a document store into the mirror database
pub struct SyncOrchestrator<'a, S> {
    source: &'a S,
    mirror: &'a MirrorDatabase,
    options: SyncOptions,
}

impl<'a, S: DocumentStore> SyncOrchestrator<'a, S> {
    pub const fn new(source: &'a S, mirror: &'a MirrorDatabase, options: SyncOptions) -> Self {
        Self {
            source,
            mirror,
            options,
        }
    }

    /// Sync every collection in order and record the run in the ledger.
    ///
    /// Per-row and per-collection mirror failures are counted in the summary.
    /// A document-store failure aborts the run: the ledger entry is closed
    /// as failed and the error is returned.
    pub async fn run(&self, collections: &[String]) -> Result<BackupRunSummary> {
        let runs = LibSqlBackupRunRepository::new(self.mirror.connection());
        let run_id = runs.start().await?;
        tracing::info!(
            "Backup run {} started ({} collections)",
            run_id,
            collections.len()
        );

        let mut reports = Vec::with_capacity(collections.len());
        let outcome = self.sync_all(&runs, run_id, collections, &mut reports).await;
        let (collections_synced, total_documents) = totals(&reports);

        match outcome {
            Ok(()) => {
                runs.complete(run_id, collections_synced, total_documents)
                    .await?;
                tracing::info!(
                    "Backup run {} completed: {} collections, {} documents",
                    run_id,
                    collections_synced,
                    total_documents
                );
                Ok(BackupRunSummary {
                    run_id,
                    status: RunStatus::Completed,
                    collections: reports,
                    total_documents,
                    error: None,
                })
            }
            Err(error) => {
                tracing::error!("Backup run {} failed: {}", run_id, error);
                if let Err(ledger_error) = runs
                    .fail(
                        run_id,
                        collections_synced,
                        total_documents,
                        &error.to_string(),
                    )
                    .await
                {
                    tracing::warn!(
                        "Could not mark backup run {} as failed: {}",
                        run_id,
                        ledger_error
                    );
                }
                Err(error)
            }
        }
    }

    async fn sync_all(
        &self,
        runs: &LibSqlBackupRunRepository<'_>,
        run_id: i64,
        collections: &[String],
        reports: &mut Vec<CollectionReport>,
    ) -> Result<()> {
        for collection in collections {
            let report = self.sync_collection(collection).await?;
            runs.record_collection(run_id, &report).await?;
            reports.push(report);
        }
        Ok(())
    }

    /// Sync one collection; only run-fatal errors are returned as `Err`
    pub async fn sync_collection(&self, collection: &str) -> Result<CollectionReport> {
        let documents = self.source.list_all(collection).await?;

        if documents.is_empty() {
            // an empty snapshot still replaces whatever the last one mirrored
            match MirrorTables::new(self.mirror.connection()).clear(collection).await {
                Ok(0) => tracing::info!("{}: no documents, skipped", collection),
                Ok(removed) => tracing::info!(
                    "{}: no documents, skipped and cleared {} mirrored rows",
                    collection,
                    removed
                ),
                Err(error) if error.is_fatal_for_run() => return Err(error),
                Err(error) => {
                    tracing::warn!("{}: could not clear mirror table: {}", collection, error);
                    return Ok(CollectionReport::failed(collection, 0, error.to_string()));
                }
            }
            return Ok(CollectionReport::skipped(collection));
        }

        match self.mirror_documents(collection, &documents).await {
            Ok(report) => Ok(report),
            Err(error) if error.is_fatal_for_run() => Err(error),
            Err(error) => {
                tracing::warn!("{}: sync failed: {}", collection, error);
                Ok(CollectionReport::failed(
                    collection,
                    documents.len() as u64,
                    error.to_string(),
                ))
            }
        }
    }

    async fn mirror_documents(
        &self,
        collection: &str,
        documents: &[Document],
    ) -> Result<CollectionReport> {
        let sample = &documents[..documents.len().min(self.options.sample_size)];
        let schema = infer_schema(collection, sample);
        tracing::debug!(
            "{}: inferred {} columns from {} sampled documents",
            collection,
            schema.columns().len(),
            sample.len()
        );

        let tables = MirrorTables::new(self.mirror.connection());
        tables.rebuild(&schema).await?;

        let mut report = CollectionReport {
            collection: collection.to_string(),
            status: CollectionStatus::Synced,
            documents_total: documents.len() as u64,
            documents_synced: 0,
            duplicates: 0,
            rows_failed: 0,
            error: None,
        };

        let batch_size = self.options.batch_size.max(1);
        for (batch_index, batch) in documents.chunks(batch_size).enumerate() {
            for document in batch {
                let row = flatten(document);
                if row.unique_id().is_none() {
                    report.rows_failed += 1;
                    tracing::warn!(
                        "{}: skipping document with {} _id (ids must be strings, object ids or integers)",
                        collection,
                        document.get(SOURCE_ID_FIELD).map_or("missing", crate::models::Value::kind)
                    );
                    continue;
                }
                match tables.insert_row(&schema, &row).await {
                    Ok(()) => report.documents_synced += 1,
                    Err(error) if error.is_unique_violation() => report.duplicates += 1,
                    Err(error) => {
                        report.rows_failed += 1;
                        tracing::warn!(
                            "{}: failed to mirror document {}: {}",
                            collection,
                            row.unique_id().unwrap_or_default(),
                            error
                        );
                    }
                }
            }
            tracing::debug!(
                "{}: batch {} done ({}/{} documents)",
                collection,
                batch_index + 1,
                (batch_index * batch_size + batch.len()).min(documents.len()),
                documents.len()
            );
        }

        tracing::info!(
            "{}: synced {}/{} documents ({} failed)",
            collection,
            report.documents_synced,
            report.documents_total,
            report.rows_failed
        );
        Ok(report)
    }
}

/// Synced-collection count and document total over successful collections
fn totals(reports: &[CollectionReport]) -> (u64, u64) {
    reports
        .iter()
        .filter(|report| report.status == CollectionStatus::Synced)
        .fold((0, 0), |(collections, documents), report| {
            (collections + 1, documents + report.documents_synced)
        })
}
