use docmirror_core::db::MirrorDatabase;
use docmirror_core::models::{
    BackupRun, BackupRunSummary, CollectionReport, CollectionStatus, DeletedDocument,
    RecoveryBatchSummary, RecoveryOutcome, TableStats,
};
use docmirror_core::source::JsonDirStore;
use docmirror_core::{MirrorConfig, StatsReport};

use crate::error::CliError;

pub async fn open_mirror(config: &MirrorConfig) -> Result<MirrorDatabase, CliError> {
    Ok(MirrorDatabase::open(&config.mirror_db_path).await?)
}

pub fn open_source(config: &MirrorConfig) -> Result<JsonDirStore, CliError> {
    Ok(JsonDirStore::open(config.source_dir.clone())?)
}

pub fn normalize_collection(name: &str) -> Result<String, CliError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyCollection)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_document_id(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyDocumentId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Collections named on the command line win over the configured list
pub fn resolve_sync_collections(
    requested: &[String],
    configured: &[String],
) -> Result<Vec<String>, CliError> {
    let source = if requested.is_empty() {
        configured
    } else {
        requested
    };

    let mut collections: Vec<String> = Vec::with_capacity(source.len());
    for name in source {
        let name = normalize_collection(name)?;
        if !collections.contains(&name) {
            collections.push(name);
        }
    }

    if collections.is_empty() {
        return Err(CliError::NoCollections);
    }
    Ok(collections)
}

pub fn format_sync_lines(summary: &BackupRunSummary) -> Vec<String> {
    let mut lines = vec![format!("Backup run {} {}", summary.run_id, summary.status)];
    lines.extend(summary.collections.iter().map(format_collection_report));
    lines.push(format!(
        "{} synced, {} skipped, {} failed; {} documents mirrored",
        summary.collections_synced(),
        summary.collections_skipped(),
        summary.collections_failed(),
        summary.total_documents
    ));
    lines
}

fn format_collection_report(report: &CollectionReport) -> String {
    match report.status {
        CollectionStatus::Synced => format!(
            "  {:<20} synced   {}/{} documents ({} duplicates, {} failed)",
            report.collection,
            report.documents_synced,
            report.documents_total,
            report.duplicates,
            report.rows_failed
        ),
        CollectionStatus::Skipped => {
            format!("  {:<20} skipped  no documents", report.collection)
        }
        CollectionStatus::Failed => format!(
            "  {:<20} failed   {}",
            report.collection,
            report.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

pub fn format_deleted_lines(deleted: &[DeletedDocument]) -> Vec<String> {
    deleted
        .iter()
        .map(|document| {
            let retention = document.days_remaining.map_or_else(
                || "retention unknown".to_string(),
                |days| format!("{days} days left"),
            );
            format!(
                "{}/{}  deleted {}  {}",
                document.collection,
                document.mongo_id,
                document.deleted_at.as_deref().unwrap_or("-"),
                retention
            )
        })
        .collect()
}

pub fn format_recovery_outcome(collection: &str, id: &str, outcome: RecoveryOutcome) -> String {
    match outcome {
        RecoveryOutcome::Recovered => format!("Recovered {collection}/{id}"),
        RecoveryOutcome::NotFound => {
            format!("Not recovered: {collection}/{id} is not flagged deleted in the mirror")
        }
        RecoveryOutcome::AlreadyExists => {
            format!("Skipped: {collection}/{id} already exists in the primary store")
        }
    }
}

pub fn format_batch_lines(summary: &RecoveryBatchSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Recovered {}/{} documents from {} ({} skipped, {} failed)",
        summary.recovered, summary.total, summary.collection, summary.skipped, summary.failed
    )];
    lines.extend(
        summary
            .failures
            .iter()
            .map(|failure| format!("  {}: {}", failure.mongo_id, failure.error)),
    );
    lines
}

pub fn format_stats_lines(report: &StatsReport) -> Vec<String> {
    let mut lines = vec!["Recent backup runs:".to_string()];
    if report.runs.is_empty() {
        lines.push("  (none)".to_string());
    }
    lines.extend(report.runs.iter().map(format_run));

    lines.push("Mirror tables:".to_string());
    if report.tables.is_empty() {
        lines.push("  (none)".to_string());
    }
    lines.extend(report.tables.iter().map(format_table_stats));

    lines.push(format!("Documents recovered: {}", report.total_recovered));
    lines
}

fn format_run(run: &BackupRun) -> String {
    let mut line = format!(
        "  #{:<5} {}  {:<9}  {} collections  {} documents",
        run.id, run.started_at, run.status, run.collections_synced, run.total_documents
    );
    if let Some(error) = &run.error_message {
        line.push_str("  error: ");
        line.push_str(error);
    }
    line
}

fn format_table_stats(stats: &TableStats) -> String {
    format!(
        "  {:<20} active {:<8} deleted {:<8} total {}",
        stats.collection, stats.active, stats.deleted, stats.total
    )
}
