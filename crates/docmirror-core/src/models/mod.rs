//! Data models for docmirror

mod backup_run;
mod document;
mod recovery;

pub use backup_run::{
    BackupRun, BackupRunSummary, CollectionReport, CollectionStatus, RunStatus,
};
pub use document::{Document, Value, SOURCE_ID_FIELD};
pub use recovery::{
    DeletedDocument, RecoveryBatchSummary, RecoveryFailure, RecoveryLogEntry, RecoveryOutcome,
    TableStats, STATUS_FAILED, STATUS_RECOVERED,
};
