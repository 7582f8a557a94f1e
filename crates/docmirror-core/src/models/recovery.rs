//! Recovery models

use serde::{Deserialize, Serialize};

/// Status recorded for a successful recovery
pub const STATUS_RECOVERED: &str = "recovered";
/// Status recorded when the primary-store write (or un-flag) failed
pub const STATUS_FAILED: &str = "failed";

/// Audit record for one recovery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryLogEntry {
    pub id: i64,
    pub collection: String,
    pub mongo_id: String,
    pub status: String,
    pub error_message: Option<String>,
    pub recovered_at: String,
}

/// A mirror row flagged as deleted upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedDocument {
    pub collection: String,
    pub mongo_id: String,
    /// As stored by the deletion tracker, if it stored one
    pub deleted_at: Option<String>,
    /// Days left in the retention window; `None` when `deleted_at` is unknown
    pub days_remaining: Option<i64>,
}

/// Result of recovering a single document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Recovered,
    /// No mirror row, or the row is not flagged deleted
    NotFound,
    /// The primary store already holds the document; nothing written
    AlreadyExists,
}

impl RecoveryOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recovered => "recovered",
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
        }
    }
}

/// One item that failed during a bulk recovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryFailure {
    pub mongo_id: String,
    pub error: String,
}

/// Tally of a bulk recovery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryBatchSummary {
    pub collection: String,
    pub total: usize,
    pub recovered: usize,
    /// Not found or already present in the primary store
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<RecoveryFailure>,
}

/// Row counts for one mirror table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub collection: String,
    pub active: u64,
    pub deleted: u64,
    pub total: u64,
}
