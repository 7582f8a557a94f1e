//! Backup run ledger models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a backup run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Started and not yet finished (or the process died mid-run)
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// One invocation of the sync job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRun {
    pub id: i64,
    /// `YYYY-MM-DD HH:MM:SS` UTC
    pub started_at: String,
    pub status: RunStatus,
    pub collections_synced: i64,
    pub total_documents: i64,
    pub error_message: Option<String>,
    pub completed_at: Option<String>,
}

/// Outcome of one collection within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Synced,
    /// Source collection was empty
    Skipped,
    Failed,
}

impl CollectionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for CollectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(Self::Synced),
            "skipped" => Ok(Self::Skipped),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown collection status '{other}'")),
        }
    }
}

/// Per-collection statistics recorded for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub collection: String,
    pub status: CollectionStatus,
    /// Documents fetched from the primary store
    pub documents_total: u64,
    /// Rows written to the mirror table
    pub documents_synced: u64,
    /// Rows rejected as duplicate keys
    pub duplicates: u64,
    /// Rows that failed for any other reason
    pub rows_failed: u64,
    pub error: Option<String>,
}

impl CollectionReport {
    pub fn skipped(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            status: CollectionStatus::Skipped,
            documents_total: 0,
            documents_synced: 0,
            duplicates: 0,
            rows_failed: 0,
            error: None,
        }
    }

    pub fn failed(collection: impl Into<String>, documents_total: u64, error: String) -> Self {
        Self {
            collection: collection.into(),
            status: CollectionStatus::Failed,
            documents_total,
            documents_synced: 0,
            duplicates: 0,
            rows_failed: 0,
            error: Some(error),
        }
    }
}

/// Result of a whole sync invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRunSummary {
    pub run_id: i64,
    pub status: RunStatus,
    pub collections: Vec<CollectionReport>,
    pub total_documents: u64,
    pub error: Option<String>,
}

impl BackupRunSummary {
    fn count(&self, status: CollectionStatus) -> usize {
        self.collections
            .iter()
            .filter(|report| report.status == status)
            .count()
    }

    pub fn collections_synced(&self) -> usize {
        self.count(CollectionStatus::Synced)
    }

    pub fn collections_skipped(&self) -> usize {
        self.count(CollectionStatus::Skipped)
    }

    pub fn collections_failed(&self) -> usize {
        self.count(CollectionStatus::Failed)
    }

    pub fn rows_failed(&self) -> u64 {
        self.collections.iter().map(|report| report.rows_failed).sum()
    }
}
