//! docmirror-core - Core library for docmirror
//!
//! Mirrors schemaless document collections into relational tables, keeps a
//! ledger of backup runs and restores soft-deleted documents from the mirror
//! back into the primary store.

pub mod coerce;
pub mod config;
pub mod db;
pub mod error;
pub mod flatten;
pub mod models;
pub mod recovery;
pub mod schema;
pub mod source;
pub mod sync;
pub mod util;

pub use config::MirrorConfig;
pub use error::{Error, Result};
pub use models::{BackupRunSummary, Document, Value};
pub use recovery::{RecoveryEngine, StatsReport};
pub use sync::{SyncOptions, SyncOrchestrator};
