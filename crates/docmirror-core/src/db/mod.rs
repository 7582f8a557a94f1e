//! Mirror database layer for docmirror

mod connection;
mod migrations;
mod mirror;
mod recovery_repository;
mod run_repository;

pub use connection::MirrorDatabase;
pub use mirror::{
    mirror_table_name, sql_value_to_text, MirrorColumn, MirrorRecord, MirrorTables,
    MIRROR_TABLE_PREFIX,
};
pub use recovery_repository::{LibSqlRecoveryLogRepository, RecoveryLogRepository};
pub use run_repository::{BackupRunRepository, LibSqlBackupRunRepository};
