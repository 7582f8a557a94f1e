//! Recovery of documents deleted from the primary store
//!
//! Rows flagged `is_deleted` in a mirror table are turned back into documents
//! and re-inserted upstream. Mirror and store are written in two separate
//! steps; a failure between them leaves the row flagged while the document is
//! already back in the store.

use chrono::{DateTime, Utc};
use libsql::Value as SqlValue;
use serde::{Deserialize, Serialize};

use crate::db::{
    BackupRunRepository, LibSqlBackupRunRepository, LibSqlRecoveryLogRepository, MirrorDatabase,
    MirrorRecord, MirrorTables, RecoveryLogRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    BackupRun, DeletedDocument, Document, RecoveryBatchSummary, RecoveryFailure,
    RecoveryOutcome, TableStats, Value, SOURCE_ID_FIELD, STATUS_FAILED, STATUS_RECOVERED,
};
use crate::schema::{is_reserved_column, ColumnType};
use crate::source::DocumentStore;
use crate::util::parse_sql_timestamp;

/// Days a deleted document stays recoverable
pub const RETENTION_DAYS: i64 = 60;

/// Whole days left in the retention window, never negative
pub fn days_remaining(deleted_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let elapsed = now.signed_duration_since(deleted_at).num_days();
    (RETENTION_DAYS - elapsed).max(0)
}

/// Ledger and table overview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    /// Recent backup runs, newest first
    pub runs: Vec<BackupRun>,
    pub tables: Vec<TableStats>,
    pub total_recovered: u64,
}

/// Recovery operations over a mirror database and its primary store
pub struct RecoveryEngine<'a, S> {
    source: &'a S,
    mirror: &'a MirrorDatabase,
}

impl<'a, S: DocumentStore> RecoveryEngine<'a, S> {
    pub const fn new(source: &'a S, mirror: &'a MirrorDatabase) -> Self {
        Self { source, mirror }
    }

    fn tables(&self) -> MirrorTables<'_> {
        MirrorTables::new(self.mirror.connection())
    }

    fn log(&self) -> LibSqlRecoveryLogRepository<'_> {
        LibSqlRecoveryLogRepository::new(self.mirror.connection())
    }

    /// Flagged-deleted documents, for one collection or every mirror table
    pub async fn list(&self, collection: Option<&str>) -> Result<Vec<DeletedDocument>> {
        let tables = self.tables();
        let collections = match collection {
            Some(name) => vec![name.to_string()],
            None => tables.mirror_collections().await?,
        };

        let now = Utc::now();
        let mut deleted = Vec::new();
        for collection in collections {
            for (mongo_id, deleted_at) in tables.list_deleted(&collection).await? {
                let days_remaining = deleted_at
                    .as_deref()
                    .and_then(parse_sql_timestamp)
                    .map(|at| days_remaining(at, now));
                deleted.push(DeletedDocument {
                    collection: collection.clone(),
                    mongo_id,
                    deleted_at,
                    days_remaining,
                });
            }
        }
        Ok(deleted)
    }

    /// Put one flagged-deleted document back into the primary store
    pub async fn recover_one(&self, collection: &str, mongo_id: &str) -> Result<RecoveryOutcome> {
        let tables = self.tables();
        let Some(record) = tables.find_deleted(collection, mongo_id).await? else {
            tracing::info!("{}/{}: no deleted mirror row", collection, mongo_id);
            return Ok(RecoveryOutcome::NotFound);
        };

        if self.source.find_by_id(collection, mongo_id).await?.is_some() {
            tracing::info!("{}/{}: already in the primary store", collection, mongo_id);
            return Ok(RecoveryOutcome::AlreadyExists);
        }

        let document = reconstruct_document(record, mongo_id);
        if let Err(error) = self.source.insert_one(collection, document).await {
            self.log_failure(collection, mongo_id, &error).await;
            return Err(error);
        }

        match tables.clear_deleted_flag(collection, mongo_id).await {
            Ok(true) => {}
            Ok(false) => {
                let error = Error::NotFound(format!(
                    "mirror row {collection}/{mongo_id} vanished before it could be un-flagged"
                ));
                self.log_failure(collection, mongo_id, &error).await;
                return Err(error);
            }
            Err(error) => {
                self.log_failure(collection, mongo_id, &error).await;
                return Err(error);
            }
        }

        self.log()
            .append(collection, mongo_id, STATUS_RECOVERED, None)
            .await?;
        tracing::info!("{}/{}: recovered", collection, mongo_id);
        Ok(RecoveryOutcome::Recovered)
    }

    /// Recover every flagged-deleted document of a collection.
    ///
    /// Item failures are tallied in the summary; only listing the flagged
    /// rows can fail the whole call.
    pub async fn recover_all(&self, collection: &str) -> Result<RecoveryBatchSummary> {
        let deleted = self.tables().list_deleted(collection).await?;
        let mut summary = RecoveryBatchSummary {
            collection: collection.to_string(),
            total: deleted.len(),
            ..RecoveryBatchSummary::default()
        };

        for (mongo_id, _) in deleted {
            match self.recover_one(collection, &mongo_id).await {
                Ok(RecoveryOutcome::Recovered) => summary.recovered += 1,
                Ok(_) => summary.skipped += 1,
                Err(error) => {
                    tracing::warn!("{}/{}: recovery failed: {}", collection, mongo_id, error);
                    summary.failed += 1;
                    summary.failures.push(RecoveryFailure {
                        mongo_id,
                        error: error.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "{}: recovered {}/{} documents ({} skipped, {} failed)",
            collection,
            summary.recovered,
            summary.total,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    /// Recent runs, per-table counts and the cumulative recovery count
    pub async fn stats(&self, recent_runs: usize) -> Result<StatsReport> {
        let runs = LibSqlBackupRunRepository::new(self.mirror.connection())
            .recent(recent_runs)
            .await?;

        let tables = self.tables();
        let mut table_stats = Vec::new();
        for collection in tables.mirror_collections().await? {
            table_stats.push(tables.counts(&collection).await?);
        }

        let total_recovered = self.log().count_recovered(None).await?;
        Ok(StatsReport {
            runs,
            tables: table_stats,
            total_recovered,
        })
    }

    async fn log_failure(&self, collection: &str, mongo_id: &str, error: &Error) {
        let message = error.to_string();
        if let Err(log_error) = self
            .log()
            .append(collection, mongo_id, STATUS_FAILED, Some(&message))
            .await
        {
            tracing::warn!(
                "{}/{}: could not write recovery log: {}",
                collection,
                mongo_id,
                log_error
            );
        }
    }
}

/// Rebuild a document from a mirror row.
///
/// Reserved columns are skipped and NULL columns omitted. `DATETIME` text
/// becomes a timestamp again and `BOOLEAN` 0/1 a boolean. Text that looks
/// like a JSON object or array is parsed back into structure. Flattened
/// columns stay flat.
pub fn reconstruct_document(record: MirrorRecord, mongo_id: &str) -> Document {
    let mut document = Document::new().with(SOURCE_ID_FIELD, Value::id_from_str(mongo_id));

    for column in record {
        if is_reserved_column(&column.name) {
            continue;
        }
        if let Some(value) = decode_column(&column.declared_type, column.value) {
            document.insert(column.name, value);
        }
    }
    document
}

fn decode_column(declared_type: &str, value: SqlValue) -> Option<Value> {
    let declared = ColumnKind::of(declared_type);
    match value {
        SqlValue::Null => None,
        SqlValue::Integer(number) if declared == ColumnKind::Boolean => {
            Some(Value::Bool(number != 0))
        }
        SqlValue::Integer(number) => Some(Value::Int(number)),
        SqlValue::Real(number) => Some(Value::Float(number)),
        SqlValue::Text(text) if declared == ColumnKind::Timestamp => {
            match parse_sql_timestamp(&text) {
                Some(instant) => Some(Value::Timestamp(instant)),
                None => Some(decode_text(text)),
            }
        }
        SqlValue::Text(text) => Some(decode_text(text)),
        SqlValue::Blob(bytes) => Some(Value::Text(String::from_utf8_lossy(&bytes).into_owned())),
    }
}

/// Declared column types that change how a stored value reads back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Boolean,
    Timestamp,
    Other,
}

impl ColumnKind {
    fn of(declared_type: &str) -> Self {
        if declared_type.eq_ignore_ascii_case(ColumnType::Boolean.sql_type()) {
            Self::Boolean
        } else if declared_type.eq_ignore_ascii_case(ColumnType::Timestamp.sql_type()) {
            Self::Timestamp
        } else {
            Self::Other
        }
    }
}

fn decode_text(text: String) -> Value {
    if text.starts_with('{') || text.starts_with('[') {
        if let Ok(json) = serde_json::from_str(&text) {
            return Value::from_plain_json(json);
        }
    }
    Value::Text(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MirrorColumn;
    use crate::source::MemoryDocumentStore;
    use crate::sync::{SyncOptions, SyncOrchestrator};
    use crate::util::format_sql_timestamp;
    use chrono::{Duration, TimeZone};
    use libsql::params;
    use pretty_assertions::assert_eq;

    const OBJECT_ID: &str = "65a1b2c3d4e5f60718293a4b";

    /// Memory store that refuses inserts of one id
    struct RejectingStore {
        inner: MemoryDocumentStore,
        reject: String,
    }

    impl DocumentStore for RejectingStore {
        async fn list_all(&self, collection: &str) -> Result<Vec<Document>> {
            self.inner.list_all(collection).await
        }

        async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>> {
            self.inner.find_by_id(collection, id).await
        }

        async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
            if document.id().as_deref() == Some(self.reject.as_str()) {
                return Err(Error::Source("write rejected".into()));
            }
            self.inner.insert_one(collection, document).await
        }
    }

    fn doc(id: &str) -> Document {
        Document::new()
            .with(SOURCE_ID_FIELD, Value::Text(id.into()))
            .with("name", Value::Text(format!("name-{id}")))
    }

    async fn synced(store: &MemoryDocumentStore, collection: &str, docs: Vec<Document>) -> MirrorDatabase {
        store.replace_collection(collection, docs).await;
        let db = MirrorDatabase::open_in_memory().await.unwrap();
        SyncOrchestrator::new(store, &db, SyncOptions::default())
            .run(&[collection.to_string()])
            .await
            .unwrap();
        db
    }

    /// Stand-in for the external deletion tracker
    async fn flag_deleted(db: &MirrorDatabase, collection: &str, id: &str, deleted_at: DateTime<Utc>) {
        db.connection()
            .execute(
                &format!(
                    "UPDATE mongo_{collection} SET is_deleted = 1, deleted_at = ? WHERE mongo_id = ?"
                ),
                params![format_sql_timestamp(&deleted_at), id],
            )
            .await
            .unwrap();
    }

    #[test]
    fn retention_window_counts_down_and_saturates() {
        let now = Utc::now();
        assert_eq!(days_remaining(now - Duration::days(10), now), 50);
        assert_eq!(days_remaining(now, now), RETENTION_DAYS);
        assert_eq!(days_remaining(now - Duration::days(90), now), 0);
    }

    #[test]
    fn reconstruct_skips_reserved_and_null_columns() {
        let column = |name: &str, declared_type: &str, value: SqlValue| MirrorColumn {
            name: name.to_string(),
            declared_type: declared_type.to_string(),
            value,
        };
        let record = vec![
            column("id", "INTEGER", SqlValue::Integer(7)),
            column("mongo_id", "VARCHAR(255)", SqlValue::Text(OBJECT_ID.into())),
            column("name", "VARCHAR(255)", SqlValue::Text("x".into())),
            column("tags", "JSON", SqlValue::Text("[\"a\",\"b\"]".into())),
            column("note", "TEXT", SqlValue::Text("{not json".into())),
            column("score", "DOUBLE", SqlValue::Real(2.5)),
            column("createdAt", "DATETIME", SqlValue::Null),
            column("synced_at", "DATETIME", SqlValue::Text("2024-01-01 00:00:00".into())),
            column("is_deleted", "BOOLEAN", SqlValue::Integer(1)),
            column("deleted_at", "DATETIME", SqlValue::Text("2024-01-02 00:00:00".into())),
        ];

        let document = reconstruct_document(record, OBJECT_ID);
        let expected = Document::new()
            .with(SOURCE_ID_FIELD, Value::ObjectId(OBJECT_ID.into()))
            .with("name", Value::Text("x".into()))
            .with(
                "tags",
                Value::Array(vec![Value::Text("a".into()), Value::Text("b".into())]),
            )
            .with("note", Value::Text("{not json".into()))
            .with("score", Value::Float(2.5));
        assert_eq!(document, expected);
    }

    #[test]
    fn declared_types_restore_timestamps_and_booleans() {
        let column = |name: &str, declared_type: &str, value: SqlValue| MirrorColumn {
            name: name.to_string(),
            declared_type: declared_type.to_string(),
            value,
        };
        let record = vec![
            column("createdAt", "DATETIME", SqlValue::Text("2024-01-01 00:00:00".into())),
            column("seenAt", "DATETIME", SqlValue::Text("not a date".into())),
            column("label", "VARCHAR(255)", SqlValue::Text("2024-01-01 00:00:00".into())),
            column("active", "BOOLEAN", SqlValue::Integer(0)),
            column("count", "BIGINT", SqlValue::Integer(1)),
        ];

        let document = reconstruct_document(record, "A1");
        assert_eq!(
            document.get("createdAt"),
            Some(&Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))
        );
        assert_eq!(document.get("seenAt"), Some(&Value::Text("not a date".into())));
        assert_eq!(
            document.get("label"),
            Some(&Value::Text("2024-01-01 00:00:00".into()))
        );
        assert_eq!(document.get("active"), Some(&Value::Bool(false)));
        assert_eq!(document.get("count"), Some(&Value::Int(1)));
    }

    #[test]
    fn non_hex_ids_stay_text() {
        let document = reconstruct_document(Vec::new(), "A1");
        assert_eq!(document.get(SOURCE_ID_FIELD), Some(&Value::Text("A1".into())));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_reports_retention() {
        let store = MemoryDocumentStore::new();
        let db = synced(&store, "users", vec![doc("u1"), doc("u2")]).await;
        flag_deleted(&db, "users", "u2", Utc::now() - Duration::days(10)).await;

        let engine = RecoveryEngine::new(&store, &db);
        let deleted = engine.list(None).await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].mongo_id, "u2");
        assert_eq!(deleted[0].collection, "users");
        assert_eq!(deleted[0].days_remaining, Some(50));

        assert!(engine.list(Some("visits")).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recover_one_restores_document_and_unflags_row() {
        let store = MemoryDocumentStore::new();
        let original = Document::new()
            .with(SOURCE_ID_FIELD, Value::Text("A1".into()))
            .with("name", Value::Text("x".into()))
            .with(
                "meta",
                Value::Object(
                    Document::new()
                        .with("a", Value::Int(1))
                        .with("b", Value::Int(2)),
                ),
            )
            .with("active", Value::Bool(true));
        let db = synced(&store, "users", vec![original]).await;
        store.delete_by_id("users", "A1").await.unwrap();
        flag_deleted(&db, "users", "A1", Utc::now()).await;

        let engine = RecoveryEngine::new(&store, &db);
        let outcome = engine.recover_one("users", "A1").await.unwrap();
        assert_eq!(outcome, RecoveryOutcome::Recovered);

        let restored = store.find_by_id("users", "A1").await.unwrap().unwrap();
        assert_eq!(restored.get("name"), Some(&Value::Text("x".into())));
        assert_eq!(restored.get("meta_a"), Some(&Value::Int(1)));
        assert_eq!(restored.get("active"), Some(&Value::Bool(true)));

        assert!(engine.list(Some("users")).await.unwrap().is_empty());
        let log = LibSqlRecoveryLogRepository::new(db.connection())
            .recent(10)
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, STATUS_RECOVERED);
        assert_eq!(log[0].mongo_id, "A1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recovered_timestamps_keep_their_type() {
        let store = MemoryDocumentStore::new();
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let original = doc("u1")
            .with("createdAt", Value::Timestamp(created))
            .with("verified", Value::Bool(false));
        let db = synced(&store, "users", vec![original]).await;
        store.delete_by_id("users", "u1").await.unwrap();
        flag_deleted(&db, "users", "u1", Utc::now()).await;

        let engine = RecoveryEngine::new(&store, &db);
        assert_eq!(
            engine.recover_one("users", "u1").await.unwrap(),
            RecoveryOutcome::Recovered
        );

        let restored = store.find_by_id("users", "u1").await.unwrap().unwrap();
        assert_eq!(restored.get("createdAt"), Some(&Value::Timestamp(created)));
        assert_eq!(restored.get("verified"), Some(&Value::Bool(false)));
        assert_eq!(restored.get("updatedAt"), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_recover_reports_already_exists() {
        let store = MemoryDocumentStore::new();
        let db = synced(&store, "users", vec![doc("u1")]).await;
        store.delete_by_id("users", "u1").await.unwrap();
        flag_deleted(&db, "users", "u1", Utc::now()).await;
        let engine = RecoveryEngine::new(&store, &db);

        assert_eq!(
            engine.recover_one("users", "u1").await.unwrap(),
            RecoveryOutcome::Recovered
        );
        // the tracker flags it again while the document is back upstream
        flag_deleted(&db, "users", "u1", Utc::now()).await;
        assert_eq!(
            engine.recover_one("users", "u1").await.unwrap(),
            RecoveryOutcome::AlreadyExists
        );
        assert_eq!(store.count("users").await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unflagged_or_unknown_rows_are_not_found() {
        let store = MemoryDocumentStore::new();
        let db = synced(&store, "users", vec![doc("u1")]).await;
        let engine = RecoveryEngine::new(&store, &db);

        assert_eq!(
            engine.recover_one("users", "u1").await.unwrap(),
            RecoveryOutcome::NotFound
        );
        assert_eq!(
            engine.recover_one("ghosts", "u1").await.unwrap(),
            RecoveryOutcome::NotFound
        );
        let logged = LibSqlRecoveryLogRepository::new(db.connection())
            .recent(10)
            .await
            .unwrap();
        assert!(logged.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recover_all_isolates_item_failures() {
        let seed = MemoryDocumentStore::new();
        let db = synced(&seed, "users", vec![doc("u1"), doc("u2"), doc("u3")]).await;
        for id in ["u1", "u2", "u3"] {
            flag_deleted(&db, "users", id, Utc::now()).await;
        }
        let store = RejectingStore {
            inner: MemoryDocumentStore::new(),
            reject: "u2".into(),
        };

        let summary = RecoveryEngine::new(&store, &db)
            .recover_all("users")
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.recovered, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].mongo_id, "u2");

        let log = LibSqlRecoveryLogRepository::new(db.connection());
        assert_eq!(log.count_recovered(Some("users")).await.unwrap(), 2);
        let entries = log.recent(10).await.unwrap();
        assert!(entries
            .iter()
            .any(|entry| entry.mongo_id == "u2" && entry.status == STATUS_FAILED));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stats_counts_add_up() {
        let store = MemoryDocumentStore::new();
        let db = synced(&store, "users", vec![doc("u1"), doc("u2"), doc("u3")]).await;
        flag_deleted(&db, "users", "u3", Utc::now()).await;

        let report = RecoveryEngine::new(&store, &db).stats(5).await.unwrap();

        assert_eq!(report.runs.len(), 1);
        assert_eq!(report.total_recovered, 0);
        assert_eq!(
            report.tables,
            vec![TableStats {
                collection: "users".into(),
                active: 2,
                deleted: 1,
                total: 3,
            }]
        );
        for table in &report.tables {
            assert_eq!(table.active + table.deleted, table.total);
        }
    }
}
