//! Mirror table DDL and DML
//!
//! One table per source collection, named `mongo_<collection>`. The sync job
//! owns every column except `is_deleted`/`deleted_at`, which belong to the
//! external deletion tracker and are only ever cleared here on recovery.

#![allow(clippy::cast_possible_wrap)] // SQLite takes i64 for lengths

use libsql::{params, params_from_iter, Connection, Value as SqlValue};

use crate::error::Result;
use crate::flatten::FlatRow;
use crate::models::TableStats;
use crate::schema::{
    CollectionSchema, DELETED_AT_COLUMN, IS_DELETED_COLUMN, UNIQUE_ID_COLUMN,
};
use crate::util::quote_ident;

/// Prefix shared by every mirror table
pub const MIRROR_TABLE_PREFIX: &str = "mongo_";

/// Mirror table name for a collection
pub fn mirror_table_name(collection: &str) -> String {
    format!("{MIRROR_TABLE_PREFIX}{collection}")
}

/// One column of a raw mirror row
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorColumn {
    pub name: String,
    /// Type named in the table's DDL, e.g. `DATETIME`
    pub declared_type: String,
    pub value: SqlValue,
}

/// A raw mirror row in table order
pub type MirrorRecord = Vec<MirrorColumn>;

/// Mirror table operations over a borrowed connection
pub struct MirrorTables<'a> {
    conn: &'a Connection,
}

impl<'a> MirrorTables<'a> {
    /// Create a new accessor with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Whether the collection has a mirror table
    pub async fn exists(&self, collection: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
                params![mirror_table_name(collection)],
            )
            .await?;

        Ok(match rows.next().await? {
            Some(row) => row.get::<i32>(0)? != 0,
            None => false,
        })
    }

    /// Drop and recreate a collection's mirror table from its schema.
    ///
    /// Any soft-delete flags in the old table are lost with it.
    pub async fn rebuild(&self, schema: &CollectionSchema) -> Result<()> {
        let table = mirror_table_name(schema.collection());
        let mut statements = vec![format!("DROP TABLE IF EXISTS {}", quote_ident(&table))];
        statements.extend(schema.create_table_sql(&table));

        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        for stmt in &statements {
            if let Err(e) = self.conn.execute(stmt, ()).await {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
        }
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        tracing::debug!(
            "Recreated {} with {} columns",
            table,
            schema.columns().len()
        );
        Ok(())
    }

    /// Delete every row of an existing mirror table, keeping the table.
    ///
    /// Returns the number of rows removed; a missing table removes nothing.
    pub async fn clear(&self, collection: &str) -> Result<u64> {
        if !self.exists(collection).await? {
            return Ok(0);
        }
        let sql = format!("DELETE FROM {}", quote_ident(&mirror_table_name(collection)));
        Ok(self.conn.execute(&sql, ()).await?)
    }

    /// Column names and declared types of a mirror table, in table order
    pub async fn column_types(&self, collection: &str) -> Result<Vec<(String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT name, type FROM pragma_table_info(?) ORDER BY cid",
                params![mirror_table_name(collection)],
            )
            .await?;

        let mut columns = Vec::new();
        while let Some(row) = rows.next().await? {
            columns.push((row.get::<String>(0)?, row.get::<String>(1)?));
        }
        Ok(columns)
    }

    /// Insert one flattened document
    pub async fn insert_row(&self, schema: &CollectionSchema, row: &FlatRow) -> Result<()> {
        let (columns, values) = row.project(schema);
        let table = mirror_table_name(schema.collection());

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&table),
            columns
                .iter()
                .map(|column| quote_ident(column))
                .collect::<Vec<_>>()
                .join(", "),
            vec!["?"; values.len()].join(", ")
        );

        self.conn.execute(&sql, params_from_iter(values)).await?;
        Ok(())
    }

    /// Fetch a row only if it is flagged deleted
    pub async fn find_deleted(
        &self,
        collection: &str,
        mongo_id: &str,
    ) -> Result<Option<MirrorRecord>> {
        if !self.exists(collection).await? {
            return Ok(None);
        }

        let sql = format!(
            "SELECT * FROM {} WHERE {} = ? AND {} = 1 LIMIT 1",
            quote_ident(&mirror_table_name(collection)),
            quote_ident(UNIQUE_ID_COLUMN),
            quote_ident(IS_DELETED_COLUMN)
        );
        let mut rows = self.conn.query(&sql, params![mongo_id]).await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let declared = self.column_types(collection).await?;

        let mut record = Vec::new();
        for index in 0..row.column_count() {
            let name = row.column_name(index).unwrap_or_default().to_string();
            let declared_type = declared
                .iter()
                .find(|(column, _)| column.eq_ignore_ascii_case(&name))
                .map(|(_, declared_type)| declared_type.clone())
                .unwrap_or_default();
            record.push(MirrorColumn {
                name,
                declared_type,
                value: row.get_value(index)?,
            });
        }
        Ok(Some(record))
    }

    /// Ids and deletion instants of every flagged row, oldest deletion first
    pub async fn list_deleted(&self, collection: &str) -> Result<Vec<(String, Option<String>)>> {
        if !self.exists(collection).await? {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {id}, {deleted_at} FROM {table} WHERE {is_deleted} = 1 ORDER BY {deleted_at} ASC, {id} ASC",
            id = quote_ident(UNIQUE_ID_COLUMN),
            deleted_at = quote_ident(DELETED_AT_COLUMN),
            is_deleted = quote_ident(IS_DELETED_COLUMN),
            table = quote_ident(&mirror_table_name(collection)),
        );
        let mut rows = self.conn.query(&sql, ()).await?;

        let mut deleted = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let deleted_at = sql_value_to_text(row.get_value(1)?);
            deleted.push((id, deleted_at));
        }
        Ok(deleted)
    }

    /// Clear the soft-delete flag after a successful recovery
    pub async fn clear_deleted_flag(&self, collection: &str, mongo_id: &str) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET {} = 0, {} = NULL WHERE {} = ?",
            quote_ident(&mirror_table_name(collection)),
            quote_ident(IS_DELETED_COLUMN),
            quote_ident(DELETED_AT_COLUMN),
            quote_ident(UNIQUE_ID_COLUMN)
        );
        let changed = self.conn.execute(&sql, params![mongo_id]).await?;
        Ok(changed > 0)
    }

    /// Collections that currently have a mirror table, sorted by name
    pub async fn mirror_collections(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND substr(name, 1, ?) = ?
                 ORDER BY name",
                params![MIRROR_TABLE_PREFIX.len() as i64, MIRROR_TABLE_PREFIX],
            )
            .await?;

        let mut collections = Vec::new();
        while let Some(row) = rows.next().await? {
            let table: String = row.get(0)?;
            if let Some(collection) = table.strip_prefix(MIRROR_TABLE_PREFIX) {
                collections.push(collection.to_string());
            }
        }
        Ok(collections)
    }

    /// Active/deleted/total counts; active is everything not flagged deleted
    pub async fn counts(&self, collection: &str) -> Result<TableStats> {
        let sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN {} = 1 THEN 1 ELSE 0 END), 0) FROM {}",
            quote_ident(IS_DELETED_COLUMN),
            quote_ident(&mirror_table_name(collection))
        );
        let mut rows = self.conn.query(&sql, ()).await?;

        let (total, deleted) = match rows.next().await? {
            Some(row) => (row.get::<i64>(0)?, row.get::<i64>(1)?),
            None => (0, 0),
        };
        let total = u64::try_from(total).unwrap_or_default();
        let deleted = u64::try_from(deleted).unwrap_or_default();

        Ok(TableStats {
            collection: collection.to_string(),
            active: total - deleted,
            deleted,
            total,
        })
    }

    /// Every unique id in a mirror table, sorted
    pub async fn unique_ids(&self, collection: &str) -> Result<Vec<String>> {
        if !self.exists(collection).await? {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {id} FROM {table} ORDER BY {id}",
            id = quote_ident(UNIQUE_ID_COLUMN),
            table = quote_ident(&mirror_table_name(collection))
        );
        let mut rows = self.conn.query(&sql, ()).await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }
}

/// Text form of a stored value, `None` for NULL
pub fn sql_value_to_text(value: SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Integer(number) => Some(number.to_string()),
        SqlValue::Real(number) => Some(number.to_string()),
        SqlValue::Text(text) => Some(text),
        SqlValue::Blob(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MirrorDatabase;
    use crate::flatten::flatten;
    use crate::models::{Document, Value, SOURCE_ID_FIELD};
    use crate::schema::infer_schema;
    use pretty_assertions::assert_eq;

    fn doc(id: &str, name: &str) -> Document {
        Document::new()
            .with(SOURCE_ID_FIELD, Value::Text(id.into()))
            .with("name", Value::Text(name.into()))
    }

    async fn seeded(db: &MirrorDatabase) -> CollectionSchema {
        let docs = vec![doc("a", "first"), doc("b", "second"), doc("c", "third")];
        let schema = infer_schema("users", &docs);
        let tables = MirrorTables::new(db.connection());
        tables.rebuild(&schema).await.unwrap();
        for document in &docs {
            tables.insert_row(&schema, &flatten(document)).await.unwrap();
        }
        schema
    }

    async fn flag(db: &MirrorDatabase, id: &str, deleted_at: &str) {
        db.connection()
            .execute(
                "UPDATE mongo_users SET is_deleted = 1, deleted_at = ? WHERE mongo_id = ?",
                params![deleted_at, id],
            )
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rebuild_and_insert() {
        let db = MirrorDatabase::open_in_memory().await.unwrap();
        seeded(&db).await;
        let tables = MirrorTables::new(db.connection());

        assert!(tables.exists("users").await.unwrap());
        assert!(!tables.exists("visits").await.unwrap());
        assert_eq!(tables.unique_ids("users").await.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(tables.mirror_collections().await.unwrap(), vec!["users"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_ids_are_unique_violations() {
        let db = MirrorDatabase::open_in_memory().await.unwrap();
        let schema = seeded(&db).await;
        let tables = MirrorTables::new(db.connection());

        let error = tables
            .insert_row(&schema, &flatten(&doc("a", "again")))
            .await
            .unwrap_err();
        assert!(error.is_unique_violation());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rebuild_drops_previous_rows_and_flags() {
        let db = MirrorDatabase::open_in_memory().await.unwrap();
        let schema = seeded(&db).await;
        flag(&db, "a", "2024-01-01 00:00:00").await;

        let tables = MirrorTables::new(db.connection());
        tables.rebuild(&schema).await.unwrap();

        let stats = tables.counts("users").await.unwrap();
        assert_eq!((stats.total, stats.deleted), (0, 0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn find_deleted_requires_flag() {
        let db = MirrorDatabase::open_in_memory().await.unwrap();
        seeded(&db).await;
        let tables = MirrorTables::new(db.connection());

        assert!(tables.find_deleted("users", "a").await.unwrap().is_none());
        flag(&db, "a", "2024-01-01 00:00:00").await;

        let record = tables.find_deleted("users", "a").await.unwrap().unwrap();
        let name = record.iter().find(|column| column.name == "name").unwrap();
        assert_eq!(name.value, SqlValue::Text("first".into()));
        assert_eq!(name.declared_type, "VARCHAR(255)");
        let created = record.iter().find(|column| column.name == "createdAt").unwrap();
        assert_eq!(created.declared_type, "DATETIME");
        assert!(tables.find_deleted("missing", "a").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn column_types_follow_the_ddl() {
        let db = MirrorDatabase::open_in_memory().await.unwrap();
        seeded(&db).await;
        let tables = MirrorTables::new(db.connection());

        let columns = tables.column_types("users").await.unwrap();
        let names = columns.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "id",
                "mongo_id",
                "name",
                "createdAt",
                "updatedAt",
                "synced_at",
                "is_deleted",
                "deleted_at"
            ]
        );
        assert_eq!(columns[6].1, "BOOLEAN");
        assert!(tables.column_types("missing").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_empties_the_table_but_keeps_it() {
        let db = MirrorDatabase::open_in_memory().await.unwrap();
        seeded(&db).await;
        let tables = MirrorTables::new(db.connection());

        assert_eq!(tables.clear("users").await.unwrap(), 3);
        assert!(tables.exists("users").await.unwrap());
        assert!(tables.unique_ids("users").await.unwrap().is_empty());
        assert_eq!(tables.clear("visits").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_counts_and_clear() {
        let db = MirrorDatabase::open_in_memory().await.unwrap();
        seeded(&db).await;
        flag(&db, "c", "2024-02-01 00:00:00").await;
        flag(&db, "b", "2024-01-01 00:00:00").await;
        let tables = MirrorTables::new(db.connection());

        assert_eq!(
            tables.list_deleted("users").await.unwrap(),
            vec![
                ("b".to_string(), Some("2024-01-01 00:00:00".to_string())),
                ("c".to_string(), Some("2024-02-01 00:00:00".to_string())),
            ]
        );

        let stats = tables.counts("users").await.unwrap();
        assert_eq!((stats.active, stats.deleted, stats.total), (1, 2, 3));

        assert!(tables.clear_deleted_flag("users", "b").await.unwrap());
        let stats = tables.counts("users").await.unwrap();
        assert_eq!((stats.active, stats.deleted, stats.total), (2, 1, 3));
        assert_eq!(stats.active + stats.deleted, stats.total);
    }
}
