//! In-process document store

use std::collections::BTreeMap;

use tokio::sync::Mutex;

use super::DocumentStore;
use crate::error::{Error, Result};
use crate::models::Document;

/// Document store held in memory (tests and embedding)
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<BTreeMap<String, Vec<Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection, replacing whatever it held
    pub async fn replace_collection(&self, collection: &str, documents: Vec<Document>) {
        self.collections
            .lock()
            .await
            .insert(collection.to_string(), documents);
    }

    /// Remove a document, returning it if it existed
    pub async fn delete_by_id(&self, collection: &str, id: &str) -> Option<Document> {
        let mut collections = self.collections.lock().await;
        let documents = collections.get_mut(collection)?;
        let index = documents
            .iter()
            .position(|document| document.id().as_deref() == Some(id))?;
        Some(documents.remove(index))
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn list_all(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .lock()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.collections.lock().await.get(collection).and_then(|documents| {
            documents
                .iter()
                .find(|document| document.id().as_deref() == Some(id))
                .cloned()
        }))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        let Some(id) = document.id() else {
            return Err(Error::InvalidInput("document has no usable _id".into()));
        };

        let mut collections = self.collections.lock().await;
        let documents = collections.entry(collection.to_string()).or_default();
        if documents
            .iter()
            .any(|existing| existing.id().as_deref() == Some(id.as_str()))
        {
            return Err(Error::Source(format!(
                "duplicate key: {collection} already holds _id {id}"
            )));
        }
        documents.push(document);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Value, SOURCE_ID_FIELD};

    fn doc(id: &str) -> Document {
        Document::new().with(SOURCE_ID_FIELD, Value::Text(id.into()))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_find_and_list() {
        let store = MemoryDocumentStore::new();
        store.insert_one("users", doc("u1")).await.unwrap();
        store.insert_one("users", doc("u2")).await.unwrap();

        assert_eq!(store.list_all("users").await.unwrap().len(), 2);
        assert!(store.find_by_id("users", "u2").await.unwrap().is_some());
        assert!(store.find_by_id("users", "u3").await.unwrap().is_none());
        assert!(store.list_all("visits").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_rejects_duplicates_and_missing_ids() {
        let store = MemoryDocumentStore::new();
        store.insert_one("users", doc("u1")).await.unwrap();

        assert!(store.insert_one("users", doc("u1")).await.is_err());
        assert!(store.insert_one("users", Document::new()).await.is_err());
        assert_eq!(store.count("users").await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_by_id_removes_document() {
        let store = MemoryDocumentStore::new();
        store.replace_collection("users", vec![doc("u1")]).await;

        assert!(store.delete_by_id("users", "u1").await.is_some());
        assert!(store.delete_by_id("users", "u1").await.is_none());
        assert_eq!(store.count("users").await, 0);
    }
}
