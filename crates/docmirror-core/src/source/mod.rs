//! Primary document store access
//!
//! The mirror only needs three operations from the store it backs up, so any
//! backend that can list a collection, find by id and insert one document can
//! be plugged in.

mod json_dir;
mod memory;

pub use json_dir::JsonDirStore;
pub use memory::MemoryDocumentStore;

use crate::error::Result;
use crate::models::Document;

/// Trait for primary document store operations (async)
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// Every document currently in the collection
    async fn list_all(&self, collection: &str) -> Result<Vec<Document>>;

    /// Look a document up by the string form of its `_id`
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Insert a document as-is
    async fn insert_one(&self, collection: &str, document: Document) -> Result<()>;
}
