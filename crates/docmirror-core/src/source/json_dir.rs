//! Directory of `mongoexport`-style JSON Lines files
//!
//! Each collection lives in `<root>/<collection>.jsonl`, one Extended JSON
//! document per line. A missing file is an empty collection; a missing root
//! directory means the store is unreachable.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use super::DocumentStore;
use crate::error::{Error, Result};
use crate::models::Document;

const COLLECTION_FILE_EXTENSION: &str = "jsonl";

/// File-backed document store
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    /// Open a store rooted at an existing directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Source(format!(
                "document store directory {} does not exist",
                root.display()
            )));
        }
        tracing::debug!("Opened document store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, collection: &str) -> Result<PathBuf> {
        let valid = !collection.is_empty()
            && !collection.starts_with('.')
            && !collection.contains(['/', '\\']);
        if !valid {
            return Err(Error::InvalidInput(format!(
                "invalid collection name '{collection}'"
            )));
        }
        Ok(self
            .root
            .join(format!("{collection}.{COLLECTION_FILE_EXTENSION}")))
    }

    async fn read_collection(&self, collection: &str) -> Result<Vec<Document>> {
        let path = self.collection_path(collection)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(Error::Source(format!(
                    "failed to read {}: {error}",
                    path.display()
                )))
            }
        };

        raw.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                Document::from_extended_json_str(line).map_err(|error| {
                    Error::Source(format!("{}:{}: {error}", path.display(), index + 1))
                })
            })
            .collect()
    }
}

impl DocumentStore for JsonDirStore {
    async fn list_all(&self, collection: &str) -> Result<Vec<Document>> {
        self.read_collection(collection).await
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self
            .read_collection(collection)
            .await?
            .into_iter()
            .find(|document| document.id().as_deref() == Some(id)))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        if document.id().is_none() {
            return Err(Error::InvalidInput("document has no usable _id".into()));
        }

        let path = self.collection_path(collection)?;
        let mut line = serde_json::to_string(&document.to_extended_json())?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|error| Error::Source(format!("failed to open {}: {error}", path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|error| Error::Source(format!("failed to write {}: {error}", path.display())))?;
        file.flush()
            .await
            .map_err(|error| Error::Source(format!("failed to write {}: {error}", path.display())))?;
        Ok(())
    }
}
