use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] docmirror_core::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Collection name cannot be empty")]
    EmptyCollection,
    #[error("Document id cannot be empty")]
    EmptyDocumentId,
    #[error(
        "No collections to sync. Pass --collection, set DOCMIRROR_COLLECTIONS, or list them in docmirror.json."
    )]
    NoCollections,
}
