//! Document store: the Drive / Docs collaborator behind a trait.
//!
//! The pipeline only ever talks to `dyn DocumentStore`. `GoogleWorkspaceClient`
//! is the production backend; tests swap in an in-memory store.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod google;
pub mod link;
pub mod lister;
pub mod models;

pub use google::{GoogleEndpoints, GoogleWorkspaceClient};
pub use link::extract_folder_id;
pub use lister::list_documents;
pub use models::{DocsRequest, DocumentFormat, DocumentRef, DriveFile, StructuredDocument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Access denied to {resource}: {message}")]
    Access { resource: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage quota exceeded: {0}")]
    Quota(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Store API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Capabilities the pipeline needs from the cloud file store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every direct child of a folder, all result pages.
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveFile>, StoreError>;

    async fn fetch_document(&self, document_id: &str) -> Result<StructuredDocument, StoreError>;

    async fn download_file(&self, file_id: &str) -> Result<Bytes, StoreError>;

    /// Creates an empty structured document in `folder_id` and returns its id.
    async fn create_document(&self, title: &str, folder_id: &str) -> Result<String, StoreError>;

    async fn batch_update(
        &self,
        document_id: &str,
        requests: &[DocsRequest],
    ) -> Result<(), StoreError>;
}
