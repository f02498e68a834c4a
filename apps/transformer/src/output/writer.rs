use serde::Serialize;
use tracing::info;

use crate::drive::{DocumentStore, StoreError};
use crate::output::formatter::format_document;

/// A document created in the destination folder.
#[derive(Debug, Clone, Serialize)]
pub struct OutputDocument {
    pub id: String,
    pub title: String,
    pub body: String,
    pub target_folder: String,
}

/// Creates one output document in `target_folder` and fills it with `text`.
///
/// Quota and permission failures are returned to the caller, which decides
/// whether the rest of the batch continues.
pub async fn write_output(
    store: &dyn DocumentStore,
    text: &str,
    target_folder: &str,
    font: Option<&str>,
) -> Result<OutputDocument, StoreError> {
    let formatted = format_document(text, font);

    let id = store
        .create_document(&formatted.title, target_folder)
        .await?;
    if !formatted.requests.is_empty() {
        store.batch_update(&id, &formatted.requests).await?;
    }

    info!("Wrote '{}' as document {id}", formatted.title);
    Ok(OutputDocument {
        id,
        title: formatted.title,
        body: formatted.body,
        target_folder: target_folder.to_string(),
    })
}
