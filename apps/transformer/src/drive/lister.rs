use tracing::{debug, info};

use crate::drive::models::{DocumentFormat, DocumentRef, FOLDER_MIME};
use crate::drive::{DocumentStore, StoreError};

/// Lists the documents directly inside `folder_id`, in store order.
///
/// Sub-folders are dropped (no recursion). Files of an unsupported type are
/// kept as `DocumentFormat::Unrecognized` so they surface as skipped later.
pub async fn list_documents(
    store: &dyn DocumentStore,
    folder_id: &str,
) -> Result<Vec<DocumentRef>, StoreError> {
    let children = store.list_children(folder_id).await?;

    let documents: Vec<DocumentRef> = children
        .into_iter()
        .filter(|file| {
            let is_folder = file.mime_type == FOLDER_MIME;
            if is_folder {
                debug!("Skipping sub-folder '{}' in {folder_id}", file.name);
            }
            !is_folder
        })
        .map(|file| DocumentRef {
            format: DocumentFormat::from_mime(&file.mime_type),
            id: file.id,
            name: file.name,
        })
        .collect();

    info!("Folder {folder_id}: {} documents", documents.len());
    Ok(documents)
}
