//! Text extraction: turns a listed document into plain text.
//!
//! Structured documents are walked run by run; PDFs are materialised into a
//! temporary file that lives only for the duration of the call.

use std::io::Write;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::drive::models::StructuralElement;
use crate::drive::{DocumentFormat, DocumentRef, DocumentStore, StoreError};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("'{name}' has unsupported type '{mime_type}'")]
    UnsupportedFormat { name: String, mime_type: String },

    #[error("Failed to fetch '{name}': {source}")]
    Fetch {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to read PDF '{name}': {message}")]
    Pdf { name: String, message: String },

    #[error("Temporary file error for '{name}': {source}")]
    TempFile {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{name}' contains no extractable text")]
    Empty { name: String },
}

#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub source: DocumentRef,
    pub raw_text: String,
}

pub struct TextExtractor<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> TextExtractor<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    pub async fn extract(&self, doc: &DocumentRef) -> Result<ExtractedText, ExtractionError> {
        let raw_text = match &doc.format {
            DocumentFormat::Structured => self.extract_structured(doc).await?,
            DocumentFormat::Portable => self.extract_portable(doc).await?,
            DocumentFormat::Unrecognized(mime_type) => {
                return Err(ExtractionError::UnsupportedFormat {
                    name: doc.name.clone(),
                    mime_type: mime_type.clone(),
                })
            }
        };

        if raw_text.trim().is_empty() {
            return Err(ExtractionError::Empty {
                name: doc.name.clone(),
            });
        }

        debug!("Extracted {} chars from '{}'", raw_text.len(), doc.name);
        Ok(ExtractedText {
            source: doc.clone(),
            raw_text,
        })
    }

    async fn extract_structured(&self, doc: &DocumentRef) -> Result<String, ExtractionError> {
        let tree = self
            .store
            .fetch_document(&doc.id)
            .await
            .map_err(|source| ExtractionError::Fetch {
                name: doc.name.clone(),
                source,
            })?;

        let mut text = String::new();
        collect_runs(&tree.body.content, &mut text);
        debug!("Walked '{}' ({} elements)", tree.title, tree.body.content.len());
        Ok(text)
    }

    async fn extract_portable(&self, doc: &DocumentRef) -> Result<String, ExtractionError> {
        let bytes = self
            .store
            .download_file(&doc.id)
            .await
            .map_err(|source| ExtractionError::Fetch {
                name: doc.name.clone(),
                source,
            })?;

        // pdf-extract can panic on malformed input; the blocking task
        // contains it and the JoinError becomes an extraction failure.
        let name = doc.name.clone();
        tokio::task::spawn_blocking(move || extract_pdf_pages(&bytes, &name))
            .await
            .map_err(|e| ExtractionError::Pdf {
                name: doc.name.clone(),
                message: e.to_string(),
            })?
    }
}

/// Appends the literal text of every run, in document order.
fn collect_runs(elements: &[StructuralElement], out: &mut String) {
    for element in elements {
        if let Some(paragraph) = &element.paragraph {
            for run in paragraph.elements.iter().filter_map(|e| e.text_run.as_ref()) {
                out.push_str(&run.content);
            }
        }
        if let Some(table) = &element.table {
            for cell in table.table_rows.iter().flat_map(|row| &row.table_cells) {
                collect_runs(&cell.content, out);
            }
        }
        if let Some(toc) = &element.table_of_contents {
            collect_runs(&toc.content, out);
        }
    }
}

fn extract_pdf_pages(bytes: &[u8], name: &str) -> Result<String, ExtractionError> {
    extract_pdf_pages_in(&std::env::temp_dir(), bytes, name)
}

fn extract_pdf_pages_in(dir: &Path, bytes: &[u8], name: &str) -> Result<String, ExtractionError> {
    let temp_err = |source| ExtractionError::TempFile {
        name: name.to_string(),
        source,
    };

    // Removed from disk when `file` drops at the end of this function.
    let mut file = tempfile::Builder::new()
        .prefix("transformer-")
        .suffix(".pdf")
        .tempfile_in(dir)
        .map_err(temp_err)?;
    file.write_all(bytes).map_err(temp_err)?;
    file.flush().map_err(temp_err)?;

    let pages =
        pdf_extract::extract_text_by_pages(file.path()).map_err(|e| ExtractionError::Pdf {
            name: name.to_string(),
            message: e.to_string(),
        })?;

    Ok(join_pages(pages))
}

/// Joins page texts with newlines, dropping pages with no text (image-only).
fn join_pages(pages: Vec<String>) -> String {
    pages
        .into_iter()
        .filter(|page| !page.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
