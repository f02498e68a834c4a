//! In-memory doubles for the store and completion seams, shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::Config;
use crate::drive::models::{
    DocsRequest, DriveFile, StructuredDocument, GOOGLE_DOC_MIME, PDF_MIME,
};
use crate::drive::{DocumentStore, GoogleEndpoints, StoreError};
use crate::ingest::PageTotal;
use crate::llm_client::{split_sections, CompletionService, LlmError};
use crate::pipeline::PipelineSettings;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct CreatedDocument {
    pub id: String,
    pub title: String,
    pub folder_id: String,
    pub requests: Vec<DocsRequest>,
}

impl CreatedDocument {
    pub fn inserted_text(&self) -> String {
        self.requests
            .iter()
            .filter_map(|r| match r {
                DocsRequest::InsertText(insert) => Some(insert.text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Default)]
pub struct FakeStore {
    folders: HashMap<String, Vec<DriveFile>>,
    documents: HashMap<String, StructuredDocument>,
    files: HashMap<String, Bytes>,
    quota_exhausted_titles: HashSet<String>,
    created: Mutex<Vec<CreatedDocument>>,
    next_id: AtomicUsize,
}

impl FakeStore {
    pub fn with_folder(mut self, folder_id: &str) -> Self {
        self.folders.entry(folder_id.to_string()).or_default();
        self
    }

    pub fn with_file(mut self, folder_id: &str, id: &str, name: &str, mime_type: &str) -> Self {
        self.folders
            .entry(folder_id.to_string())
            .or_default()
            .push(DriveFile {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: mime_type.to_string(),
            });
        self
    }

    /// Adds a Google Doc whose body is one paragraph per line of `text`.
    pub fn with_document(self, folder_id: &str, id: &str, name: &str, text: &str) -> Self {
        let content: Vec<_> = text
            .lines()
            .map(|line| {
                serde_json::json!({
                    "paragraph": {"elements": [{"textRun": {"content": format!("{line}\n")}}]}
                })
            })
            .collect();
        let doc: StructuredDocument = serde_json::from_value(serde_json::json!({
            "title": name,
            "body": {"content": content}
        }))
        .expect("fixture document is valid");

        let mut store = self.with_file(folder_id, id, name, GOOGLE_DOC_MIME);
        store.documents.insert(id.to_string(), doc);
        store
    }

    pub fn with_pdf(self, folder_id: &str, id: &str, name: &str, bytes: &[u8]) -> Self {
        let mut store = self.with_file(folder_id, id, name, PDF_MIME);
        store
            .files
            .insert(id.to_string(), Bytes::copy_from_slice(bytes));
        store
    }

    /// Creating a document with this title fails with a quota error.
    pub fn with_quota_exhausted_for(mut self, title: &str) -> Self {
        self.quota_exhausted_titles.insert(title.to_string());
        self
    }

    pub fn created(&self) -> Vec<CreatedDocument> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveFile>, StoreError> {
        self.folders
            .get(folder_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(folder_id.to_string()))
    }

    async fn fetch_document(&self, document_id: &str) -> Result<StructuredDocument, StoreError> {
        self.documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(document_id.to_string()))
    }

    async fn download_file(&self, file_id: &str) -> Result<Bytes, StoreError> {
        self.files
            .get(file_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(file_id.to_string()))
    }

    async fn create_document(&self, title: &str, folder_id: &str) -> Result<String, StoreError> {
        if self.quota_exhausted_titles.contains(title) {
            return Err(StoreError::Quota(format!("cannot create '{title}'")));
        }
        let id = format!("out-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.created.lock().unwrap().push(CreatedDocument {
            id: id.clone(),
            title: title.to_string(),
            folder_id: folder_id.to_string(),
            requests: Vec::new(),
        });
        Ok(id)
    }

    async fn batch_update(
        &self,
        document_id: &str,
        requests: &[DocsRequest],
    ) -> Result<(), StoreError> {
        let mut created = self.created.lock().unwrap();
        let doc = created
            .iter_mut()
            .find(|d| d.id == document_id)
            .ok_or_else(|| StoreError::NotFound(document_id.to_string()))?;
        doc.requests.extend_from_slice(requests);
        Ok(())
    }
}

/// Completion double that records prompts and replies with a canned response.
pub struct FakeCompletion {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails as if the API key were rejected.
    pub fn rejecting_key() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionService for FakeCompletion {
    async fn complete(
        &self,
        prompt: &str,
        _model_id: &str,
        _api_key: &str,
    ) -> Result<Vec<String>, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Some(reply) => Ok(split_sections(reply)),
            None => Err(LlmError::Auth {
                status: 401,
                message: "Incorrect API key provided".to_string(),
            }),
        }
    }
}

/// App state wired to `completion`, with every optional credential unset.
pub fn test_state(completion: FakeCompletion) -> AppState {
    let config = Config {
        port: 0,
        rust_log: "info".to_string(),
        openai_api_key: None,
        google_access_token: None,
        openai_base_url: "http://127.0.0.1:1".to_string(),
        google: GoogleEndpoints::default(),
        completion_model: "gpt-4o-mini-2024-07-18".to_string(),
        input_token_limit: 128_000,
        prompt_instruction: "Transform.".to_string(),
        output_font: None,
        footer_page_total: PageTotal::default(),
        extract_concurrency: 1,
        write_concurrency: 1,
        completion_timeout_secs: 1,
        completion_max_attempts: 1,
        drop_empty_sections: false,
    };
    let settings = PipelineSettings::from_config(&config).expect("valid footer pattern");
    AppState {
        config,
        http: reqwest::Client::new(),
        completion: Arc::new(completion),
        settings: Arc::new(settings),
    }
}

/// A valid two-page PDF with one line of Helvetica text per page.
pub fn two_page_pdf(first: &str, second: &str) -> Vec<u8> {
    let stream = |text: &str| {
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len())
    };
    let page = |contents: u32| {
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 7 0 R >> >> /Contents {contents} 0 R >>"
        )
    };
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>".to_string(),
        page(5),
        page(6),
        stream(first),
        stream(second),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref_at = pdf.len();
    let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        tail.push_str(&format!("{offset:010} 00000 n \n"));
    }
    tail.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
        objects.len() + 1
    ));
    pdf.extend_from_slice(tail.as_bytes());
    pdf
}
