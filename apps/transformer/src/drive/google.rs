use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::drive::models::{
    BatchUpdate, CreateFile, CreatedFile, DocsRequest, DriveFile, FileList, StructuredDocument,
    GOOGLE_DOC_MIME,
};
use crate::drive::{DocumentStore, StoreError};

pub const DEFAULT_DRIVE_BASE_URL: &str = "https://www.googleapis.com";
pub const DEFAULT_DOCS_BASE_URL: &str = "https://docs.googleapis.com";

const LIST_PAGE_SIZE: &str = "100";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType)";

/// Error reasons Google reports on a 403 when the caller is out of quota
/// rather than out of permission.
const QUOTA_REASONS: &[&str] = &[
    "storageQuotaExceeded",
    "quotaExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "dailyLimitExceeded",
];

#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub drive_base_url: String,
    pub docs_base_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            drive_base_url: DEFAULT_DRIVE_BASE_URL.to_string(),
            docs_base_url: DEFAULT_DOCS_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<GoogleErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    reason: String,
}

/// Drive v3 + Docs v1 REST client authenticated with a caller-supplied
/// OAuth access token. One instance per run.
#[derive(Clone)]
pub struct GoogleWorkspaceClient {
    client: Client,
    access_token: String,
    endpoints: GoogleEndpoints,
}

impl fmt::Debug for GoogleWorkspaceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleWorkspaceClient")
            .field("access_token", &"<redacted>")
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl GoogleWorkspaceClient {
    pub fn new(client: Client, access_token: String, endpoints: GoogleEndpoints) -> Self {
        Self {
            client,
            access_token,
            endpoints,
        }
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.endpoints.drive_base_url)
    }

    fn document_url(&self, document_id: &str) -> String {
        format!("{}/v1/documents/{document_id}", self.endpoints.docs_base_url)
    }

    async fn list_page(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<FileList, StoreError> {
        let query = format!(
            "'{}' in parents and trashed = false",
            folder_id.replace('\'', "\\'")
        );
        let mut params = vec![
            ("q", query.as_str()),
            ("fields", LIST_FIELDS),
            ("pageSize", LIST_PAGE_SIZE),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response = self
            .client
            .get(self.files_url())
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await?;

        let response = check_status(response, folder_id, Access::Read).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DocumentStore for GoogleWorkspaceClient {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveFile>, StoreError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(folder_id, page_token.as_deref()).await?;
            debug!(
                "Listed {} files from folder {folder_id} (more pages: {})",
                page.files.len(),
                page.next_page_token.is_some()
            );
            files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }

    async fn fetch_document(&self, document_id: &str) -> Result<StructuredDocument, StoreError> {
        let response = self
            .client
            .get(self.document_url(document_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let response = check_status(response, document_id, Access::Read).await?;
        Ok(response.json().await?)
    }

    async fn download_file(&self, file_id: &str) -> Result<Bytes, StoreError> {
        let response = self
            .client
            .get(format!("{}/{file_id}", self.files_url()))
            .bearer_auth(&self.access_token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await?;

        let response = check_status(response, file_id, Access::Read).await?;
        Ok(response.bytes().await?)
    }

    async fn create_document(&self, title: &str, folder_id: &str) -> Result<String, StoreError> {
        let body = CreateFile {
            name: title,
            mime_type: GOOGLE_DOC_MIME,
            parents: [folder_id],
        };

        let response = self
            .client
            .post(self.files_url())
            .bearer_auth(&self.access_token)
            .query(&[("supportsAllDrives", "true"), ("fields", "id")])
            .json(&body)
            .send()
            .await?;

        let response = check_status(response, folder_id, Access::Write).await?;
        let created: CreatedFile = response.json().await?;
        Ok(created.id)
    }

    async fn batch_update(
        &self,
        document_id: &str,
        requests: &[DocsRequest],
    ) -> Result<(), StoreError> {
        let response = self
            .client
            .post(format!("{}:batchUpdate", self.document_url(document_id)))
            .bearer_auth(&self.access_token)
            .json(&BatchUpdate { requests })
            .send()
            .await?;

        check_status(response, document_id, Access::Write).await?;
        Ok(())
    }
}

/// Maps a non-2xx Google response onto the store error taxonomy.
async fn check_status(
    response: Response,
    resource: &str,
    access: Access,
) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (message, reasons) = match serde_json::from_str::<GoogleError>(&body) {
        Ok(parsed) => (
            parsed.error.message,
            parsed
                .error
                .errors
                .into_iter()
                .map(|e| e.reason)
                .collect::<Vec<_>>(),
        ),
        Err(_) => (body, Vec::new()),
    };
    let is_quota = status == StatusCode::TOO_MANY_REQUESTS
        || reasons.iter().any(|r| QUOTA_REASONS.contains(&r.as_str()));

    let err = match (status, access) {
        (StatusCode::NOT_FOUND, _) => StoreError::NotFound(format!("{resource}: {message}")),
        (StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS, Access::Write) if is_quota => {
            StoreError::Quota(message)
        }
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, Access::Read) => StoreError::Access {
            resource: resource.to_string(),
            message,
        },
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, Access::Write) => {
            StoreError::Permission(format!("{resource}: {message}"))
        }
        _ => StoreError::Api {
            status: status.as_u16(),
            message,
        },
    };
    Err(err)
}
