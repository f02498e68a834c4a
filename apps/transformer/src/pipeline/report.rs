//! Run outcome and progress events.
//!
//! Every run ends in exactly one of three states: all sections written,
//! some writes failed (failures listed), or aborted with a reason.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::output::OutputDocument;

pub const REMOVE_DOCUMENTS_HINT: &str =
    "Temporarily remove job description documents to reduce the prompt size, then run again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderRole {
    References,
    JobDescriptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub folder: FolderRole,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedWrite {
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    ListingFailed { folder: FolderRole, message: String },
    NoJobDescriptions,
    TokenizerUnavailable { model: String, message: String },
    TokenLimitExceeded { tokens: usize, limit: usize, hint: String },
    InvalidApiKey { message: String },
    CompletionFailed { message: String },
    EmptyCompletion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    PartiallySucceeded,
    Aborted {
        reason: AbortReason,
        /// Whether the completion request had already been sent.
        dispatched: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub message: String,
    pub prompt_tokens: Option<usize>,
    pub written: Vec<OutputDocument>,
    pub skipped: Vec<SkippedDocument>,
    pub failed_writes: Vec<FailedWrite>,
}

impl RunStatus {
    /// User-facing summary of the outcome.
    pub fn message(&self, written: usize, failed: usize) -> String {
        match self {
            RunStatus::Succeeded => format!("Automation completed: {written} documents written."),
            RunStatus::PartiallySucceeded => format!(
                "Automation partially completed: {written} documents written, {failed} failed."
            ),
            RunStatus::Aborted { reason, .. } => match reason {
                AbortReason::ListingFailed { folder, message } => {
                    let folder = match folder {
                        FolderRole::References => "reference material",
                        FolderRole::JobDescriptions => "job description",
                    };
                    format!("Could not read the {folder} folder: {message}")
                }
                AbortReason::NoJobDescriptions => {
                    "No readable job descriptions were found; nothing was sent.".to_string()
                }
                AbortReason::TokenizerUnavailable { model, .. } => {
                    format!("No tokenizer is available for model '{model}'; nothing was sent.")
                }
                AbortReason::TokenLimitExceeded {
                    tokens,
                    limit,
                    hint,
                } => format!("Token limit exceeded ({tokens} > {limit}). {hint}"),
                AbortReason::InvalidApiKey { .. } => {
                    "The completion service rejected the API key. Check the key and try again."
                        .to_string()
                }
                AbortReason::CompletionFailed { message } => {
                    format!("The completion request failed: {message}")
                }
                AbortReason::EmptyCompletion => {
                    "The completion contained no job descriptions to write.".to_string()
                }
            },
        }
    }
}

/// Progress signal emitted while a run executes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Listed {
        folder: FolderRole,
        documents: usize,
    },
    Extracted {
        folder: FolderRole,
        name: String,
    },
    Skipped(SkippedDocument),
    PromptAssembled {
        references: usize,
        job_descriptions: usize,
    },
    BudgetChecked {
        tokens: usize,
        limit: usize,
    },
    Dispatched {
        model: String,
    },
    CompletionReceived {
        sections: usize,
    },
    Written {
        title: String,
        document_id: String,
    },
    WriteFailed(FailedWrite),
    Finished(Box<RunReport>),
}

impl RunEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::Listed { .. } => "listed",
            RunEvent::Extracted { .. } => "extracted",
            RunEvent::Skipped(_) => "skipped",
            RunEvent::PromptAssembled { .. } => "prompt_assembled",
            RunEvent::BudgetChecked { .. } => "budget_checked",
            RunEvent::Dispatched { .. } => "dispatched",
            RunEvent::CompletionReceived { .. } => "completion_received",
            RunEvent::Written { .. } => "written",
            RunEvent::WriteFailed(_) => "write_failed",
            RunEvent::Finished(_) => "finished",
        }
    }
}
