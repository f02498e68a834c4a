//! Token budget: counts prompt tokens with the completion model's own
//! tokenizer and enforces the input ceiling before any money is spent.

use serde::Serialize;
use thiserror::Error;
use tiktoken_rs::CoreBPE;

#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("No tokenizer available for model '{model}': {message}")]
    TokenizerUnavailable { model: String, message: String },

    #[error("Token counting task failed: {0}")]
    Task(String),
}

/// Result of counting a prompt against a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetCheck {
    pub tokens: usize,
    pub limit: usize,
}

impl BudgetCheck {
    /// Inclusive: a prompt of exactly `limit` tokens fits.
    pub fn within_limit(&self) -> bool {
        self.tokens <= self.limit
    }
}

pub struct TokenBudget {
    bpe: CoreBPE,
}

impl TokenBudget {
    /// Loads the exact tokenizer for `model`. Never falls back to an
    /// approximation.
    pub fn for_model(model: &str) -> Result<Self, BudgetError> {
        let bpe = tiktoken_rs::get_bpe_from_model(model).map_err(|e| {
            BudgetError::TokenizerUnavailable {
                model: model.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self { bpe })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    pub fn check(&self, text: &str, limit: usize) -> BudgetCheck {
        BudgetCheck {
            tokens: self.count(text),
            limit,
        }
    }
}

/// Loads the tokenizer and counts `text` on the blocking pool; both steps
/// are CPU-bound and a full prompt can run to hundreds of kilobytes.
pub async fn check_blocking(
    model: String,
    text: String,
    limit: usize,
) -> Result<BudgetCheck, BudgetError> {
    tokio::task::spawn_blocking(move || {
        TokenBudget::for_model(&model).map(|budget| budget.check(&text, limit))
    })
    .await
    .map_err(|e| BudgetError::Task(e.to_string()))?
}
