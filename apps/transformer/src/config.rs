use std::str::FromStr;

use anyhow::{Context, Result};

use crate::drive::google::{DEFAULT_DOCS_BASE_URL, DEFAULT_DRIVE_BASE_URL};
use crate::drive::GoogleEndpoints;
use crate::ingest::PageTotal;
use crate::llm_client::DEFAULT_OPENAI_BASE_URL;
use crate::prompt::DEFAULT_INSTRUCTION;

/// Application configuration loaded from environment variables (and `.env`).
/// Fails at startup if a value is present but malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Fallback key when a run request does not carry one.
    pub openai_api_key: Option<String>,
    /// Fallback token when a run request does not carry one.
    pub google_access_token: Option<String>,
    pub openai_base_url: String,
    pub google: GoogleEndpoints,
    pub completion_model: String,
    pub input_token_limit: usize,
    pub prompt_instruction: String,
    /// Font applied to generated documents; `None` leaves the default.
    pub output_font: Option<String>,
    pub footer_page_total: PageTotal,
    pub extract_concurrency: usize,
    pub write_concurrency: usize,
    pub completion_timeout_secs: u64,
    pub completion_max_attempts: u32,
    pub drop_empty_sections: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let prompt_instruction = match optional_env("PROMPT_INSTRUCTION_PATH") {
            Some(path) => std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt instruction from '{path}'"))?,
            None => DEFAULT_INSTRUCTION.to_string(),
        };

        Ok(Config {
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            openai_api_key: read_api_key()?,
            google_access_token: optional_env("GOOGLE_ACCESS_TOKEN"),
            openai_base_url: optional_env("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            google: GoogleEndpoints {
                drive_base_url: optional_env("GOOGLE_DRIVE_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_DRIVE_BASE_URL.to_string()),
                docs_base_url: optional_env("GOOGLE_DOCS_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_DOCS_BASE_URL.to_string()),
            },
            completion_model: optional_env("COMPLETION_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini-2024-07-18".to_string()),
            input_token_limit: parse_env("INPUT_TOKEN_LIMIT", 128_000)?,
            prompt_instruction,
            // Set but empty disables the font; unset keeps the default.
            output_font: match std::env::var("OUTPUT_FONT") {
                Ok(font) if font.trim().is_empty() => None,
                Ok(font) => Some(font.trim().to_string()),
                Err(_) => Some("Raleway".to_string()),
            },
            footer_page_total: parse_env("FOOTER_PAGE_TOTAL", PageTotal::default())?,
            extract_concurrency: parse_env("EXTRACT_CONCURRENCY", 4)?,
            write_concurrency: parse_env("WRITE_CONCURRENCY", 4)?,
            completion_timeout_secs: parse_env("COMPLETION_TIMEOUT_SECS", 120)?,
            completion_max_attempts: parse_env("COMPLETION_MAX_ATTEMPTS", 3)?,
            drop_empty_sections: parse_env("DROP_EMPTY_SECTIONS", false)?,
        })
    }
}

/// `OPENAI_API_KEY` wins; otherwise the trimmed contents of `OPENAI_API_KEY_FILE`.
fn read_api_key() -> Result<Option<String>> {
    if let Some(key) = optional_env("OPENAI_API_KEY") {
        return Ok(Some(key));
    }
    match optional_env("OPENAI_API_KEY_FILE") {
        Some(path) => {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read API key file '{path}'"))?;
            let key = contents.trim();
            Ok((!key.is_empty()).then(|| key.to_string()))
        }
        None => Ok(None),
    }
}

/// Non-empty value of `key`, if set.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has invalid value '{raw}': {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_uses_default_when_unset() {
        let value: usize = parse_env("TRANSFORMER_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_env_rejects_malformed_value() {
        std::env::set_var("TRANSFORMER_TEST_BAD_LIMIT", "lots");
        let result: Result<usize> = parse_env("TRANSFORMER_TEST_BAD_LIMIT", 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_env_reads_page_total() {
        std::env::set_var("TRANSFORMER_TEST_PAGE_TOTAL", "any");
        let total: PageTotal =
            parse_env("TRANSFORMER_TEST_PAGE_TOTAL", PageTotal::default()).unwrap();
        assert_eq!(total, PageTotal::Any);
    }
}
