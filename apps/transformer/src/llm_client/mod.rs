/// LLM Client: the single point of entry for chat-completion calls.
///
/// ARCHITECTURAL RULE: No other module may call the completion API directly.
/// The pipeline depends on `dyn CompletionService`; `CompletionClient` is the
/// OpenAI-compatible implementation.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

use prompts::{DIVIDER, SYSTEM_ROLE};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
/// Sampling temperature for every completion.
pub const TEMPERATURE: f32 = 0.3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Completion service rejected the API key (status {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Rate limited by completion service: {message}")]
    RateLimited { message: String },

    #[error("Completion service error (status {status}): {message}")]
    Service { status: u16, message: String },

    #[error("Completion request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service accepted the request but the body could not be decoded.
    #[error("Failed to parse completion response: {0}")]
    Parse(String),
}

impl LlmError {
    /// Only transient failures before a response was accepted are retried.
    /// A bad key, a rate limit, a rejected request body or an unreadable
    /// 200 response is reported straight away.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Service { status, .. } => *status >= 500 || *status == 408,
            LlmError::Timeout { .. } | LlmError::Http(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before retry number `attempt` (1-based): base, 2×base, 4×base…
    fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(16))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text of the first choice, if it has any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
}

/// Dispatches a prompt and returns one string per output document.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        model_id: &str,
        api_key: &str,
    ) -> Result<Vec<String>, LlmError>;
}

/// Chat Completions client with bounded retry. One deadline covers every
/// attempt and every backoff of a call.
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(client: Client, base_url: String, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            retry,
            timeout,
        }
    }

    /// Makes one logical completion call, returning the full response object.
    /// Retries service errors and timeouts with exponential backoff.
    pub async fn call(
        &self,
        prompt: &str,
        system: &str,
        model: &str,
        api_key: &str,
    ) -> Result<ChatResponse, LlmError> {
        let request_body = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
        };
        let max_attempts = self.retry.max_attempts.max(1);

        let attempts = async {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match self.send_once(&request_body, api_key).await {
                    Ok(response) => return Ok(response),
                    Err(e) if e.is_retryable() && attempt < max_attempts => {
                        let delay = self.retry.delay_before(attempt);
                        warn!(
                            "Completion attempt {attempt}/{max_attempts} failed ({e}), \
                             retrying after {}ms...",
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        tokio::time::timeout(self.timeout, attempts)
            .await
            .map_err(|_| LlmError::Timeout {
                secs: self.timeout.as_secs(),
            })?
    }

    async fn send_once(
        &self,
        request_body: &ChatRequest<'_>,
        api_key: &str,
    ) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(request_body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Auth {
                    status: status.as_u16(),
                    message,
                },
                StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited { message },
                _ => LlmError::Service {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        let chat: ChatResponse =
            serde_json::from_slice(&body).map_err(|e| LlmError::Parse(e.to_string()))?;
        if let Some(usage) = &chat.usage {
            debug!(
                "Completion succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
        Ok(chat)
    }

    fn transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            LlmError::Http(e)
        }
    }
}

#[async_trait]
impl CompletionService for CompletionClient {
    async fn complete(
        &self,
        prompt: &str,
        model_id: &str,
        api_key: &str,
    ) -> Result<Vec<String>, LlmError> {
        let response = self.call(prompt, SYSTEM_ROLE, model_id, api_key).await?;
        let text = response.text().ok_or_else(|| LlmError::Service {
            status: StatusCode::OK.as_u16(),
            message: "response contained no content".to_string(),
        })?;
        Ok(split_sections(text))
    }
}

/// Splits a multi-document completion on the literal divider and trims each
/// piece. Empty pieces (e.g. after a trailing divider) are kept.
pub fn split_sections(text: &str) -> Vec<String> {
    text.split(DIVIDER).map(|s| s.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CompletionClient {
        CompletionClient::new(
            Client::new(),
            server.uri(),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(5),
            },
            Duration::from_secs(5),
        )
    }

    fn completion_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": text}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        })
    }

    #[test]
    fn test_split_sections_trims_each_piece() {
        assert_eq!(
            split_sections("A[DIVIDER]B[DIVIDER]C"),
            vec!["A", "B", "C"]
        );
        assert_eq!(
            split_sections("  Analyst\nbody \n[DIVIDER]\n Engineer  "),
            vec!["Analyst\nbody", "Engineer"]
        );
    }

    #[test]
    fn test_split_sections_keeps_trailing_empty_piece() {
        assert_eq!(split_sections("A[DIVIDER]B[DIVIDER]\n"), vec!["A", "B", ""]);
    }

    #[test]
    fn test_split_sections_without_divider_is_single_section() {
        assert_eq!(split_sections("only one"), vec!["only one"]);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::from_secs(1));
        assert_eq!(policy.delay_before(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_complete_sends_system_role_and_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "temperature": 0.3,
                "messages": [
                    {"role": "system", "content": SYSTEM_ROLE},
                    {"role": "user", "content": "PROMPT"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
                "Analyst\nDo AI[DIVIDER]Engineer\nShip AI",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let sections = client_for(&server)
            .complete("PROMPT", "gpt-4o-mini", "sk-test")
            .await
            .unwrap();
        assert_eq!(sections, vec!["Analyst\nDo AI", "Engineer\nShip AI"]);
    }

    #[tokio::test]
    async fn test_bad_key_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Incorrect API key provided"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete("p", "gpt-4o-mini", "bad")
            .await
            .unwrap_err();
        match err {
            LlmError::Auth { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_is_reported_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete("p", "gpt-4o-mini", "k")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_service_errors_are_retried_up_to_bound() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete("p", "gpt-4o-mini", "k")
            .await
            .unwrap_err();
        assert!(
            matches!(err, LlmError::Service { status: 503, .. }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_service_error_then_success_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Done")))
            .mount(&server)
            .await;

        let sections = client_for(&server)
            .complete("p", "gpt-4o-mini", "k")
            .await
            .unwrap();
        assert_eq!(sections, vec!["Done"]);
    }

    #[tokio::test]
    async fn test_empty_content_is_a_service_error_without_resend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("   ")))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete("p", "gpt-4o-mini", "k")
            .await
            .unwrap_err();
        assert!(
            matches!(err, LlmError::Service { status: 200, .. }),
            "got {err:?}"
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_undecodable_success_body_is_not_resent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete("p", "gpt-4o-mini", "k")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_deadline_bounds_all_attempts_and_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body("late"))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        let client = CompletionClient::new(
            Client::new(),
            server.uri(),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(500),
            },
            Duration::from_secs(1),
        );

        let started = std::time::Instant::now();
        let err = client
            .complete("p", "gpt-4o-mini", "k")
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, LlmError::Timeout { secs: 1 }), "got {err:?}");
        assert!(elapsed < Duration::from_millis(1800), "took {elapsed:?}");
    }
}
