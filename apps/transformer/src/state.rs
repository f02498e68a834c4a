use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::CompletionService;
use crate::pipeline::PipelineSettings;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Shared connection pool; each run wraps it with its own access token.
    pub http: reqwest::Client,
    pub completion: Arc<dyn CompletionService>,
    pub settings: Arc<PipelineSettings>,
}
