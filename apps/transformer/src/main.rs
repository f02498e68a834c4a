mod config;
mod drive;
mod errors;
mod ingest;
mod llm_client;
mod output;
mod pipeline;
mod prompt;
mod routes;
mod state;

#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::{CompletionClient, RetryPolicy};
use crate::pipeline::PipelineSettings;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JD Transformer v{}", env!("CARGO_PKG_VERSION"));

    // One connection pool for Drive, Docs and the completion service
    let http = reqwest::Client::new();

    let completion = CompletionClient::new(
        http.clone(),
        config.openai_base_url.clone(),
        RetryPolicy {
            max_attempts: config.completion_max_attempts.max(1),
            ..RetryPolicy::default()
        },
        Duration::from_secs(config.completion_timeout_secs),
    );
    info!(
        "Completion client initialized (model: {}, input limit: {} tokens)",
        config.completion_model, config.input_token_limit
    );

    let settings = PipelineSettings::from_config(&config)?;
    info!(
        "Pipeline: footer page total {}, font {:?}, extract x{}, write x{}",
        config.footer_page_total,
        settings.output_font,
        settings.extract_concurrency,
        settings.write_concurrency
    );

    let state = AppState {
        config: config.clone(),
        http,
        completion: Arc::new(completion),
        settings: Arc::new(settings),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
