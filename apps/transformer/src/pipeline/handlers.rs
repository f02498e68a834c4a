use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::UnboundedReceiverStream, Stream, StreamExt};
use tracing::info;
use uuid::Uuid;

use crate::drive::{extract_folder_id, GoogleWorkspaceClient};
use crate::errors::AppError;
use crate::pipeline::context::RunContext;
use crate::pipeline::report::RunReport;
use crate::pipeline::runner::{run_pipeline, Progress};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RunRequest {
    pub job_folder_link: String,
    pub reference_folder_link: String,
    pub output_folder_link: String,
    /// Falls back to the configured key when absent.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Falls back to the configured token when absent.
    #[serde(default)]
    pub google_access_token: Option<String>,
}

/// POST /api/v1/runs
/// Runs to completion and returns the final report.
pub async fn handle_run(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunReport>, AppError> {
    let (ctx, store) = prepare_run(&state, req)?;
    info!("Starting run {}", ctx.run_id);
    let report = run_pipeline(&ctx, &store, state.completion.as_ref(), &Progress::silent()).await;
    Ok(Json(report))
}

/// POST /api/v1/runs/stream
/// Streams progress events as SSE; the last event is `finished`.
pub async fn handle_run_stream(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (ctx, store) = prepare_run(&state, req)?;
    info!("Starting streamed run {}", ctx.run_id);

    let (tx, rx) = mpsc::unbounded_channel();
    let completion = state.completion.clone();
    tokio::spawn(async move {
        let progress = Progress::channel(tx);
        run_pipeline(&ctx, &store, completion.as_ref(), &progress).await;
    });

    let stream = UnboundedReceiverStream::new(rx).filter_map(|event| {
        Event::default()
            .event(event.name())
            .json_data(&event)
            .ok()
            .map(Ok)
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Validates the request and resolves credentials before anything is fetched.
fn prepare_run(
    state: &AppState,
    req: RunRequest,
) -> Result<(RunContext, GoogleWorkspaceClient), AppError> {
    let job_folder_id = folder_id("job_folder_link", &req.job_folder_link)?;
    let reference_folder_id = folder_id("reference_folder_link", &req.reference_folder_link)?;
    let output_folder_id = folder_id("output_folder_link", &req.output_folder_link)?;

    let api_key = non_empty(req.api_key)
        .or_else(|| state.config.openai_api_key.clone())
        .ok_or_else(|| AppError::Validation("api_key is required".to_string()))?;
    let access_token = non_empty(req.google_access_token)
        .or_else(|| state.config.google_access_token.clone())
        .ok_or_else(|| AppError::Validation("google_access_token is required".to_string()))?;

    let ctx = RunContext {
        run_id: Uuid::new_v4(),
        job_folder_id,
        reference_folder_id,
        output_folder_id,
        api_key,
        settings: state.settings.clone(),
    };
    let store = GoogleWorkspaceClient::new(
        state.http.clone(),
        access_token,
        state.config.google.clone(),
    );
    Ok((ctx, store))
}

fn folder_id(field: &str, link: &str) -> Result<String, AppError> {
    let id = extract_folder_id(link);
    if id.is_empty() {
        return Err(AppError::Validation(format!(
            "{field} does not contain a folder id"
        )));
    }
    Ok(id.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
