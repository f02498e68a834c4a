//! Run orchestration.
//!
//! Flow: list + extract + clean (both folders) → assemble → token budget →
//!       complete → split → write each section.
//!
//! Nothing is sent to the completion service unless the prompt fits the
//! budget. After dispatch, write failures are isolated per section.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::drive::{list_documents, DocumentStore, StoreError};
use crate::ingest::{CleanedText, FooterCleaner, TextExtractor};
use crate::llm_client::{CompletionService, LlmError};
use crate::output::{write_output, OutputDocument};
use crate::pipeline::context::RunContext;
use crate::pipeline::report::{
    AbortReason, FailedWrite, FolderRole, RunEvent, RunReport, RunStatus, SkippedDocument,
    REMOVE_DOCUMENTS_HINT,
};
use crate::prompt::{assemble, check_blocking};

/// Progress sink. A run without a listener uses `Progress::silent()`.
#[derive(Clone, Default)]
pub struct Progress {
    tx: Option<UnboundedSender<RunEvent>>,
}

impl Progress {
    pub fn silent() -> Self {
        Self { tx: None }
    }

    pub fn channel(tx: UnboundedSender<RunEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            // A listener that went away does not stop the run.
            let _ = tx.send(event);
        }
    }
}

#[derive(Default)]
struct RunLedger {
    prompt_tokens: Option<usize>,
    written: Vec<OutputDocument>,
    skipped: Vec<SkippedDocument>,
    failed_writes: Vec<FailedWrite>,
}

struct FolderText {
    texts: Vec<CleanedText>,
    skipped: Vec<SkippedDocument>,
}

/// Runs the whole pipeline once and always returns a terminal report.
pub async fn run_pipeline(
    ctx: &RunContext,
    store: &dyn DocumentStore,
    completion: &dyn CompletionService,
    progress: &Progress,
) -> RunReport {
    let started_at = Utc::now();
    let mut ledger = RunLedger::default();

    let status = execute(ctx, store, completion, progress, &mut ledger).await;
    let message = status.message(ledger.written.len(), ledger.failed_writes.len());

    match &status {
        RunStatus::Succeeded => info!("Run {} succeeded: {message}", ctx.run_id),
        RunStatus::PartiallySucceeded => warn!("Run {} partial: {message}", ctx.run_id),
        RunStatus::Aborted { dispatched, .. } => warn!(
            "Run {} aborted (dispatched={dispatched}): {message}",
            ctx.run_id
        ),
    }

    let report = RunReport {
        run_id: ctx.run_id,
        started_at,
        finished_at: Utc::now(),
        status,
        message,
        prompt_tokens: ledger.prompt_tokens,
        written: ledger.written,
        skipped: ledger.skipped,
        failed_writes: ledger.failed_writes,
    };
    progress.emit(RunEvent::Finished(Box::new(report.clone())));
    report
}

fn aborted(reason: AbortReason, dispatched: bool) -> RunStatus {
    RunStatus::Aborted { reason, dispatched }
}

fn listing_failed(folder: FolderRole, e: StoreError) -> RunStatus {
    aborted(
        AbortReason::ListingFailed {
            folder,
            message: e.to_string(),
        },
        false,
    )
}

async fn execute(
    ctx: &RunContext,
    store: &dyn DocumentStore,
    completion: &dyn CompletionService,
    progress: &Progress,
    ledger: &mut RunLedger,
) -> RunStatus {
    let settings = &ctx.settings;

    // Step 1: list, extract and clean both folders
    let (references, jobs) = tokio::join!(
        collect_folder(
            store,
            &ctx.reference_folder_id,
            FolderRole::References,
            settings.extract_concurrency,
            &settings.footer,
            progress,
        ),
        collect_folder(
            store,
            &ctx.job_folder_id,
            FolderRole::JobDescriptions,
            settings.extract_concurrency,
            &settings.footer,
            progress,
        ),
    );
    let references = match references {
        Ok(folder) => folder,
        Err(e) => return listing_failed(FolderRole::References, e),
    };
    let jobs = match jobs {
        Ok(folder) => folder,
        Err(e) => return listing_failed(FolderRole::JobDescriptions, e),
    };
    ledger.skipped.extend(references.skipped);
    ledger.skipped.extend(jobs.skipped);
    let (references, jobs) = (references.texts, jobs.texts);

    if jobs.is_empty() {
        return aborted(AbortReason::NoJobDescriptions, false);
    }

    // Step 2: assemble
    let reference_texts: Vec<&str> = references.iter().map(|t| t.text.as_str()).collect();
    let job_texts: Vec<&str> = jobs.iter().map(|t| t.text.as_str()).collect();
    let prompt = assemble(&reference_texts, &job_texts, &settings.instruction);
    info!(
        "Run {}: prompt assembled from {} references and {} job descriptions ({} chars)",
        ctx.run_id,
        references.len(),
        jobs.len(),
        prompt.len()
    );
    progress.emit(RunEvent::PromptAssembled {
        references: references.len(),
        job_descriptions: jobs.len(),
    });

    // Step 3: token budget, before any money is spent
    let check = match check_blocking(
        settings.model.clone(),
        prompt.clone(),
        settings.input_token_limit,
    )
    .await
    {
        Ok(check) => check,
        Err(e) => {
            return aborted(
                AbortReason::TokenizerUnavailable {
                    model: settings.model.clone(),
                    message: e.to_string(),
                },
                false,
            )
        }
    };
    ledger.prompt_tokens = Some(check.tokens);
    progress.emit(RunEvent::BudgetChecked {
        tokens: check.tokens,
        limit: check.limit,
    });
    if !check.within_limit() {
        return aborted(
            AbortReason::TokenLimitExceeded {
                tokens: check.tokens,
                limit: check.limit,
                hint: REMOVE_DOCUMENTS_HINT.to_string(),
            },
            false,
        );
    }

    // Step 4: one completion call
    info!(
        "Run {}: dispatching {} tokens to {}",
        ctx.run_id, check.tokens, settings.model
    );
    progress.emit(RunEvent::Dispatched {
        model: settings.model.clone(),
    });
    let mut sections = match completion
        .complete(&prompt, &settings.model, &ctx.api_key)
        .await
    {
        Ok(sections) => sections,
        Err(LlmError::Auth { message, .. }) => {
            return aborted(AbortReason::InvalidApiKey { message }, true)
        }
        Err(e) => {
            return aborted(
                AbortReason::CompletionFailed {
                    message: e.to_string(),
                },
                true,
            )
        }
    };

    let empty = sections.iter().filter(|s| s.is_empty()).count();
    if empty > 0 {
        if settings.drop_empty_sections {
            sections.retain(|s| !s.is_empty());
            info!("Run {}: dropped {empty} empty sections", ctx.run_id);
        } else {
            warn!(
                "Run {}: completion contains {empty} empty sections; writing them as-is",
                ctx.run_id
            );
        }
    }
    if sections.is_empty() {
        return aborted(AbortReason::EmptyCompletion, true);
    }
    progress.emit(RunEvent::CompletionReceived {
        sections: sections.len(),
    });

    // Step 5: write every section; one failure never stops the others
    write_sections(ctx, store, sections, progress, ledger).await;

    if ledger.failed_writes.is_empty() {
        RunStatus::Succeeded
    } else {
        RunStatus::PartiallySucceeded
    }
}

/// Lists a folder and extracts every document with bounded concurrency.
/// Listing errors are returned; extraction errors become skipped entries.
/// Texts keep listing order.
async fn collect_folder(
    store: &dyn DocumentStore,
    folder_id: &str,
    role: FolderRole,
    concurrency: usize,
    cleaner: &FooterCleaner,
    progress: &Progress,
) -> Result<FolderText, StoreError> {
    let documents = list_documents(store, folder_id).await?;
    progress.emit(RunEvent::Listed {
        folder: role,
        documents: documents.len(),
    });

    let extractor = TextExtractor::new(store);
    let extractor = &extractor;
    let results: Vec<_> = stream::iter(documents)
        .map(|doc| async move {
            let result = extractor.extract(&doc).await;
            (doc, result)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut folder = FolderText {
        texts: Vec::with_capacity(results.len()),
        skipped: Vec::new(),
    };
    for (doc, result) in results {
        match result {
            Ok(extracted) => {
                let cleaned = extracted.clean(cleaner);
                progress.emit(RunEvent::Extracted {
                    folder: role,
                    name: cleaned.source.name.clone(),
                });
                folder.texts.push(cleaned);
            }
            Err(e) => {
                warn!("Skipping '{}' ({:?}): {e}", doc.name, role);
                let skipped = SkippedDocument {
                    folder: role,
                    name: doc.name,
                    reason: e.to_string(),
                };
                progress.emit(RunEvent::Skipped(skipped.clone()));
                folder.skipped.push(skipped);
            }
        }
    }
    Ok(folder)
}

async fn write_sections(
    ctx: &RunContext,
    store: &dyn DocumentStore,
    sections: Vec<String>,
    progress: &Progress,
    ledger: &mut RunLedger,
) {
    let font = ctx.settings.output_font.as_deref();
    let folder = ctx.output_folder_id.as_str();

    let mut outcomes: Vec<_> = stream::iter(sections.into_iter().enumerate())
        .map(|(index, section)| async move {
            let result = write_output(store, &section, folder, font).await;
            match &result {
                Ok(doc) => progress.emit(RunEvent::Written {
                    title: doc.title.clone(),
                    document_id: doc.id.clone(),
                }),
                Err(e) => progress.emit(RunEvent::WriteFailed(FailedWrite {
                    title: first_line(&section),
                    reason: e.to_string(),
                })),
            }
            (index, first_line(&section), result)
        })
        .buffer_unordered(ctx.settings.write_concurrency.max(1))
        .collect()
        .await;
    outcomes.sort_by_key(|(index, _, _)| *index);

    for (_, title, result) in outcomes {
        match result {
            Ok(doc) => ledger.written.push(doc),
            Err(e) => {
                warn!("Run {}: failed to write '{title}': {e}", ctx.run_id);
                ledger.failed_writes.push(FailedWrite {
                    title,
                    reason: e.to_string(),
                });
            }
        }
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().to_string()
}
