use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::Config;
use crate::ingest::FooterCleaner;

/// Static pipeline configuration shared by every run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub instruction: String,
    pub model: String,
    pub input_token_limit: usize,
    pub output_font: Option<String>,
    pub footer: FooterCleaner,
    pub extract_concurrency: usize,
    pub write_concurrency: usize,
    /// When false, empty completion sections are written like any other.
    pub drop_empty_sections: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Result<Self, regex::Error> {
        Ok(Self {
            instruction: config.prompt_instruction.clone(),
            model: config.completion_model.clone(),
            input_token_limit: config.input_token_limit,
            output_font: config.output_font.clone(),
            footer: FooterCleaner::new(config.footer_page_total)?,
            extract_concurrency: config.extract_concurrency.max(1),
            write_concurrency: config.write_concurrency.max(1),
            drop_empty_sections: config.drop_empty_sections,
        })
    }
}

/// Everything one run needs, fixed before the run starts.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub job_folder_id: String,
    pub reference_folder_id: String,
    pub output_folder_id: String,
    pub api_key: String,
    pub settings: Arc<PipelineSettings>,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("job_folder_id", &self.job_folder_id)
            .field("reference_folder_id", &self.reference_folder_id)
            .field("output_folder_id", &self.output_folder_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
