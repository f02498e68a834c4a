// Run pipeline and the HTTP entry points that start it.

pub mod context;
pub mod handlers;
pub mod report;
pub mod runner;

pub use context::PipelineSettings;
