//! Error kinds owned by the pipeline crate (§7): transcription, scene
//! detection, grading, windowing, and ranking/planning all fail through
//! `PipelineError`. Per-window and per-clip failures (`GradeError`,
//! `RenderError`) are represented as data on the value they degrade rather
//! than as `Err` variants here, matching §7's isolation policy — only
//! job-fatal failures propagate as `Result::Err`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transcription failed: {0}")]
    Asr(String),

    #[error("grading failed: {0}")]
    Grade(String),

    #[error("ingest failed: {0}")]
    Ingest(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("stage timed out")]
    Timeout,

    #[error("job cancelled")]
    Cancelled,
}

impl From<clipforge_core::Cancelled> for PipelineError {
    fn from(_: clipforge_core::Cancelled) -> Self {
        PipelineError::Cancelled
    }
}

impl From<clipforge_media::MediaError> for PipelineError {
    fn from(e: clipforge_media::MediaError) -> Self {
        PipelineError::Ingest(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for PipelineError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        PipelineError::Timeout
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
