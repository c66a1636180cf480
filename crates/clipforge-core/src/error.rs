//! Error kinds shared by every stage of the pipeline.
//!
//! Narrower, transport-specific errors live in their owning crate
//! (`clipforge-media::MediaError`, `clipforge-pipeline::PipelineError`) and convert
//! into `CoreError` at the boundary. The binary crate composes all of them into
//! one top-level error with an exit-code mapping.

use thiserror::Error;

/// Errors that can arise from domain-type construction and configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid window: {0}")]
    InvalidWindow(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
