//! Transport and subprocess error kinds owned by the media crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error fetching media: {0}")]
    Http(#[from] reqwest::Error),

    #[error("source unavailable or unsupported: {0}")]
    Ingest(String),

    #[error("ingest endpoint returned {status} for {url}")]
    IngestStatus { status: u16, url: String },

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("render failed: {0}")]
    Render(String),
}

/// Whether a failed ingest attempt is worth retrying (§4.A: no retry on
/// permanent 4xx refusals except 408/429).
pub fn is_retryable_status(status: u16) -> bool {
    !(400..500).contains(&status) || status == 408 || status == 429
}

pub type Result<T> = std::result::Result<T, MediaError>;
