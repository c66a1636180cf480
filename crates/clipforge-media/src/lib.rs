//! ClipForge Media - ingest, probing, and rendering.
//!
//! This crate handles:
//! - Fetching source media (HTTP or local path) into a scratch directory
//! - Probing media files for duration and stream metadata via `ffprobe`
//! - Rendering a [`clipforge_core::RenderPlan`] to a captioned vertical MP4

pub mod error;
pub mod ingest;
pub mod probe;
pub mod render;

pub use error::{is_retryable_status, MediaError, Result};
pub use ingest::fetch;
pub use probe::{AudioStreamInfo, MediaProbe, VideoStreamInfo};
pub use render::{probe_hardware_encoder, render};

/// Download and install the FFmpeg binaries ffmpeg-sidecar needs, if not
/// already present on the system. Call once at startup.
pub fn init() -> Result<()> {
    if ffmpeg_sidecar::command::ffmpeg_is_installed() {
        tracing::info!("ffmpeg already installed");
        return Ok(());
    }
    tracing::info!("downloading ffmpeg");
    ffmpeg_sidecar::download::auto_download()
        .map_err(|e| MediaError::Render(format!("failed to install ffmpeg: {e}")))?;
    Ok(())
}
