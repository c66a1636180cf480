//! Media Ingest Adapter (§4.A).
//!
//! Fetches `source_url` into the job's scratch directory and probes it,
//! producing a [`MediaAsset`]. A single attempt per call; the orchestrator
//! drives the 3x exponential-backoff retry policy around [`fetch`], classifying
//! each failure with [`crate::error::is_retryable_status`] (no retry on a
//! permanent 4xx refusal except 408/429) — see `clipforge_pipeline::orchestrator`.

use crate::error::{MediaError, Result};
use crate::probe::probe;
use clipforge_core::{media_id, MediaAsset};
use std::path::Path;
use tracing::info;

/// Fetch `source_url` into `scratch_dir`, returning the resulting asset.
///
/// `source_url` may be an `http(s)://` URL (streamed to disk without
/// buffering the whole body in memory) or a local filesystem path (copied
/// into the scratch directory, useful for tests and pre-staged media).
pub async fn fetch(source_url: &str, scratch_dir: &Path) -> Result<MediaAsset> {
    std::fs::create_dir_all(scratch_dir)?;
    let id = media_id(source_url);
    let local_path = scratch_dir.join(format!("{id}_source.mp4"));

    if source_url.starts_with("http://") || source_url.starts_with("https://") {
        fetch_http(source_url, &local_path).await?;
    } else {
        fetch_local(source_url, &local_path)?;
    }

    let probed = probe(&local_path).await?;
    if !probed.has_audio() {
        return Err(MediaError::Ingest(format!(
            "{source_url}: no audio stream present"
        )));
    }

    info!(
        media_id = %id,
        duration = probed.duration,
        "ingest complete"
    );

    Ok(MediaAsset {
        id,
        local_path,
        duration_seconds: probed.duration,
        sample_rate_hint: probed.primary_audio().map(|a| a.sample_rate),
    })
}

async fn fetch_http(url: &str, dest: &Path) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(MediaError::IngestStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    use futures_util::StreamExt;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;
    }
    Ok(())
}

fn fetch_local(path: &str, dest: &Path) -> Result<()> {
    let source = path.strip_prefix("file://").unwrap_or(path);
    if !Path::new(source).exists() {
        return Err(MediaError::Ingest(format!("local path not found: {source}")));
    }
    std::fs::copy(source, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_local_missing_file_errors() {
        let scratch = tempfile::tempdir().unwrap();
        let result = fetch("/no/such/file.mp4", scratch.path()).await;
        assert!(result.is_err());
    }
}
