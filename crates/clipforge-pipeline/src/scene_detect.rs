//! Scene Detector (§4.C): a content-aware, non-fatal scan for visual cuts.
//!
//! Frames are decoded at a reduced sampling cadence (one frame per second,
//! downscaled to a small fixed size) through the external encoder's
//! frame-extraction pipe rather than at the source frame rate — a cut
//! decision does not need full-rate decode. Adjacent sampled frames are
//! scored with a mean-absolute-difference (MAD) metric; a pair whose score
//! exceeds `scene_cut_threshold` is a cut candidate, subject to a minimum
//! gap so sensor noise cannot produce back-to-back cuts.
//!
//! Failure here is never fatal to the job (§7 `SceneDetectError` degrades to
//! an empty cut list): [`detect`] itself returns `Vec<SceneCut>`, logging a
//! warning and returning empty on any subprocess or decode error.

use clipforge_core::SceneCut;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use std::path::Path;
use tracing::warn;

/// Sampling cadence for cut detection: 1 decoded frame per second of source.
const SAMPLE_FPS: u32 = 1;
/// Downscaled frame dimensions used for the MAD comparison.
const SAMPLE_WIDTH: u32 = 64;
const SAMPLE_HEIGHT: u32 = 36;
/// Minimum gap between reported cuts; suppresses rapid-fire false positives.
const MIN_SCENE_GAP_SECS: f64 = 1.0;

/// Detect scene cuts in `media_path`. Never fails: on any error this logs a
/// warning and returns an empty list, which is a fully valid input to every
/// downstream stage (§4.C, §7).
pub async fn detect(media_path: &Path, threshold: f32) -> Vec<SceneCut> {
    let path = media_path.to_path_buf();
    let result =
        tokio::task::spawn_blocking(move || detect_blocking(&path, threshold, SAMPLE_FPS)).await;

    match result {
        Ok(Ok(cuts)) => cuts,
        Ok(Err(e)) => {
            warn!(error = %e, "scene detection failed, continuing with zero cuts");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "scene detection task panicked, continuing with zero cuts");
            Vec::new()
        }
    }
}

fn detect_blocking(path: &Path, threshold: f32, sample_fps: u32) -> Result<Vec<SceneCut>, String> {
    let mut command = FfmpegCommand::new();
    command
        .input(path.to_string_lossy())
        .args([
            "-vf",
            &format!("fps={sample_fps},scale={SAMPLE_WIDTH}:{SAMPLE_HEIGHT}"),
            "-pix_fmt",
            "gray",
            "-f",
            "rawvideo",
        ])
        .output("-");

    let mut child = command
        .spawn()
        .map_err(|e| format!("failed to spawn ffmpeg frame extractor: {e}"))?;

    let frame_size = (SAMPLE_WIDTH * SAMPLE_HEIGHT) as usize;
    let mut prev_frame: Option<Vec<u8>> = None;
    let mut cuts = Vec::new();
    let mut frame_index: u64 = 0;
    let mut last_cut_time: Option<f64> = None;

    let events = child
        .iter()
        .map_err(|e| format!("failed to read ffmpeg event stream: {e}"))?;

    for event in events {
        if let FfmpegEvent::OutputFrame(frame) = event {
            if frame.data.len() < frame_size {
                continue;
            }
            let timestamp = frame_index as f64 / sample_fps as f64;
            if let Some(prev) = &prev_frame {
                let mad = mean_absolute_difference(prev, &frame.data[..frame_size]);
                let normalized = mad / 255.0;
                if normalized > threshold {
                    let suppressed = last_cut_time
                        .map(|t| timestamp - t < MIN_SCENE_GAP_SECS)
                        .unwrap_or(false);
                    if !suppressed {
                        cuts.push(SceneCut { time: timestamp });
                        last_cut_time = Some(timestamp);
                    }
                }
            }
            prev_frame = Some(frame.data[..frame_size].to_vec());
            frame_index += 1;
        }
    }

    Ok(cuts)
}

/// Mean absolute difference between two equal-length grayscale byte buffers.
fn mean_absolute_difference(a: &[u8], b: &[u8]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let sum: u64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as i32 - *y as i32).unsigned_abs() as u64)
        .sum();
    sum as f32 / a.len() as f32
}
