//! Orchestrator (§4.J): the only stage-graph-aware component. Drives
//! `INGESTING → (TRANSCRIBING ∥ SCENE_DETECTING) → WINDOWING →
//! (FEATURIZING ∥ GRADING) → RANKING → PLANNING → RENDERING → DONE`, owns
//! the job's scratch directory, and is the sole place retry, concurrency,
//! and cancellation policy live. Every other stage function is narrow and
//! has no knowledge of what precedes or follows it.

use crate::error::{PipelineError, Result};
use crate::{asr, grader, ranker, render_plan, scene_detect, text_features, windower};
use clipforge_core::{
    CancellationToken, Config, EncoderProfile, JobLogRow, MediaAsset, RankedClip,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

const INGEST_TIMEOUT: Duration = Duration::from_secs(600);
const ASR_TIMEOUT: Duration = Duration::from_secs(600);
const RENDER_TIMEOUT: Duration = Duration::from_secs(900);
const SCRATCH_POLL_INTERVAL: Duration = Duration::from_millis(500);

const INGEST_MAX_RETRIES: u32 = 3;
const INGEST_RETRY_BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(4),
    Duration::from_secs(16),
];

/// Job-level outcome, mapped to a process exit code by the binary crate
/// (§6): `Success` → 0, `PartialSuccess` → 1, `AllClipsFailed` → 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    PartialSuccess,
    AllClipsFailed,
}

pub struct JobResult {
    pub media: MediaAsset,
    pub clips_log: Vec<JobLogRow>,
    pub outcome: JobOutcome,
}

/// Run one job end to end against `source_url`, honoring `cancel` at every
/// stage boundary. A job-level `Err` means an unrecoverable failure before
/// any clip could be produced (`IngestError`/`AsrError`/cancellation); a
/// per-clip `RenderError` never surfaces here — it is recorded in the
/// returned log and folded into `JobOutcome` instead.
pub async fn run_job(
    config: &Config,
    source_url: &str,
    client: &reqwest::Client,
    cancel: &CancellationToken,
) -> Result<JobResult> {
    let scratch_dir = config.output_dir.join(".scratch");

    let media = timeout_stage(
        INGEST_TIMEOUT,
        fetch_with_retry(source_url, &scratch_dir),
        "ingest",
    )
    .await??;
    cancel.check()?;

    let source_fps = clipforge_media::probe::probe(&media.local_path)
        .await
        .ok()
        .and_then(|p| p.primary_video().map(|v| v.fps))
        .unwrap_or(30.0);

    let (transcript, cuts) = {
        let asr_fut = timeout_stage(
            ASR_TIMEOUT,
            asr::transcribe(client, &config.whisper_server_url, &media.local_path),
            "transcribe",
        );
        let scene_fut = scene_detect::detect(&media.local_path, config.scene_cut_threshold);
        let (transcript, cuts) = tokio::join!(asr_fut, scene_fut);
        (transcript??, cuts)
    };
    cancel.check()?;

    info!(tokens = transcript.tokens.len(), cuts = cuts.len(), "transcription complete");

    if transcript.is_empty() {
        info!("empty transcript, producing zero clips");
        return Ok(JobResult {
            media,
            clips_log: Vec::new(),
            outcome: JobOutcome::Success,
        });
    }

    let params = windower::WindowerParams {
        target: config.window_duration,
        stride: config.window_stride,
        min: config.window_min,
        max: config.window_max,
    };
    let windows = windower::windows(&transcript, &cuts, media.duration_seconds, params, &media.id);
    cancel.check()?;

    if windows.is_empty() {
        info!("no candidate windows survived snapping, producing zero clips");
        return Ok(JobResult {
            media,
            clips_log: Vec::new(),
            outcome: JobOutcome::Success,
        });
    }
    info!(count = windows.len(), "windowing complete");

    let (features, grades) = {
        // CPU-bound feature extraction is kept off the async I/O executor
        // threads via `spawn_blocking`, bounded to `min(cores, 4)` workers
        // (§5) so it can't starve ASR/grader request handling.
        let cpu_pool = tokio::sync::Semaphore::new(num_cpus::get().min(4).max(1));
        let windows_for_features = windows.clone();
        let features_task = tokio::task::spawn_blocking(move || {
            let _permit = cpu_pool.try_acquire();
            text_features::compute_for_job(&windows_for_features)
        });
        let grades_fut = grader::grade(
            client,
            &config.chat_server_url,
            &windows,
            config.grader_concurrency,
            cancel,
        );
        let (features_result, grades) = tokio::join!(features_task, grades_fut);
        let features = features_result
            .map_err(|e| PipelineError::Grade(format!("feature extraction task panicked: {e}")))?;
        (features, grades)
    };
    cancel.check()?;
    info!("featurizing and grading complete");

    let ranked = ranker::rank(windows, features, grades, &config.ranker_weights, config.k);
    info!(selected = ranked.len(), "ranking complete");

    if ranked.is_empty() {
        return Ok(JobResult {
            media,
            clips_log: Vec::new(),
            outcome: JobOutcome::Success,
        });
    }

    let hw_encoder = clipforge_media::probe_hardware_encoder().await;
    let encoder_profile = if hw_encoder {
        EncoderProfile::HwH264Nvenc
    } else {
        EncoderProfile::CpuH264
    };

    std::fs::create_dir_all(&config.output_dir)?;
    let clips_log = render_all(
        &ranked,
        &transcript,
        &media,
        config,
        &scratch_dir,
        encoder_profile,
        source_fps,
        cancel,
    )
    .await?;

    let succeeded = clips_log.iter().filter(|row| !row.text_preview.starts_with("error:")).count();
    let outcome = if succeeded == clips_log.len() {
        JobOutcome::Success
    } else if succeeded > 0 {
        JobOutcome::PartialSuccess
    } else {
        JobOutcome::AllClipsFailed
    };

    Ok(JobResult { media, clips_log, outcome })
}

/// PLANNING + RENDERING (§4.H, §4.I): bounded by `render_concurrency`, with
/// a scratch-quota check before each task is admitted past the semaphore
/// and a one-shot CPU-encoder retry on a hardware render failure (§4.I).
#[allow(clippy::too_many_arguments)]
async fn render_all(
    ranked: &[RankedClip],
    transcript: &clipforge_core::Transcript,
    media: &MediaAsset,
    config: &Config,
    scratch_dir: &std::path::Path,
    encoder_profile: EncoderProfile,
    source_fps: f64,
    cancel: &CancellationToken,
) -> Result<Vec<JobLogRow>> {
    use tokio::sync::Semaphore;

    let semaphore = std::sync::Arc::new(Semaphore::new(config.render_concurrency.max(1)));
    let mut handles = Vec::with_capacity(ranked.len());

    for clip in ranked {
        await_scratch_quota(scratch_dir, config.scratch_quota_bytes, cancel).await?;
        cancel.check()?;

        let plan = render_plan::plan_for_clip(
            clip,
            transcript,
            media,
            clip.rank,
            &config.output_dir,
            encoder_profile,
            source_fps,
        );
        let row = log_row_for(clip, &plan.output_path, media);

        let semaphore = semaphore.clone();
        let cancel = cancel.clone();
        let quality = config.render_quality;

        handles.push(tokio::spawn(
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                render_one_with_retry(plan, quality, row, &cancel).await
            }
            .instrument(info_span!("render_clip", rank = clip.rank)),
        ));
    }

    let mut rows = Vec::with_capacity(handles.len());
    for handle in handles {
        rows.push(handle.await.map_err(|e| PipelineError::Render(format!("render task panicked: {e}")))?);
    }
    Ok(rows)
}

async fn render_one_with_retry(
    mut plan: clipforge_core::RenderPlan,
    quality: clipforge_core::RenderQuality,
    mut row: JobLogRow,
    cancel: &CancellationToken,
) -> JobLogRow {
    let first = timeout_stage(RENDER_TIMEOUT, clipforge_media::render(&plan, quality, cancel), "render").await;

    let final_result = match first {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) | Err(_) if plan.encoder_profile == EncoderProfile::HwH264Nvenc => {
            warn!(rank = row.rank, "hardware render failed, retrying with CPU encoder");
            plan.encoder_profile = EncoderProfile::CpuH264;
            match timeout_stage(RENDER_TIMEOUT, clipforge_media::render(&plan, quality, cancel), "render").await {
                Ok(result) => result,
                Err(_) => Err(clipforge_media::MediaError::Render("render timed out".into())),
            }
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(clipforge_media::MediaError::Render("render timed out".into())),
    };

    if let Err(e) = final_result {
        warn!(rank = row.rank, error = %e, "clip render failed, skipping");
        row.text_preview = format!("error: {e}");
    }
    row
}

fn log_row_for(clip: &RankedClip, output_path: &std::path::Path, media: &MediaAsset) -> JobLogRow {
    let preview: String = clip.window.text.chars().take(160).collect::<String>().replace('\n', " ");
    JobLogRow {
        video_id: media.id.clone(),
        rank: clip.rank,
        window_id: clip.window.id.clone(),
        start_time: clip.window.start,
        end_time: clip.window.end,
        keyphrase_score: clip.features.coverage_score,
        density_score: clip.features.density_score,
        cogency_score: clip.grade.cogency,
        final_score: clip.final_score,
        quotes: clip.grade.quotes.clone(),
        salient_terms: clip.grade.salient_terms.clone(),
        keyphrases: clip.features.keyphrases.iter().map(|(k, _)| k.clone()).collect(),
        scene_cuts: clip.window.contains_scene_cuts,
        file_path: output_path.display().to_string(),
        text_preview: preview,
    }
}

/// Wait until the scratch directory's total size drops below quota before
/// admitting the next render task past the semaphore (§5).
async fn await_scratch_quota(scratch_dir: &std::path::Path, quota: u64, cancel: &CancellationToken) -> Result<()> {
    loop {
        let dir = scratch_dir.to_path_buf();
        let size = tokio::task::spawn_blocking(move || dir_size(&dir))
            .await
            .unwrap_or(0);
        if size < quota {
            return Ok(());
        }
        warn!(size, quota, "scratch quota exceeded, waiting for prior renders to finalize");
        tokio::select! {
            _ = tokio::time::sleep(SCRATCH_POLL_INTERVAL) => {}
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
        }
    }
}

fn dir_size(path: &std::path::Path) -> u64 {
    let mut total = 0u64;
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    for entry in entries.flatten() {
        if let Ok(meta) = entry.metadata() {
            if meta.is_dir() {
                total += dir_size(&entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    total
}

/// Drive `clipforge_media::ingest::fetch` with the §4.A retry policy: up to
/// 3 retries with 1s/4s/16s backoff, skipping retry on a permanent 4xx
/// refusal (anything but 408/429) per [`clipforge_media::is_retryable_status`].
async fn fetch_with_retry(
    source_url: &str,
    scratch_dir: &std::path::Path,
) -> std::result::Result<MediaAsset, clipforge_media::MediaError> {
    let mut attempt = 0u32;
    loop {
        match clipforge_media::ingest::fetch(source_url, scratch_dir).await {
            Ok(asset) => return Ok(asset),
            Err(e) => {
                let retryable = match &e {
                    clipforge_media::MediaError::IngestStatus { status, .. } => {
                        clipforge_media::is_retryable_status(*status)
                    }
                    _ => true,
                };
                if !retryable || attempt >= INGEST_MAX_RETRIES {
                    return Err(e);
                }
                warn!(attempt, error = %e, "ingest failed, retrying");
                tokio::time::sleep(INGEST_RETRY_BACKOFF[attempt as usize]).await;
                attempt += 1;
            }
        }
    }
}

/// Apply a stage-level timeout, converting elapsed time into the same
/// `Result` shape the stage itself would have returned on failure.
async fn timeout_stage<F, T>(duration: Duration, fut: F, stage: &'static str) -> std::result::Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    let result = tokio::time::timeout(duration, fut).await;
    if result.is_err() {
        warn!(stage, "stage timed out");
    }
    result
}

/// Write the per-job CSV log in the exact §6 column order. Hand-rolled
/// (every field is always quoted, embedded quotes doubled per RFC 4180)
/// rather than pulled in as a dependency, matching how this workspace
/// already hand-rolls its other small text formats (see the SRT writer in
/// `clipforge-media::render`).
pub fn write_csv_log(path: &std::path::Path, rows: &[JobLogRow]) -> Result<()> {
    let mut out = String::from(
        "video_id,rank,window_id,start_time,end_time,keyphrase_score,density_score,cogency_score,\
         final_score,quotes,salient_terms,keyphrases,scene_cuts,file_path,text_preview\n",
    );
    for row in rows {
        out.push_str(&csv_field(&row.video_id));
        out.push(',');
        out.push_str(&row.rank.to_string());
        out.push(',');
        out.push_str(&csv_field(&row.window_id));
        out.push(',');
        out.push_str(&csv_field(&format!("{:.3}", row.start_time)));
        out.push(',');
        out.push_str(&csv_field(&format!("{:.3}", row.end_time)));
        out.push(',');
        out.push_str(&csv_field(&format!("{:.4}", row.keyphrase_score)));
        out.push(',');
        out.push_str(&csv_field(&format!("{:.4}", row.density_score)));
        out.push(',');
        out.push_str(&csv_field(&row.cogency_score.to_string()));
        out.push(',');
        out.push_str(&csv_field(&format!("{:.6}", row.final_score)));
        out.push(',');
        out.push_str(&csv_field(&row.quotes.join("|")));
        out.push(',');
        out.push_str(&csv_field(&row.salient_terms.join("|")));
        out.push(',');
        out.push_str(&csv_field(&row.keyphrases.join("|")));
        out.push(',');
        out.push_str(&csv_field(&row.scene_cuts.to_string()));
        out.push(',');
        out.push_str(&csv_field(&row.file_path));
        out.push(',');
        out.push_str(&csv_field(&row.text_preview));
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Path the CSV log is always written to for a given job (§6).
pub fn csv_log_path(output_dir: &std::path::Path, media_id: &str) -> PathBuf {
    output_dir.join(format!("{media_id}_clips_log.csv"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(rank: u32, preview: &str) -> JobLogRow {
        JobLogRow {
            video_id: "m1".into(),
            rank,
            window_id: format!("w{rank}"),
            start_time: 0.0,
            end_time: 90.0,
            keyphrase_score: 0.5,
            density_score: 0.5,
            cogency_score: 4,
            final_score: 0.7,
            quotes: vec!["a quote".into()],
            salient_terms: vec!["term".into()],
            keyphrases: vec!["phrase".into()],
            scene_cuts: 1,
            file_path: "/out/m1_clip_01.mp4".into(),
            text_preview: preview.to_string(),
        }
    }

    #[test]
    fn csv_field_escapes_embedded_quotes() {
        assert_eq!(csv_field("he said \"hi\""), "\"he said \"\"hi\"\"\"");
    }

    #[test]
    fn write_csv_log_header_only_for_empty_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        write_csv_log(&path, &[]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.starts_with("video_id,rank,window_id"));
    }

    #[test]
    fn write_csv_log_joins_list_fields_with_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        write_csv_log(&path, &[sample_row(1, "hello")]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"a quote\""));
        assert!(content.contains("\"term\""));
    }

    #[test]
    fn csv_log_path_matches_naming_convention() {
        let path = csv_log_path(std::path::Path::new("/out"), "abc123");
        assert_eq!(path, PathBuf::from("/out/abc123_clips_log.csv"));
    }

    #[test]
    fn dir_size_sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), vec![0u8; 100]).unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("b.bin"), vec![0u8; 50]).unwrap();
        assert_eq!(dir_size(dir.path()), 150);
    }

    #[test]
    fn log_row_text_preview_is_truncated_to_160_chars() {
        let long_text = "a".repeat(300);
        let clip = RankedClip {
            window: clipforge_core::Window {
                id: "w1".into(),
                start: 0.0,
                end: 10.0,
                token_span: (0, 0),
                text: long_text,
                contains_scene_cuts: 0,
            },
            features: clipforge_core::TextFeatures {
                keyphrases: Vec::new(),
                coverage_score: 0.5,
                density_score: 0.5,
                filler_ratio: 0.0,
                scene_cut_penalty: 0.0,
            },
            grade: clipforge_core::LlmGrade {
                cogency: 4,
                quotes: Vec::new(),
                salient_terms: Vec::new(),
            },
            final_score: 0.5,
            rank: 1,
        };
        let media = MediaAsset {
            id: "m1".into(),
            local_path: "/tmp/in.mp4".into(),
            duration_seconds: 100.0,
            sample_rate_hint: None,
        };
        let row = log_row_for(&clip, std::path::Path::new("/out/m1_clip_01.mp4"), &media);
        assert_eq!(row.text_preview.len(), 160);
    }
}
