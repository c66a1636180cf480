//! Renderer (§4.I): burns a [`RenderPlan`] into the final vertical MP4.
//!
//! Cuts the source to `[cut_start, cut_end)`, scales/crops to the plan's
//! target frame, and burns subtitle events via an SRT sidecar passed through
//! FFmpeg's `subtitles=` filter. The encoder choice is decided once upstream
//! (see [`probe_hardware_encoder`]) and carried on the plan; this module only
//! executes it. Drives the encoder through `ffmpeg-sidecar` so the subprocess
//! is killable on cancellation.

use crate::error::{MediaError, Result};
use clipforge_core::{CancellationToken, EncoderProfile, RenderPlan, RenderQuality};
use ffmpeg_sidecar::command::FfmpegCommand;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

static HARDWARE_ENCODER: OnceLock<bool> = OnceLock::new();

/// Probe once whether `h264_nvenc` is usable on this host, caching the
/// result for the lifetime of the process. Called by whatever builds a
/// [`RenderPlan`] to decide its `encoder_profile`.
pub async fn probe_hardware_encoder() -> bool {
    if let Some(cached) = HARDWARE_ENCODER.get() {
        return *cached;
    }
    let usable = tokio::task::spawn_blocking(|| {
        let mut command = FfmpegCommand::new();
        command
            .args(["-f", "lavfi", "-i", "color=c=black:s=16x16:d=0.1"])
            .args(["-c:v", "h264_nvenc", "-f", "null", "-"]);
        match command.spawn() {
            Ok(mut child) => child.wait().map(|status| status.success()).unwrap_or(false),
            Err(_) => false,
        }
    })
    .await
    .unwrap_or(false);

    *HARDWARE_ENCODER.get_or_init(|| usable)
}

/// Render `plan` at `quality`, returning once the output file exists and is
/// non-empty. A single attempt; the orchestrator owns any retry policy.
pub async fn render(
    plan: &RenderPlan,
    quality: RenderQuality,
    cancel: &CancellationToken,
) -> Result<()> {
    cancel
        .check()
        .map_err(|_| MediaError::Render("cancelled before start".into()))?;

    let srt_path = plan.output_path.with_extension("srt");
    write_srt(&srt_path, &plan.subtitle_events)?;

    let argv = build_argv(plan, quality, &srt_path);
    let label = plan
        .output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!(job = %label, profile = %format!("{:?}", plan.encoder_profile), "starting render");

    let mut command = FfmpegCommand::new();
    command.args(&argv);
    let mut child = command
        .spawn()
        .map_err(|e| MediaError::Render(format!("failed to spawn ffmpeg: {e}")))?;

    let wait = tokio::task::spawn_blocking(move || child.wait());

    let status = tokio::select! {
        result = wait => {
            result.map_err(|e| MediaError::Render(format!("ffmpeg task panicked: {e}")))?
                .map_err(|e| MediaError::Render(format!("failed to wait on ffmpeg: {e}")))?
        }
        _ = cancel.cancelled() => {
            let _ = std::fs::remove_file(&srt_path);
            let _ = std::fs::remove_file(&plan.output_path);
            return Err(MediaError::Render("cancelled".into()));
        }
    };

    let _ = std::fs::remove_file(&srt_path);

    if !status.success() {
        let _ = std::fs::remove_file(&plan.output_path);
        return Err(MediaError::Render(format!("ffmpeg exited with {status}")));
    }

    match std::fs::metadata(&plan.output_path) {
        Ok(meta) if meta.len() > 0 => {}
        _ => {
            warn!(job = %label, "render produced empty or missing output");
            return Err(MediaError::Render("output file missing or empty".into()));
        }
    }

    Ok(())
}

fn build_filter_chain(plan: &RenderPlan, srt_path: &Path) -> String {
    let (tw, th) = (plan.target_width, plan.target_height);
    let escaped_srt = srt_path.to_string_lossy().replace(':', "\\:");
    format!(
        "scale={tw}:{th}:force_original_aspect_ratio=increase,crop={tw}:{th},\
         subtitles='{escaped_srt}':force_style='FontSize=18,PrimaryColour=&HFFFFFF&'"
    )
}

fn build_argv(plan: &RenderPlan, quality: RenderQuality, srt_path: &Path) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-ss".to_string(),
        format!("{:.3}", plan.cut_start),
        "-i".to_string(),
        plan.source_path.to_string_lossy().into_owned(),
        "-t".to_string(),
        format!("{:.3}", plan.cut_end - plan.cut_start),
        "-r".to_string(),
        format!("{:.3}", plan.target_fps),
        "-vf".to_string(),
        build_filter_chain(plan, srt_path),
    ];

    match plan.encoder_profile {
        EncoderProfile::HwH264Nvenc => {
            let cq = match quality {
                RenderQuality::Low => 28,
                RenderQuality::Medium => 23,
                RenderQuality::High => 18,
            };
            args.extend([
                "-c:v".to_string(),
                "h264_nvenc".to_string(),
                "-cq".to_string(),
                cq.to_string(),
            ]);
        }
        EncoderProfile::CpuH264 => {
            let (crf, preset) = quality.cpu_params();
            args.extend([
                "-c:v".to_string(),
                "libx264".to_string(),
                "-crf".to_string(),
                crf.to_string(),
                "-preset".to_string(),
                preset.to_string(),
            ]);
        }
    }

    let sample_rate = match plan.source_sample_rate_hint {
        Some(rate) if rate >= 44_100 => rate,
        _ => 48_000,
    };

    args.extend([
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "128k".to_string(),
        "-ac".to_string(),
        "2".to_string(),
        "-ar".to_string(),
        sample_rate.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        plan.output_path.to_string_lossy().into_owned(),
    ]);

    args
}

fn write_srt(path: &Path, events: &[clipforge_core::SubtitleEvent]) -> Result<()> {
    let mut body = String::new();
    for (idx, event) in events.iter().enumerate() {
        body.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            idx + 1,
            srt_timestamp(event.start),
            srt_timestamp(event.end),
            escape_srt_text(&event.text)
        ));
    }
    std::fs::write(path, body)?;
    Ok(())
}

fn srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;
    let s = total_s % 60;
    let total_m = total_s / 60;
    let m = total_m % 60;
    let h = total_m / 60;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

fn escape_srt_text(text: &str) -> String {
    text.replace('\r', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_core::{CropStrategyKind, SubtitleEvent};
    use std::path::PathBuf;

    fn sample_plan(encoder_profile: EncoderProfile) -> RenderPlan {
        RenderPlan {
            cut_start: 10.0,
            cut_end: 25.0,
            source_path: PathBuf::from("/tmp/source.mp4"),
            output_path: PathBuf::from("/tmp/w1.mp4"),
            crop_strategy: CropStrategyKind::Center,
            subtitle_events: vec![SubtitleEvent {
                start: 0.0,
                end: 1.5,
                text: "hello world".to_string(),
                speaker_label: None,
            }],
            encoder_profile,
            target_width: clipforge_core::TARGET_WIDTH,
            target_height: clipforge_core::TARGET_HEIGHT,
            target_fps: 30.0,
            source_sample_rate_hint: None,
        }
    }

    #[test]
    fn srt_timestamp_formats_correctly() {
        assert_eq!(srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(srt_timestamp(61.234), "00:01:01,234");
        assert_eq!(srt_timestamp(3661.5), "01:01:01,500");
    }

    #[test]
    fn argv_contains_seek_and_duration() {
        let plan = sample_plan(EncoderProfile::CpuH264);
        let argv = build_argv(&plan, RenderQuality::Medium, Path::new("/tmp/w1.srt"));
        assert!(argv.contains(&"-ss".to_string()));
        assert!(argv.contains(&"10.000".to_string()));
        assert!(argv.contains(&"-t".to_string()));
        assert!(argv.contains(&"15.000".to_string()));
    }

    #[test]
    fn argv_selects_cpu_encoder_params() {
        let plan = sample_plan(EncoderProfile::CpuH264);
        let argv = build_argv(&plan, RenderQuality::High, Path::new("/tmp/w1.srt"));
        assert!(argv.contains(&"libx264".to_string()));
        assert!(argv.contains(&"-crf".to_string()));
        assert!(argv.contains(&"16".to_string()));
        assert!(argv.contains(&"slow".to_string()));
    }

    #[test]
    fn argv_selects_hw_encoder_params() {
        let plan = sample_plan(EncoderProfile::HwH264Nvenc);
        let argv = build_argv(&plan, RenderQuality::Low, Path::new("/tmp/w1.srt"));
        assert!(argv.contains(&"h264_nvenc".to_string()));
        assert!(argv.contains(&"-cq".to_string()));
        assert!(argv.contains(&"28".to_string()));
    }

    #[test]
    fn argv_forces_stereo_and_faststart() {
        let plan = sample_plan(EncoderProfile::CpuH264);
        let argv = build_argv(&plan, RenderQuality::Medium, Path::new("/tmp/w1.srt"));
        assert!(argv.contains(&"-ac".to_string()));
        assert!(argv.contains(&"2".to_string()));
        assert!(argv.contains(&"-movflags".to_string()));
        assert!(argv.contains(&"+faststart".to_string()));
    }

    #[test]
    fn argv_preserves_sample_rate_at_or_above_44100() {
        let mut plan = sample_plan(EncoderProfile::CpuH264);
        plan.source_sample_rate_hint = Some(48_000);
        let argv = build_argv(&plan, RenderQuality::Medium, Path::new("/tmp/w1.srt"));
        assert!(argv.contains(&"-ar".to_string()));
        assert!(argv.contains(&"48000".to_string()));
    }

    #[test]
    fn argv_upsamples_low_sample_rate_to_48k() {
        let mut plan = sample_plan(EncoderProfile::CpuH264);
        plan.source_sample_rate_hint = Some(22_050);
        let argv = build_argv(&plan, RenderQuality::Medium, Path::new("/tmp/w1.srt"));
        assert!(argv.contains(&"-ar".to_string()));
        assert!(argv.contains(&"48000".to_string()));
    }

    #[test]
    fn argv_defaults_sample_rate_to_48k_when_unknown() {
        let plan = sample_plan(EncoderProfile::CpuH264);
        let argv = build_argv(&plan, RenderQuality::Medium, Path::new("/tmp/w1.srt"));
        assert!(argv.contains(&"48000".to_string()));
    }

    #[test]
    fn filter_chain_targets_plan_resolution() {
        let plan = sample_plan(EncoderProfile::CpuH264);
        let chain = build_filter_chain(&plan, Path::new("/tmp/w1.srt"));
        assert!(chain.contains(&format!("scale={}:{}", plan.target_width, plan.target_height)));
        assert!(chain.contains("subtitles="));
    }

    #[test]
    fn write_srt_produces_numbered_cues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cues.srt");
        let events = vec![
            SubtitleEvent {
                start: 0.0,
                end: 1.0,
                text: "one".to_string(),
                speaker_label: None,
            },
            SubtitleEvent {
                start: 1.0,
                end: 2.0,
                text: "two".to_string(),
                speaker_label: None,
            },
        ];
        write_srt(&path, &events).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("1\n"));
        assert!(content.contains("2\n00:00:01,000"));
    }
}
