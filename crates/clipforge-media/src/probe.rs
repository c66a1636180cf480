//! Media file probing to get duration and stream metadata without a full
//! decode. Shells out to `ffprobe` (shipped alongside `ffmpeg`) and parses
//! its `-print_format json` output.

use crate::error::{MediaError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Metadata describing a probed media file.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    pub path: String,
    pub duration: f64,
    pub video_streams: Vec<VideoStreamInfo>,
    pub audio_streams: Vec<AudioStreamInfo>,
    pub format: String,
}

#[derive(Debug, Clone)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

#[derive(Debug, Clone)]
pub struct AudioStreamInfo {
    pub index: usize,
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl MediaProbe {
    pub fn has_video(&self) -> bool {
        !self.video_streams.is_empty()
    }

    pub fn has_audio(&self) -> bool {
        !self.audio_streams.is_empty()
    }

    pub fn primary_video(&self) -> Option<&VideoStreamInfo> {
        self.video_streams.first()
    }

    pub fn primary_audio(&self) -> Option<&AudioStreamInfo> {
        self.audio_streams.first()
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    format_name: String,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: usize,
    codec_type: String,
    #[serde(default)]
    codec_name: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    sample_rate: Option<String>,
    #[serde(default)]
    channels: Option<u16>,
}

/// Probe `path` via `ffprobe`.
pub async fn probe(path: &Path) -> Result<MediaProbe> {
    if !path.exists() {
        return Err(MediaError::Probe(format!("file not found: {}", path.display())));
    }

    let ffprobe_bin = which::which("ffprobe").unwrap_or_else(|_| "ffprobe".into());
    let output = tokio::process::Command::new(&ffprobe_bin)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| MediaError::Probe(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(MediaError::Probe(format!(
            "ffprobe exited with status {}",
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!(path = %path.display(), "parsed ffprobe output");
    parse_ffprobe_json(&stdout, path)
}

fn parse_ffprobe_json(json: &str, path: &Path) -> Result<MediaProbe> {
    let parsed: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| MediaError::Probe(format!("bad ffprobe json: {e}")))?;

    let duration: f64 = parsed
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse().ok())
        .unwrap_or(0.0);

    let mut video_streams = Vec::new();
    let mut audio_streams = Vec::new();

    for stream in parsed.streams {
        match stream.codec_type.as_str() {
            "video" => video_streams.push(VideoStreamInfo {
                index: stream.index,
                codec: stream.codec_name,
                width: stream.width.unwrap_or(0),
                height: stream.height.unwrap_or(0),
                fps: stream
                    .r_frame_rate
                    .as_deref()
                    .and_then(parse_frame_rate_fraction)
                    .unwrap_or(30.0),
            }),
            "audio" => audio_streams.push(AudioStreamInfo {
                index: stream.index,
                codec: stream.codec_name,
                sample_rate: stream
                    .sample_rate
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(48_000),
                channels: stream.channels.unwrap_or(2),
            }),
            _ => {}
        }
    }

    Ok(MediaProbe {
        path: path.to_string_lossy().into_owned(),
        duration,
        video_streams,
        audio_streams,
        format: parsed.format.format_name,
    })
}

/// Parse an ffprobe `"30000/1001"`-style fraction into an f64 fps.
fn parse_frame_rate_fraction(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frame_rate_fraction() {
        assert!((parse_frame_rate_fraction("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate_fraction("25/1").unwrap(), 25.0);
        assert!(parse_frame_rate_fraction("25/0").is_none());
    }

    #[test]
    fn parses_full_ffprobe_json() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "r_frame_rate": "30/1"},
                {"index": 1, "codec_type": "audio", "codec_name": "aac", "sample_rate": "48000", "channels": 2}
            ],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "123.456000"}
        }"#;
        let probe = parse_ffprobe_json(json, Path::new("in.mp4")).expect("parse");
        assert!((probe.duration - 123.456).abs() < 1e-6);
        assert!(probe.has_video());
        assert!(probe.has_audio());
        assert_eq!(probe.primary_video().unwrap().width, 1920);
        assert_eq!(probe.primary_audio().unwrap().sample_rate, 48_000);
    }

    #[test]
    fn parses_video_only_stream_set() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 640, "height": 360, "r_frame_rate": "24/1"}
            ],
            "format": {"format_name": "mp4", "duration": "5.0"}
        }"#;
        let probe = parse_ffprobe_json(json, Path::new("in.mp4")).expect("parse");
        assert!(probe.has_video());
        assert!(!probe.has_audio());
    }
}
