//! Value types shared across every pipeline stage.
//!
//! All timestamps are plain `f64` seconds. The donor editor crate this
//! workspace grew from represents time as a rational fraction of a frame rate
//! for frame-accurate timeline editing; this pipeline has no timeline and no
//! frame-accurate cut requirement, so it keeps the simpler representation the
//! data model actually calls for end to end.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fetched, locally-cached source video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    /// Stable identifier derived from the source URL (see [`media_id`]).
    pub id: String,
    pub local_path: std::path::PathBuf,
    pub duration_seconds: f64,
    pub sample_rate_hint: Option<u32>,
}

/// Derive a stable, filesystem-safe identifier from a source URL.
///
/// Uses a content hash rather than the URL text itself so the id is safe to
/// embed in file names regardless of query strings or unicode in the path.
pub fn media_id(source_url: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    source_url.hash(&mut hasher);
    format!("media_{:016x}", hasher.finish())
}

/// A single word-level transcript unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub confidence: Option<f32>,
    pub speaker_label: Option<String>,
}

impl Token {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Ordered, immutable sequence of [`Token`]s produced by the ASR client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Transcript {
    pub tokens: Vec<Token>,
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Joined text of tokens `[start..=end]`, space-separated.
    pub fn text_for_span(&self, start: usize, end: usize) -> String {
        self.tokens[start..=end]
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A detected visual discontinuity in the source media.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SceneCut {
    pub time: f64,
}

/// Deduplicate scene cuts within `tolerance` seconds of each other, ascending.
pub fn dedup_scene_cuts(mut cuts: Vec<SceneCut>, tolerance: f64) -> Vec<SceneCut> {
    cuts.sort_by(|a, b| a.time.total_cmp(&b.time));
    let mut out: Vec<SceneCut> = Vec::with_capacity(cuts.len());
    for cut in cuts {
        match out.last() {
            Some(prev) if cut.time - prev.time < tolerance => {}
            _ => out.push(cut),
        }
    }
    out
}

/// A candidate clip interval over the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    pub id: String,
    pub start: f64,
    pub end: f64,
    /// Inclusive token indices `[first, last]` into the owning transcript.
    pub token_span: (usize, usize),
    pub text: String,
    pub contains_scene_cuts: u32,
}

impl Window {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Fraction of `self`'s own length that overlaps `other`, in `[0,1]`.
    pub fn overlap_fraction(&self, other: &Window) -> f64 {
        let overlap_start = self.start.max(other.start);
        let overlap_end = self.end.min(other.end);
        let overlap = (overlap_end - overlap_start).max(0.0);
        let len = self.duration();
        if len <= 0.0 {
            0.0
        } else {
            overlap / len
        }
    }
}

/// Deterministic id for a window, stable across runs given identical inputs.
pub fn window_id(media_id: &str, start: f64, end: f64) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    media_id.hash(&mut hasher);
    start.to_bits().hash(&mut hasher);
    end.to_bits().hash(&mut hasher);
    format!("win_{:016x}", hasher.finish())
}

/// Per-window text-derived signals, all normalized to `[0,1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextFeatures {
    pub keyphrases: Vec<(String, f32)>,
    pub coverage_score: f32,
    pub density_score: f32,
    pub filler_ratio: f32,
    pub scene_cut_penalty: f32,
}

/// Per-window grade from the LLM grader, or the sentinel disqualifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmGrade {
    /// `0` is the sentinel value: grading failed and the window is disqualified.
    pub cogency: u8,
    pub quotes: Vec<String>,
    pub salient_terms: Vec<String>,
}

impl LlmGrade {
    pub fn sentinel() -> Self {
        Self {
            cogency: 0,
            quotes: Vec::new(),
            salient_terms: Vec::new(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.cogency == 0
    }
}

/// A window plus its computed signals and final score, in selection order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedClip {
    pub window: Window,
    pub features: TextFeatures,
    pub grade: LlmGrade,
    pub final_score: f64,
    pub rank: u32,
}

/// Crop strategy for reframing to 9:16. See `clipforge-tracking::CropStrategy`
/// for the trait this selects between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CropStrategyKind {
    Center,
    FaceTrackStub,
}

impl fmt::Display for CropStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Center => write!(f, "center"),
            Self::FaceTrackStub => write!(f, "face_track_stub"),
        }
    }
}

/// Encoder chosen for a render, decided once per process and cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncoderProfile {
    HwH264Nvenc,
    CpuH264,
}

/// One caption line: `[start, end)`, the line text, and its speaker label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleEvent {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub speaker_label: Option<String>,
}

/// Target dimensions for the rendered output. Always 1080x1920 per the spec.
pub const TARGET_WIDTH: u32 = 1080;
pub const TARGET_HEIGHT: u32 = 1920;

/// A fully resolved, ready-to-execute render job for one clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPlan {
    pub cut_start: f64,
    pub cut_end: f64,
    pub source_path: std::path::PathBuf,
    pub output_path: std::path::PathBuf,
    pub crop_strategy: CropStrategyKind,
    pub subtitle_events: Vec<SubtitleEvent>,
    pub encoder_profile: EncoderProfile,
    pub target_width: u32,
    pub target_height: u32,
    pub target_fps: f64,
    /// Source audio sample rate, if probed (§4.I: preserved if ≥ 44.1 kHz,
    /// otherwise upsampled to 48 kHz by the renderer).
    pub source_sample_rate_hint: Option<u32>,
}

/// One row of the per-job CSV log, in the exact column order of §6.
#[derive(Debug, Clone)]
pub struct JobLogRow {
    pub video_id: String,
    pub rank: u32,
    pub window_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub keyphrase_score: f32,
    pub density_score: f32,
    pub cogency_score: u8,
    pub final_score: f64,
    pub quotes: Vec<String>,
    pub salient_terms: Vec<String>,
    pub keyphrases: Vec<String>,
    pub scene_cuts: u32,
    pub file_path: String,
    /// First 160 chars of window text, newlines collapsed; `"error: ..."` on
    /// a failed clip (§7 propagation policy).
    pub text_preview: String,
}
