//! Windower (§4.D): segments a word-timestamped transcript into overlapping
//! candidate clip windows whose boundaries snap to speech and scene
//! structure.
//!
//! Anchors are generated every `stride` seconds across the transcript;
//! each anchor's nominal `[a, a+duration]` interval is snapped to the
//! nearest token boundary that sits at a natural speech pause, unless a
//! scene cut sits closer to the nominal boundary, in which case the scene
//! cut wins (§4.D). Anchors with no acceptable boundary, or whose snapped
//! length falls outside `[min, max]`, are discarded. Near-duplicate windows
//! (≥85% token-span overlap) are merged, keeping whichever boundary sits
//! closer to a scene cut.

use clipforge_core::{window_id, SceneCut, Token, Transcript, Window};

/// Tolerance within which a nominal boundary may snap to a token boundary.
const SNAP_TOLERANCE_SECS: f64 = 0.75;
/// Minimum silence gap required for a token boundary to count as a
/// "speech-pause" boundary (§4.D).
const PAUSE_GAP_SECS: f64 = 0.15;
/// A scene cut within this distance of a nominal boundary overrides the
/// pause heuristic.
const SCENE_CUT_OVERRIDE_SECS: f64 = 1.5;
/// Windows sharing at least this fraction of their token span are
/// considered near-duplicates and merged.
const DEDUP_OVERLAP_FRACTION: f64 = 0.85;

#[derive(Debug, Clone, Copy)]
pub struct WindowerParams {
    pub target: f64,
    pub stride: f64,
    pub min: f64,
    pub max: f64,
}

/// Produce candidate windows over `transcript`, ascending by `start`.
///
/// `duration` is the media's total duration, used to bound anchor
/// generation and to produce the single full-span window for short media.
pub fn windows(
    transcript: &Transcript,
    cuts: &[SceneCut],
    duration: f64,
    params: WindowerParams,
    media_id: &str,
) -> Vec<Window> {
    if transcript.is_empty() {
        return Vec::new();
    }
    let tokens = &transcript.tokens;

    if duration <= params.min {
        let start = 0.0;
        let end = duration.max(tokens.last().map(|t| t.end).unwrap_or(0.0));
        return vec![build_window(media_id, tokens, cuts, start, end, 0, tokens.len() - 1)];
    }

    let mut candidates = Vec::new();
    let mut anchor = 0.0;
    while anchor <= duration - params.min {
        let nominal_start = anchor;
        let nominal_end = (anchor + params.target).min(duration);

        let Some((start_idx, start_time)) =
            snap_start(tokens, cuts, nominal_start)
        else {
            anchor += params.stride;
            continue;
        };
        let Some((end_idx, end_time)) = snap_end(tokens, cuts, nominal_end) else {
            anchor += params.stride;
            continue;
        };

        if end_idx < start_idx || end_time <= start_time {
            anchor += params.stride;
            continue;
        }
        let span = end_time - start_time;
        if span < params.min || span > params.max {
            anchor += params.stride;
            continue;
        }

        candidates.push(build_window(
            media_id, tokens, cuts, start_time, end_time, start_idx, end_idx,
        ));
        anchor += params.stride;
    }

    let mut merged = dedup_by_token_overlap(candidates, cuts);
    merged.sort_by(|a, b| a.start.total_cmp(&b.start));
    merged
}

fn build_window(
    media_id: &str,
    tokens: &[Token],
    cuts: &[SceneCut],
    start: f64,
    end: f64,
    start_idx: usize,
    end_idx: usize,
) -> Window {
    let text = tokens[start_idx..=end_idx]
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let contains_scene_cuts = cuts.iter().filter(|c| c.time > start && c.time < end).count() as u32;
    Window {
        id: window_id(media_id, start, end),
        start,
        end,
        token_span: (start_idx, end_idx),
        text,
        contains_scene_cuts,
    }
}

/// Snap a nominal start time to a token-start boundary, preferring a nearby
/// scene cut over the speech-pause heuristic (§4.D).
fn snap_start(tokens: &[Token], cuts: &[SceneCut], nominal: f64) -> Option<(usize, f64)> {
    if let Some(cut_time) = nearest_scene_cut(cuts, nominal, SCENE_CUT_OVERRIDE_SECS) {
        if let Some(hit) = nearest_token_start(tokens, cut_time, SNAP_TOLERANCE_SECS, None) {
            return Some(hit);
        }
    }
    nearest_token_start(tokens, nominal, SNAP_TOLERANCE_SECS, Some(PAUSE_GAP_SECS))
}

/// Snap a nominal end time to a token-end boundary, preferring a nearby
/// scene cut over the speech-pause heuristic (§4.D).
fn snap_end(tokens: &[Token], cuts: &[SceneCut], nominal: f64) -> Option<(usize, f64)> {
    if let Some(cut_time) = nearest_scene_cut(cuts, nominal, SCENE_CUT_OVERRIDE_SECS) {
        if let Some(hit) = nearest_token_end(tokens, cut_time, SNAP_TOLERANCE_SECS, None) {
            return Some(hit);
        }
    }
    nearest_token_end(tokens, nominal, SNAP_TOLERANCE_SECS, Some(PAUSE_GAP_SECS))
}

fn nearest_scene_cut(cuts: &[SceneCut], target: f64, tolerance: f64) -> Option<f64> {
    cuts.iter()
        .map(|c| c.time)
        .filter(|t| (t - target).abs() <= tolerance)
        .min_by(|a, b| (a - target).abs().total_cmp(&(b - target).abs()))
}

/// Nearest token whose `start` lies within `tolerance` of `target`. When
/// `min_pause` is set, the token's predecessor must end at least that long
/// before it (a genuine speech pause); index 0 has no predecessor and
/// always qualifies.
fn nearest_token_start(
    tokens: &[Token],
    target: f64,
    tolerance: f64,
    min_pause: Option<f64>,
) -> Option<(usize, f64)> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| (t.start - target).abs() <= tolerance)
        .filter(|(idx, t)| match (min_pause, idx.checked_sub(1)) {
            (Some(gap), Some(prev_idx)) => t.start - tokens[prev_idx].end >= gap,
            (Some(_), None) => true,
            (None, _) => true,
        })
        .map(|(idx, t)| (idx, t.start))
        .min_by(|a, b| (a.1 - target).abs().total_cmp(&(b.1 - target).abs()))
}

/// Nearest token whose `end` lies within `tolerance` of `target`. When
/// `min_pause` is set, the following token must start at least that long
/// after it; the last token has no successor and always qualifies.
fn nearest_token_end(
    tokens: &[Token],
    target: f64,
    tolerance: f64,
    min_pause: Option<f64>,
) -> Option<(usize, f64)> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| (t.end - target).abs() <= tolerance)
        .filter(|(idx, t)| match min_pause {
            Some(gap) if *idx + 1 < tokens.len() => tokens[*idx + 1].start - t.end >= gap,
            _ => true,
        })
        .map(|(idx, t)| (idx, t.end))
        .min_by(|a, b| (a.1 - target).abs().total_cmp(&(b.1 - target).abs()))
}

fn token_span_overlap_fraction(a: (usize, usize), b: (usize, usize)) -> f64 {
    let lo = a.0.max(b.0);
    let hi = a.1.min(b.1);
    if hi < lo {
        return 0.0;
    }
    let overlap = (hi - lo + 1) as f64;
    let len_a = (a.1 - a.0 + 1) as f64;
    let len_b = (b.1 - b.0 + 1) as f64;
    overlap / len_a.min(len_b)
}

fn closeness_to_nearest_cut(window: &Window, cuts: &[SceneCut]) -> f64 {
    let start_dist = cuts
        .iter()
        .map(|c| (c.time - window.start).abs())
        .fold(f64::INFINITY, f64::min);
    let end_dist = cuts
        .iter()
        .map(|c| (c.time - window.end).abs())
        .fold(f64::INFINITY, f64::min);
    start_dist.min(end_dist)
}

/// Merge windows whose token spans overlap ≥ [`DEDUP_OVERLAP_FRACTION`],
/// keeping whichever sits closer to a scene cut (earlier wins ties, §4.D).
fn dedup_by_token_overlap(mut candidates: Vec<Window>, cuts: &[SceneCut]) -> Vec<Window> {
    candidates.sort_by(|a, b| a.start.total_cmp(&b.start));
    let mut kept: Vec<Window> = Vec::new();
    for candidate in candidates.drain(..) {
        let dup_idx = kept
            .iter()
            .position(|k| token_span_overlap_fraction(k.token_span, candidate.token_span) >= DEDUP_OVERLAP_FRACTION);
        match dup_idx {
            Some(idx) => {
                let existing_closeness = closeness_to_nearest_cut(&kept[idx], cuts);
                let candidate_closeness = closeness_to_nearest_cut(&candidate, cuts);
                if candidate_closeness < existing_closeness {
                    kept[idx] = candidate;
                }
            }
            None => kept.push(candidate),
        }
    }
    kept
}
