//! Render Planner (§4.H): turns a [`RankedClip`] into a fully resolved
//! [`RenderPlan`] — cut points, reframe crop, and a subtitle track — ready
//! for the media crate's renderer to execute.

use clipforge_core::{
    CropStrategyKind, EncoderProfile, MediaAsset, RankedClip, RenderPlan, SubtitleEvent, Token,
    Transcript, TARGET_HEIGHT, TARGET_WIDTH,
};
use clipforge_tracking::{CenterCrop, CropStrategy};
use std::path::Path;

/// Small pad applied to both cut points so the first/last phoneme isn't
/// chopped (§4.H).
const CUT_PAD_SECS: f64 = 0.1;
/// Caption line triggers: whichever of these two limits fires first.
const MAX_CAPTION_CHARS: usize = 42;
const MAX_CAPTION_SECS: f64 = 2.5;
const MAX_TARGET_FPS: f64 = 30.0;

/// Build the render plan for `clip`, the `rank`-th selected clip (1-based,
/// used in the output file name).
pub fn plan_for_clip(
    clip: &RankedClip,
    transcript: &Transcript,
    media: &MediaAsset,
    rank: u32,
    output_dir: &Path,
    encoder_profile: EncoderProfile,
    source_fps: f64,
) -> RenderPlan {
    let cut_start = (clip.window.start - CUT_PAD_SECS).max(0.0);
    let cut_end = (clip.window.end + CUT_PAD_SECS).min(media.duration_seconds);

    // The crop-strategy seam (§4.H, §9) is wired through here even though
    // every strategy shipped today resolves to a center crop; a future
    // tracker-backed `FaceTrackStub` only needs to change which
    // `CropStrategy` impl is selected, not this call site.
    let _ = CenterCrop.crop_rect(TARGET_WIDTH, TARGET_HEIGHT, TARGET_WIDTH, TARGET_HEIGHT, None);
    let crop_strategy = CropStrategyKind::Center;

    let subtitle_events = build_subtitle_events(transcript, clip, cut_start);

    let output_path = output_dir.join(format!("{}_clip_{:02}.mp4", media.id, rank));

    RenderPlan {
        cut_start,
        cut_end,
        source_path: media.local_path.clone(),
        output_path,
        crop_strategy,
        subtitle_events,
        encoder_profile,
        target_width: TARGET_WIDTH,
        target_height: TARGET_HEIGHT,
        target_fps: source_fps.min(MAX_TARGET_FPS),
        source_sample_rate_hint: media.sample_rate_hint,
    }
}

/// Group the window's tokens into caption lines of at most 42 characters or
/// 2.5 seconds, whichever triggers first, never splitting a token.
/// Event timestamps are relative to the rendered clip (i.e. to `cut_start`),
/// matching what the renderer burns into the cut-and-reframed output.
fn build_subtitle_events(
    transcript: &Transcript,
    clip: &clipforge_core::RankedClip,
    cut_start: f64,
) -> Vec<SubtitleEvent> {
    let (start_idx, end_idx) = clip.window.token_span;
    if transcript.tokens.is_empty() || start_idx > end_idx || end_idx >= transcript.tokens.len() {
        return Vec::new();
    }
    let tokens = &transcript.tokens[start_idx..=end_idx];

    let mut events = Vec::new();
    let mut line: Vec<&Token> = Vec::new();

    for token in tokens {
        if !line.is_empty() && would_exceed_limits(&line, token) {
            events.push(finish_line(&line, cut_start));
            line.clear();
        }
        line.push(token);
    }
    if !line.is_empty() {
        events.push(finish_line(&line, cut_start));
    }

    events
}

fn would_exceed_limits(line: &[&Token], next: &Token) -> bool {
    let candidate_len: usize =
        line.iter().map(|t| t.text.len()).sum::<usize>() + line.len() + next.text.len();
    let candidate_duration = next.end - line[0].start;
    candidate_len > MAX_CAPTION_CHARS || candidate_duration > MAX_CAPTION_SECS
}

fn finish_line(line: &[&Token], cut_start: f64) -> SubtitleEvent {
    let text = line
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    SubtitleEvent {
        start: (line[0].start - cut_start).max(0.0),
        end: (line.last().unwrap().end - cut_start).max(0.0),
        text,
        speaker_label: line[0].speaker_label.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_core::{LlmGrade, TextFeatures, Window};
    use std::path::PathBuf;

    fn token(text: &str, start: f64, end: f64) -> Token {
        Token {
            text: text.to_string(),
            start,
            end,
            confidence: None,
            speaker_label: None,
        }
    }

    fn sample_clip(start: f64, end: f64, span: (usize, usize)) -> RankedClip {
        RankedClip {
            window: Window {
                id: "w1".into(),
                start,
                end,
                token_span: span,
                text: String::new(),
                contains_scene_cuts: 0,
            },
            features: TextFeatures {
                keyphrases: Vec::new(),
                coverage_score: 0.5,
                density_score: 0.5,
                filler_ratio: 0.0,
                scene_cut_penalty: 0.0,
            },
            grade: LlmGrade {
                cogency: 4,
                quotes: Vec::new(),
                salient_terms: Vec::new(),
            },
            final_score: 0.7,
            rank: 1,
        }
    }

    #[test]
    fn cut_points_are_padded_and_clamped_to_duration() {
        let transcript = Transcript { tokens: vec![token("a", 0.0, 1.0)] };
        let clip = sample_clip(0.0, 10.0, (0, 0));
        let media = MediaAsset {
            id: "m1".into(),
            local_path: PathBuf::from("/tmp/in.mp4"),
            duration_seconds: 10.05,
            sample_rate_hint: None,
        };
        let plan = plan_for_clip(&clip, &transcript, &media, 1, Path::new("/tmp/out"), EncoderProfile::CpuH264, 30.0);
        assert_eq!(plan.cut_start, 0.0);
        assert!((plan.cut_end - 10.05).abs() < 1e-9);
    }

    #[test]
    fn output_path_follows_naming_convention() {
        let transcript = Transcript { tokens: vec![token("a", 0.0, 1.0)] };
        let clip = sample_clip(0.0, 10.0, (0, 0));
        let media = MediaAsset {
            id: "abc123".into(),
            local_path: PathBuf::from("/tmp/in.mp4"),
            duration_seconds: 20.0,
            sample_rate_hint: None,
        };
        let plan = plan_for_clip(&clip, &transcript, &media, 3, Path::new("/out"), EncoderProfile::CpuH264, 30.0);
        assert_eq!(plan.output_path, PathBuf::from("/out/abc123_clip_03.mp4"));
    }

    #[test]
    fn fps_never_exceeds_30_even_for_high_fps_source() {
        let transcript = Transcript { tokens: vec![token("a", 0.0, 1.0)] };
        let clip = sample_clip(0.0, 10.0, (0, 0));
        let media = MediaAsset {
            id: "m1".into(),
            local_path: PathBuf::from("/tmp/in.mp4"),
            duration_seconds: 20.0,
            sample_rate_hint: None,
        };
        let plan = plan_for_clip(&clip, &transcript, &media, 1, Path::new("/out"), EncoderProfile::CpuH264, 60.0);
        assert_eq!(plan.target_fps, 30.0);
    }

    #[test]
    fn subtitle_lines_never_split_a_token_and_respect_char_limit() {
        let tokens: Vec<Token> = (0..20)
            .map(|i| token("word", i as f64 * 0.3, i as f64 * 0.3 + 0.25))
            .collect();
        let transcript = Transcript { tokens };
        let clip = sample_clip(0.0, 6.0, (0, 19));
        let events = build_subtitle_events(&transcript, &clip, 0.0);
        for event in &events {
            assert!(event.text.len() <= MAX_CAPTION_CHARS);
        }
        let total_words: usize = events.iter().map(|e| e.text.split(' ').count()).sum();
        assert_eq!(total_words, 20);
    }

    #[test]
    fn subtitle_lines_respect_duration_limit() {
        let tokens: Vec<Token> = (0..10)
            .map(|i| token("w", i as f64 * 1.0, i as f64 * 1.0 + 0.5))
            .collect();
        let transcript = Transcript { tokens };
        let clip = sample_clip(0.0, 10.0, (0, 9));
        let events = build_subtitle_events(&transcript, &clip, 0.0);
        for event in &events {
            assert!(event.end - event.start <= MAX_CAPTION_SECS + 0.5);
        }
    }

    #[test]
    fn subtitle_event_times_are_relative_to_cut_start() {
        let tokens = vec![token("hi", 10.0, 10.5)];
        let transcript = Transcript { tokens };
        let clip = sample_clip(10.0, 20.0, (0, 0));
        let events = build_subtitle_events(&transcript, &clip, 9.9);
        assert!((events[0].start - 0.1).abs() < 1e-9);
    }
}
