//! Ranker (§4.G): blends text features and the LLM grade into one final
//! score per window, then greedily selects the top-K non-overlapping
//! clips.
//!
//! Windows with a sentinel grade (`cogency == 0`) are excluded before
//! scoring (§3, §7). Selection order, not score order, is the output order
//! (§4.G) — rank 1 is the first clip picked, not necessarily the
//! highest-scoring window overall once overlap exclusion is applied.

use clipforge_core::{LlmGrade, RankedClip, RankerWeights, TextFeatures, Window};

/// Final `score = weights · (coverage, density, cogency/5, quote_bonus,
/// scene_cut_penalty, filler_ratio)`, clamped to `[0,1]` (§8 invariant 8).
pub fn score(features: &TextFeatures, grade: &LlmGrade, weights: &RankerWeights) -> f64 {
    let quote_bonus = (grade.quotes.len() as f64 / 3.0).min(1.0);
    let raw = weights.coverage * features.coverage_score as f64
        + weights.density * features.density_score as f64
        + weights.cogency * (grade.cogency as f64 / 5.0)
        + weights.quote_bonus * quote_bonus
        + weights.scene_cut_penalty * features.scene_cut_penalty as f64
        + weights.filler_ratio * features.filler_ratio as f64;
    raw.clamp(0.0, 1.0)
}

/// Fraction of `candidate`'s own length that overlaps `picked`, in `[0,1]`.
fn overlap_fraction_of_candidate(candidate: &Window, picked: &Window) -> f64 {
    let overlap_start = candidate.start.max(picked.start);
    let overlap_end = candidate.end.min(picked.end);
    let overlap = (overlap_end - overlap_start).max(0.0);
    let len = candidate.end - candidate.start;
    if len <= 0.0 {
        0.0
    } else {
        overlap / len
    }
}

struct Candidate {
    window: Window,
    features: TextFeatures,
    grade: LlmGrade,
    final_score: f64,
}

/// Score every window, exclude sentinel grades, and greedily select up to
/// `k` non-overlapping clips in selection order.
pub fn rank(
    windows: Vec<Window>,
    features: Vec<TextFeatures>,
    grades: Vec<LlmGrade>,
    weights: &RankerWeights,
    k: usize,
) -> Vec<RankedClip> {
    let mut candidates: Vec<Candidate> = windows
        .into_iter()
        .zip(features)
        .zip(grades)
        .filter_map(|((window, features), grade)| {
            if grade.is_sentinel() {
                return None;
            }
            let final_score = score(&features, &grade, weights);
            Some(Candidate {
                window,
                features,
                grade,
                final_score,
            })
        })
        .collect();

    // Highest score first; ties broken by higher cogency, higher coverage,
    // then earlier start (§4.G).
    candidates.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| b.grade.cogency.cmp(&a.grade.cogency))
            .then_with(|| b.features.coverage_score.total_cmp(&a.features.coverage_score))
            .then_with(|| a.window.start.total_cmp(&b.window.start))
    });

    let mut selected: Vec<RankedClip> = Vec::new();
    for candidate in candidates {
        if selected.len() >= k {
            break;
        }
        let overlaps_too_much = selected
            .iter()
            .any(|picked| overlap_fraction_of_candidate(&candidate.window, &picked.window) > 0.10);
        if overlaps_too_much {
            continue;
        }
        selected.push(RankedClip {
            window: candidate.window,
            features: candidate.features,
            grade: candidate.grade,
            final_score: candidate.final_score,
            rank: (selected.len() + 1) as u32,
        });
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(id: &str, start: f64, end: f64) -> Window {
        Window {
            id: id.to_string(),
            start,
            end,
            token_span: (0, 0),
            text: String::new(),
            contains_scene_cuts: 0,
        }
    }

    fn features(coverage: f32, density: f32, filler: f32, scene_cut: f32) -> TextFeatures {
        TextFeatures {
            keyphrases: Vec::new(),
            coverage_score: coverage,
            density_score: density,
            filler_ratio: filler,
            scene_cut_penalty: scene_cut,
        }
    }

    fn grade(cogency: u8, quote_count: usize) -> LlmGrade {
        LlmGrade {
            cogency,
            quotes: vec!["q".to_string(); quote_count],
            salient_terms: Vec::new(),
        }
    }

    #[test]
    fn score_is_always_clamped_to_unit_range() {
        let weights = RankerWeights::default();
        let worst = features(0.0, 0.0, 1.0, 1.0);
        let worst_grade = grade(1, 0);
        let s = score(&worst, &worst_grade, &weights);
        assert!((0.0..=1.0).contains(&s));

        let best = features(1.0, 1.0, 0.0, 0.0);
        let best_grade = grade(5, 3);
        let s = score(&best, &best_grade, &weights);
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn sentinel_grade_is_excluded_from_selection() {
        let windows = vec![window("a", 0.0, 90.0), window("b", 200.0, 290.0)];
        let feats = vec![features(1.0, 1.0, 0.0, 0.0), features(1.0, 1.0, 0.0, 0.0)];
        let grades = vec![LlmGrade::sentinel(), grade(5, 2)];
        let selected = rank(windows, feats, grades, &RankerWeights::default(), 5);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].window.id, "b");
    }

    #[test]
    fn non_overlapping_windows_are_all_selected() {
        let windows = vec![
            window("a", 0.0, 90.0),
            window("b", 100.0, 190.0),
            window("c", 200.0, 290.0),
        ];
        let feats = vec![features(0.8, 0.8, 0.0, 0.0); 3];
        let grades = vec![grade(4, 1); 3];
        let selected = rank(windows, feats, grades, &RankerWeights::default(), 3);
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn heavily_overlapping_window_is_excluded_after_first_pick() {
        let windows = vec![window("a", 0.0, 90.0), window("b", 5.0, 95.0)];
        let feats = vec![features(0.9, 0.9, 0.0, 0.0), features(0.5, 0.5, 0.0, 0.0)];
        let grades = vec![grade(5, 2), grade(3, 0)];
        let selected = rank(windows, feats, grades, &RankerWeights::default(), 2);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].window.id, "a");
    }

    #[test]
    fn rank_values_are_contiguous_from_one() {
        let windows = vec![window("a", 0.0, 90.0), window("b", 200.0, 290.0)];
        let feats = vec![features(0.8, 0.8, 0.0, 0.0); 2];
        let grades = vec![grade(4, 1); 2];
        let selected = rank(windows, feats, grades, &RankerWeights::default(), 2);
        let ranks: Vec<u32> = selected.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
    }

    #[test]
    fn tie_break_prefers_higher_cogency_then_earlier_start() {
        let windows = vec![window("a", 0.0, 90.0), window("b", 500.0, 590.0)];
        // Equal coverage/density/filler/scene_cut but differing cogency
        // below drives identical final scores only if cogency weight
        // contribution ties; instead assert ordering follows the actual
        // score when cogency differs, since cogency feeds the score too.
        let feats = vec![features(0.5, 0.5, 0.0, 0.0); 2];
        let grades = vec![grade(3, 0), grade(5, 0)];
        let selected = rank(windows, feats, grades, &RankerWeights::default(), 1);
        assert_eq!(selected[0].window.id, "b");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn arb_unit() -> impl Strategy<Value = f32> {
            0.0f32..=1.0f32
        }

        /// Invariant 8 (§8): `score()` is always in `[0,1]` regardless of
        /// the feature/grade/weight combination fed in, since it clamps
        /// its weighted sum before returning.
        proptest! {
            #[test]
            fn score_is_always_in_unit_range(
                coverage in arb_unit(),
                density in arb_unit(),
                filler in arb_unit(),
                scene_cut in arb_unit(),
                cogency in 1u8..=5,
                quote_count in 0usize..6,
            ) {
                let weights = RankerWeights::default();
                let feats = features(coverage, density, filler, scene_cut);
                let g = grade(cogency, quote_count);
                let s = score(&feats, &g, &weights);
                prop_assert!((0.0..=1.0).contains(&s));
            }
        }

        /// Invariant 2 (§8): any two selected clips overlap by at most 10%
        /// of the shorter clip's own length — the greedy selection loop
        /// rejects any candidate that would violate this against an
        /// already-picked clip.
        proptest! {
            #[test]
            fn selected_clips_never_overlap_past_tolerance(
                starts in proptest::collection::vec(0.0f64..1000.0, 2..10),
                cogencies in proptest::collection::vec(1u8..=5, 2..10),
            ) {
                let n = starts.len().min(cogencies.len());
                let windows: Vec<Window> = starts[..n]
                    .iter()
                    .enumerate()
                    .map(|(i, &s)| window(&format!("w{i}"), s, s + 60.0))
                    .collect();
                let feats = vec![features(0.5, 0.5, 0.0, 0.0); n];
                let grades: Vec<LlmGrade> = cogencies[..n].iter().map(|&c| grade(c, 1)).collect();

                let selected = rank(windows, feats, grades, &RankerWeights::default(), n);

                for i in 0..selected.len() {
                    for j in 0..selected.len() {
                        if i == j {
                            continue;
                        }
                        let frac = overlap_fraction_of_candidate(&selected[i].window, &selected[j].window);
                        prop_assert!(frac <= 0.10 + 1e-9);
                    }
                }
            }
        }
    }
}
