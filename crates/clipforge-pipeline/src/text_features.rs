//! Text Features (§4.E): keyphrase coverage, information-density, and filler
//! detection, computed purely and deterministically from window text plus
//! job-wide corpus statistics (IDF over every window's text in the job).
//!
//! Two keyphrase extractors are combined per §4.E: a statistical TF-IDF-style
//! scorer and a lightweight local "embedding-based" scorer realized as an
//! n-gram co-occurrence affinity model (§9 — no network round-trip; the only
//! calls out are ASR and the LLM grader). Final phrase weight is the max
//! across extractors.

use clipforge_core::{TextFeatures, Window};
use std::collections::{HashMap, HashSet};

const MAX_PHRASES_PER_EXTRACTOR: usize = 10;
const MAX_NGRAM: usize = 3;
const TOP_IDF_FRACTION: f64 = 0.05;
const DENSITY_WEIGHTS: (f64, f64, f64) = (0.4, 0.3, 0.3);

const FILLERS: &[&str] = &[
    "um", "uh", "like", "you know", "i mean", "sort of", "kind of", "basically", "literally",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "is", "are", "was", "were", "be", "been", "being", "to",
    "of", "in", "on", "at", "for", "with", "as", "by", "that", "this", "it", "its", "it's", "i",
    "you", "he", "she", "we", "they", "them", "his", "her", "their", "our", "my", "your", "not",
    "so", "than", "then", "there", "here", "just", "do", "does", "did", "have", "has", "had",
    "can", "could", "will", "would", "should", "if", "into", "up", "out", "about", "from",
];

/// Compute [`TextFeatures`] for every window in a job, in input order.
///
/// This is the entry point: it builds job-wide corpus statistics (IDF) from
/// every window's text, extracts keyphrases per window, and normalizes
/// coverage scores across the whole job before returning — that
/// normalization is why this takes the full slice rather than one window
/// at a time.
pub fn compute_for_job(windows: &[Window]) -> Vec<TextFeatures> {
    let corpus = CorpusStats::build(windows);

    let mut keyphrases_per_window = Vec::with_capacity(windows.len());
    let mut raw_coverage = Vec::with_capacity(windows.len());

    for window in windows {
        let tokens = tokenize(&window.text);
        let keyphrases = extract_keyphrases(&tokens, &corpus);
        let coverage = raw_coverage_sum(&keyphrases, &corpus);
        raw_coverage.push(coverage);
        keyphrases_per_window.push(keyphrases);
    }

    let coverage_scores = min_max_normalize(&raw_coverage);

    windows
        .iter()
        .zip(keyphrases_per_window)
        .zip(coverage_scores)
        .map(|((window, keyphrases), coverage_score)| {
            let tokens = tokenize(&window.text);
            TextFeatures {
                keyphrases,
                coverage_score: coverage_score as f32,
                density_score: density_score(&tokens) as f32,
                filler_ratio: filler_ratio(&tokens) as f32,
                scene_cut_penalty: (window.contains_scene_cuts as f64 / 3.0).min(1.0) as f32,
            }
        })
        .collect()
}

struct CorpusStats {
    /// IDF per unigram, computed over all windows' texts in the job.
    idf: HashMap<String, f64>,
    /// The top 5% of vocabulary by IDF (§4.E coverage score input).
    top_vocab: HashSet<String>,
}

impl CorpusStats {
    fn build(windows: &[Window]) -> Self {
        let doc_count = windows.len().max(1) as f64;
        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        for window in windows {
            let unique_words: HashSet<String> = tokenize(&window.text).into_iter().collect();
            for word in unique_words {
                *doc_freq.entry(word).or_insert(0) += 1;
            }
        }

        let mut idf: HashMap<String, f64> = HashMap::new();
        for (word, df) in &doc_freq {
            idf.insert(word.clone(), (doc_count / *df as f64).ln() + 1.0);
        }

        let mut by_idf: Vec<(&String, &f64)> = idf.iter().collect();
        by_idf.sort_by(|a, b| b.1.total_cmp(a.1));
        let top_n = ((by_idf.len() as f64) * TOP_IDF_FRACTION).ceil() as usize;
        let top_vocab = by_idf
            .into_iter()
            .take(top_n.max(1))
            .map(|(w, _)| w.clone())
            .collect();

        Self { idf, top_vocab }
    }

    fn idf_of(&self, word: &str) -> f64 {
        self.idf.get(word).copied().unwrap_or(1.0)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '\'')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

fn ngrams(tokens: &[String], n: usize) -> Vec<String> {
    if tokens.len() < n {
        return Vec::new();
    }
    (0..=tokens.len() - n)
        .map(|i| tokens[i..i + n].join(" "))
        .collect()
}

/// Statistical extractor: TF (within the window) times corpus IDF, per
/// 1-3 gram.
fn statistical_scores(tokens: &[String], corpus: &CorpusStats) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for n in 1..=MAX_NGRAM {
        let mut tf: HashMap<String, u32> = HashMap::new();
        for gram in ngrams(tokens, n) {
            *tf.entry(gram).or_insert(0) += 1;
        }
        for (gram, count) in tf {
            let idf = gram
                .split(' ')
                .map(|w| corpus.idf_of(w))
                .fold(0.0, f64::max);
            let score = count as f64 * idf;
            scores
                .entry(gram)
                .and_modify(|s| *s = s.max(score))
                .or_insert(score);
        }
    }
    scores
}

/// "Embedding-based" extractor realized as a local n-gram co-occurrence
/// affinity model (§4.E, §9): scores a phrase by how strongly its
/// constituent words co-occur as immediate neighbors elsewhere in the
/// window, a cheap proxy for semantic cohesion with no model call.
fn affinity_scores(tokens: &[String], corpus: &CorpusStats) -> HashMap<String, f64> {
    let mut bigram_strength: HashMap<(String, String), u32> = HashMap::new();
    for pair in tokens.windows(2) {
        *bigram_strength
            .entry((pair[0].clone(), pair[1].clone()))
            .or_insert(0) += 1;
    }

    let mut scores: HashMap<String, f64> = HashMap::new();
    for n in 1..=MAX_NGRAM {
        for gram_words in tokens.windows(n) {
            let gram = gram_words.join(" ");
            let internal_strength: f64 = gram_words
                .windows(2)
                .map(|pair| {
                    *bigram_strength
                        .get(&(pair[0].clone(), pair[1].clone()))
                        .unwrap_or(&0) as f64
                })
                .sum();
            let content_boost: f64 = gram_words
                .iter()
                .map(|w| if is_stopword(w) { 0.5 } else { corpus.idf_of(w) })
                .sum::<f64>()
                / gram_words.len() as f64;
            let score = (internal_strength + 1.0) * content_boost;
            scores
                .entry(gram)
                .and_modify(|s| *s = s.max(score))
                .or_insert(score);
        }
    }
    scores
}

fn normalize_to_unit(mut scored: Vec<(String, f64)>) -> Vec<(String, f32)> {
    let max = scored.iter().map(|(_, s)| *s).fold(0.0, f64::max);
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(MAX_PHRASES_PER_EXTRACTOR);
    scored
        .into_iter()
        .map(|(phrase, score)| {
            let normalized = if max > 0.0 { score / max } else { 0.0 };
            (phrase, normalized as f32)
        })
        .collect()
}

/// Union of both extractors' top phrases, weight = max across extractors.
fn extract_keyphrases(tokens: &[String], corpus: &CorpusStats) -> Vec<(String, f32)> {
    if tokens.is_empty() {
        return Vec::new();
    }
    let statistical = normalize_to_unit(statistical_scores(tokens, corpus).into_iter().collect());
    let affinity = normalize_to_unit(affinity_scores(tokens, corpus).into_iter().collect());

    let mut combined: HashMap<String, f32> = HashMap::new();
    for (phrase, weight) in statistical.into_iter().chain(affinity) {
        combined
            .entry(phrase)
            .and_modify(|w| *w = w.max(weight))
            .or_insert(weight);
    }
    let mut result: Vec<(String, f32)> = combined.into_iter().collect();
    result.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    result
}

/// Sum of phrase weights whose phrase's words are all in the job-wide top
/// IDF vocabulary (§4.E coverage score, pre-normalization).
fn raw_coverage_sum(keyphrases: &[(String, f32)], corpus: &CorpusStats) -> f64 {
    keyphrases
        .iter()
        .filter(|(phrase, _)| phrase.split(' ').all(|w| corpus.top_vocab.contains(w)))
        .map(|(_, w)| *w as f64)
        .sum()
}

fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    values
        .iter()
        .map(|v| if range > 1e-9 { (v - min) / range } else { 0.0 })
        .map(|v| v.clamp(0.0, 1.0))
        .collect()
}

fn density_score(tokens: &[String]) -> f64 {
    let content: Vec<&String> = tokens.iter().filter(|w| !is_stopword(w)).collect();
    if content.is_empty() {
        return 0.0;
    }

    let unique: HashSet<&&String> = content.iter().collect();
    let type_token_ratio = unique.len() as f64 / content.len() as f64;

    let mut freq: HashMap<&str, u32> = HashMap::new();
    for word in &content {
        *freq.entry(word.as_str()).or_insert(0) += 1;
    }
    let n = content.len() as f64;
    let entropy: f64 = freq
        .values()
        .map(|&count| {
            let p = count as f64 / n;
            -p * p.log2()
        })
        .sum();
    let unique_types = freq.len() as f64;
    let entropy_normalized = if unique_types > 1.0 {
        entropy / unique_types.log2()
    } else {
        0.0
    };

    let content_word_ratio = if tokens.is_empty() {
        0.0
    } else {
        content.len() as f64 / tokens.len() as f64
    };

    let (w_ttr, w_entropy, w_content) = DENSITY_WEIGHTS;
    (w_ttr * type_token_ratio + w_entropy * entropy_normalized + w_content * content_word_ratio)
        .clamp(0.0, 1.0)
}

fn filler_ratio(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let joined = tokens.join(" ");
    let mut filler_word_count = 0usize;
    for filler in FILLERS {
        let filler_len = filler.split(' ').count();
        filler_word_count += joined.matches(filler).count() * filler_len;
    }
    (filler_word_count as f64 / tokens.len() as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_with_text(id: &str, text: &str) -> Window {
        Window {
            id: id.to_string(),
            start: 0.0,
            end: 90.0,
            token_span: (0, 0),
            text: text.to_string(),
            contains_scene_cuts: 0,
        }
    }

    #[test]
    fn all_subsignals_stay_in_unit_range() {
        let windows = vec![
            window_with_text("a", "the quick brown fox jumps over the lazy dog um like you know"),
            window_with_text("b", "rust ownership borrowing lifetimes memory safety concurrency"),
        ];
        let features = compute_for_job(&windows);
        for f in &features {
            assert!((0.0..=1.0).contains(&f.coverage_score));
            assert!((0.0..=1.0).contains(&f.density_score));
            assert!((0.0..=1.0).contains(&f.filler_ratio));
            assert!((0.0..=1.0).contains(&f.scene_cut_penalty));
            for (_, w) in &f.keyphrases {
                assert!((0.0..=1.0).contains(w));
            }
        }
    }

    #[test]
    fn filler_heavy_window_scores_higher_filler_ratio() {
        let windows = vec![
            window_with_text("a", "um uh like you know basically literally sort of kind of"),
            window_with_text("b", "quantum computing relies on superposition and entanglement"),
        ];
        let features = compute_for_job(&windows);
        assert!(features[0].filler_ratio > features[1].filler_ratio);
    }

    #[test]
    fn dense_varied_vocabulary_scores_higher_density() {
        let windows = vec![
            window_with_text("a", "the the the the the the the the the the"),
            window_with_text(
                "b",
                "quantum entanglement enables nonlocal correlations between distant particles",
            ),
        ];
        let features = compute_for_job(&windows);
        assert!(features[1].density_score > features[0].density_score);
    }

    #[test]
    fn empty_window_text_yields_zeroed_features() {
        let windows = vec![window_with_text("a", "")];
        let features = compute_for_job(&windows);
        assert_eq!(features[0].density_score, 0.0);
        assert_eq!(features[0].filler_ratio, 0.0);
        assert!(features[0].keyphrases.is_empty());
    }

    #[test]
    fn keyphrases_are_capped_and_deduplicated() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu nu xi";
        let windows = vec![window_with_text("a", text)];
        let features = compute_for_job(&windows);
        let phrases: HashSet<&String> = features[0].keyphrases.iter().map(|(p, _)| p).collect();
        assert_eq!(phrases.len(), features[0].keyphrases.len());
    }

    #[test]
    fn scene_cut_penalty_matches_formula() {
        let mut window = window_with_text("a", "hello world");
        window.contains_scene_cuts = 6;
        let features = compute_for_job(std::slice::from_ref(&window));
        assert_eq!(features[0].scene_cut_penalty, 1.0);
    }
}
