//! ASR Client (§4.B): submits the ingested audio to the transcription
//! endpoint and returns a word-timestamped [`Transcript`].
//!
//! Transport is a single multipart POST — no dynamically-typed JSON value
//! survives past [`transcribe`]'s boundary (§9): the wire shape
//! ([`AsrResponse`]) is parsed and immediately converted into
//! `clipforge_core::Token`/`Transcript`.

use crate::error::{PipelineError, Result};
use clipforge_core::{Token, Transcript};
use reqwest::multipart;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const TIMEOUT: Duration = Duration::from_secs(600);
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(8),
    Duration::from_secs(32),
];

#[derive(Debug, Deserialize)]
struct AsrResponse {
    #[serde(default)]
    words: Vec<AsrWord>,
}

#[derive(Debug, Deserialize)]
struct AsrWord {
    word: String,
    start: f64,
    end: f64,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    speaker: Option<String>,
}

/// Transcribe `audio_path` against `whisper_server_url`.
///
/// Retries up to [`MAX_RETRIES`] times on HTTP 5xx or connection errors with
/// exponential backoff; a malformed response body is not retried (§4.B).
/// Tokens with empty or whitespace-only text are dropped.
pub async fn transcribe(
    client: &reqwest::Client,
    whisper_server_url: &str,
    audio_path: &Path,
) -> Result<Transcript> {
    let bytes = tokio::fs::read(audio_path).await?;
    let file_name = audio_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio.wav".to_string());

    let url = format!("{}/audio/transcriptions", whisper_server_url.trim_end_matches('/'));

    let mut attempt = 0u32;
    loop {
        let part = multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
        let form = multipart::Form::new()
            .part("file", part)
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word")
            .text("language", "auto");

        let result = client
            .post(&url)
            .timeout(TIMEOUT)
            .multipart(form)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| PipelineError::Asr(format!("reading response body: {e}")))?;
                return parse_response(&body);
            }
            Ok(response) if response.status().is_server_error() && attempt < MAX_RETRIES => {
                warn!(attempt, status = %response.status(), "asr server error, retrying");
            }
            Ok(response) => {
                return Err(PipelineError::Asr(format!(
                    "transcription endpoint returned {}",
                    response.status()
                )));
            }
            Err(e) if attempt < MAX_RETRIES && (e.is_timeout() || e.is_connect()) => {
                warn!(attempt, error = %e, "asr transport error, retrying");
            }
            Err(e) => return Err(PipelineError::Http(e)),
        }

        tokio::time::sleep(RETRY_BACKOFF[attempt as usize]).await;
        attempt += 1;
    }
}

fn parse_response(body: &str) -> Result<Transcript> {
    let parsed: AsrResponse =
        serde_json::from_str(body).map_err(|e| PipelineError::Asr(format!("malformed response: {e}")))?;

    let mut tokens: Vec<Token> = Vec::with_capacity(parsed.words.len());
    for word in parsed.words {
        let text = word.word.trim();
        if text.is_empty() {
            continue;
        }
        tokens.push(Token {
            text: normalize_whitespace(text),
            start: word.start,
            end: word.end.max(word.start),
            confidence: word.confidence,
            speaker_label: word.speaker,
        });
    }

    info!(token_count = tokens.len(), "transcription complete");
    Ok(Transcript { tokens })
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_response() {
        let body = r#"{"words": [
            {"word": "hello", "start": 0.0, "end": 0.4},
            {"word": "world", "start": 0.4, "end": 0.9, "confidence": 0.95, "speaker": "A"}
        ]}"#;
        let transcript = parse_response(body).expect("parse");
        assert_eq!(transcript.tokens.len(), 2);
        assert_eq!(transcript.tokens[1].text, "world");
        assert_eq!(transcript.tokens[1].speaker_label.as_deref(), Some("A"));
    }

    #[test]
    fn drops_whitespace_only_words() {
        let body = r#"{"words": [
            {"word": "  ", "start": 0.0, "end": 0.1},
            {"word": "hi", "start": 0.1, "end": 0.3}
        ]}"#;
        let transcript = parse_response(body).expect("parse");
        assert_eq!(transcript.tokens.len(), 1);
        assert_eq!(transcript.tokens[0].text, "hi");
    }

    #[test]
    fn malformed_response_is_not_retried() {
        let body = "not json";
        assert!(parse_response(body).is_err());
    }

    #[test]
    fn empty_words_list_yields_empty_transcript() {
        let body = r#"{"words": []}"#;
        let transcript = parse_response(body).expect("parse");
        assert!(transcript.is_empty());
    }
}
