//! LLM Grader Client (§4.F): batched chat-completion calls that grade each
//! window's rhetorical cogency and extract quotes.
//!
//! Concurrency is bounded by a `tokio::sync::Semaphore` sized to
//! `grader_concurrency` (§5); the cancellation token is checked before each
//! request is issued. A malformed or unreachable response degrades to the
//! [`LlmGrade::sentinel`] value rather than failing the job (§7
//! `GradeError`) — no dynamically-typed JSON value survives past this
//! module's boundary (§9).

use clipforge_core::{CancellationToken, LlmGrade, Window};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

const SYSTEM_PROMPT: &str = "Grade a ~90-second transcript chunk for a short. Criteria: clear \
claim → brief reason → one example; minimal dangling pronouns; quote-worthiness. Respond with \
JSON only: {\"cogency\": 1-5, \"quotes\": [string, at most 3], \"salient_terms\": [string, at \
most 8]}.";

const TEMPERATURE: f64 = 0.2;
const TOP_P: f64 = 0.9;
const MAX_TOKENS: u32 = 400;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);
const MAX_RETRIES: u32 = 2;
const RETRY_BACKOFF: [Duration; 2] = [Duration::from_secs(2), Duration::from_secs(8)];
const MAX_QUOTES: usize = 3;
const MAX_QUOTE_CHARS: usize = 240;
const MAX_SALIENT_TERMS: usize = 8;

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct GradePayload {
    cogency: u8,
    #[serde(default)]
    quotes: Vec<String>,
    #[serde(default)]
    salient_terms: Vec<String>,
}

/// Grade every window in `windows`, aligned positionally with the input.
pub async fn grade(
    client: &reqwest::Client,
    chat_server_url: &str,
    windows: &[Window],
    concurrency: usize,
    cancel: &CancellationToken,
) -> Vec<LlmGrade> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(windows.len());

    for window in windows {
        let client = client.clone();
        let url = chat_server_url.to_string();
        let text = window.text.clone();
        let window_id = window.id.clone();
        let semaphore = semaphore.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            if cancel.is_cancelled() {
                return LlmGrade::sentinel();
            }
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return LlmGrade::sentinel(),
            };
            if cancel.is_cancelled() {
                return LlmGrade::sentinel();
            }
            grade_one(&client, &url, &text, &window_id).await
        }));
    }

    let mut grades = Vec::with_capacity(handles.len());
    for handle in handles {
        grades.push(handle.await.unwrap_or_else(|_| LlmGrade::sentinel()));
    }
    grades
}

async fn grade_one(
    client: &reqwest::Client,
    chat_server_url: &str,
    window_text: &str,
    window_id: &str,
) -> LlmGrade {
    let url = format!("{}/chat/completions", chat_server_url.trim_end_matches('/'));
    let body = ChatRequest {
        messages: vec![
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            ChatMessage {
                role: "user",
                content: window_text,
            },
        ],
        temperature: TEMPERATURE,
        top_p: TOP_P,
        max_tokens: MAX_TOKENS,
    };

    let mut attempt = 0u32;
    loop {
        let result = client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                let text = match response.text().await {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(window_id, error = %e, "grader: failed to read response body");
                        return LlmGrade::sentinel();
                    }
                };
                return parse_grade(&text, window_id);
            }
            Ok(response) if response.status().is_server_error() && attempt < MAX_RETRIES => {
                warn!(window_id, attempt, status = %response.status(), "grader server error, retrying");
            }
            Ok(response) => {
                warn!(window_id, status = %response.status(), "grader returned non-retryable error");
                return LlmGrade::sentinel();
            }
            Err(e) if attempt < MAX_RETRIES && (e.is_timeout() || e.is_connect()) => {
                warn!(window_id, attempt, error = %e, "grader transport error, retrying");
            }
            Err(e) => {
                warn!(window_id, error = %e, "grader transport error, not retrying");
                return LlmGrade::sentinel();
            }
        }

        tokio::time::sleep(RETRY_BACKOFF[attempt as usize]).await;
        attempt += 1;
    }
}

/// Parse the OpenAI-compatible chat response, then the model's JSON payload
/// inside `choices[0].message.content`, with one repair pass on failure.
fn parse_grade(body: &str, window_id: &str) -> LlmGrade {
    let content = match serde_json::from_str::<ChatResponse>(body) {
        Ok(resp) => match resp.choices.into_iter().next() {
            Some(choice) => choice.message.content,
            None => {
                warn!(window_id, "grader: response had no choices");
                return LlmGrade::sentinel();
            }
        },
        Err(e) => {
            warn!(window_id, error = %e, "grader: malformed chat response envelope");
            return LlmGrade::sentinel();
        }
    };

    if let Some(grade) = parse_payload(&content) {
        return grade;
    }
    if let Some(repaired) = repair_json(&content) {
        if let Some(grade) = parse_payload(&repaired) {
            return grade;
        }
    }
    warn!(window_id, "grader: payload JSON unparseable after repair pass");
    LlmGrade::sentinel()
}

fn parse_payload(raw: &str) -> Option<LlmGrade> {
    let payload: GradePayload = serde_json::from_str(raw.trim()).ok()?;
    if !(1..=5).contains(&payload.cogency) {
        return None;
    }
    let mut quotes = payload.quotes;
    quotes.truncate(MAX_QUOTES);
    for quote in &mut quotes {
        *quote = quote.chars().take(MAX_QUOTE_CHARS).collect();
    }
    let mut salient_terms = payload.salient_terms;
    salient_terms.truncate(MAX_SALIENT_TERMS);

    Some(LlmGrade {
        cogency: payload.cogency,
        quotes,
        salient_terms,
    })
}

/// Strip Markdown code fences and locate the outermost `{...}` span.
fn repair_json(raw: &str) -> Option<String> {
    let stripped = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(stripped[start..=end].to_string())
}
