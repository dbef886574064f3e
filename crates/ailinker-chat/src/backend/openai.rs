//! OpenAI-compatible streaming chat backend.
//!
//! Posts to `{base_url}/chat/completions` with `stream: true` and reads the
//! Server-Sent Events response:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo."}}]}
//!
//! data: [DONE]
//! ```
//!
//! Content deltas are fed through the sentence segmenter.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::Serialize;

use ailinker_core::{ChatBackend, ChatPortError, ChatSegmentStream, ChatSettings};

use crate::segmenter::segment_stream;

// ── Request body ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

// ── Backend ────────────────────────────────────────────────────────

/// Streaming client for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    system_prompt: Option<String>,
    segment_min_chars: usize,
}

impl OpenAiChat {
    /// Build from settings. The API key is read from the environment
    /// variable named by `api_key_env`.
    pub fn from_settings(settings: &ChatSettings) -> Result<Self, ChatPortError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ChatPortError::Config(format!("environment variable {} is not set", settings.api_key_env))
            })?;
        Self::new(settings, api_key)
    }

    /// Build with an explicit API key.
    pub fn new(settings: &ChatSettings, api_key: String) -> Result<Self, ChatPortError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|e| ChatPortError::Config(e.to_string()))?;
        Ok(Self {
            client,
            url: completions_url(&settings.base_url),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
            system_prompt: settings.system_prompt.clone(),
            segment_min_chars: settings.segment_min_chars,
        })
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream: true,
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    async fn stream_reply(&self, prompt: &str) -> Result<ChatSegmentStream, ChatPortError> {
        tracing::debug!(url = %self.url, model = %self.model, "Requesting chat completion");
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| ChatPortError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatPortError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let deltas = sse_content_deltas(response.bytes_stream());
        Ok(segment_stream(deltas, self.segment_min_chars))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

// ── SSE decoding ───────────────────────────────────────────────────

/// State threaded through the `unfold` stream.
struct SseState<S> {
    stream: S,
    buf: BytesMut,
    done: bool,
}

/// Extract `choices[0].delta.content` from an SSE byte stream.
///
/// Empty deltas, comments and unparseable lines are skipped. `[DONE]` or the
/// end of the byte stream finishes the delta stream.
pub fn sse_content_deltas<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, ChatPortError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display,
{
    let state = SseState {
        stream: byte_stream.boxed(),
        buf: BytesMut::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }

        loop {
            if let Some(line_end) = find_newline(&st.buf) {
                let line = st.buf.split_to(line_end);
                match parse_sse_line(&String::from_utf8_lossy(&line)) {
                    SseLine::Content(text) => return Some((Ok(text), st)),
                    SseLine::Done => {
                        st.done = true;
                        return None;
                    }
                    SseLine::Error(message) => {
                        st.done = true;
                        return Some((Err(ChatPortError::Decode(message)), st));
                    }
                    SseLine::Skip => continue,
                }
            }

            match st.stream.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    tracing::warn!("Upstream stream error: {e}");
                    st.done = true;
                    return Some((Err(ChatPortError::Request(e.to_string())), st));
                }
                None => {
                    st.done = true;
                    // A last line without trailing newline.
                    if !st.buf.is_empty() {
                        let rest = st.buf.split();
                        if let SseLine::Content(text) = parse_sse_line(&String::from_utf8_lossy(&rest)) {
                            return Some((Ok(text), st));
                        }
                    }
                    return None;
                }
            }
        }
    })
}

#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Content(String),
    Done,
    Error(String),
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(data) = trimmed.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
        tracing::debug!(line = data, "Skipping unparseable SSE data");
        return SseLine::Skip;
    };
    if let Some(error) = event.get("error") {
        let message = error["message"].as_str().map_or_else(|| error.to_string(), str::to_string);
        return SseLine::Error(message);
    }
    match event["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => SseLine::Content(content.to_string()),
        _ => SseLine::Skip,
    }
}

/// Find the next newline in the buffer, returning the position after it.
fn find_newline(buf: &BytesMut) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n').map(|pos| pos + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_stream(chunks: &[&str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
        let owned: Vec<Result<Bytes, std::io::Error>> =
            chunks.iter().map(|c| Ok(Bytes::from(c.to_string()))).collect();
        futures_util::stream::iter(owned)
    }

    fn collect(chunks: &[&str]) -> Vec<Result<String, ChatPortError>> {
        tokio_test::block_on(sse_content_deltas(bytes_stream(chunks)).collect::<Vec<_>>())
    }

    #[test]
    fn parses_content_split_across_chunks() {
        let deltas = collect(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
            "\ndata: {\"choices\":[{\"del",
            "ta\":{\"content\":\"lo.\"}}]}\n\n: keep-alive\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]);
        let texts: Vec<String> = deltas.into_iter().map(Result::unwrap).collect();
        assert_eq!(texts, vec!["Hel", "lo."]);
    }

    #[test]
    fn error_event_becomes_decode_error() {
        let deltas = collect(&["data: {\"error\":{\"message\":\"quota exceeded\"}}\n\n"]);
        assert_eq!(deltas.len(), 1);
        assert!(matches!(&deltas[0], Err(ChatPortError::Decode(m)) if m == "quota exceeded"));
    }

    #[test]
    fn trailing_line_without_newline_is_kept() {
        let deltas = collect(&["data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}"]);
        assert_eq!(deltas.into_iter().map(Result::unwrap).collect::<Vec<_>>(), vec!["end"]);
    }

    #[test]
    fn parse_line_variants() {
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(parse_sse_line(": ping"), SseLine::Skip);
        assert_eq!(parse_sse_line("event: message"), SseLine::Skip);
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line("data: not json"), SseLine::Skip);
        assert_eq!(
            parse_sse_line(r#"data:{"choices":[{"delta":{"content":"x"}}]}"#),
            SseLine::Content("x".into())
        );
    }

    #[test]
    fn completions_url_joins_cleanly() {
        assert_eq!(completions_url("http://localhost:8080/v1/"), "http://localhost:8080/v1/chat/completions");
        assert_eq!(completions_url("https://api.openai.com/v1"), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn request_body_includes_system_prompt() {
        let settings = ChatSettings {
            system_prompt: Some("Be brief.".into()),
            ..ChatSettings::default()
        };
        let backend = OpenAiChat::new(&settings, "sk-test".into()).unwrap();
        let body = serde_json::to_value(backend.request_body("hi")).unwrap();
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let settings = ChatSettings {
            api_key_env: "AILINKER_TEST_UNSET_KEY_VAR".into(),
            ..ChatSettings::default()
        };
        assert!(matches!(OpenAiChat::from_settings(&settings), Err(ChatPortError::Config(_))));
    }
}
