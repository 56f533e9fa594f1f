//! Gemini Backend Implementation
//!
//! Streams replies from Google's Generative Language API using the
//! server-sent-events flavour of `streamGenerateContent`.
//!
//! # Wire format
//!
//! Each SSE `data:` line carries one JSON object:
//!
//! ```json
//! {"candidates":[{"content":{"parts":[{"text":"Oh! Hi"}],"role":"model"}}]}
//! ```
//!
//! A prompt refused by the safety filter arrives as `promptFeedback.blockReason`
//! and is reported as an invalid request, never retried.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use super::traits::{ChatBackend, ChatRequest, ChunkStream};
use crate::config::BackendConfig;
use crate::conversation::Role;
use crate::error::BackendError;

/// Finish reasons that mean the reply was withheld
const BLOCKED_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

/// Gemini streaming client
#[derive(Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiBackend {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Authentication`] when no API key is configured
    /// and [`BackendError::InvalidRequest`] if the HTTP client cannot be built.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| BackendError::Authentication("GOOGLE_API_KEY is not set".into()))?
            .to_string();

        let client = reqwest::Client::builder()
            .read_timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| BackendError::InvalidRequest(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Model used when a request does not override it
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn stream_url(&self, model: &str) -> String {
        format!("{}/models/{model}:streamGenerateContent?alt=sse", self.base_url)
    }

    fn translate_request(request: &ChatRequest) -> GeminiRequest {
        let mut contents: Vec<GeminiContent> = request
            .prior_turns
            .iter()
            .filter_map(|turn| {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Character => "model",
                    Role::System => return None,
                };
                Some(GeminiContent::text(role, &turn.text))
            })
            .collect();
        contents.push(GeminiContent::text("user", &request.user_text));

        GeminiRequest {
            contents,
            system_instruction: request.system.as_ref().map(|system| GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(system.clone()),
                }],
            }),
        }
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ChunkStream, BackendError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = Self::translate_request(request);

        tracing::debug!(
            model,
            context_turns = request.prior_turns.len(),
            "Opening Gemini stream"
        );

        let response = self
            .client
            .post(self.stream_url(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(BackendError::from_status(status.as_u16(), &message));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();

        Ok(sse_text_stream(bytes))
    }
}

// ============================================================================
// SSE decoding
// ============================================================================

/// Splits an SSE byte stream into text fragments
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes; returns every complete event's outcome
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, BackendError>> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = decode_line(&line) {
                out.push(item);
            }
        }
        out
    }

    /// Flush a trailing line without newline
    fn finish(&mut self) -> Vec<Result<String, BackendError>> {
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line).into_iter().collect()
    }
}

/// Decode one SSE line; `None` for comments, blanks and empty fragments
fn decode_line(line: &[u8]) -> Option<Result<String, BackendError>> {
    let line = String::from_utf8_lossy(line);
    let data = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    let event: GeminiStreamChunk = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            return Some(Err(BackendError::Transient(format!(
                "malformed stream event: {e}"
            ))))
        }
    };

    if let Some(error) = event.error {
        return Some(Err(BackendError::from_status(
            error.code.unwrap_or(500),
            &error.message,
        )));
    }

    if let Some(reason) = event.prompt_feedback.and_then(|f| f.block_reason) {
        return Some(Err(BackendError::InvalidRequest(format!(
            "prompt blocked: {reason}"
        ))));
    }

    let candidate = event.candidates.into_iter().next()?;
    if let Some(reason) = candidate.finish_reason.as_deref() {
        if BLOCKED_FINISH_REASONS.contains(&reason) {
            return Some(Err(BackendError::InvalidRequest(format!(
                "response blocked: {reason}"
            ))));
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    (!text.is_empty()).then_some(Ok(text))
}

struct SseState {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, BackendError>>,
    done: bool,
}

/// Turn a response body into a fragment stream that ends at the first error
fn sse_text_stream(bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> ChunkStream {
    let state = SseState {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.done = true;
                }
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let decoded = state.decoder.push(&chunk);
                    state.pending.extend(decoded);
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(BackendError::from_transport(&e)));
                }
                None => {
                    let decoded = state.decoder.finish();
                    state.pending.extend(decoded);
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}

// ============================================================================
// Gemini API types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![GeminiPart {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeminiStreamChunk {
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    code: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::traits::ContextTurn;

    fn decode_all(input: &[&[u8]]) -> Vec<Result<String, BackendError>> {
        let mut decoder = SseDecoder::default();
        let mut out = Vec::new();
        for part in input {
            out.extend(decoder.push(part));
        }
        out.extend(decoder.finish());
        out
    }

    #[test]
    fn test_translate_request_maps_roles() {
        let request = ChatRequest::new("How are you?")
            .with_context(vec![
                ContextTurn {
                    role: Role::User,
                    text: "Hi".into(),
                },
                ContextTurn {
                    role: Role::Character,
                    text: "Hello [happy]!".into(),
                },
                ContextTurn {
                    role: Role::System,
                    text: "note".into(),
                },
            ])
            .with_system("Be Niko");

        let json = serde_json::to_value(GeminiBackend::translate_request(&request)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "Hi"}]},
                    {"role": "model", "parts": [{"text": "Hello [happy]!"}]},
                    {"role": "user", "parts": [{"text": "How are you?"}]}
                ],
                "systemInstruction": {"parts": [{"text": "Be Niko"}]}
            })
        );
    }

    #[test]
    fn test_decoder_handles_split_events() {
        let out = decode_all(&[
            b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"te",
            b"xt\":\"Oh! \"}]}}]}\r\n\r\n",
            b": keep-alive\n",
            b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]},\"finishReason\":\"STOP\"}]}",
        ]);

        assert_eq!(out, vec![Ok("Oh! ".to_string()), Ok("Hi".to_string())]);
    }

    #[test]
    fn test_decoder_reports_blocked_prompt() {
        let out = decode_all(&[b"data: {\"promptFeedback\":{\"blockReason\":\"SAFETY\"}}\n"]);
        assert!(matches!(out.as_slice(), [Err(BackendError::InvalidRequest(_))]));
    }

    #[test]
    fn test_decoder_maps_inline_error_status() {
        let out = decode_all(&[
            b"data: {\"error\":{\"code\":503,\"message\":\"overloaded\"}}\n",
        ]);
        assert!(matches!(out.as_slice(), [Err(BackendError::Transient(_))]));
    }

    #[tokio::test]
    async fn test_stream_stops_after_first_error() {
        let bytes: Vec<reqwest::Result<Vec<u8>>> = vec![
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]}}]}\n".to_vec()),
            Ok(b"data: not json\n".to_vec()),
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"b\"}]}}]}\n".to_vec()),
        ];
        let items: Vec<_> = sse_text_stream(stream::iter(bytes).boxed()).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("a".to_string()));
        assert!(items[1].is_err());
    }

    /// A reply that streams for longer than the timeout still completes as
    /// long as the connection never goes quiet for that long.
    #[tokio::test]
    async fn test_long_reply_outlives_read_timeout() {
        use std::time::Duration;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();

            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            for word in ["one", "two", "three", "four"] {
                let event = format!(
                    "data: {{\"candidates\":[{{\"content\":{{\"parts\":[{{\"text\":\"{word} \"}}]}}}}]}}\n\n"
                );
                socket.write_all(event.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
        });

        let mut config = BackendConfig::default();
        config.set_api_key("test-key");
        config.base_url = format!("http://{addr}");
        config.request_timeout = Duration::from_millis(400);
        let backend = GeminiBackend::from_config(&config).unwrap();

        let items: Vec<_> = backend
            .open_stream(&ChatRequest::new("go"))
            .await
            .unwrap()
            .collect()
            .await;

        let text: String = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(text, "one two three four ");
        server.await.unwrap();
    }

    #[test]
    fn test_missing_key_is_authentication_error() {
        let config = BackendConfig::default();
        assert!(matches!(
            GeminiBackend::from_config(&config),
            Err(BackendError::Authentication(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let mut config = BackendConfig::default();
        config.set_api_key("AIza-secret");
        let backend = GeminiBackend::from_config(&config).unwrap();

        let debug = format!("{backend:?}");
        assert!(!debug.contains("AIza-secret"));
        assert_eq!(
            backend.stream_url(backend.model()),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
    }
}
