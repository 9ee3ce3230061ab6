use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt as _;
use futures::stream;
use tracing::{debug, warn};

use crate::errors::{ClientError, TransportError};
use crate::source::SourceRecord;
use crate::wire::UpstreamEvent;

use super::transport::SseLineDecoder;
use super::{AnswerRequest, AnswerSource, AnswerStreamHandle, UpstreamConfig};

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// HTTP adapter for the answer service.
///
/// Streams `text/event-stream` responses through the line decoder; when the
/// service does not honor the event-stream accept header, the single JSON
/// body is parsed and re-played as an equivalent event sequence so consumers
/// see one API either way.
pub struct HttpAnswerSource {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl HttpAnswerSource {
    /// Creates a source from explicit configuration. Fails fast on missing
    /// credentials, before any network call.
    pub fn new(config: UpstreamConfig) -> Result<Self, ClientError> {
        if config.api_key.trim().is_empty() {
            return Err(ClientError::Config(
                "answer service api_key must not be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build answer client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a source from `SCREENROOM_ANSWERS_KEY` / `SCREENROOM_ANSWERS_URL`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(UpstreamConfig::from_env()?)
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl AnswerSource for HttpAnswerSource {
    async fn open(&self, request: AnswerRequest) -> Result<AnswerStreamHandle, TransportError> {
        let body = build_request_body(&request);
        debug!(
            deep_search = request.deep_search,
            continued = request.conversation_id.is_some(),
            "opening answer stream"
        );
        let response = self
            .client
            .post(self.config.ask_url())
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::io(format!("answer request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if is_event_stream(content_type(&response).as_deref()) {
            let bytes: ByteStream = Box::pin(response.bytes_stream());
            return Ok(AnswerStreamHandle {
                events: Box::pin(sse_event_stream(bytes)),
            });
        }

        warn!("answer service did not stream; replaying the JSON fallback body");
        let payload: FallbackResponse = response
            .json()
            .await
            .map_err(|e| TransportError::protocol(format!("invalid fallback body: {e}")))?;
        let events = synthesize_events(payload, self.config.fallback_chunk_chars);
        Ok(AnswerStreamHandle {
            events: Box::pin(synthetic_event_stream(
                events,
                self.config.fallback_chunk_delay,
            )),
        })
    }
}

fn content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn is_event_stream(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|value| value.trim_start().starts_with("text/event-stream"))
}

fn build_request_body(request: &AnswerRequest) -> serde_json::Value {
    let mut body = serde_json::json!({ "message": request.query });
    // Continue-conversation form; a new conversation sends the message alone.
    if let Some(id) = &request.conversation_id {
        body["conversationId"] = serde_json::Value::String(id.clone());
    }
    body
}

fn sse_event_stream(
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<UpstreamEvent, TransportError>> + Send {
    struct State {
        bytes_stream: ByteStream,
        decoder: SseLineDecoder,
        pending: VecDeque<UpstreamEvent>,
        finished: bool,
    }

    stream::unfold(
        State {
            bytes_stream,
            decoder: SseLineDecoder::default(),
            pending: VecDeque::new(),
            finished: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((Ok(event), state));
                }
                if state.finished {
                    return None;
                }
                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => state.pending.extend(state.decoder.push_chunk(&chunk)),
                    Some(Err(error)) => {
                        state.finished = true;
                        return Some((
                            Err(TransportError::io(format!(
                                "answer stream read failed: {error}"
                            ))),
                            state,
                        ));
                    }
                    None => {
                        state.finished = true;
                        state.pending.extend(state.decoder.finish());
                    }
                }
            }
        },
    )
}

/// Non-streaming fallback body (`Accept: text/event-stream` not honored).
#[derive(Debug, serde::Deserialize)]
struct FallbackResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    answer: Option<FallbackAnswer>,
    #[serde(default, alias = "conversationId")]
    conversation_id: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct FallbackAnswer {
    #[serde(default)]
    text: String,
    #[serde(default)]
    citations: Vec<SourceRecord>,
}

/// Replays a fallback body as the event sequence the streaming path would
/// have produced for the same logical answer.
fn synthesize_events(payload: FallbackResponse, chunk_chars: usize) -> Vec<UpstreamEvent> {
    if payload.success == Some(false) {
        return vec![UpstreamEvent::Error {
            code: "request_failed".to_string(),
            message: "answer service reported an unsuccessful response".to_string(),
            retryable: true,
        }];
    }

    let answer = payload.answer.unwrap_or_default();
    let mut events = Vec::new();
    if payload.mode.as_deref() == Some(crate::session::CLARIFICATION_RESPONSE_TYPE) {
        events.push(UpstreamEvent::MessageComplete {
            content: Some(answer.text),
            sources: None,
            conversation_id: payload.conversation_id,
            response_type: payload.mode,
        });
        events.push(UpstreamEvent::Done);
        return events;
    }

    for chunk in chunk_text(&answer.text, chunk_chars) {
        events.push(UpstreamEvent::TextDelta { delta: chunk });
    }
    if !answer.citations.is_empty() {
        events.push(UpstreamEvent::Sources {
            sources: answer.citations.clone(),
        });
    }
    events.push(UpstreamEvent::MessageComplete {
        content: Some(answer.text),
        sources: Some(answer.citations),
        conversation_id: payload.conversation_id,
        response_type: payload.mode,
    });
    events.push(UpstreamEvent::Done);
    events
}

/// Splits text into chunks of at most `chunk_chars` characters, on char
/// boundaries.
fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let chunk_chars = chunk_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count >= chunk_chars {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Yields synthesized events with a small pacing delay between text deltas,
/// preserving the incremental-rendering UX on the fallback path.
fn synthetic_event_stream(
    events: Vec<UpstreamEvent>,
    delay: Duration,
) -> impl futures::Stream<Item = Result<UpstreamEvent, TransportError>> + Send {
    struct State {
        events: VecDeque<UpstreamEvent>,
        delay: Duration,
        first: bool,
    }

    stream::unfold(
        State {
            events: VecDeque::from(events),
            delay,
            first: true,
        },
        |mut state| async move {
            let event = state.events.pop_front()?;
            if matches!(event, UpstreamEvent::TextDelta { .. }) && !state.first && !state.delay.is_zero()
            {
                tokio::time::sleep(state.delay).await;
            }
            state.first = false;
            Some((Ok(event), state))
        },
    )
}
