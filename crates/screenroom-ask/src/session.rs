use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::citation::{Citation, reconcile};
use crate::errors::TurnFailure;
use crate::event::{AnswerTurn, AskEvent};
use crate::source::SourceRecord;
use crate::wire::UpstreamEvent;

/// `response_type` value that marks a clarification terminal.
pub(crate) const CLARIFICATION_RESPONSE_TYPE: &str = "clarification";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingFirstEvent,
    StreamingText,
    Terminal,
}

/// Per-ask mutable state: accumulated text, the held source list, and the
/// display numbers handed out so far. All mutation happens on the consuming
/// task, one decoded event at a time.
pub(crate) struct TurnSession {
    turn_id: Uuid,
    phase: Phase,
    message_id: Option<String>,
    conversation_id: Option<String>,
    text: String,
    sources: Vec<SourceRecord>,
    numbers: HashMap<String, usize>,
    last_citations: Vec<Citation>,
    last_render: String,
    seq: u64,
}

impl TurnSession {
    pub fn new(turn_id: Uuid, conversation_id: Option<String>) -> Self {
        Self {
            turn_id,
            phase: Phase::AwaitingFirstEvent,
            message_id: None,
            conversation_id,
            text: String::new(),
            sources: Vec::new(),
            numbers: HashMap::new(),
            last_citations: Vec::new(),
            last_render: String::new(),
            seq: 0,
        }
    }

    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == Phase::Terminal
    }

    /// Consumes one decoded event and yields the resulting UI updates.
    /// Events arriving after a terminal are dropped.
    pub fn apply(&mut self, event: UpstreamEvent) -> Vec<AskEvent> {
        if self.phase == Phase::Terminal {
            return Vec::new();
        }
        match event.normalized() {
            UpstreamEvent::MessageStart { id } => {
                if self.message_id.is_some() {
                    debug!(turn_id = %self.turn_id, "ignoring repeated message_start");
                    return Vec::new();
                }
                if self.conversation_id.is_none() {
                    self.conversation_id = Some(id.clone());
                }
                self.message_id = Some(id);
                Vec::new()
            }
            UpstreamEvent::TextDelta { delta } => {
                if delta.is_empty() {
                    return Vec::new();
                }
                self.phase = Phase::StreamingText;
                self.text.push_str(&delta);
                let mut out = vec![AskEvent::AnswerDelta {
                    turn_id: self.turn_id,
                    seq: self.seq,
                    delta: delta.clone(),
                }];
                self.seq = self.seq.saturating_add(1);
                // A new marker can only close with ']'.
                if delta.contains(']')
                    && let Some(update) = self.rerender()
                {
                    out.push(update);
                }
                out
            }
            UpstreamEvent::Sources { sources } => {
                // Each occurrence replaces the prior list.
                self.phase = Phase::StreamingText;
                self.sources = sources;
                self.rerender().into_iter().collect()
            }
            UpstreamEvent::MessageComplete {
                content,
                sources,
                conversation_id,
                response_type,
            } => {
                self.phase = Phase::Terminal;
                if let Some(id) = conversation_id {
                    self.conversation_id = Some(id);
                }
                if response_type.as_deref() == Some(CLARIFICATION_RESPONSE_TYPE) {
                    // Clarifications surface the payload verbatim and skip
                    // citation reconciliation entirely.
                    self.text.clear();
                    self.sources.clear();
                    return vec![AskEvent::Clarification {
                        turn_id: self.turn_id,
                        question: content.unwrap_or_default(),
                        conversation_id: self.conversation_id.clone(),
                    }];
                }
                let text = match content {
                    Some(content) if !content.is_empty() => content,
                    _ => std::mem::take(&mut self.text),
                };
                let sources = match sources {
                    Some(sources) => sources,
                    None => std::mem::take(&mut self.sources),
                };
                vec![AskEvent::Completed {
                    turn_id: self.turn_id,
                    answer: self.answer_from(text, &sources),
                }]
            }
            UpstreamEvent::Error {
                code,
                message,
                retryable,
            } => vec![self.fail(TurnFailure::Upstream {
                code,
                message,
                retryable,
            })],
            UpstreamEvent::Done => vec![self.finish()],
            UpstreamEvent::Answer { .. } => unreachable!("normalized above"),
            UpstreamEvent::Unknown => {
                debug!(turn_id = %self.turn_id, "ignoring unrecognized answer event");
                Vec::new()
            }
        }
    }

    /// Finalizes when the transport closes without a `message_complete`:
    /// accumulated text becomes the answer; an empty stream is a protocol
    /// failure.
    pub fn finish(&mut self) -> AskEvent {
        self.phase = Phase::Terminal;
        match self.partial_answer() {
            Some(answer) => {
                debug!(turn_id = %self.turn_id, "stream closed early; completing from accumulated text");
                AskEvent::Completed {
                    turn_id: self.turn_id,
                    answer,
                }
            }
            None => AskEvent::Failed {
                turn_id: self.turn_id,
                failure: TurnFailure::Protocol {
                    message: "answer stream ended without completion".to_string(),
                },
                partial: None,
            },
        }
    }

    /// Terminates with a failure, preserving any streamed text.
    pub fn fail(&mut self, failure: TurnFailure) -> AskEvent {
        self.phase = Phase::Terminal;
        AskEvent::Failed {
            turn_id: self.turn_id,
            failure,
            partial: self.partial_answer(),
        }
    }

    /// Terminates on caller cancellation; never an error.
    pub fn cancel(&mut self) -> AskEvent {
        self.phase = Phase::Terminal;
        AskEvent::Cancelled {
            turn_id: self.turn_id,
            partial: self.partial_answer(),
        }
    }

    fn partial_answer(&mut self) -> Option<AnswerTurn> {
        if self.text.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.text);
        let sources = std::mem::take(&mut self.sources);
        Some(self.answer_from(text, &sources))
    }

    fn answer_from(&mut self, text: String, sources: &[SourceRecord]) -> AnswerTurn {
        let reconciled = reconcile(&text, sources, Some(&self.numbers));
        self.numbers = reconciled.numbers;
        AnswerTurn {
            text,
            render_text: reconciled.render_text,
            citations: reconciled.citations,
            conversation_id: self.conversation_id.clone(),
        }
    }

    /// Re-runs reconciliation over the held text and sources, seeded with
    /// the numbers handed out so far. Emits an update only when the visible
    /// result changed.
    fn rerender(&mut self) -> Option<AskEvent> {
        let reconciled = reconcile(&self.text, &self.sources, Some(&self.numbers));
        self.numbers = reconciled.numbers;
        if reconciled.citations == self.last_citations && reconciled.render_text == self.last_render
        {
            return None;
        }
        self.last_citations = reconciled.citations.clone();
        self.last_render = reconciled.render_text.clone();
        Some(AskEvent::CitationsUpdated {
            turn_id: self.turn_id,
            citations: reconciled.citations,
            render_text: reconciled.render_text,
        })
    }
}
