use serde::{Deserialize, Serialize};

use crate::source::SourceRecord;

/// One decoded event from the upstream answer stream.
///
/// The `type` tag selects the variant. Unrecognized tags deserialize to
/// [`UpstreamEvent::Unknown`] and are dropped by the decoder; new upstream
/// event types must be ignored, not rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamEvent {
    /// Opens a message. At most one per request.
    MessageStart { id: String },
    /// Incremental answer text.
    TextDelta { delta: String },
    /// Replaces the full source list for the in-flight answer.
    Sources { sources: Vec<SourceRecord> },
    /// Terminal event carrying the authoritative final state.
    MessageComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sources: Option<Vec<SourceRecord>>,
        #[serde(
            default,
            alias = "conversationId",
            skip_serializing_if = "Option::is_none"
        )]
        conversation_id: Option<String>,
        #[serde(default, alias = "mode", skip_serializing_if = "Option::is_none")]
        response_type: Option<String>,
    },
    /// Legacy terminal shape, normalized onto `message_complete` semantics.
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        citations: Option<Vec<SourceRecord>>,
    },
    /// Upstream-declared failure. Terminal.
    Error {
        #[serde(default)]
        code: String,
        message: String,
        #[serde(default)]
        retryable: bool,
    },
    /// End-of-stream sentinel (`data: [DONE]`); produced by the decoder,
    /// never JSON-decoded.
    Done,
    /// Unrecognized `type` tag.
    #[serde(other)]
    Unknown,
}

impl UpstreamEvent {
    /// Folds the legacy `answer` terminal shape onto `message_complete` so
    /// consumers handle a single terminal variant.
    pub fn normalized(self) -> UpstreamEvent {
        match self {
            UpstreamEvent::Answer { content, citations } => UpstreamEvent::MessageComplete {
                content,
                sources: citations,
                conversation_id: None,
                response_type: None,
            },
            other => other,
        }
    }

    /// True for events that terminate a message. The `done` sentinel is a
    /// transport-level end marker, not a message terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpstreamEvent::MessageComplete { .. }
                | UpstreamEvent::Answer { .. }
                | UpstreamEvent::Error { .. }
        )
    }
}
