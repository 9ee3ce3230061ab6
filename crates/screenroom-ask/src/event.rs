use uuid::Uuid;

use crate::citation::Citation;
use crate::errors::TurnFailure;

/// Finalized assistant answer payload.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnswerTurn {
    /// Full answer text, markers included.
    pub text: String,
    /// Answer text with resolved markers replaced by citation placeholders.
    pub render_text: String,
    /// Citations ordered by display number.
    pub citations: Vec<Citation>,
    /// Conversation id to send with the next ask, when the service assigned
    /// one.
    pub conversation_id: Option<String>,
}

/// Normalized events yielded by `AskStream`.
#[derive(Clone, Debug, PartialEq)]
pub enum AskEvent {
    /// First event for every ask.
    TurnStarted { turn_id: Uuid },
    /// Incremental answer text.
    AnswerDelta {
        turn_id: Uuid,
        seq: u64,
        delta: String,
    },
    /// The citation set or render text changed.
    CitationsUpdated {
        turn_id: Uuid,
        citations: Vec<Citation>,
        render_text: String,
    },
    /// Terminal: the answer finished.
    Completed { turn_id: Uuid, answer: AnswerTurn },
    /// Terminal: the service asked a follow-up question instead of
    /// answering.
    Clarification {
        turn_id: Uuid,
        question: String,
        conversation_id: Option<String>,
    },
    /// Terminal: the ask failed. Partial output is preserved whenever any
    /// text had streamed.
    Failed {
        turn_id: Uuid,
        failure: TurnFailure,
        partial: Option<AnswerTurn>,
    },
    /// Terminal: cancelled by the caller. Not an error.
    Cancelled {
        turn_id: Uuid,
        partial: Option<AnswerTurn>,
    },
}

impl AskEvent {
    /// Returns true if this event ends the ask stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. }
                | Self::Clarification { .. }
                | Self::Failed { .. }
                | Self::Cancelled { .. }
        )
    }

    /// The turn this event belongs to.
    pub fn turn_id(&self) -> Uuid {
        match self {
            Self::TurnStarted { turn_id }
            | Self::AnswerDelta { turn_id, .. }
            | Self::CitationsUpdated { turn_id, .. }
            | Self::Completed { turn_id, .. }
            | Self::Clarification { turn_id, .. }
            | Self::Failed { turn_id, .. }
            | Self::Cancelled { turn_id, .. } => *turn_id,
        }
    }
}
