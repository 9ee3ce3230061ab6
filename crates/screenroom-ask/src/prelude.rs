//! Common imports for typical ask-client usage.
//!
//! This module intentionally exports the most frequently used client/stream
//! types so examples and application code need fewer import lines.
pub use crate::{
    AbortHandle, AnswerTurn, AskClient, AskEvent, AskOptions, AskOutcome, AskStream, Citation,
    ClientError, Conversation, ConversationTurn, Role, SourceRecord, TurnFailure, TurnState,
    UpstreamConfig,
};
