//! Streaming Ask AI client for the Screenroom video portal.
//!
//! Turns a natural-language question about a video library into an
//! incrementally rendered, citation-grounded answer: the client opens a
//! request against the answer service, decodes its `data:` event stream into
//! typed events, accumulates partial text and sources, reconciles inline
//! citation markers against the source list, and keeps an ordered
//! conversation transcript updated in place, with cooperative cancellation,
//! multi-turn continuation, and a non-streaming fallback that replays the
//! same event sequence.
//!
//! # Driving a conversation
//!
//! ```no_run
//! use screenroom_ask::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = AskClient::from_env()?;
//! let mut conversation = Conversation::new();
//!
//! let mut stream = client.ask(&mut conversation, "Where is capacity planning discussed?")?;
//! while let Some(event) = stream.next_event().await {
//!     conversation.apply(&event);
//!     if let AskEvent::AnswerDelta { delta, .. } = &event {
//!         print!("{delta}");
//!     }
//! }
//!
//! if let Some(turn) = conversation.latest_answer() {
//!     for citation in &turn.citations {
//!         println!("[{}] {} ({})", citation.display_number, citation.title, citation.start);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Ask stream driver and cancellation handle.
pub mod ask;
/// Citation reconciliation between answer text and source records.
pub mod citation;
/// Public client API: `AskClient` and per-ask options.
pub mod client;
/// Conversation transcript: ordered turns updated in place while streaming.
pub mod conversation;
/// Public error types used by the client API.
pub mod errors;
/// Normalized events yielded by `AskStream`.
pub mod event;
/// Common imports for typical usage.
pub mod prelude;
/// Downstream re-emission of the answer stream as public SSE frames.
pub mod relay;
/// Per-ask accumulator state, internal to the stream driver.
mod session;
/// Wire-level source records.
pub mod source;
/// Answer-service transport: HTTP adapter, configuration, wire decoding.
pub mod upstream;
/// Wire-level events decoded from the answer stream.
pub mod wire;

pub use ask::{AbortHandle, AskOutcome, AskStream};
pub use citation::{Citation, RenderSegment, format_timestamp, render_segments};
pub use client::{AskClient, AskOptions};
pub use conversation::{Conversation, ConversationTurn, Role, TurnState};
pub use errors::{ClientError, TransportError, TurnFailure};
pub use event::{AnswerTurn, AskEvent};
pub use relay::SseRelay;
pub use source::SourceRecord;
pub use upstream::{
    AnswerRequest, AnswerSource, AnswerStreamHandle, HttpAnswerSource, UpstreamConfig,
};
pub use wire::UpstreamEvent;
