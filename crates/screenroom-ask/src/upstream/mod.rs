//! Answer-service integration: the transport seam, the HTTP adapter, and
//! the wire event decoder.
mod config;
mod http;
pub(crate) mod transport;

pub use config::UpstreamConfig;
pub use http::HttpAnswerSource;

use std::pin::Pin;

use crate::errors::TransportError;
use crate::wire::UpstreamEvent;

/// Boxed stream of decoded upstream events.
pub type UpstreamEventStream =
    Pin<Box<dyn futures::Stream<Item = Result<UpstreamEvent, TransportError>> + Send + 'static>>;

/// Request for one answer exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnswerRequest {
    /// The user's question.
    pub query: String,
    /// Thread id for continuing an earlier exchange.
    pub conversation_id: Option<String>,
    /// Selects the extended deep-search budget.
    pub deep_search: bool,
}

/// Live handle for one opened exchange.
pub struct AnswerStreamHandle {
    /// Decoded events in arrival order.
    pub events: UpstreamEventStream,
}

/// Transport seam for the answer service.
///
/// The production implementation is [`HttpAnswerSource`]; tests inject
/// scripted sources.
#[async_trait::async_trait]
pub trait AnswerSource: Send + Sync {
    /// Opens the exchange and returns the decoded event stream.
    async fn open(&self, request: AnswerRequest) -> Result<AnswerStreamHandle, TransportError>;
}
