use std::time::Duration;

/// Errors produced by the transport adapter before they are normalized for
/// the public ask stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The answer service returned a non-success HTTP status.
    #[error("answer service returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Network or stream I/O failed.
    #[error("transport error: {message}")]
    Io { message: String },
    /// The response shape could not be interpreted.
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl TransportError {
    /// Creates an I/O-level transport error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a protocol-level transport error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

/// Terminal failure carried by `AskEvent::Failed`.
///
/// Cancellation is intentionally absent: a cancelled ask finalizes through
/// `AskEvent::Cancelled` and is not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum TurnFailure {
    /// The answer service declared a failure through an `error` event.
    #[error("answer service error ({code}): {message}")]
    Upstream {
        code: String,
        message: String,
        retryable: bool,
    },
    /// Network failure or non-success HTTP status.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// No answer arrived within the configured budget.
    #[error("no answer after {}s; the request is taking longer than expected", .after.as_secs())]
    Timeout { after: Duration },
    /// The stream violated the answer protocol.
    #[error("protocol failure: {message}")]
    Protocol { message: String },
}

impl TurnFailure {
    /// Whether the UI should offer a retry action for this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { retryable, .. } => *retryable,
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Protocol { .. } => false,
        }
    }
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration; raised before any network call.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid user input to the ask API.
    #[error("validation error: {0}")]
    Validation(String),
    /// Transport error surfaced outside an ask stream.
    #[error(transparent)]
    Transport(TransportError),
    /// Terminal failure returned from a driven ask.
    #[error(transparent)]
    TurnFailed(TurnFailure),
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<TurnFailure> for ClientError {
    fn from(value: TurnFailure) -> Self {
        ClientError::TurnFailed(value)
    }
}

pub(crate) fn turn_failure_from_transport(error: &TransportError) -> TurnFailure {
    match error {
        TransportError::Status { status, body } => TurnFailure::Transport {
            message: format!("answer service returned status {status}: {body}"),
        },
        TransportError::Io { message } => TurnFailure::Transport {
            message: message.clone(),
        },
        TransportError::Protocol { message } => TurnFailure::Protocol {
            message: message.clone(),
        },
    }
}
