use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt as _;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::{ClientError, TransportError, TurnFailure, turn_failure_from_transport};
use crate::event::{AnswerTurn, AskEvent};
use crate::session::TurnSession;
use crate::upstream::{AnswerStreamHandle, UpstreamEventStream};
use crate::wire::UpstreamEvent;

/// Handle used to request cancellation of an in-flight ask.
///
/// Cancellation is cooperative: the stream finalizes with whatever was
/// accumulated and surfaces no error.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    pub(crate) fn new(tx: watch::Sender<bool>) -> Self {
        Self { tx }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(tx: watch::Sender<bool>) -> Self {
        Self::new(tx)
    }

    /// Requests cancellation.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

pub(crate) type OpenFuture =
    Pin<Box<dyn Future<Output = Result<AnswerStreamHandle, TransportError>> + Send + 'static>>;

enum Transport {
    Opening(OpenFuture),
    Streaming(UpstreamEventStream),
    Closed,
}

enum Step {
    Abort,
    Opened(AnswerStreamHandle),
    Event(UpstreamEvent),
    TransportFailed(TransportError),
    TimedOut,
    Eof,
}

/// Terminal result of a driven ask.
#[derive(Clone, Debug, PartialEq)]
pub enum AskOutcome {
    /// The service answered.
    Answer(AnswerTurn),
    /// The service asked a follow-up question instead of answering.
    Clarification {
        question: String,
        conversation_id: Option<String>,
    },
    /// The ask was cancelled; any streamed text is preserved.
    Cancelled { partial: Option<AnswerTurn> },
}

/// Streaming handle returned by `AskClient::ask`.
///
/// `next_event()` is the single suspension point: the transport is only
/// pulled once the previous event has been fully processed, so events are
/// handled strictly in arrival order with no concurrent writer.
pub struct AskStream {
    turn_id: Uuid,
    session: TurnSession,
    transport: Transport,
    abort_rx: watch::Receiver<bool>,
    abort_handle: AbortHandle,
    deadline: Instant,
    budget: Duration,
    queued: VecDeque<AskEvent>,
    done: bool,
}

impl AskStream {
    pub(crate) fn new(
        session: TurnSession,
        open: OpenFuture,
        abort_rx: watch::Receiver<bool>,
        abort_handle: AbortHandle,
        budget: Duration,
    ) -> Self {
        let turn_id = session.turn_id();
        Self {
            turn_id,
            session,
            transport: Transport::Opening(open),
            abort_rx,
            abort_handle,
            deadline: Instant::now() + budget,
            budget,
            queued: VecDeque::from([AskEvent::TurnStarted { turn_id }]),
            done: false,
        }
    }

    /// The turn this stream feeds.
    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    /// Returns a handle that can cancel the ask.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for and returns the next normalized event.
    ///
    /// Returns `None` after the terminal event has been delivered.
    pub async fn next_event(&mut self) -> Option<AskEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                if event.is_terminal() {
                    // Terminal: stop reading and release the transport.
                    self.done = true;
                    self.transport = Transport::Closed;
                }
                return Some(event);
            }
            if self.done {
                return None;
            }
            if *self.abort_rx.borrow() {
                self.queue_cancel();
                continue;
            }

            let step = match &mut self.transport {
                Transport::Opening(open) => {
                    tokio::select! {
                        _ = self.abort_rx.changed() => Step::Abort,
                        opened = tokio::time::timeout_at(self.deadline, open.as_mut()) => {
                            match opened {
                                Err(_) => Step::TimedOut,
                                Ok(Ok(handle)) => Step::Opened(handle),
                                Ok(Err(error)) => Step::TransportFailed(error),
                            }
                        }
                    }
                }
                Transport::Streaming(events) => {
                    tokio::select! {
                        _ = self.abort_rx.changed() => Step::Abort,
                        next = tokio::time::timeout_at(self.deadline, events.next()) => {
                            match next {
                                Err(_) => Step::TimedOut,
                                Ok(Some(Ok(event))) => Step::Event(event),
                                Ok(Some(Err(error))) => Step::TransportFailed(error),
                                Ok(None) => Step::Eof,
                            }
                        }
                    }
                }
                Transport::Closed => {
                    self.done = true;
                    return None;
                }
            };

            match step {
                Step::Abort => {
                    if *self.abort_rx.borrow() {
                        self.queue_cancel();
                    }
                }
                Step::Opened(handle) => {
                    self.transport = Transport::Streaming(handle.events);
                }
                Step::Event(event) => {
                    let events = self.session.apply(event);
                    self.queued.extend(events);
                }
                Step::TransportFailed(error) => {
                    self.transport = Transport::Closed;
                    let failure = turn_failure_from_transport(&error);
                    self.queued.push_back(self.session.fail(failure));
                }
                Step::TimedOut => {
                    self.transport = Transport::Closed;
                    self.queued.push_back(self.session.fail(TurnFailure::Timeout {
                        after: self.budget,
                    }));
                }
                Step::Eof => {
                    self.transport = Transport::Closed;
                    self.queued.push_back(self.session.finish());
                }
            }
        }
    }

    /// Drains the stream and returns the terminal outcome.
    ///
    /// A failed ask returns `ClientError::TurnFailed`; callers that want the
    /// preserved partial text consume `next_event()` (or a `Conversation`)
    /// instead.
    pub async fn finish(mut self) -> Result<AskOutcome, ClientError> {
        let mut outcome = None;
        while let Some(event) = self.next_event().await {
            match event {
                AskEvent::Completed { answer, .. } => {
                    outcome = Some(AskOutcome::Answer(answer));
                }
                AskEvent::Clarification {
                    question,
                    conversation_id,
                    ..
                } => {
                    outcome = Some(AskOutcome::Clarification {
                        question,
                        conversation_id,
                    });
                }
                AskEvent::Failed { failure, .. } => {
                    return Err(ClientError::TurnFailed(failure));
                }
                AskEvent::Cancelled { partial, .. } => {
                    outcome = Some(AskOutcome::Cancelled { partial });
                }
                _ => {}
            }
        }
        outcome.ok_or_else(|| {
            ClientError::Protocol("ask stream ended without a terminal event".into())
        })
    }

    fn queue_cancel(&mut self) {
        self.transport = Transport::Closed;
        self.queued.push_back(self.session.cancel());
    }
}
