use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use uuid::Uuid;

use crate::ask::{AbortHandle, AskOutcome, AskStream, OpenFuture};
use crate::conversation::Conversation;
use crate::errors::ClientError;
use crate::event::AskEvent;
use crate::session::TurnSession;
use crate::upstream::{AnswerRequest, AnswerSource, HttpAnswerSource, UpstreamConfig};

/// Per-ask options.
#[derive(Clone, Debug, Default)]
pub struct AskOptions {
    /// Selects the extended deep-search timeout budget.
    pub deep_search: bool,
    /// Overrides the configured timeout budget for this ask.
    pub timeout: Option<Duration>,
}

impl AskOptions {
    /// Enables the deep-search budget.
    pub fn deep_search(mut self, deep_search: bool) -> Self {
        self.deep_search = deep_search;
        self
    }

    /// Overrides the timeout budget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Entry point for asking questions about the video library.
///
/// One client serves many conversations; each ask owns its own transport
/// connection, abort signal, and accumulator state.
#[derive(Clone)]
pub struct AskClient {
    source: Arc<dyn AnswerSource>,
    answer_timeout: Duration,
    deep_answer_timeout: Duration,
}

impl AskClient {
    /// Creates a client over the HTTP answer service.
    pub fn new(config: UpstreamConfig) -> Result<Self, ClientError> {
        let answer_timeout = config.answer_timeout;
        let deep_answer_timeout = config.deep_answer_timeout;
        Ok(Self {
            source: Arc::new(HttpAnswerSource::new(config)?),
            answer_timeout,
            deep_answer_timeout,
        })
    }

    /// Creates a client from `SCREENROOM_ANSWERS_KEY` / `SCREENROOM_ANSWERS_URL`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(UpstreamConfig::from_env()?)
    }

    /// Creates a client over a custom transport (tests, alternate backends).
    pub fn with_source(
        source: Arc<dyn AnswerSource>,
        answer_timeout: Duration,
        deep_answer_timeout: Duration,
    ) -> Self {
        Self {
            source,
            answer_timeout,
            deep_answer_timeout,
        }
    }

    /// Submits a question on `conversation` and returns the event stream.
    ///
    /// Appends the user turn and a loading assistant turn, aborting any
    /// exchange still in flight first; at most one ask is active per
    /// conversation. Drive the stream with `next_event()` and feed each
    /// event to `Conversation::apply`.
    pub fn ask(
        &self,
        conversation: &mut Conversation,
        query: &str,
    ) -> Result<AskStream, ClientError> {
        self.ask_with(conversation, query, AskOptions::default())
    }

    /// `ask` with explicit options.
    pub fn ask_with(
        &self,
        conversation: &mut Conversation,
        query: &str,
        options: AskOptions,
    ) -> Result<AskStream, ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ClientError::Validation("ask query must not be empty".into()));
        }

        let turn_id = Uuid::new_v4();
        let (abort_tx, abort_rx) = watch::channel(false);
        let abort_handle = AbortHandle::new(abort_tx);
        conversation.begin_exchange(query, turn_id, abort_handle.clone());

        let request = AnswerRequest {
            query: query.to_string(),
            conversation_id: conversation.conversation_id().map(str::to_string),
            deep_search: options.deep_search,
        };
        let budget = options.timeout.unwrap_or(if options.deep_search {
            self.deep_answer_timeout
        } else {
            self.answer_timeout
        });
        let session = TurnSession::new(turn_id, request.conversation_id.clone());
        let source = self.source.clone();
        let open: OpenFuture = Box::pin(async move { source.open(request).await });

        Ok(AskStream::new(session, open, abort_rx, abort_handle, budget))
    }

    /// Asks and drives the stream to completion, applying every event to
    /// `conversation`.
    pub async fn collect(
        &self,
        conversation: &mut Conversation,
        query: &str,
    ) -> Result<AskOutcome, ClientError> {
        self.collect_with(conversation, query, AskOptions::default())
            .await
    }

    /// `collect` with explicit options.
    pub async fn collect_with(
        &self,
        conversation: &mut Conversation,
        query: &str,
        options: AskOptions,
    ) -> Result<AskOutcome, ClientError> {
        let mut stream = self.ask_with(conversation, query, options)?;
        let mut outcome = None;
        while let Some(event) = stream.next_event().await {
            conversation.apply(&event);
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
                AskEvent::Cancelled { partial, .. } => {
                    outcome = Some(AskOutcome::Cancelled { partial });
                }
                AskEvent::Failed { failure, .. } => {
                    // The conversation has already preserved any partial
                    // output at this point.
                    return Err(ClientError::TurnFailed(failure));
                }
                _ => {}
            }
        }
        outcome.ok_or_else(|| {
            ClientError::Protocol("ask stream ended without a terminal event".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use futures::stream;

    use crate::conversation::TurnState;
    use crate::errors::TransportError;
    use crate::upstream::AnswerStreamHandle;
    use crate::wire::UpstreamEvent;

    /// Scripted answer source that records every request it serves.
    struct ScriptedSource {
        scripts: Mutex<Vec<Vec<Result<UpstreamEvent, TransportError>>>>,
        requests: Mutex<Vec<AnswerRequest>>,
    }

    impl ScriptedSource {
        fn new(scripts: Vec<Vec<Result<UpstreamEvent, TransportError>>>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<AnswerRequest> {
            self.requests.lock().expect("lock").clone()
        }
    }

    #[async_trait::async_trait]
    impl AnswerSource for ScriptedSource {
        async fn open(&self, request: AnswerRequest) -> Result<AnswerStreamHandle, TransportError> {
            self.requests.lock().expect("lock").push(request);
            let mut scripts = self.scripts.lock().expect("lock");
            if scripts.is_empty() {
                return Ok(AnswerStreamHandle {
                    events: Box::pin(stream::pending()),
                });
            }
            let script = scripts.remove(0);
            Ok(AnswerStreamHandle {
                events: Box::pin(stream::iter(script)),
            })
        }
    }

    fn client(source: Arc<ScriptedSource>) -> AskClient {
        AskClient::with_source(source, Duration::from_secs(5), Duration::from_secs(5))
    }

    fn complete(
        content: &str,
        conversation_id: Option<&str>,
    ) -> Result<UpstreamEvent, TransportError> {
        Ok(UpstreamEvent::MessageComplete {
            content: Some(content.to_string()),
            sources: None,
            conversation_id: conversation_id.map(str::to_string),
            response_type: None,
        })
    }

    #[tokio::test]
    async fn empty_queries_are_rejected_before_any_turn_is_created() {
        let source = ScriptedSource::new(vec![]);
        let client = client(source);
        let mut conversation = Conversation::new();
        let result = client.ask(&mut conversation, "   ");
        assert!(matches!(result, Err(ClientError::Validation(_))));
        assert!(conversation.turns().is_empty());
    }

    #[tokio::test]
    async fn the_thread_id_is_sent_on_the_next_ask() {
        let source = ScriptedSource::new(vec![
            vec![complete("First answer.", Some("conv-1"))],
            vec![complete("Second answer.", Some("conv-1"))],
        ]);
        let client = client(source.clone());
        let mut conversation = Conversation::new();

        client
            .collect(&mut conversation, "first question")
            .await
            .expect("first ask");
        client
            .collect(&mut conversation, "second question")
            .await
            .expect("second ask");

        let requests = source.requests();
        assert_eq!(requests[0].conversation_id, None);
        assert_eq!(requests[1].conversation_id.as_deref(), Some("conv-1"));
    }

    #[tokio::test]
    async fn resubmission_aborts_the_previous_stream() {
        let source = ScriptedSource::new(vec![]);
        let client = client(source);
        let mut conversation = Conversation::new();

        let mut first = client.ask(&mut conversation, "first").expect("first ask");
        assert!(matches!(
            first.next_event().await,
            Some(AskEvent::TurnStarted { .. })
        ));

        let _second = client.ask(&mut conversation, "second").expect("second ask");
        // The superseded stream observes cancellation, then nothing more.
        assert!(matches!(
            first.next_event().await,
            Some(AskEvent::Cancelled { .. })
        ));
        assert!(first.next_event().await.is_none());

        // user, user, loading: the first loading placeholder was removed.
        assert_eq!(conversation.turns().len(), 3);
        assert_eq!(conversation.turns()[2].state, TurnState::Loading);
    }

    #[tokio::test]
    async fn collect_applies_the_final_answer_to_the_conversation() {
        let source = ScriptedSource::new(vec![vec![
            Ok(UpstreamEvent::TextDelta {
                delta: "Shipping ".into(),
            }),
            Ok(UpstreamEvent::TextDelta {
                delta: "update [1].".into(),
            }),
            Ok(UpstreamEvent::Sources {
                sources: vec![crate::source::SourceRecord {
                    id: None,
                    video_id: "v1".into(),
                    title: "Weekly sync".into(),
                    timestamp: 61.0,
                    timestamp_end: Some(95.0),
                    text: "we shipped".into(),
                    playback_id: None,
                    speaker: None,
                    cited: None,
                }],
            }),
            complete("", None),
        ]]);
        let client = client(source);
        let mut conversation = Conversation::new();

        let outcome = client
            .collect(&mut conversation, "what shipped?")
            .await
            .expect("outcome");
        let answer = match outcome {
            AskOutcome::Answer(answer) => answer,
            other => panic!("expected answer, got {other:?}"),
        };
        assert_eq!(answer.text, "Shipping update [1].");
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].display_number, 1);
        assert_eq!(answer.citations[0].start, "1:01");

        let turn = conversation.latest_answer().expect("answer turn");
        assert_eq!(turn.text, "Shipping update [1].");
        assert_eq!(turn.citations.len(), 1);
    }

    /// Streaming and non-streaming delivery of the same logical answer must
    /// leave the conversation in an equivalent end state.
    #[tokio::test]
    async fn fallback_and_streaming_paths_converge() {
        let text = "Capacity planning is covered in [1].";
        let citation = crate::source::SourceRecord {
            id: None,
            video_id: "v7".into(),
            title: "Planning review".into(),
            timestamp: 30.0,
            timestamp_end: None,
            text: "capacity".into(),
            playback_id: None,
            speaker: None,
            cited: None,
        };

        let streamed = ScriptedSource::new(vec![vec![
            Ok(UpstreamEvent::MessageStart { id: "m1".into() }),
            Ok(UpstreamEvent::TextDelta {
                delta: text.to_string(),
            }),
            Ok(UpstreamEvent::Sources {
                sources: vec![citation.clone()],
            }),
            Ok(UpstreamEvent::MessageComplete {
                content: Some(text.to_string()),
                sources: Some(vec![citation.clone()]),
                conversation_id: Some("conv-9".into()),
                response_type: None,
            }),
            Ok(UpstreamEvent::Done),
        ]]);
        // The fallback path replays the JSON body as synthetic deltas plus
        // the same terminal event.
        let fallback = ScriptedSource::new(vec![vec![
            Ok(UpstreamEvent::TextDelta {
                delta: text[..20].to_string(),
            }),
            Ok(UpstreamEvent::TextDelta {
                delta: text[20..].to_string(),
            }),
            Ok(UpstreamEvent::Sources {
                sources: vec![citation.clone()],
            }),
            Ok(UpstreamEvent::MessageComplete {
                content: Some(text.to_string()),
                sources: Some(vec![citation.clone()]),
                conversation_id: Some("conv-9".into()),
                response_type: Some("answer".into()),
            }),
            Ok(UpstreamEvent::Done),
        ]]);

        let mut streamed_conversation = Conversation::new();
        let streamed_outcome = client(streamed)
            .collect(&mut streamed_conversation, "where is capacity planning?")
            .await
            .expect("streamed");
        let mut fallback_conversation = Conversation::new();
        let fallback_outcome = client(fallback)
            .collect(&mut fallback_conversation, "where is capacity planning?")
            .await
            .expect("fallback");

        let streamed_answer = match streamed_outcome {
            AskOutcome::Answer(answer) => answer,
            other => panic!("expected answer, got {other:?}"),
        };
        let fallback_answer = match fallback_outcome {
            AskOutcome::Answer(answer) => answer,
            other => panic!("expected answer, got {other:?}"),
        };
        assert_eq!(streamed_answer.text, fallback_answer.text);
        assert_eq!(streamed_answer.citations, fallback_answer.citations);
        assert_eq!(streamed_answer.render_text, fallback_answer.render_text);
        assert_eq!(
            streamed_conversation.conversation_id(),
            fallback_conversation.conversation_id()
        );
    }

    #[tokio::test]
    async fn upstream_error_after_text_keeps_the_partial_visible() {
        let source = ScriptedSource::new(vec![vec![
            Ok(UpstreamEvent::TextDelta {
                delta: "Partial ".into(),
            }),
            Ok(UpstreamEvent::TextDelta {
                delta: "answer".into(),
            }),
            Ok(UpstreamEvent::Error {
                code: "overloaded".into(),
                message: "busy".into(),
                retryable: true,
            }),
        ]]);
        let client = client(source);
        let mut conversation = Conversation::new();

        let result = client.collect(&mut conversation, "q").await;
        assert!(matches!(
            result,
            Err(ClientError::TurnFailed(crate::errors::TurnFailure::Upstream { .. }))
        ));
        // Partial answer turn plus the trailing failure notice.
        assert_eq!(conversation.turns()[1].text, "Partial answer");
        assert_eq!(conversation.turns()[1].state, TurnState::Answer);
        assert!(matches!(
            conversation.turns()[2].state,
            TurnState::Error { .. }
        ));
    }

    #[tokio::test]
    async fn env_gated_smoke_collect_if_configured() {
        if std::env::var("SCREENROOM_ANSWERS_KEY")
            .unwrap_or_default()
            .trim()
            .is_empty()
        {
            eprintln!("skipping answer service smoke test (SCREENROOM_ANSWERS_KEY missing)");
            return;
        }

        let client = AskClient::from_env().expect("client");
        let mut conversation = Conversation::new();
        let result = client
            .collect(&mut conversation, "What topics does this library cover?")
            .await;
        assert!(result.is_ok(), "answer service smoke failed: {result:?}");
    }
}
