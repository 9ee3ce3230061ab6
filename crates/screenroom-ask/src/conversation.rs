use uuid::Uuid;

use crate::ask::AbortHandle;
use crate::citation::Citation;
use crate::errors::TurnFailure;
use crate::event::{AnswerTurn, AskEvent};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle discriminator for a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnState {
    /// Assistant turn awaiting its first streamed text.
    Loading,
    /// Finalized (or streaming) answer text.
    Answer,
    /// The service asked a follow-up question; the question is the turn text.
    Clarification,
    /// Terminal failure.
    Error { failure: TurnFailure },
}

/// One entry in the conversation transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub role: Role,
    /// Accumulated raw text (the question for user turns).
    pub text: String,
    /// Reconciled render text, refreshed whenever the citation set changes.
    pub render_text: Option<String>,
    /// Citations ordered by display number.
    pub citations: Vec<Citation>,
    pub state: TurnState,
}

impl ConversationTurn {
    fn user(text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            text: text.to_string(),
            render_text: None,
            citations: Vec::new(),
            state: TurnState::Answer,
        }
    }

    fn loading(id: Uuid) -> Self {
        Self {
            id,
            role: Role::Assistant,
            text: String::new(),
            render_text: None,
            citations: Vec::new(),
            state: TurnState::Loading,
        }
    }

    fn failure_notice(failure: TurnFailure) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            text: String::new(),
            render_text: None,
            citations: Vec::new(),
            state: TurnState::Error { failure },
        }
    }

    fn finalize_answer(&mut self, answer: &AnswerTurn) {
        self.text = answer.text.clone();
        self.render_text = Some(answer.render_text.clone());
        self.citations = answer.citations.clone();
        self.state = TurnState::Answer;
    }
}

/// Ordered transcript of a conversation, updated in place as an ask stream
/// progresses. At most one assistant turn is mutable at a time.
#[derive(Default)]
pub struct Conversation {
    conversation_id: Option<String>,
    turns: Vec<ConversationTurn>,
    streaming: Option<usize>,
    in_flight: Option<AbortHandle>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes a conversation thread by id (for example after a page reload).
    pub fn with_id(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            ..Self::default()
        }
    }

    /// The upstream thread id, once one has been assigned.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    /// The turn currently receiving stream updates.
    pub fn streaming_turn(&self) -> Option<&ConversationTurn> {
        self.streaming.and_then(|index| self.turns.get(index))
    }

    /// The most recent finalized assistant answer.
    pub fn latest_answer(&self) -> Option<&ConversationTurn> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Assistant && turn.state == TurnState::Answer)
    }

    /// Stops the in-flight exchange, if any. The streaming turn keeps its
    /// partial text as an answer; an untouched loading placeholder is
    /// removed. No error is surfaced.
    pub fn cancel_in_flight(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        if let Some(index) = self.streaming.take() {
            if self.turns.get(index).is_some_and(|turn| turn.text.is_empty()) {
                self.turns.remove(index);
            } else if let Some(turn) = self.turns.get_mut(index) {
                turn.state = TurnState::Answer;
            }
        }
    }

    /// Clears the transcript and drops the thread id.
    pub fn reset(&mut self) {
        self.cancel_in_flight();
        self.turns.clear();
        self.conversation_id = None;
    }

    /// Appends the user turn and the loading assistant turn for a new
    /// exchange, aborting any exchange still in flight first.
    pub(crate) fn begin_exchange(&mut self, query: &str, turn_id: Uuid, abort: AbortHandle) {
        self.cancel_in_flight();
        self.turns.push(ConversationTurn::user(query));
        self.turns.push(ConversationTurn::loading(turn_id));
        self.streaming = Some(self.turns.len() - 1);
        self.in_flight = Some(abort);
    }

    /// Applies one stream event to the transcript. Events for anything other
    /// than the current streaming turn are ignored, so a superseded stream
    /// can no longer mutate state.
    pub fn apply(&mut self, event: &AskEvent) {
        let Some(index) = self.streaming else {
            return;
        };
        if self.turns.get(index).map(|turn| turn.id) != Some(event.turn_id()) {
            return;
        }
        match event {
            AskEvent::TurnStarted { .. } => {}
            AskEvent::AnswerDelta { delta, .. } => {
                let turn = &mut self.turns[index];
                turn.text.push_str(delta);
                turn.state = TurnState::Answer;
            }
            AskEvent::CitationsUpdated {
                citations,
                render_text,
                ..
            } => {
                let turn = &mut self.turns[index];
                turn.citations = citations.clone();
                turn.render_text = Some(render_text.clone());
            }
            AskEvent::Completed { answer, .. } => {
                self.note_conversation_id(answer.conversation_id.as_deref());
                self.turns[index].finalize_answer(answer);
                self.end_exchange();
            }
            AskEvent::Clarification {
                question,
                conversation_id,
                ..
            } => {
                self.note_conversation_id(conversation_id.as_deref());
                let turn = &mut self.turns[index];
                turn.text = question.clone();
                turn.render_text = None;
                turn.citations.clear();
                turn.state = TurnState::Clarification;
                self.end_exchange();
            }
            AskEvent::Failed {
                failure, partial, ..
            } => {
                match partial {
                    Some(partial) => {
                        // Streamed text stays visible; the failure lands as
                        // a trailing notice.
                        self.note_conversation_id(partial.conversation_id.as_deref());
                        self.turns[index].finalize_answer(partial);
                        self.turns
                            .push(ConversationTurn::failure_notice(failure.clone()));
                    }
                    None => {
                        self.turns[index].state = TurnState::Error {
                            failure: failure.clone(),
                        };
                    }
                }
                self.end_exchange();
            }
            AskEvent::Cancelled { partial, .. } => {
                match partial {
                    Some(partial) => {
                        self.note_conversation_id(partial.conversation_id.as_deref());
                        self.turns[index].finalize_answer(partial);
                    }
                    None => {
                        self.turns.remove(index);
                    }
                }
                self.end_exchange();
            }
        }
    }

    fn end_exchange(&mut self) {
        self.streaming = None;
        self.in_flight = None;
    }

    fn note_conversation_id(&mut self, id: Option<&str>) {
        // Monotonic: a thread id is never silently dropped.
        if let Some(id) = id {
            self.conversation_id = Some(id.to_string());
        }
    }
}
