//! Conversation state and request lifecycle for one chat.
//!
//! The transport owns the ordered turns and the [`RequestStatus`]. It performs
//! no IO: callers get an [`ExchangeRequest`] to hand to a provider and feed
//! the resulting stream back through [`ChatTransport::apply`].

use snafu::{Snafu, ensure};

use crate::chat::events::{RegenerateRequest, SendMessageRequest};
use crate::chat::message::{
    ChatId, ConversationTurn, Part, RequestStatus, Role, StreamSessionId, StreamTarget, TurnId,
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("a request is already in flight ({status:?})"))]
    Busy {
        stage: &'static str,
        status: RequestStatus,
    },
    #[snafu(display("refusing to send an empty message"))]
    EmptyMessage { stage: &'static str },
    #[snafu(display("turn '{message_id}' does not exist"))]
    UnknownTurn {
        stage: &'static str,
        message_id: TurnId,
    },
    #[snafu(display("turn '{message_id}' is not a user turn"))]
    NotUserTurn {
        stage: &'static str,
        message_id: TurnId,
    },
    #[snafu(display("no user turn precedes '{message_id}'"))]
    NothingToRegenerate {
        stage: &'static str,
        message_id: TurnId,
    },
}

pub type TransportResult<T> = Result<T, TransportError>;

/// One history entry as sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Work item produced by a send or regenerate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRequest {
    pub target: StreamTarget,
    pub history: Vec<HistoryEntry>,
}

/// Stream output of the active exchange, in chat-domain terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    Delta(String),
    ReasoningDelta(String),
    Done,
    Error(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveExchange {
    target: StreamTarget,
    assistant_turn_id: Option<TurnId>,
}

#[derive(Debug, Clone)]
pub struct ChatTransport {
    chat_id: ChatId,
    turns: Vec<ConversationTurn>,
    status: RequestStatus,
    last_error: Option<String>,
    next_session_id: u64,
    active: Option<ActiveExchange>,
}

impl ChatTransport {
    pub fn new(chat_id: ChatId) -> Self {
        Self::with_turns(chat_id, Vec::new())
    }

    pub fn with_turns(chat_id: ChatId, turns: Vec<ConversationTurn>) -> Self {
        Self {
            chat_id,
            turns,
            status: RequestStatus::Ready,
            last_error: None,
            next_session_id: 1,
            active: None,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn active_target(&self) -> Option<StreamTarget> {
        self.active.as_ref().map(|active| active.target)
    }

    /// Appends a user turn, or rewrites an existing one and drops every turn
    /// after it.
    pub fn send_message(&mut self, request: SendMessageRequest) -> TransportResult<ExchangeRequest> {
        self.ensure_idle("send-message")?;
        ensure!(
            !request.text.trim().is_empty(),
            EmptyMessageSnafu {
                stage: "send-message",
            }
        );

        match request.message_id {
            None => {
                self.turns
                    .push(ConversationTurn::user_text(TurnId::new_v7(), request.text));
            }
            Some(message_id) => {
                let index = self.position_of(&message_id, "send-message-replace")?;
                ensure!(
                    self.turns[index].is_user(),
                    NotUserTurnSnafu {
                        stage: "send-message-replace",
                        message_id,
                    }
                );

                self.turns.truncate(index + 1);
                self.turns[index] = ConversationTurn::user_text(message_id, request.text);
            }
        }

        Ok(self.begin_exchange())
    }

    /// Drops the response that followed `message_id` and requests a new one.
    pub fn regenerate(&mut self, request: RegenerateRequest) -> TransportResult<ExchangeRequest> {
        self.ensure_idle("regenerate")?;
        let index = self.position_of(&request.message_id, "regenerate")?;

        let keep = if self.turns[index].is_user() {
            index + 1
        } else {
            // Regenerating an answer means re-asking the user turn before it.
            let has_prompt = self.turns[..index].iter().any(ConversationTurn::is_user);
            ensure!(
                has_prompt,
                NothingToRegenerateSnafu {
                    stage: "regenerate",
                    message_id: request.message_id,
                }
            );
            index
        };

        self.turns.truncate(keep);
        Ok(self.begin_exchange())
    }

    /// Applies one stream event. Events for anything but the active exchange
    /// are ignored; returns whether the event was accepted.
    pub fn apply(&mut self, target: StreamTarget, event: ExchangeEvent) -> bool {
        if self.active_target() != Some(target) {
            tracing::debug!(?target, "dropping event for inactive exchange");
            return false;
        }

        match event {
            ExchangeEvent::Delta(chunk) => {
                self.append_to_assistant(chunk, Part::as_text, |text| Part::Text { text });
                self.status = RequestStatus::Streaming;
            }
            ExchangeEvent::ReasoningDelta(chunk) => {
                self.append_to_assistant(chunk, as_reasoning, |text| Part::Reasoning { text });
                self.status = RequestStatus::Streaming;
            }
            ExchangeEvent::Done => {
                self.finish(RequestStatus::Ready);
            }
            ExchangeEvent::Error(message) => {
                tracing::warn!(?target, error = %message, "exchange failed");
                self.finish(RequestStatus::Error);
                self.last_error = Some(message);
            }
            ExchangeEvent::Cancelled => {
                tracing::debug!(?target, "exchange cancelled");
                self.finish(RequestStatus::Ready);
            }
        }

        true
    }

    /// Conversation history for the model: text parts only, blank turns skipped.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.turns
            .iter()
            .filter_map(|turn| {
                let content = crate::chat::render::display_text(&turn.parts);
                if content.trim().is_empty() {
                    None
                } else {
                    Some(HistoryEntry {
                        role: turn.role,
                        content,
                    })
                }
            })
            .collect()
    }

    fn ensure_idle(&self, stage: &'static str) -> TransportResult<()> {
        ensure!(
            !self.status.is_busy(),
            BusySnafu {
                stage,
                status: self.status,
            }
        );
        Ok(())
    }

    fn position_of(&self, message_id: &TurnId, stage: &'static str) -> TransportResult<usize> {
        self.turns
            .iter()
            .position(|turn| turn.id == *message_id)
            .ok_or_else(|| TransportError::UnknownTurn {
                stage,
                message_id: message_id.clone(),
            })
    }

    fn begin_exchange(&mut self) -> ExchangeRequest {
        let target = StreamTarget::new(self.chat_id, StreamSessionId::new(self.next_session_id));
        self.next_session_id = self.next_session_id.saturating_add(1);
        self.status = RequestStatus::Submitted;
        self.last_error = None;
        self.active = Some(ActiveExchange {
            target,
            assistant_turn_id: None,
        });

        tracing::debug!(?target, turn_count = self.turns.len(), "exchange submitted");

        ExchangeRequest {
            target,
            history: self.history(),
        }
    }

    fn finish(&mut self, status: RequestStatus) {
        self.status = status;
        self.active = None;
    }

    fn append_to_assistant(
        &mut self,
        chunk: String,
        matches_kind: fn(&Part) -> Option<&str>,
        make: fn(String) -> Part,
    ) {
        if chunk.is_empty() {
            return;
        }

        let Some(active) = self.active.as_mut() else {
            return;
        };

        let turn_id = match &active.assistant_turn_id {
            Some(turn_id) => turn_id.clone(),
            None => {
                let turn_id = TurnId::new_v7();
                self.turns
                    .push(ConversationTurn::assistant_empty(turn_id.clone()));
                active.assistant_turn_id = Some(turn_id.clone());
                turn_id
            }
        };

        let Some(turn) = self.turns.iter_mut().rev().find(|turn| turn.id == turn_id) else {
            return;
        };

        // Replace the turn wholesale so observers never see a half-applied update.
        let mut parts = std::mem::take(&mut turn.parts);
        let extends_last = parts
            .last()
            .is_some_and(|last| matches_kind(last).is_some());
        if extends_last {
            if let Some(Part::Text { text } | Part::Reasoning { text }) = parts.last_mut() {
                text.push_str(&chunk);
            }
        } else {
            parts.push(make(chunk));
        }
        turn.parts = parts;
    }
}

fn as_reasoning(part: &Part) -> Option<&str> {
    match part {
        Part::Reasoning { text } => Some(text),
        Part::Text { .. } | Part::Other { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn transport() -> ChatTransport {
        ChatTransport::new(ChatId::new(Uuid::nil()))
    }

    fn answered(transport: &mut ChatTransport, prompt: &str, answer: &str) -> TurnId {
        let request = transport
            .send_message(SendMessageRequest::new(prompt))
            .expect("idle transport accepts sends");
        transport.apply(request.target, ExchangeEvent::Delta(answer.to_string()));
        transport.apply(request.target, ExchangeEvent::Done);
        transport.turns()[transport.turns().len() - 2].id.clone()
    }

    #[test]
    fn send_appends_user_turn_and_submits() {
        let mut transport = transport();
        let request = transport
            .send_message(SendMessageRequest::new("hi"))
            .expect("send accepted");

        assert_eq!(transport.status(), RequestStatus::Submitted);
        assert_eq!(transport.turns().len(), 1);
        assert!(transport.turns()[0].is_user());
        assert!(transport.turns()[0].created_at().is_some());
        assert_eq!(
            request.history,
            vec![HistoryEntry {
                role: Role::User,
                content: "hi".to_string()
            }]
        );
    }

    #[test]
    fn streaming_builds_one_assistant_turn() {
        let mut transport = transport();
        let request = transport
            .send_message(SendMessageRequest::new("hi"))
            .expect("send accepted");

        assert!(transport.apply(request.target, ExchangeEvent::ReasoningDelta("let me".into())));
        assert!(transport.apply(request.target, ExchangeEvent::ReasoningDelta(" think".into())));
        assert!(transport.apply(request.target, ExchangeEvent::Delta("Hel".into())));
        assert_eq!(transport.status(), RequestStatus::Streaming);
        assert!(transport.apply(request.target, ExchangeEvent::Delta("lo".into())));
        assert!(transport.apply(request.target, ExchangeEvent::Done));

        assert_eq!(transport.status(), RequestStatus::Ready);
        assert_eq!(transport.turns().len(), 2);
        assert_eq!(
            transport.turns()[1].parts,
            vec![Part::reasoning("let me think"), Part::text("Hello")]
        );
        assert_eq!(transport.history()[1].content, "Hello");
    }

    #[test]
    fn sends_are_rejected_while_busy() {
        let mut transport = transport();
        transport
            .send_message(SendMessageRequest::new("hi"))
            .expect("send accepted");

        let result = transport.send_message(SendMessageRequest::new("again"));
        assert!(matches!(result, Err(TransportError::Busy { .. })));
        let result = transport.regenerate(RegenerateRequest {
            message_id: transport.turns()[0].id.clone(),
        });
        assert!(matches!(result, Err(TransportError::Busy { .. })));
    }

    #[test]
    fn blank_message_is_rejected() {
        let mut transport = transport();
        let result = transport.send_message(SendMessageRequest::new("   "));
        assert!(matches!(result, Err(TransportError::EmptyMessage { .. })));
        assert_eq!(transport.status(), RequestStatus::Ready);
    }

    #[test]
    fn replace_rewrites_user_turn_and_drops_followers() {
        let mut transport = transport();
        let first = answered(&mut transport, "one", "uno");
        answered(&mut transport, "two", "dos");
        assert_eq!(transport.turns().len(), 4);

        let request = transport
            .send_message(SendMessageRequest::replacing("Hello", first.clone()))
            .expect("replace accepted");

        assert_eq!(transport.turns().len(), 1);
        assert_eq!(transport.turns()[0].id, first);
        assert_eq!(transport.turns()[0].parts, vec![Part::text("Hello")]);
        assert_eq!(request.history.len(), 1);
        assert_eq!(request.history[0].content, "Hello");
    }

    #[test]
    fn replace_rejects_assistant_and_unknown_turns() {
        let mut transport = transport();
        answered(&mut transport, "one", "uno");
        let assistant_id = transport.turns()[1].id.clone();

        let result = transport.send_message(SendMessageRequest::replacing("x", assistant_id));
        assert!(matches!(result, Err(TransportError::NotUserTurn { .. })));

        let result =
            transport.send_message(SendMessageRequest::replacing("x", TurnId::from("missing")));
        assert!(matches!(result, Err(TransportError::UnknownTurn { .. })));
        assert_eq!(transport.turns().len(), 2);
    }

    #[test]
    fn regenerate_from_user_turn_keeps_it() {
        let mut transport = transport();
        let first = answered(&mut transport, "one", "uno");
        answered(&mut transport, "two", "dos");

        let request = transport
            .regenerate(RegenerateRequest {
                message_id: first.clone(),
            })
            .expect("regenerate accepted");

        assert_eq!(transport.turns().len(), 1);
        assert_eq!(transport.turns()[0].id, first);
        assert_eq!(request.history.len(), 1);
        assert_eq!(transport.status(), RequestStatus::Submitted);
    }

    #[test]
    fn regenerate_from_assistant_turn_drops_it() {
        let mut transport = transport();
        answered(&mut transport, "one", "uno");
        let assistant_id = transport.turns()[1].id.clone();

        transport
            .regenerate(RegenerateRequest {
                message_id: assistant_id,
            })
            .expect("regenerate accepted");

        assert_eq!(transport.turns().len(), 1);
        assert!(transport.turns()[0].is_user());
    }

    #[test]
    fn regenerate_without_prompt_is_rejected() {
        let orphan = ConversationTurn::new(
            TurnId::from("a1"),
            Role::Assistant,
            vec![Part::text("welcome")],
        );
        let mut transport = ChatTransport::with_turns(ChatId::new(Uuid::nil()), vec![orphan]);

        let result = transport.regenerate(RegenerateRequest {
            message_id: TurnId::from("a1"),
        });
        assert!(matches!(
            result,
            Err(TransportError::NothingToRegenerate { .. })
        ));
    }

    #[test]
    fn stale_exchange_events_are_ignored() {
        let mut transport = transport();
        let first = transport
            .send_message(SendMessageRequest::new("one"))
            .expect("send accepted");
        transport.apply(first.target, ExchangeEvent::Cancelled);

        let second = transport
            .send_message(SendMessageRequest::new("two"))
            .expect("send accepted");
        assert_ne!(first.target, second.target);

        assert!(!transport.apply(first.target, ExchangeEvent::Delta("late".into())));
        assert_eq!(transport.turns().len(), 2);
        assert!(transport.turns().iter().all(ConversationTurn::is_user));
    }

    #[test]
    fn errors_are_recorded_and_allow_retry() {
        let mut transport = transport();
        let request = transport
            .send_message(SendMessageRequest::new("one"))
            .expect("send accepted");

        transport.apply(
            request.target,
            ExchangeEvent::Error("model not found".into()),
        );
        assert_eq!(transport.status(), RequestStatus::Error);
        assert_eq!(transport.last_error(), Some("model not found"));
        assert_eq!(transport.active_target(), None);

        let retry = transport.regenerate(RegenerateRequest {
            message_id: transport.turns()[0].id.clone(),
        });
        assert!(retry.is_ok());
        assert_eq!(transport.last_error(), None);
    }

    #[test]
    fn history_skips_turns_without_text() {
        let turns = vec![
            ConversationTurn::new(TurnId::from("u1"), Role::User, vec![Part::other("image")]),
            ConversationTurn::new(TurnId::from("u2"), Role::User, vec![Part::text("caption")]),
        ];
        let transport = ChatTransport::with_turns(ChatId::new(Uuid::nil()), turns);

        assert_eq!(
            transport.history(),
            vec![HistoryEntry {
                role: Role::User,
                content: "caption".to_string()
            }]
        );
    }
}
