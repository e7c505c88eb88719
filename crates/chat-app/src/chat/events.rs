use crate::chat::message::{StreamTarget, TurnId};

/// Asks the transport to recompute the response that follows `message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegenerateRequest {
    pub message_id: TurnId,
}

/// Sends `text` as a new user turn, or replaces the user turn `message_id`
/// and regenerates everything after it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SendMessageRequest {
    pub text: String,
    pub message_id: Option<TurnId>,
}

impl SendMessageRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            message_id: None,
        }
    }

    pub fn replacing(text: impl Into<String>, message_id: TurnId) -> Self {
        Self {
            text: text.into(),
            message_id: Some(message_id),
        }
    }
}

/// Emitted when the user submits a prompt from the input box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submit {
    pub content: String,
}

impl Submit {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn into_request(self) -> SendMessageRequest {
        SendMessageRequest::new(self.content)
    }
}

/// Emitted when the user requests cancellation of the active stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stop {
    pub target: StreamTarget,
}

/// A failure the user should see even though the transcript is unaffected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatNotice {
    /// Work went ahead with a fallback.
    Degraded(String),
    Failed(String),
}
