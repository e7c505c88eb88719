use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub Uuid);

impl ChatId {
    pub const fn new(raw: Uuid) -> Self {
        Self(raw)
    }

    /// Time-ordered id for a freshly opened chat.
    pub fn new_v7() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Identifier of one turn. Kept as text because turns may originate outside
/// this process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl TurnId {
    pub fn new_v7() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for TurnId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier for one request/response exchange.
///
/// Changes on every send or regenerate so late chunks of an abandoned
/// exchange can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamSessionId(pub u64);

impl StreamSessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Stream routing key used for stale-chunk rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamTarget {
    pub chat_id: ChatId,
    pub session_id: StreamSessionId,
}

impl StreamTarget {
    pub const fn new(chat_id: ChatId, session_id: StreamSessionId) -> Self {
        Self {
            chat_id,
            session_id,
        }
    }
}

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One fragment of a turn's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text { text: String },
    Reasoning { text: String },
    /// Any part kind this client does not display (files, tool calls, ...).
    Other { kind: String },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning { text: text.into() }
    }

    pub fn other(kind: impl Into<String>) -> Self {
        Self::Other { kind: kind.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Reasoning { .. } | Self::Other { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMetadata {
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One message in a conversation. Replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default)]
    pub metadata: Option<TurnMetadata>,
}

impl ConversationTurn {
    pub fn new(id: TurnId, role: Role, parts: Vec<Part>) -> Self {
        Self {
            id,
            role,
            parts,
            metadata: None,
        }
    }

    /// A user turn stamped with the current time.
    pub fn user_text(id: TurnId, text: impl Into<String>) -> Self {
        Self::new(id, Role::User, vec![Part::text(text)]).with_created_at(Utc::now())
    }

    /// An assistant turn with no content yet.
    pub fn assistant_empty(id: TurnId) -> Self {
        Self::new(id, Role::Assistant, Vec::new()).with_created_at(Utc::now())
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.metadata = Some(TurnMetadata {
            created_at: Some(created_at),
        });
        self
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.metadata.as_ref().and_then(|metadata| metadata.created_at)
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Where the current exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Submitted,
    Streaming,
    #[default]
    Ready,
    Error,
}

impl RequestStatus {
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }

    /// True while a request is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Submitted | Self::Streaming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_use_tagged_wire_shape() {
        let turn: ConversationTurn = serde_json::from_str(
            r#"{
                "id": "t1",
                "role": "user",
                "parts": [
                    {"type": "text", "text": "A"},
                    {"type": "other", "kind": "image"},
                    {"type": "reasoning", "text": "hmm"}
                ],
                "metadata": {"createdAt": "2025-01-02T03:04:05Z"}
            }"#,
        )
        .expect("valid turn");

        assert_eq!(turn.id, TurnId::from("t1"));
        assert!(turn.is_user());
        assert_eq!(turn.parts[0], Part::text("A"));
        assert_eq!(turn.parts[1], Part::other("image"));
        assert_eq!(turn.parts[2], Part::reasoning("hmm"));
        assert!(turn.created_at().is_some());
    }

    #[test]
    fn metadata_is_optional() {
        let turn: ConversationTurn =
            serde_json::from_str(r#"{"id": "t2", "role": "assistant", "parts": []}"#)
                .expect("valid turn");
        assert_eq!(turn.created_at(), None);
        assert_eq!(turn.role, Role::Assistant);
    }

    #[test]
    fn only_in_flight_statuses_are_busy() {
        assert!(RequestStatus::Submitted.is_busy());
        assert!(RequestStatus::Streaming.is_busy());
        assert!(!RequestStatus::Ready.is_busy());
        assert!(!RequestStatus::Error.is_busy());
        assert!(RequestStatus::default().is_ready());
    }

    #[test]
    fn generated_turn_ids_are_unique() {
        assert_ne!(TurnId::new_v7(), TurnId::new_v7());
    }
}
