/// Event contracts between the chat views and the transport.
pub mod events;
/// Conversation turns, identifiers and request status.
pub mod message;
pub mod message_input;
pub mod message_list;
/// Turn presentation: labels, display text and action gating.
pub mod render;
pub mod timestamp;
pub mod transport;
pub mod view;

pub use events::{ChatNotice, RegenerateRequest, SendMessageRequest, Stop, Submit};
pub use message::{
    ChatId, ConversationTurn, Part, RequestStatus, Role, StreamSessionId, StreamTarget, TurnId,
    TurnMetadata,
};
pub use message_input::MessageInput;
pub use message_list::MessageList;
pub use render::{TurnActions, TurnPresentation, display_text, present};
pub use timestamp::TimestampSlot;
pub use transport::{ChatTransport, ExchangeEvent, ExchangeRequest, HistoryEntry, TransportError};
pub use view::ChatView;
