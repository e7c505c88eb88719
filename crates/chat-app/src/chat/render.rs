//! Presentation of a single conversation turn.
//!
//! Everything here is plain data so the list component only has to map a
//! [`TurnPresentation`] onto elements.

use crate::chat::events::{RegenerateRequest, SendMessageRequest};
use crate::chat::message::{ConversationTurn, Part, RequestStatus, Role, TurnId};

pub const USER_LABEL: &str = "User:";
pub const ASSISTANT_LABEL: &str = "AI:";
pub const REGENERATE_LABEL: &str = "Regenerate";
pub const REPLACE_LABEL: &str = "Replace with Hello";
/// Text sent by the replace action.
pub const REPLACEMENT_TEXT: &str = "Hello";

/// Horizontal placement of a turn bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Right-aligned, indented from the left.
    End,
    /// Left-aligned, indented from the right.
    Start,
}

/// Background tint of a turn bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    Accent,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnStyle {
    pub alignment: Alignment,
    pub tint: Tint,
    pub label: &'static str,
}

impl TurnStyle {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::User => Self {
                alignment: Alignment::End,
                tint: Tint::Accent,
                label: USER_LABEL,
            },
            Role::Assistant => Self {
                alignment: Alignment::Start,
                tint: Tint::Neutral,
                label: ASSISTANT_LABEL,
            },
        }
    }
}

/// The two actions offered on user turns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnActions {
    message_id: TurnId,
    enabled: bool,
}

impl TurnActions {
    pub fn new(message_id: TurnId, status: RequestStatus) -> Self {
        Self {
            message_id,
            enabled: status.is_ready(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn message_id(&self) -> &TurnId {
        &self.message_id
    }

    /// Invokes `dispatch` with a regenerate request when enabled.
    /// Returns whether the callback ran.
    pub fn regenerate(&self, dispatch: impl FnOnce(RegenerateRequest)) -> bool {
        if !self.enabled {
            return false;
        }

        dispatch(RegenerateRequest {
            message_id: self.message_id.clone(),
        });
        true
    }

    /// Invokes `dispatch` with the fixed replacement when enabled.
    /// Returns whether the callback ran.
    pub fn replace_with_hello(&self, dispatch: impl FnOnce(SendMessageRequest)) -> bool {
        if !self.enabled {
            return false;
        }

        dispatch(SendMessageRequest::replacing(
            REPLACEMENT_TEXT,
            self.message_id.clone(),
        ));
        true
    }
}

/// Everything needed to draw one turn, minus the timestamp which is derived
/// after the first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnPresentation {
    pub turn_id: TurnId,
    pub style: TurnStyle,
    pub text: String,
    pub actions: Option<TurnActions>,
}

pub fn present(turn: &ConversationTurn, status: RequestStatus) -> TurnPresentation {
    let actions = turn
        .is_user()
        .then(|| TurnActions::new(turn.id.clone(), status));

    TurnPresentation {
        turn_id: turn.id.clone(),
        style: TurnStyle::for_role(turn.role),
        text: display_text(&turn.parts),
        actions,
    }
}

/// Concatenates text parts in order; every other part kind renders as nothing.
pub fn display_text(parts: &[Part]) -> String {
    parts.iter().filter_map(Part::as_text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Role, parts: Vec<Part>) -> ConversationTurn {
        ConversationTurn::new(TurnId::from("turn-1"), role, parts)
    }

    const ALL_STATUSES: [RequestStatus; 4] = [
        RequestStatus::Submitted,
        RequestStatus::Streaming,
        RequestStatus::Ready,
        RequestStatus::Error,
    ];

    #[test]
    fn turn_without_text_parts_displays_nothing() {
        assert_eq!(display_text(&[]), "");
        assert_eq!(
            display_text(&[Part::other("image"), Part::reasoning("thinking")]),
            ""
        );
    }

    #[test]
    fn text_parts_concatenate_in_order_skipping_others() {
        let parts = vec![Part::text("A"), Part::other("image"), Part::text("B")];
        assert_eq!(display_text(&parts), "AB");

        let presentation = present(&turn(Role::Assistant, parts), RequestStatus::Ready);
        assert_eq!(presentation.text, "AB");
    }

    #[test]
    fn assistant_turns_never_expose_actions() {
        for status in ALL_STATUSES {
            let presentation = present(&turn(Role::Assistant, vec![Part::text("hi")]), status);
            assert_eq!(presentation.actions, None);
            assert_eq!(presentation.style.label, ASSISTANT_LABEL);
            assert_eq!(presentation.style.alignment, Alignment::Start);
            assert_eq!(presentation.style.tint, Tint::Neutral);
        }
    }

    #[test]
    fn user_actions_are_disabled_until_ready() {
        for status in ALL_STATUSES
            .into_iter()
            .filter(|status| *status != RequestStatus::Ready)
        {
            let presentation = present(&turn(Role::User, vec![Part::text("hi")]), status);
            let actions = presentation.actions.expect("user turns carry actions");
            assert!(!actions.enabled());

            let mut called = false;
            assert!(!actions.regenerate(|_| called = true));
            assert!(!actions.replace_with_hello(|_| called = true));
            assert!(!called);
        }
    }

    #[test]
    fn regenerate_dispatches_only_the_turn_id() {
        let presentation = present(&turn(Role::User, vec![Part::text("hi")]), RequestStatus::Ready);
        let actions = presentation.actions.expect("user turns carry actions");
        let mut regenerated = Vec::new();

        assert!(actions.regenerate(|request| regenerated.push(request)));

        assert_eq!(
            regenerated,
            vec![RegenerateRequest {
                message_id: TurnId::from("turn-1")
            }]
        );
    }

    #[test]
    fn replace_sends_fixed_text_for_the_turn() {
        let presentation = present(&turn(Role::User, vec![Part::text("hi")]), RequestStatus::Ready);
        let actions = presentation.actions.expect("user turns carry actions");
        let mut sent = Vec::new();

        assert!(actions.replace_with_hello(|request| sent.push(request)));

        assert_eq!(
            sent,
            vec![SendMessageRequest {
                text: "Hello".to_string(),
                message_id: Some(TurnId::from("turn-1")),
            }]
        );
    }

    #[test]
    fn user_style_is_right_aligned_with_accent() {
        let style = present(&turn(Role::User, Vec::new()), RequestStatus::Ready).style;
        assert_eq!(style.alignment, Alignment::End);
        assert_eq!(style.tint, Tint::Accent);
        assert_eq!(style.label, USER_LABEL);
    }
}
