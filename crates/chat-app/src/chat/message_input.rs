use gpui::*;
use gpui_component::{
    ActiveTheme, IconName, Sizable,
    button::{Button, ButtonVariants},
    input::{Input, InputEvent, InputState},
    v_flex,
};

use crate::chat::events::{Stop, Submit};
use crate::chat::message::StreamTarget;

const PLACEHOLDER: &str = "Ask a local model...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnterAction {
    Send,
    /// The newline is already in the draft; the enter event is an echo.
    KeepNewline,
}

fn enter_action(secondary: bool, newline_inserted: bool) -> EnterAction {
    if secondary || newline_inserted {
        EnterAction::KeepNewline
    } else {
        EnterAction::Send
    }
}

/// The text to send for `draft`, without the newline the enter key left behind.
fn prompt_from_draft(draft: &str) -> Option<String> {
    let prompt = draft.strip_suffix('\n').unwrap_or(draft);
    (!prompt.trim().is_empty()).then(|| prompt.to_string())
}

/// Prompt box under the transcript. While an exchange runs the draft is
/// locked and the action button stops that exchange instead of sending.
pub struct MessageInput {
    draft: Entity<InputState>,
    in_flight: Option<StreamTarget>,
    newline_inserted: bool,
}

impl EventEmitter<Submit> for MessageInput {}
impl EventEmitter<Stop> for MessageInput {}

impl MessageInput {
    pub fn new(window: &mut Window, cx: &mut Context<Self>) -> Self {
        let draft = cx.new(|cx| {
            InputState::new(window, cx)
                .placeholder(PLACEHOLDER)
                .clean_on_escape()
                .auto_grow(1, 8)
        });

        cx.subscribe_in(&draft, window, |this, _, event: &InputEvent, window, cx| {
            let InputEvent::PressEnter { secondary } = event else {
                return;
            };
            match enter_action(*secondary, this.newline_inserted) {
                EnterAction::KeepNewline => this.newline_inserted = false,
                EnterAction::Send => this.send_draft(window, cx),
            }
        })
        .detach();

        Self {
            draft,
            in_flight: None,
            newline_inserted: false,
        }
    }

    /// `Some` while an exchange streams into the transcript.
    pub fn set_active_target(&mut self, target: Option<StreamTarget>, cx: &mut Context<Self>) {
        self.in_flight = target;
        self.newline_inserted = false;
        cx.notify();
    }

    fn insert_newline(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        if self.in_flight.is_some() {
            return;
        }

        self.newline_inserted = true;
        self.draft.update(cx, |state, cx| state.insert("\n", window, cx));
    }

    fn send_draft(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        if self.in_flight.is_some() {
            return;
        }

        let Some(prompt) = prompt_from_draft(&self.draft.read(cx).value()) else {
            return;
        };
        cx.emit(Submit::new(prompt));

        self.newline_inserted = false;
        self.draft
            .update(cx, |state, cx| state.set_value("", window, cx));
    }

    fn stop_exchange(&mut self, cx: &mut Context<Self>) {
        if let Some(target) = self.in_flight.take() {
            cx.emit(Stop { target });
            cx.notify();
        }
    }

    fn render_action(&self, cx: &Context<Self>) -> AnyElement {
        if self.in_flight.is_some() {
            return Button::new("stop")
                .small()
                .danger()
                .icon(IconName::CircleX)
                .child("Stop")
                .on_click(cx.listener(|this, _, _window, cx| this.stop_exchange(cx)))
                .into_any_element();
        }

        Button::new("send")
            .small()
            .primary()
            .icon(IconName::ArrowUp)
            .child("Send")
            .on_click(cx.listener(|this, _, window, cx| this.send_draft(window, cx)))
            .into_any_element()
    }
}

impl Render for MessageInput {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        v_flex()
            .gap_2()
            .p_3()
            .bg(theme.background)
            .child(
                div()
                    .w_full()
                    .px_3()
                    .py_2()
                    .rounded_lg()
                    .border_1()
                    .border_color(theme.border)
                    .on_key_down(cx.listener(|this, event: &KeyDownEvent, window, cx| {
                        let keystroke = &event.keystroke;
                        if keystroke.key == "enter" && keystroke.modifiers.shift {
                            this.insert_newline(window, cx);
                        }
                    }))
                    .child(
                        Input::new(&self.draft)
                            .w_full()
                            .disabled(self.in_flight.is_some()),
                    ),
            )
            .child(
                div()
                    .w_full()
                    .flex()
                    .justify_end()
                    .child(self.render_action(cx)),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[::core::prelude::v1::test]
    fn plain_enter_sends_and_shift_enter_keeps_its_newline() {
        assert_eq!(enter_action(false, false), EnterAction::Send);
        assert_eq!(enter_action(false, true), EnterAction::KeepNewline);
        assert_eq!(enter_action(true, false), EnterAction::KeepNewline);
    }

    #[::core::prelude::v1::test]
    fn draft_loses_only_the_enter_newline() {
        assert_eq!(prompt_from_draft("hi\n").as_deref(), Some("hi"));
        assert_eq!(
            prompt_from_draft("line one\nline two\n\n").as_deref(),
            Some("line one\nline two\n")
        );
        assert_eq!(prompt_from_draft("  \n"), None);
        assert_eq!(prompt_from_draft(""), None);
    }
}
