use std::collections::{HashMap, HashSet};

use gpui::prelude::FluentBuilder as _;
use gpui::*;
use gpui_component::{
    ActiveTheme, Disableable, Sizable,
    button::{Button, ButtonVariants},
    h_flex,
    label::Label,
    v_flex,
};

use crate::chat::events::{RegenerateRequest, SendMessageRequest};
use crate::chat::message::{ConversationTurn, RequestStatus, TurnId};
use crate::chat::render::{
    Alignment, REGENERATE_LABEL, REPLACE_LABEL, Tint, TurnActions, TurnPresentation, present,
};
use crate::chat::timestamp::TimestampSlot;

const BUBBLE_INDENT: Pixels = px(40.);
const EMPTY_STATE_TEXT: &str = "Start a conversation with a local model.";

/// Renders the ordered turns of the active chat and forwards turn actions to
/// the parent as [`RegenerateRequest`] / [`SendMessageRequest`] events.
pub struct MessageList {
    turns: Vec<ConversationTurn>,
    status: RequestStatus,
    error: Option<String>,
    timestamps: HashMap<TurnId, TimestampSlot>,
    timestamp_pass: TimestampPass,
    scroll_handle: ScrollHandle,
    pending_scroll_to_bottom: bool,
}

impl EventEmitter<RegenerateRequest> for MessageList {}
impl EventEmitter<SendMessageRequest> for MessageList {}

impl MessageList {
    pub fn new(_cx: &mut Context<Self>) -> Self {
        Self {
            turns: Vec::new(),
            status: RequestStatus::Ready,
            error: None,
            timestamps: HashMap::new(),
            timestamp_pass: TimestampPass::default(),
            scroll_handle: ScrollHandle::new(),
            pending_scroll_to_bottom: false,
        }
    }

    pub fn set_turns(
        &mut self,
        turns: Vec<ConversationTurn>,
        status: RequestStatus,
        error: Option<String>,
        cx: &mut Context<Self>,
    ) {
        if should_follow(self.turns.len(), turns.len(), status) {
            self.pending_scroll_to_bottom = true;
        }

        self.turns = turns;
        self.status = status;
        self.error = error;
        self.sync_timestamps();
        cx.notify();
    }

    pub fn reset(&mut self, cx: &mut Context<Self>) {
        self.timestamps.clear();
        self.scroll_handle.set_offset(point(px(0.), px(0.)));
        self.set_turns(Vec::new(), RequestStatus::Ready, None, cx);
    }

    fn sync_timestamps(&mut self) {
        let mut active_ids = HashSet::with_capacity(self.turns.len());
        let mut refresh_due = false;

        for turn in &self.turns {
            let slot = self.timestamps.entry(turn.id.clone()).or_default();
            refresh_due |= slot.observe(turn.created_at());
            active_ids.insert(turn.id.clone());
        }
        self.timestamps.retain(|id, _| active_ids.contains(id));

        if refresh_due {
            self.timestamp_pass.mark_due();
        }
    }

    /// Queues formatting for after the frame being built is presented, so the
    /// first paint of a turn never waits on the local time zone.
    fn schedule_timestamp_pass(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        if !self.timestamp_pass.schedule() {
            return;
        }

        let list = cx.entity().downgrade();
        window.on_next_frame(move |_window, cx| {
            let _ = list.update(cx, |list, cx| list.refresh_timestamps(cx));
        });
    }

    fn refresh_timestamps(&mut self, cx: &mut Context<Self>) {
        self.timestamp_pass.complete();

        let mut changed = false;
        for slot in self.timestamps.values_mut() {
            changed |= slot.refresh();
        }

        if changed {
            cx.notify();
        }
    }

    fn dispatch_regenerate(&mut self, message_id: TurnId, cx: &mut Context<Self>) {
        let actions = TurnActions::new(message_id, self.status);
        if !actions.regenerate(|request| cx.emit(request)) {
            tracing::debug!(status = ?self.status, "regenerate ignored while busy");
        }
    }

    fn dispatch_replace(&mut self, message_id: TurnId, cx: &mut Context<Self>) {
        let actions = TurnActions::new(message_id, self.status);
        if !actions.replace_with_hello(|request| cx.emit(request)) {
            tracing::debug!(status = ?self.status, "replace ignored while busy");
        }
    }

    fn apply_pending_scroll(&mut self) {
        if !self.pending_scroll_to_bottom {
            return;
        }

        let max_offset = self.scroll_handle.max_offset().height;
        let current_x = self.scroll_handle.offset().x;
        // Scrolling down is a negative Y offset.
        let target_y = if max_offset > Pixels::ZERO {
            -max_offset
        } else {
            Pixels::ZERO
        };
        self.scroll_handle.set_offset(point(current_x, target_y));
        self.pending_scroll_to_bottom = false;
    }

    fn render_turn(&self, turn: &ConversationTurn, cx: &Context<Self>) -> AnyElement {
        let theme = cx.theme();
        let accent = theme.accent;
        let muted = theme.muted;
        let foreground = theme.foreground;
        let muted_foreground = theme.muted_foreground;

        let TurnPresentation {
            turn_id,
            style,
            text,
            actions,
        } = present(turn, self.status);

        let timestamp = self
            .timestamps
            .get(&turn_id)
            .map(|slot| slot.text().to_string())
            .unwrap_or_default();
        let background = match style.tint {
            Tint::Accent => accent,
            Tint::Neutral => muted,
        };

        v_flex()
            .w_full()
            .my_2()
            .p_3()
            .gap_1()
            .rounded_lg()
            .shadow_sm()
            .bg(background)
            .text_color(foreground)
            .map(|bubble| match style.alignment {
                Alignment::End => bubble.items_end().ml(BUBBLE_INDENT),
                Alignment::Start => bubble.items_start().mr(BUBBLE_INDENT),
            })
            .child(
                Label::new(timestamp)
                    .text_xs()
                    .text_color(muted_foreground),
            )
            .child(
                div()
                    .font_weight(FontWeight::SEMIBOLD)
                    .child(style.label),
            )
            .child(div().text_sm().child(text))
            .when_some(actions, |bubble, actions| {
                bubble.child(self.render_actions(actions, cx))
            })
            .into_any_element()
    }

    fn render_actions(&self, actions: TurnActions, cx: &Context<Self>) -> impl IntoElement {
        let disabled = !actions.enabled();
        let regenerate_id = actions.message_id().clone();
        let replace_id = actions.message_id().clone();

        h_flex()
            .mt_2()
            .gap_2()
            .child(
                Button::new(ElementId::Name(SharedString::from(format!(
                    "regenerate-{}",
                    actions.message_id()
                ))))
                .small()
                .ghost()
                .child(REGENERATE_LABEL)
                .disabled(disabled)
                .on_click(cx.listener(move |this, _, _window, cx| {
                    this.dispatch_regenerate(regenerate_id.clone(), cx);
                })),
            )
            .child(
                Button::new(ElementId::Name(SharedString::from(format!(
                    "replace-{}",
                    actions.message_id()
                ))))
                .small()
                .ghost()
                .child(REPLACE_LABEL)
                .disabled(disabled)
                .on_click(cx.listener(move |this, _, _window, cx| {
                    this.dispatch_replace(replace_id.clone(), cx);
                })),
            )
    }
}

impl Render for MessageList {
    fn render(&mut self, window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        self.apply_pending_scroll();
        self.schedule_timestamp_pass(window, cx);

        let theme = cx.theme();
        let muted_foreground = theme.muted_foreground;
        let danger = theme.danger;

        let rows = self
            .turns
            .iter()
            .map(|turn| self.render_turn(turn, cx))
            .collect::<Vec<_>>();
        let error = (self.status == RequestStatus::Error)
            .then(|| self.error.clone())
            .flatten();

        div()
            .id("message-list")
            .size_full()
            .min_h_0()
            .overflow_y_scroll()
            .track_scroll(&self.scroll_handle)
            .px_4()
            .py_3()
            .child(
                v_flex()
                    .w_full()
                    .when(rows.is_empty(), |column| {
                        column.child(
                            Label::new(EMPTY_STATE_TEXT)
                                .text_sm()
                                .text_color(muted_foreground),
                        )
                    })
                    .children(rows)
                    .when_some(error, |column, error| {
                        column.child(
                            Label::new(format!("Error: {error}"))
                                .text_xs()
                                .text_color(danger),
                        )
                    }),
            )
    }
}

/// At most one formatting pass is queued at a time.
#[derive(Debug, Default)]
struct TimestampPass {
    due: bool,
    scheduled: bool,
}

impl TimestampPass {
    fn mark_due(&mut self) {
        self.due = true;
    }

    fn schedule(&mut self) -> bool {
        if !self.due || self.scheduled {
            return false;
        }
        self.scheduled = true;
        true
    }

    fn complete(&mut self) {
        self.due = false;
        self.scheduled = false;
    }
}

/// New turns and streaming updates keep the view pinned to the tail.
fn should_follow(previous_len: usize, next_len: usize, status: RequestStatus) -> bool {
    next_len > previous_len || status == RequestStatus::Streaming
}

#[cfg(test)]
mod tests {
    use super::*;

    #[::core::prelude::v1::test]
    fn follows_tail_on_growth_or_streaming() {
        assert!(should_follow(1, 2, RequestStatus::Submitted));
        assert!(should_follow(2, 2, RequestStatus::Streaming));
        assert!(!should_follow(2, 2, RequestStatus::Ready));
        assert!(!should_follow(4, 1, RequestStatus::Submitted));
    }

    #[::core::prelude::v1::test]
    fn timestamp_pass_waits_for_a_rendered_frame() {
        let mut pass = TimestampPass::default();
        assert!(!pass.schedule());

        pass.mark_due();
        assert!(pass.schedule());
        pass.mark_due();
        assert!(!pass.schedule());

        pass.complete();
        assert!(!pass.schedule());
        pass.mark_due();
        assert!(pass.schedule());
    }
}
