use gpui::*;
use gpui_component::notification::{Notification, NotificationList};
use gpui_component::{
    ActiveTheme, IconName, Sizable,
    button::{Button, ButtonVariants},
    h_flex, v_flex,
};

use crate::chat::{ChatNotice, ChatView};
use crate::settings::SettingsState;

pub const APP_TITLE: &str = "Parlor";
/// Height of the client-drawn title bar.
pub const TITLE_BAR_HEIGHT: f32 = 40.0;
/// Leading inset that keeps title bar content clear of the macOS traffic lights.
pub const TITLE_BAR_LEADING_INSET: f32 = 80.0;

gpui::actions!(shell, [NewChat, Quit]);

/// Root view: title bar, the active chat and the notification layer.
pub struct ParlorShell {
    notification_list: Entity<NotificationList>,
    chat_view: Entity<ChatView>,
    _subscriptions: Vec<Subscription>,
}

impl ParlorShell {
    pub fn new(
        notification_list: Entity<NotificationList>,
        settings_state: Entity<SettingsState>,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) -> Self {
        let chat_view = cx.new(|cx| ChatView::new(settings_state, window, cx));
        let _subscriptions = vec![cx.subscribe_in(&chat_view, window, Self::on_chat_notice)];

        Self {
            notification_list,
            chat_view,
            _subscriptions,
        }
    }

    fn on_chat_notice(
        &mut self,
        _chat_view: &Entity<ChatView>,
        notice: &ChatNotice,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) {
        let notification = match notice {
            ChatNotice::Degraded(message) => Notification::warning(message.clone()),
            ChatNotice::Failed(message) => Notification::error(message.clone()),
        };
        self.notification_list
            .update(cx, |list, cx| list.push(notification, window, cx));
    }

    fn new_chat(&mut self, cx: &mut Context<Self>) {
        self.chat_view
            .update(cx, |chat_view, cx| chat_view.new_chat(cx));
    }

    fn on_new_chat(&mut self, _: &NewChat, _window: &mut Window, cx: &mut Context<Self>) {
        self.new_chat(cx);
    }

    fn render_title_bar(&self, cx: &Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        h_flex()
            .id("title-bar")
            .h(px(TITLE_BAR_HEIGHT))
            .flex_shrink_0()
            .pl(px(TITLE_BAR_LEADING_INSET))
            .pr_3()
            .gap_2()
            .items_center()
            .justify_between()
            .border_b_1()
            .border_color(theme.border)
            .child(
                div()
                    .text_sm()
                    .font_weight(FontWeight::SEMIBOLD)
                    .text_color(theme.foreground)
                    .child(APP_TITLE),
            )
            .child(
                Button::new("new-chat")
                    .ghost()
                    .small()
                    .icon(IconName::Plus)
                    .child("New chat")
                    .on_click(cx.listener(|this, _, _window, cx| {
                        this.new_chat(cx);
                    })),
            )
    }
}

impl Render for ParlorShell {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        div()
            .size_full()
            .relative()
            .bg(theme.background)
            .key_context("ParlorShell")
            .on_action(cx.listener(Self::on_new_chat))
            .child(
                v_flex()
                    .size_full()
                    .child(self.render_title_bar(cx))
                    .child(
                        div()
                            .id("main-content")
                            .flex_1()
                            .min_h_0()
                            .overflow_hidden()
                            .child(self.chat_view.clone()),
                    ),
            )
            .child(self.notification_list.clone())
    }
}
