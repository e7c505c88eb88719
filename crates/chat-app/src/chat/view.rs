use std::sync::Arc;
use std::time::Duration;

use gpui::*;
use gpui_component::{ActiveTheme, h_flex, v_flex};
use gpui_tokio_bridge::Tokio;
use parlor_llm::{
    CatalogSource, ExchangeKey, LlmProvider, ModelCatalog, ProviderEventStream, ProviderMessage,
    ProviderStreamHandle, StreamEvent, StreamRequest, create_provider,
};

use crate::chat::events::{ChatNotice, RegenerateRequest, SendMessageRequest, Stop, Submit};
use crate::chat::message::{ChatId, Role, StreamTarget};
use crate::chat::transport::{ChatTransport, ExchangeEvent, ExchangeRequest};
use crate::chat::{MessageInput, MessageList};
use crate::model_selector::{ModelSelected, ModelSelector};
use crate::settings::{ChatSettings, SettingsChanged, SettingsState};

pub const STREAM_DEBOUNCE_MS: u64 = 50;

type WorkerTask = Task<Result<(), gpui_tokio_bridge::JoinError>>;

/// Worker and reader of the exchange that spawned them. A reader that
/// outlives its exchange must not tear down a newer one.
struct ExchangeTasks<W, R> {
    target: Option<StreamTarget>,
    worker: Option<W>,
    reader: Option<R>,
}

impl<W, R> ExchangeTasks<W, R> {
    fn idle() -> Self {
        Self {
            target: None,
            worker: None,
            reader: None,
        }
    }

    fn install(&mut self, target: StreamTarget, worker: W, reader: R) {
        self.target = Some(target);
        self.worker = Some(worker);
        self.reader = Some(reader);
    }

    fn stop_worker(&mut self) {
        self.worker = None;
    }

    /// Drops both tasks if they still belong to `target`.
    fn release(&mut self, target: StreamTarget) -> bool {
        if self.target != Some(target) {
            return false;
        }
        self.clear();
        true
    }

    fn clear(&mut self) {
        self.target = None;
        self.worker = None;
        self.reader = None;
    }
}

/// Owns one chat: the transport, the provider stream pipeline and the
/// list/input children.
pub struct ChatView {
    message_list: Entity<MessageList>,
    message_input: Entity<MessageInput>,
    model_selector: Entity<ModelSelector>,
    settings_state: Entity<SettingsState>,
    settings: Arc<ChatSettings>,
    provider: Option<Arc<dyn LlmProvider>>,
    provider_error: Option<String>,
    current_model_id: String,
    transport: ChatTransport,
    stream_tasks: ExchangeTasks<WorkerTask, Task<()>>,
    stream_debounce_task: Option<Task<()>>,
    model_fetch_task: Option<Task<()>>,
    pending_events: Vec<ExchangeEvent>,
}

impl ChatView {
    pub fn new(
        settings_state: Entity<SettingsState>,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) -> Self {
        let message_list = cx.new(MessageList::new);
        let message_input = cx.new(|cx| MessageInput::new(window, cx));

        let settings = settings_state.read(cx).settings();
        let (provider, provider_error) = Self::provider_from_settings(&settings);
        let current_model_id = settings.model_id();
        let model_selector = cx.new(|_| ModelSelector::new(&current_model_id));

        cx.subscribe(&message_list, |this, _, event: &RegenerateRequest, cx| {
            this.handle_regenerate(event.clone(), cx);
        })
        .detach();

        cx.subscribe(&message_list, |this, _, event: &SendMessageRequest, cx| {
            this.handle_send(event.clone(), cx);
        })
        .detach();

        cx.subscribe(&message_input, |this, _, event: &Submit, cx| {
            this.handle_send(event.clone().into_request(), cx);
        })
        .detach();

        cx.subscribe(&message_input, |this, _, event: &Stop, cx| {
            this.handle_stop(*event, cx);
        })
        .detach();

        cx.subscribe(&model_selector, |this, _, event: &ModelSelected, cx| {
            this.handle_model_selected(event.clone(), cx);
        })
        .detach();

        cx.subscribe(&settings_state, |this, _, event: &SettingsChanged, cx| {
            this.handle_settings_changed(event, cx);
        })
        .detach();

        let mut this = Self {
            message_list,
            message_input,
            model_selector,
            settings_state,
            settings,
            provider,
            provider_error,
            current_model_id,
            transport: ChatTransport::new(ChatId::new_v7()),
            stream_tasks: ExchangeTasks::idle(),
            stream_debounce_task: None,
            model_fetch_task: None,
            pending_events: Vec::new(),
        };

        this.refresh_models(cx);
        // Listeners attach after construction.
        cx.defer(|this, cx| this.report_provider_error(cx));
        this
    }

    /// Drops the current conversation and starts an empty one with a fresh id.
    pub fn new_chat(&mut self, cx: &mut Context<Self>) {
        self.cancel_active_stream(cx);
        self.transport = ChatTransport::new(ChatId::new_v7());
        tracing::info!(chat_id = %self.transport.chat_id(), "started new chat");

        self.message_list.update(cx, |list, cx| list.reset(cx));
        self.message_input.update(cx, |input, cx| {
            input.set_active_target(None, cx);
        });
        cx.notify();
    }

    fn provider_from_settings(
        settings: &ChatSettings,
    ) -> (Option<Arc<dyn LlmProvider>>, Option<String>) {
        match create_provider(settings.to_provider_config()) {
            Ok(provider) => {
                tracing::info!(
                    provider_id = %provider.id(),
                    base_url = %settings.ollama_base_url,
                    "initialized provider adapter"
                );
                (Some(provider), None)
            }
            Err(error) => {
                tracing::error!("failed to initialize provider adapter: {error}");
                (None, Some(error.to_string()))
            }
        }
    }

    fn report_provider_error(&mut self, cx: &mut Context<Self>) {
        if let Some(error) = &self.provider_error {
            cx.emit(ChatNotice::Failed(format!(
                "Provider configuration error: {error}"
            )));
        }
    }

    fn refresh_models(&mut self, cx: &mut Context<Self>) {
        let Some(provider) = self.provider.clone() else {
            self.model_fetch_task = None;
            return;
        };

        let fetch = Tokio::spawn(cx, async move { provider.fetch_models().await });
        self.model_fetch_task = Some(cx.spawn(async move |this, cx| {
            let catalog = match fetch.await {
                Ok(catalog) => catalog,
                Err(error) => {
                    tracing::warn!("model listing task failed: {error}");
                    return;
                }
            };

            let _ = this.update(cx, |this, cx| {
                this.apply_model_catalog(catalog, cx);
            });
        }));
    }

    fn apply_model_catalog(&mut self, catalog: ModelCatalog, cx: &mut Context<Self>) {
        self.model_fetch_task = None;
        if let Some(notice) = catalog_notice(&catalog) {
            cx.emit(notice);
        }

        tracing::debug!(
            source = ?catalog.source,
            model_count = catalog.models.len(),
            "model catalog loaded"
        );
        self.model_selector.update(cx, |selector, cx| {
            selector.set_catalog(catalog, cx);
        });
    }

    fn handle_model_selected(&mut self, event: ModelSelected, cx: &mut Context<Self>) {
        if event.model_id == self.current_model_id {
            return;
        }

        self.current_model_id = event.model_id;
        let mut settings = (*self.settings).clone();
        settings.default_model = parlor_llm::ModelRegistry::builtin()
            .by_model_id(&self.current_model_id)
            .map(|handle| handle.name().to_string())
            .unwrap_or_else(|| self.current_model_id.clone());

        let result = self
            .settings_state
            .update(cx, |state, cx| state.save(settings, cx));
        if let Err(error) = result {
            tracing::error!("failed to persist model selection: {error}");
            cx.emit(ChatNotice::Failed(format!(
                "Could not save the model choice: {error}"
            )));
        }
        cx.notify();
    }

    fn handle_settings_changed(&mut self, event: &SettingsChanged, cx: &mut Context<Self>) {
        let previous = std::mem::replace(&mut self.settings, Arc::new(event.settings.clone()));

        event.settings.apply_theme(None, cx);
        cx.refresh_windows();

        if previous.to_provider_config() != event.settings.to_provider_config() {
            self.cancel_active_stream(cx);
            let (provider, provider_error) = Self::provider_from_settings(&event.settings);
            self.provider = provider;
            self.provider_error = provider_error;
            self.report_provider_error(cx);
            self.refresh_models(cx);
        }

        let model_id = event.settings.model_id();
        if model_id != self.current_model_id {
            self.current_model_id = model_id.clone();
            self.model_selector.update(cx, |selector, cx| {
                selector.set_model_id(model_id, cx);
            });
        }

        cx.notify();
    }

    fn handle_send(&mut self, request: SendMessageRequest, cx: &mut Context<Self>) {
        match self.transport.send_message(request) {
            Ok(exchange) => self.start_exchange(exchange, cx),
            Err(error) => tracing::warn!("send rejected: {error}"),
        }
    }

    fn handle_regenerate(&mut self, request: RegenerateRequest, cx: &mut Context<Self>) {
        match self.transport.regenerate(request) {
            Ok(exchange) => self.start_exchange(exchange, cx),
            Err(error) => tracing::warn!("regenerate rejected: {error}"),
        }
    }

    fn start_exchange(&mut self, exchange: ExchangeRequest, cx: &mut Context<Self>) {
        let target = exchange.target;
        self.pending_events.clear();
        self.stream_debounce_task = None;
        self.message_input.update(cx, |input, cx| {
            input.set_active_target(Some(target), cx);
        });
        self.sync_list(cx);

        let Some(provider) = self.provider.clone() else {
            let message = match &self.provider_error {
                Some(error) => format!("Provider configuration error: {error}"),
                None => "Provider is not configured".to_string(),
            };
            self.finish_exchange(target, ExchangeEvent::Error(message), cx);
            return;
        };

        let request = self.build_stream_request(&exchange);
        match provider.stream_chat(request) {
            Ok(handle) => self.spawn_stream_pipeline(target, handle, cx),
            Err(error) => {
                self.finish_exchange(target, ExchangeEvent::Error(error.to_string()), cx);
            }
        }
    }

    fn build_stream_request(&self, exchange: &ExchangeRequest) -> StreamRequest {
        StreamRequest {
            key: exchange_key(exchange.target),
            model_id: self.current_model_id.clone(),
            history: exchange
                .history
                .iter()
                .map(|entry| {
                    ProviderMessage::new(to_provider_role(entry.role), entry.content.clone())
                })
                .collect(),
            options: self.settings.generation_options(),
        }
    }

    fn spawn_stream_pipeline(
        &mut self,
        target: StreamTarget,
        handle: ProviderStreamHandle,
        cx: &mut Context<Self>,
    ) {
        let worker = Tokio::spawn(cx, handle.worker);
        let reader = self.spawn_stream_reader(target, handle.stream, cx);
        self.stream_tasks.install(target, worker, reader);
    }

    fn spawn_stream_reader(
        &self,
        target: StreamTarget,
        mut stream: ProviderEventStream,
        cx: &mut Context<Self>,
    ) -> Task<()> {
        cx.spawn(async move |this, cx| {
            while let Some(event) = stream.recv().await {
                let _ = this.update(cx, |this, cx| {
                    this.handle_stream_event(target, event, cx);
                });
            }

            let _ = this.update(cx, |this, cx| {
                this.handle_stream_reader_closed(target, cx);
            });
        })
    }

    fn handle_stream_event(
        &mut self,
        target: StreamTarget,
        event: StreamEvent,
        cx: &mut Context<Self>,
    ) {
        if self.transport.active_target() != Some(target) {
            return;
        }

        match event {
            StreamEvent::Text(chunk) => {
                self.buffer_event(ExchangeEvent::Delta(chunk));
                self.schedule_debounced_flush(cx);
            }
            StreamEvent::Reasoning(chunk) => {
                self.buffer_event(ExchangeEvent::ReasoningDelta(chunk));
                self.schedule_debounced_flush(cx);
            }
            StreamEvent::Finished => {
                self.finish_exchange(target, ExchangeEvent::Done, cx);
            }
            StreamEvent::Failed(message) => {
                self.finish_exchange(target, ExchangeEvent::Error(message), cx);
            }
        }
    }

    fn handle_stream_reader_closed(&mut self, target: StreamTarget, cx: &mut Context<Self>) {
        if !self.stream_tasks.release(target) {
            tracing::debug!(?target, "ignoring close of a superseded stream");
            return;
        }

        if self.transport.active_target() == Some(target) {
            self.finish_exchange(
                target,
                ExchangeEvent::Error("provider stream ended before a terminal event".to_string()),
                cx,
            );
        }
    }

    fn handle_stop(&mut self, event: Stop, cx: &mut Context<Self>) {
        if self.transport.active_target() != Some(event.target) {
            return;
        }

        self.cancel_active_stream(cx);
    }

    fn buffer_event(&mut self, event: ExchangeEvent) {
        // Adjacent chunks of the same kind coalesce into one update.
        match (self.pending_events.last_mut(), &event) {
            (Some(ExchangeEvent::Delta(pending)), ExchangeEvent::Delta(chunk))
            | (Some(ExchangeEvent::ReasoningDelta(pending)), ExchangeEvent::ReasoningDelta(chunk)) => {
                pending.push_str(chunk);
                return;
            }
            _ => {}
        }
        self.pending_events.push(event);
    }

    fn schedule_debounced_flush(&mut self, cx: &mut Context<Self>) {
        if self.stream_debounce_task.is_some() {
            return;
        }

        self.stream_debounce_task = Some(cx.spawn(async move |this, cx| {
            cx.background_executor()
                .timer(Duration::from_millis(STREAM_DEBOUNCE_MS))
                .await;

            let _ = this.update(cx, |this, cx| {
                this.stream_debounce_task = None;
                this.flush_pending_events(cx);
            });
        }));
    }

    fn flush_pending_events(&mut self, cx: &mut Context<Self>) {
        if self.pending_events.is_empty() {
            return;
        }

        let Some(target) = self.transport.active_target() else {
            self.pending_events.clear();
            return;
        };

        for event in std::mem::take(&mut self.pending_events) {
            self.transport.apply(target, event);
        }
        self.sync_list(cx);
    }

    fn finish_exchange(&mut self, target: StreamTarget, event: ExchangeEvent, cx: &mut Context<Self>) {
        self.flush_pending_events(cx);
        self.stream_debounce_task = None;
        self.stream_tasks.stop_worker();

        if !self.transport.apply(target, event) {
            return;
        }

        self.message_input.update(cx, |input, cx| {
            input.set_active_target(None, cx);
        });
        self.sync_list(cx);
        cx.notify();
    }

    fn cancel_active_stream(&mut self, cx: &mut Context<Self>) {
        let Some(target) = self.transport.active_target() else {
            return;
        };

        // Dropping the reader drops the event stream, which signals the worker.
        self.stream_tasks.clear();
        self.finish_exchange(target, ExchangeEvent::Cancelled, cx);
    }

    fn sync_list(&mut self, cx: &mut Context<Self>) {
        let turns = self.transport.turns().to_vec();
        let status = self.transport.status();
        let error = self.transport.last_error().map(str::to_string);

        self.message_list.update(cx, |list, cx| {
            list.set_turns(turns, status, error, cx);
        });
    }
}

fn to_provider_role(role: Role) -> parlor_llm::Role {
    match role {
        Role::User => parlor_llm::Role::User,
        Role::Assistant => parlor_llm::Role::Assistant,
    }
}

fn exchange_key(target: StreamTarget) -> ExchangeKey {
    ExchangeKey::new(target.chat_id.0, target.session_id.0)
}

fn catalog_notice(catalog: &ModelCatalog) -> Option<ChatNotice> {
    let warning = catalog.warning.as_deref()?;
    let shown = match catalog.source {
        CatalogSource::Server | CatalogSource::Cached => return None,
        CatalogSource::Stale => "the last models it reported",
        CatalogSource::Registry => "the built-in model list",
    };
    Some(ChatNotice::Degraded(format!(
        "Model server unavailable, showing {shown}: {warning}"
    )))
}

impl EventEmitter<ChatNotice> for ChatView {}

impl Render for ChatView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        v_flex()
            .id("chat-view")
            .relative()
            .size_full()
            .min_h_0()
            .overflow_hidden()
            .bg(theme.background)
            .child(
                h_flex()
                    .id("chat-view-header")
                    .h(px(48.))
                    .px_4()
                    .items_center()
                    .justify_between()
                    .border_b_1()
                    .border_color(theme.border)
                    .child(
                        div()
                            .text_sm()
                            .font_weight(FontWeight::MEDIUM)
                            .text_color(theme.foreground)
                            .child("Chat"),
                    )
                    .child(self.model_selector.clone()),
            )
            .child(
                div()
                    .id("chat-view-message-list")
                    .flex_1()
                    .min_h_0()
                    .child(self.message_list.clone()),
            )
            .child(
                div()
                    .id("chat-view-message-input")
                    .flex_shrink_0()
                    .w_full()
                    .child(self.message_input.clone()),
            )
    }
}
