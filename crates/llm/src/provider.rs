use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::model::ModelCatalog;

/// Identifies one request/response exchange of one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeKey {
    pub chat_id: Uuid,
    pub session: u64,
}

impl ExchangeKey {
    pub const fn new(chat_id: Uuid, session: u64) -> Self {
        Self { chat_id, session }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

/// Model server a provider talks to. Also the key of the model list cache,
/// so two servers never share a listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub base_url: String,
}

impl ProviderConfig {
    pub fn new(provider_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into().trim().to_string(),
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
}

impl ProviderMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Per-request generation knobs taken from the user's settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub key: ExchangeKey,
    pub model_id: String,
    /// Oldest first; the last entry is the prompt being answered.
    pub history: Vec<ProviderMessage>,
    pub options: GenerationOptions,
}

/// One unit of provider output. Exactly one `Finished` or `Failed` ends a
/// stream unless it is cancelled first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Text(String),
    Reasoning(String),
    Finished,
    Failed(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed(_))
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ProviderWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' has no base URL"))]
    MissingBaseUrl {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("exchange {key:?} has no prompt to answer"))]
    EmptyHistory {
        stage: &'static str,
        key: ExchangeKey,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("failed to finalize HTTP request body: {message}"))]
    BuildHttpRequestBody {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("model server answered {status}: {body}"))]
    ModelFetchStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to parse model list on `{stage}`: {source}"))]
    ModelPayloadParse {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("model server has no models pulled"))]
    EmptyModelList { stage: &'static str },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
}

/// Worker side of a stream. Every send reports whether the reader is still
/// listening so the worker can stop early.
pub(crate) struct EventSink {
    events: mpsc::UnboundedSender<StreamEvent>,
}

impl EventSink {
    pub(crate) fn send(&self, event: StreamEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub(crate) fn fail(&self, error: &ProviderError) -> bool {
        self.send(StreamEvent::Failed(error.to_string()))
    }
}

/// Reader side of a stream. Dropping it cancels the worker.
pub struct ProviderEventStream {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl ProviderEventStream {
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }
}

impl Drop for ProviderEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
    /// Must be polled on a tokio runtime.
    pub worker: ProviderWorker,
}

pub trait LlmProvider: Send + Sync {
    fn id(&self) -> &str;
    /// Never fails: an unreachable server degrades to cached or built-in
    /// models and says so in [`ModelCatalog::warning`].
    fn fetch_models(&self) -> BoxFuture<'_, ModelCatalog>;
    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle>;
}

pub(crate) fn event_channel() -> (EventSink, ProviderEventStream, oneshot::Receiver<()>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        EventSink { events: events_tx },
        ProviderEventStream {
            events: events_rx,
            cancel_tx: Some(cancel_tx),
        },
        cancel_rx,
    )
}
