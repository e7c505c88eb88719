use std::sync::Arc;

use futures::StreamExt;
use rig::client::Nothing;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::http_client::{self, HttpClientExt, NoBody};
use rig::prelude::CompletionClient;
use rig::providers::ollama;
use rig::streaming::StreamedAssistantContent;
use serde::Deserialize;
use snafu::{OptionExt, ResultExt, ensure};
use tokio::sync::oneshot;

use super::model::{Model, ModelCache, ModelCatalog, shared_model_cache};
use super::provider::{
    BoxFuture, CompletionsFailedSnafu, EmptyHistorySnafu, EmptyModelListSnafu, EventSink,
    HttpClientSnafu, LlmProvider, MissingBaseUrlSnafu, ModelFetchStatusSnafu,
    ModelPayloadParseSnafu, ProviderConfig, ProviderError, ProviderMessage, ProviderResult,
    ProviderStreamHandle, ProviderWorker, Role, StreamEvent, StreamRequest, event_channel,
};
use super::registry::ModelRegistry;

pub const OLLAMA_PROVIDER_ID: &str = "ollama";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

type OllamaStreamingResponse = rig::streaming::StreamingCompletionResponse<
    <ollama::CompletionModel as CompletionModel>::StreamingResponse,
>;

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
    #[serde(default)]
    details: Option<TagDetails>,
}

#[derive(Debug, Deserialize)]
struct TagDetails {
    #[serde(default)]
    parameter_size: Option<String>,
    #[serde(default)]
    quantization_level: Option<String>,
}

pub struct OllamaProviderAdapter {
    config: ProviderConfig,
    registry: &'static ModelRegistry,
    model_cache: Arc<ModelCache>,
}

impl OllamaProviderAdapter {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.base_url.is_empty(),
            MissingBaseUrlSnafu {
                stage: "ollama-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self {
            config,
            registry: ModelRegistry::builtin(),
            model_cache: shared_model_cache(),
        })
    }

    fn build_client(config: &ProviderConfig) -> ProviderResult<ollama::Client> {
        ollama::Client::builder()
            .api_key(Nothing)
            .base_url(config.base_url.as_str())
            .build()
            .context(HttpClientSnafu {
                stage: "build-client",
            })
    }

    async fn fetch_models_from_provider(&self) -> ProviderResult<Vec<Model>> {
        let client = Self::build_client(&self.config)?;
        let request = client
            .get("/api/tags")
            .context(HttpClientSnafu {
                stage: "build-tags-request",
            })?
            .body(NoBody)
            .map_err(|source| ProviderError::BuildHttpRequestBody {
                stage: "build-tags-request-body",
                message: source.to_string(),
            })?;

        let response = client.send(request).await.context(HttpClientSnafu {
            stage: "send-tags-request",
        })?;
        let status = response.status();
        let payload = http_client::text(response).await.context(HttpClientSnafu {
            stage: "read-tags-response",
        })?;

        if !status.is_success() {
            return ModelFetchStatusSnafu {
                stage: "tags-http-status",
                status: status.as_u16(),
                body: payload,
            }
            .fail();
        }

        let models = self.parse_tags(&payload)?;
        ensure!(
            !models.is_empty(),
            EmptyModelListSnafu {
                stage: "parse-tags-response",
            }
        );

        Ok(models)
    }

    fn parse_tags(&self, payload: &str) -> ProviderResult<Vec<Model>> {
        let response: TagsResponse = serde_json::from_str(payload).context(ModelPayloadParseSnafu {
            stage: "parse-tags-response",
        })?;

        let mut models = response
            .models
            .into_iter()
            .filter(|entry| !entry.name.trim().is_empty())
            .map(|entry| self.tag_to_model(entry))
            .collect::<Vec<_>>();

        models.sort_by(|left, right| left.id.cmp(&right.id));
        models.dedup_by(|left, right| left.id == right.id);
        Ok(models)
    }

    fn tag_to_model(&self, entry: TagEntry) -> Model {
        let id = entry.name.trim().to_string();
        // Registered tags keep their short name so the selector stays stable.
        let mut model = match self.registry.by_model_id(&id) {
            Some(handle) => handle.as_model(),
            None => Model::from_id(id),
        };

        if let Some(details) = entry.details {
            let description = [details.parameter_size, details.quantization_level]
                .into_iter()
                .flatten()
                .filter(|value| !value.trim().is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if !description.is_empty() {
                model = model.with_description(description);
            }
        }

        model
    }

    fn to_rig_message(message: &ProviderMessage) -> RigMessage {
        match message.role {
            Role::User => RigMessage::user(message.content.clone()),
            Role::Assistant => RigMessage::assistant(message.content.clone()),
        }
    }

    async fn open_stream(
        config: &ProviderConfig,
        request: &StreamRequest,
    ) -> ProviderResult<OllamaStreamingResponse> {
        let client = Self::build_client(config)?;
        let model = client.completion_model(request.model_id.clone());

        let mut history = request
            .history
            .iter()
            .map(Self::to_rig_message)
            .collect::<Vec<_>>();
        let prompt = history.pop().context(EmptyHistorySnafu {
            stage: "open-stream-pop-prompt",
            key: request.key,
        })?;

        let mut builder = model.completion_request(prompt).messages(history);
        let options = &request.options;
        if let Some(system_prompt) = options
            .system_prompt
            .as_deref()
            .filter(|text| !text.trim().is_empty())
        {
            builder = builder.preamble(system_prompt.to_string());
        }
        if let Some(temperature) = options.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
    }

    fn to_stream_event<R>(item: StreamedAssistantContent<R>) -> Option<StreamEvent>
    where
        R: Clone + Unpin,
    {
        match item {
            StreamedAssistantContent::Text(text) => Some(StreamEvent::Text(text.text)),
            StreamedAssistantContent::Reasoning(reasoning) => {
                let text = reasoning.reasoning.join("");
                (!text.is_empty()).then_some(StreamEvent::Reasoning(text))
            }
            StreamedAssistantContent::ReasoningDelta { reasoning, .. } => {
                (!reasoning.is_empty()).then_some(StreamEvent::Reasoning(reasoning))
            }
            // Tool calls are never requested; the final chunk only carries usage.
            StreamedAssistantContent::ToolCall { .. }
            | StreamedAssistantContent::ToolCallDelta { .. }
            | StreamedAssistantContent::Final(_) => None,
        }
    }

    async fn run_stream_worker(
        config: ProviderConfig,
        request: StreamRequest,
        sink: EventSink,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let key = request.key;
        let mut stream = match Self::open_stream(&config, &request).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(
                    ?key,
                    base_url = %config.base_url,
                    model_id = %request.model_id,
                    error = %error,
                    "failed to open ollama stream"
                );
                sink.fail(&error);
                return;
            }
        };

        loop {
            let next_item = tokio::select! {
                _ = &mut cancel_rx => {
                    tracing::debug!(?key, "ollama stream cancelled");
                    stream.cancel();
                    return;
                }
                next_item = stream.next() => next_item,
            };

            match next_item {
                Some(Ok(item)) => {
                    if let Some(event) = Self::to_stream_event(item)
                        && !sink.send(event)
                    {
                        return;
                    }
                }
                Some(Err(source)) => {
                    tracing::warn!(
                        ?key,
                        model_id = %request.model_id,
                        error = %source,
                        "ollama stream emitted an error chunk"
                    );
                    sink.fail(&ProviderError::CompletionsFailed {
                        stage: "stream-chunk",
                        source,
                    });
                    return;
                }
                None => break,
            }
        }

        sink.send(StreamEvent::Finished);
    }
}

impl LlmProvider for OllamaProviderAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn fetch_models(&self) -> BoxFuture<'_, ModelCatalog> {
        Box::pin(async move {
            self.model_cache
                .catalog_for(&self.config, self.fetch_models_from_provider(), || {
                    self.registry.models()
                })
                .await
        })
    }

    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !request.history.is_empty(),
            EmptyHistorySnafu {
                stage: "stream-chat",
                key: request.key,
            }
        );

        tracing::debug!(
            key = ?request.key,
            model_id = %request.model_id,
            history_len = request.history.len(),
            "opening ollama stream"
        );

        let (sink, stream, cancel_rx) = event_channel();
        let worker: ProviderWorker = Box::pin(Self::run_stream_worker(
            self.config.clone(),
            request,
            sink,
            cancel_rx,
        ));

        Ok(ProviderStreamHandle { stream, worker })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::model::CatalogSource;
    use crate::provider::{ExchangeKey, GenerationOptions};

    fn adapter_at(base_url: &str) -> OllamaProviderAdapter {
        OllamaProviderAdapter::new(ProviderConfig::new(OLLAMA_PROVIDER_ID, base_url))
            .expect("adapter with base url")
    }

    fn adapter() -> OllamaProviderAdapter {
        adapter_at(DEFAULT_OLLAMA_BASE_URL)
    }

    #[test]
    fn missing_base_url_is_rejected() {
        let result = OllamaProviderAdapter::new(ProviderConfig::new(OLLAMA_PROVIDER_ID, " "));
        assert!(matches!(result, Err(ProviderError::MissingBaseUrl { .. })));
    }

    #[test]
    fn tags_payload_maps_registered_models_to_short_names() {
        let payload = r#"{
            "models": [
                {"name": "qwen3:4b", "details": {"parameter_size": "4.0B", "quantization_level": "Q4_K_M"}},
                {"name": "mistral:7b"},
                {"name": "qwen3:4b"},
                {"name": "  "}
            ]
        }"#;

        let models = adapter().parse_tags(payload).expect("valid payload");

        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "mistral:7b");
        assert_eq!(models[0].name, "mistral:7b");
        assert_eq!(models[1].id, "qwen3:4b");
        assert_eq!(models[1].name, "qwen3");
        assert_eq!(models[1].description.as_deref(), Some("4.0B Q4_K_M"));
    }

    #[test]
    fn malformed_tags_payload_is_a_parse_error() {
        let result = adapter().parse_tags("not json");
        assert!(matches!(
            result,
            Err(ProviderError::ModelPayloadParse { .. })
        ));
    }

    #[test]
    fn empty_history_is_rejected_before_spawning() {
        let request = StreamRequest {
            key: ExchangeKey::new(Uuid::nil(), 1),
            model_id: "llama3.1:latest".into(),
            history: Vec::new(),
            options: GenerationOptions::default(),
        };
        assert!(matches!(
            adapter().stream_chat(request),
            Err(ProviderError::EmptyHistory { .. })
        ));
    }

    #[tokio::test]
    async fn switching_servers_does_not_reuse_the_previous_listing() {
        shared_model_cache()
            .store(
                &ProviderConfig::new(OLLAMA_PROVIDER_ID, DEFAULT_OLLAMA_BASE_URL),
                vec![Model::from_id("only-on-server-a:1b")],
            )
            .await;

        let catalog = adapter_at("http://127.0.0.1:1").fetch_models().await;

        assert_ne!(catalog.source, CatalogSource::Cached);
        assert!(
            catalog
                .models
                .iter()
                .all(|model| model.id != "only-on-server-a:1b")
        );
        assert_eq!(catalog.source, CatalogSource::Registry);
        assert_eq!(catalog.models, ModelRegistry::builtin().models());
    }
}
