//! Model registry and completion providers for locally hosted models.

use std::sync::Arc;

mod model;
mod ollama_adapter;
mod provider;
pub mod registry;

pub use model::{
    CachedListing, CatalogSource, MODEL_LIST_TTL, Model, ModelCache, ModelCatalog,
    shared_model_cache,
};
pub use ollama_adapter::{DEFAULT_OLLAMA_BASE_URL, OLLAMA_PROVIDER_ID, OllamaProviderAdapter};
pub use provider::{
    BoxFuture, ExchangeKey, GenerationOptions, LlmProvider, ProviderConfig, ProviderError,
    ProviderEventStream, ProviderMessage, ProviderResult, ProviderStreamHandle, ProviderWorker,
    Role, StreamEvent, StreamRequest,
};
pub use registry::{
    DEFAULT_MODEL, ModelHandle, ModelRegistry, OLLAMA_DEEPSEEK, OLLAMA_GRANITE, OLLAMA_LLAMA,
    OLLAMA_QWEN3, OLLAMA_QWEN3_VL, registry_models,
};

/// Builds the adapter for `config.provider_id`. `local` and a blank id both
/// mean Ollama.
pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = OLLAMA_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "ollama" | "local" => {
            config.provider_id = OLLAMA_PROVIDER_ID.to_string();
            Ok(Arc::new(OllamaProviderAdapter::new(config)?))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_provider_id_defaults_to_ollama() {
        let provider = create_provider(ProviderConfig::new("", DEFAULT_OLLAMA_BASE_URL))
            .expect("ollama provider");
        assert_eq!(provider.id(), OLLAMA_PROVIDER_ID);

        let provider = create_provider(ProviderConfig::new("local", DEFAULT_OLLAMA_BASE_URL))
            .expect("ollama provider");
        assert_eq!(provider.id(), OLLAMA_PROVIDER_ID);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let result = create_provider(ProviderConfig::new("openai", DEFAULT_OLLAMA_BASE_URL));
        assert!(matches!(
            result,
            Err(ProviderError::UnsupportedProvider { .. })
        ));
    }
}
