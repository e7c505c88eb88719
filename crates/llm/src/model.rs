use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::provider::{ProviderConfig, ProviderResult};

/// How long a server's tag listing is trusted without asking again.
pub const MODEL_LIST_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    /// Tag sent to the server, e.g. `qwen3:4b`.
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl Model {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }

    /// A tag nobody registered is shown under its own id.
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Where a catalog's models came from, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    Server,
    Cached,
    Stale,
    Registry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    pub models: Vec<Model>,
    pub source: CatalogSource,
    /// Why the server's own listing could not be used.
    pub warning: Option<String>,
}

impl ModelCatalog {
    fn listed(models: Vec<Model>, source: CatalogSource) -> Self {
        Self {
            models,
            source,
            warning: None,
        }
    }

    fn degraded(models: Vec<Model>, source: CatalogSource, warning: String) -> Self {
        Self {
            models,
            source,
            warning: Some(warning),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedListing {
    Fresh(Vec<Model>),
    Stale(Vec<Model>),
    Missing,
}

struct Listing {
    models: Vec<Model>,
    stored_at: Instant,
}

/// Tag listings keyed by the server they were read from.
pub struct ModelCache {
    listings: RwLock<HashMap<ProviderConfig, Listing>>,
    ttl: Duration,
}

impl ModelCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            listings: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn lookup(&self, endpoint: &ProviderConfig) -> CachedListing {
        let listings = self.listings.read().await;
        match listings.get(endpoint) {
            Some(listing) if listing.stored_at.elapsed() < self.ttl => {
                CachedListing::Fresh(listing.models.clone())
            }
            Some(listing) => CachedListing::Stale(listing.models.clone()),
            None => CachedListing::Missing,
        }
    }

    pub async fn store(&self, endpoint: &ProviderConfig, models: Vec<Model>) {
        self.listings.write().await.insert(
            endpoint.clone(),
            Listing {
                models,
                stored_at: Instant::now(),
            },
        );
    }

    /// Resolves the model list for `endpoint`. A fresh listing wins without
    /// polling `fetch`. Otherwise a successful fetch is stored, and a failed
    /// one degrades to this endpoint's stale listing, then to `fallback`.
    pub async fn catalog_for<F>(
        &self,
        endpoint: &ProviderConfig,
        fetch: F,
        fallback: impl FnOnce() -> Vec<Model>,
    ) -> ModelCatalog
    where
        F: Future<Output = ProviderResult<Vec<Model>>>,
    {
        let stale = match self.lookup(endpoint).await {
            CachedListing::Fresh(models) => {
                return ModelCatalog::listed(models, CatalogSource::Cached);
            }
            CachedListing::Stale(models) => Some(models),
            CachedListing::Missing => None,
        };

        let error = match fetch.await {
            Ok(models) => {
                self.store(endpoint, models.clone()).await;
                return ModelCatalog::listed(models, CatalogSource::Server);
            }
            Err(error) => error.to_string(),
        };

        match stale {
            Some(models) => {
                tracing::warn!(
                    base_url = %endpoint.base_url,
                    model_count = models.len(),
                    error = %error,
                    "tag listing failed; serving stale listing"
                );
                ModelCatalog::degraded(models, CatalogSource::Stale, error)
            }
            None => {
                tracing::warn!(
                    base_url = %endpoint.base_url,
                    error = %error,
                    "tag listing failed; serving registry models"
                );
                ModelCatalog::degraded(fallback(), CatalogSource::Registry, error)
            }
        }
    }
}

static SHARED_MODEL_CACHE: OnceLock<Arc<ModelCache>> = OnceLock::new();

pub fn shared_model_cache() -> Arc<ModelCache> {
    SHARED_MODEL_CACHE
        .get_or_init(|| Arc::new(ModelCache::new(MODEL_LIST_TTL)))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;

    fn server(base_url: &str) -> ProviderConfig {
        ProviderConfig::new("ollama", base_url)
    }

    fn unreachable() -> ProviderResult<Vec<Model>> {
        Err(ProviderError::EmptyModelList { stage: "test" })
    }

    fn registry() -> Vec<Model> {
        vec![Model::new("llama3.1:latest", "llama")]
    }

    #[tokio::test]
    async fn listing_for_one_server_is_not_served_for_another() {
        let cache = ModelCache::new(MODEL_LIST_TTL);
        let server_a = server("http://server-a:11434");
        cache
            .store(&server_a, vec![Model::from_id("only-on-server-a:1b")])
            .await;

        let catalog = cache
            .catalog_for(&server("http://server-b:11434"), async { unreachable() }, registry)
            .await;

        assert_eq!(catalog.source, CatalogSource::Registry);
        assert_eq!(catalog.models, registry());
        assert!(catalog.warning.is_some());
        assert!(matches!(cache.lookup(&server_a).await, CachedListing::Fresh(_)));
    }

    #[tokio::test]
    async fn fresh_listing_answers_without_fetching() {
        let cache = ModelCache::new(MODEL_LIST_TTL);
        let endpoint = server("http://localhost:11434");
        cache.store(&endpoint, vec![Model::from_id("qwen3:4b")]).await;

        let catalog = cache
            .catalog_for(&endpoint, async { unreachable() }, registry)
            .await;

        assert_eq!(catalog.source, CatalogSource::Cached);
        assert_eq!(catalog.models, vec![Model::from_id("qwen3:4b")]);
        assert_eq!(catalog.warning, None);
    }

    #[tokio::test]
    async fn failed_fetch_prefers_the_same_servers_stale_listing() {
        let cache = ModelCache::new(Duration::ZERO);
        let endpoint = server("http://localhost:11434");
        cache.store(&endpoint, vec![Model::from_id("qwen3:4b")]).await;
        assert!(matches!(cache.lookup(&endpoint).await, CachedListing::Stale(_)));

        let catalog = cache
            .catalog_for(&endpoint, async { unreachable() }, registry)
            .await;

        assert_eq!(catalog.source, CatalogSource::Stale);
        assert_eq!(catalog.models, vec![Model::from_id("qwen3:4b")]);
        assert!(catalog.warning.is_some());
    }

    #[tokio::test]
    async fn successful_fetch_is_stored_for_that_server() {
        let cache = ModelCache::new(MODEL_LIST_TTL);
        let endpoint = server("http://localhost:11434");
        let listed = vec![Model::from_id("granite4:3b")];

        let catalog = cache
            .catalog_for(&endpoint, async { Ok(listed.clone()) }, registry)
            .await;

        assert_eq!(catalog.source, CatalogSource::Server);
        assert_eq!(cache.lookup(&endpoint).await, CachedListing::Fresh(listed));
        assert_eq!(
            cache.lookup(&server("http://elsewhere:11434")).await,
            CachedListing::Missing
        );
    }
}
