//! Shared application state handed to every axum handler.

use std::sync::Arc;

use harvey_adapters::{HttpAnalysisAdapter, HttpExtractorAdapter};
use harvey_blob::FsBlobStore;
use harvey_cache::{CacheConfig, PricingContextCache};
use harvey_llm::HttpProvider;
use harvey_loop::LoopConfig;
use harvey_notify::NotifyBus;
use harvey_session::SessionStore;

use crate::config::ServerConfig;

/// Pricing-context cache, fixed to the production HTTP extractor adapter.
pub type Cache = PricingContextCache<HttpExtractorAdapter>;

/// Everything a handler needs, cloned cheaply (every field is an `Arc`
/// or small `Copy`/owned config).
#[derive(Clone)]
pub struct AppState {
    /// Effective process configuration (also re-read for per-request
    /// provider construction, since `ServerConfig` is plain data).
    pub config: Arc<ServerConfig>,
    /// Live session registry with idle-TTL GC.
    pub sessions: Arc<SessionStore>,
    /// Pricing-context cache (C4).
    pub cache: Arc<Cache>,
    /// Analysis adapter (C3).
    pub analysis: Arc<HttpAnalysisAdapter>,
    /// Cache-transition notification bus (C5).
    pub notify: Arc<NotifyBus>,
    /// Uploaded-YAML blob store (C9).
    pub blobs: Arc<FsBlobStore>,
    /// Shared LLM provider handle (C7's provider generic is
    /// monomorphized against `Arc<HttpProvider>`, see
    /// `harvey_llm::provider`'s blanket `Provider for Arc<T>` impl).
    pub provider: Arc<HttpProvider>,
    /// Agent-loop policy knobs.
    pub loop_config: LoopConfig,
}

impl AppState {
    /// Build the production state from a loaded configuration.
    pub async fn build(config: ServerConfig) -> Result<Self, harvey_blob::BlobError> {
        let notify = Arc::new(NotifyBus::new());
        let extractor = HttpExtractorAdapter::new(config.amint_base_url.clone());
        let cache_config = CacheConfig {
            ttl: config.cache_ttl,
            ..CacheConfig::default()
        };
        let cache = Arc::new(PricingContextCache::new(extractor, notify.clone(), cache_config));
        let analysis = Arc::new(HttpAnalysisAdapter::new(config.analysis_base_url.clone()));
        let blobs = Arc::new(harvey_blob::open_default_layout(".").await?);
        let provider = Arc::new(HttpProvider::new(config.openai_api_key.clone(), config.openai_model.clone()));
        let sessions = Arc::new(SessionStore::with_idle_ttl(config.session_idle_ttl));
        let loop_config = LoopConfig::default().with_step_budget(config.step_budget);

        Ok(Self {
            config: Arc::new(config),
            sessions,
            cache,
            analysis,
            notify,
            blobs,
            provider,
            loop_config,
        })
    }
}
