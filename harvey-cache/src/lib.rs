//! # harvey-cache — pricing-context cache (C4)
//!
//! URL-keyed YAML cache with single-flight transformation: at most one
//! extractor call is ever in flight for a given canonical URL, and every
//! caller attached to that attempt observes the same terminal result.
//! Per-key state transitions are serialized; different keys proceed
//! fully independently.

#![deny(missing_docs)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use harvey_adapters::ExtractorAdapter;
use harvey_notify::{NotifyBus, TransformEventState, UrlTransformEvent};
use harvey_types::{CacheErrorCause, SessionId, TransformationRequest};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, instrument, warn};

/// Default freshness window for a `ready` entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Default cool-down before a failed entry becomes eligible for retry.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);
/// Default maximum number of tracked entries before LRU eviction kicks in.
pub const DEFAULT_MAX_ENTRIES: usize = 256;

/// Tunable policy for a [`PricingContextCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Freshness window for a `ready` entry.
    pub ttl: Duration,
    /// Cool-down after a failed transformation before retrying.
    pub cooldown: Duration,
    /// Maximum tracked entries (LRU-evicted beyond this).
    pub max_entries: usize,
    /// Extractor model identifier passed through to `transform`.
    pub extractor_model: String,
    /// Extractor max-tries passed through to `transform`.
    pub extractor_max_tries: u32,
    /// Extractor temperature passed through to `transform`.
    pub extractor_temperature: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            cooldown: DEFAULT_COOLDOWN,
            max_entries: DEFAULT_MAX_ENTRIES,
            extractor_model: "default".to_string(),
            extractor_max_tries: 3,
            extractor_temperature: 0.0,
        }
    }
}

type SharedResult = Result<String, CacheErrorCause>;

enum Slot {
    InFlight {
        started_at: DateTime<Utc>,
        waiters: Vec<oneshot::Sender<SharedResult>>,
    },
    Ready {
        yaml: String,
        fetched_at: DateTime<Utc>,
    },
    Error {
        cause: CacheErrorCause,
        at: DateTime<Utc>,
    },
}

/// Outcome of a single [`PricingContextCache::resolve`] call, used only
/// to decide whether a notification is due: a fast-path cache hit never
/// publishes (it isn't a state *transition*), while every caller that
/// observed or triggered a transition does.
enum Outcome {
    CacheHit(SharedResult),
    Transitioned(SharedResult),
}

/// URL -> YAML cache with single-flight transformation (C4).
pub struct PricingContextCache<E: ExtractorAdapter> {
    extractor: E,
    notify: Arc<NotifyBus>,
    config: CacheConfig,
    slots: Mutex<HashMap<String, Slot>>,
    recency: Mutex<VecDeque<String>>,
}

impl<E: ExtractorAdapter> PricingContextCache<E> {
    /// Build a cache around `extractor`, publishing transitions to `notify`.
    pub fn new(extractor: E, notify: Arc<NotifyBus>, config: CacheConfig) -> Self {
        Self {
            extractor,
            notify,
            config,
            slots: Mutex::new(HashMap::new()),
            recency: Mutex::new(VecDeque::new()),
        }
    }

    /// Resolve `raw_url` to its YAML text, on behalf of `session`.
    ///
    /// Publishes a `url_transform` event to `session`'s subscribers
    /// whenever this call observed a state transition (either because
    /// it performed the transformation itself, or because it attached
    /// to one already in flight) — never on a plain fresh-cache hit.
    #[instrument(skip(self), fields(canonical_url))]
    pub async fn resolve(&self, raw_url: &str, session: &SessionId) -> SharedResult {
        let key = TransformationRequest::canonicalize(raw_url);
        let canonical = key.as_str().to_string();
        tracing::Span::current().record("canonical_url", canonical.as_str());

        let outcome = self.resolve_inner(&canonical).await;
        self.touch_recency(&canonical).await;
        self.evict_if_needed().await;

        match outcome {
            Outcome::CacheHit(result) => result,
            Outcome::Transitioned(result) => {
                let event = match &result {
                    Ok(yaml) => UrlTransformEvent {
                        id: None,
                        canonical_url: canonical.clone(),
                        state: TransformEventState::Ready,
                        yaml: Some(yaml.clone()),
                        error: None,
                    },
                    Err(cause) => UrlTransformEvent {
                        id: None,
                        canonical_url: canonical.clone(),
                        state: TransformEventState::Error,
                        yaml: None,
                        error: Some(cause.to_string()),
                    },
                };
                self.notify.publish(session, event).await;
                result
            }
        }
    }

    async fn resolve_inner(&self, canonical: &str) -> Outcome {
        enum Role {
            Leader,
            Follower(oneshot::Receiver<SharedResult>),
            CacheHit(SharedResult),
        }

        let role = {
            let mut slots = self.slots.lock().await;
            let now = Utc::now();
            match slots.get(canonical) {
                Some(Slot::Ready { yaml, fetched_at })
                    if now.signed_duration_since(*fetched_at).to_std().unwrap_or(Duration::MAX)
                        < self.config.ttl =>
                {
                    Role::CacheHit(Ok(yaml.clone()))
                }
                Some(Slot::Error { cause, at })
                    if now.signed_duration_since(*at).to_std().unwrap_or(Duration::MAX)
                        < self.config.cooldown =>
                {
                    Role::CacheHit(Err(cause.clone()))
                }
                Some(Slot::InFlight { .. }) => {
                    let (tx, rx) = oneshot::channel();
                    if let Some(Slot::InFlight { waiters, .. }) = slots.get_mut(canonical) {
                        waiters.push(tx);
                    }
                    Role::Follower(rx)
                }
                _ => {
                    slots.insert(
                        canonical.to_string(),
                        Slot::InFlight {
                            started_at: now,
                            waiters: Vec::new(),
                        },
                    );
                    Role::Leader
                }
            }
        };

        match role {
            Role::CacheHit(result) => Outcome::CacheHit(result),
            Role::Follower(rx) => {
                let result = rx.await.unwrap_or_else(|_| {
                    Err(CacheErrorCause("transformation leader dropped".to_string()))
                });
                Outcome::Transitioned(result)
            }
            Role::Leader => {
                debug!(canonical_url = canonical, "leading transformation");
                let outcome = self
                    .extractor
                    .transform(
                        canonical,
                        &self.config.extractor_model,
                        self.config.extractor_max_tries,
                        self.config.extractor_temperature,
                    )
                    .await;

                let now = Utc::now();
                let result: SharedResult = match outcome {
                    Ok(yaml) => Ok(yaml),
                    Err(e) => Err(CacheErrorCause(e.to_string())),
                };

                let waiters = {
                    let mut slots = self.slots.lock().await;
                    let prior = slots.insert(
                        canonical.to_string(),
                        match &result {
                            Ok(yaml) => Slot::Ready {
                                yaml: yaml.clone(),
                                fetched_at: now,
                            },
                            Err(cause) => Slot::Error {
                                cause: cause.clone(),
                                at: now,
                            },
                        },
                    );
                    match prior {
                        Some(Slot::InFlight { waiters, .. }) => waiters,
                        _ => Vec::new(),
                    }
                };

                if result.is_ok() {
                    info!(canonical_url = canonical, "transformation ready");
                } else {
                    warn!(canonical_url = canonical, "transformation failed");
                }

                for waiter in waiters {
                    let _ = waiter.send(result.clone());
                }

                Outcome::Transitioned(result)
            }
        }
    }

    async fn touch_recency(&self, canonical: &str) {
        let mut recency = self.recency.lock().await;
        recency.retain(|k| k != canonical);
        recency.push_back(canonical.to_string());
    }

    async fn evict_if_needed(&self) {
        let mut recency = self.recency.lock().await;
        let mut slots = self.slots.lock().await;
        while slots.len() > self.config.max_entries {
            let Some(oldest) = recency
                .iter()
                .position(|k| !matches!(slots.get(k), Some(Slot::InFlight { .. })))
            else {
                break;
            };
            let key = recency.remove(oldest).expect("index from position");
            slots.remove(&key);
        }
    }

    /// Number of tracked entries (test/diagnostic hook).
    pub async fn entry_count(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvey_adapters::test_support::MockExtractorAdapter;
    use std::sync::Arc as StdArc;
    use std::time::Duration as StdDuration;

    fn cache(
        extractor: MockExtractorAdapter,
        config: CacheConfig,
    ) -> PricingContextCache<MockExtractorAdapter> {
        PricingContextCache::new(extractor, StdArc::new(NotifyBus::new()), config)
    }

    #[tokio::test]
    async fn resolves_and_reuses_within_ttl() {
        let extractor = MockExtractorAdapter::new("plans: []\n");
        let c = cache(extractor, CacheConfig::default());
        let session = SessionId::new("s1");

        let first = c.resolve("https://example.com/pricing", &session).await.unwrap();
        let second = c.resolve("https://example.com/pricing", &session).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn concurrent_resolves_single_flight_to_one_extractor_call() {
        let extractor = StdArc::new(MockExtractorAdapter::new("plans: []\n"));
        // Build the cache over a thin wrapper so both the cache and the
        // assertion can see the same spy instance.
        struct Shared(StdArc<MockExtractorAdapter>);
        #[async_trait::async_trait]
        impl ExtractorAdapter for Shared {
            async fn transform(
                &self,
                url: &str,
                model: &str,
                max_tries: u32,
                temperature: f64,
            ) -> Result<String, harvey_adapters::AdapterError> {
                tokio::time::sleep(StdDuration::from_millis(20)).await;
                self.0.transform(url, model, max_tries, temperature).await
            }
        }

        let c = StdArc::new(PricingContextCache::new(
            Shared(extractor.clone()),
            StdArc::new(NotifyBus::new()),
            CacheConfig::default(),
        ));

        async fn wrap(
            c: StdArc<PricingContextCache<Shared>>,
            session: SessionId,
        ) -> SharedResult {
            c.resolve("https://example.com/pricing", &session).await
        }

        let c1 = StdArc::clone(&c);
        let c2 = StdArc::clone(&c);
        let (r1, r2) = tokio::join!(
            wrap(c1, SessionId::new("s1")),
            wrap(c2, SessionId::new("s2"))
        );

        assert_eq!(r1.unwrap(), r2.unwrap());
        assert_eq!(extractor.call_count(), 1);
    }

    #[tokio::test]
    async fn expired_entry_triggers_second_extractor_call() {
        let extractor = MockExtractorAdapter::new("plans: []\n");
        let config = CacheConfig {
            ttl: StdDuration::from_millis(5),
            ..CacheConfig::default()
        };
        let c = StdArc::new(cache(extractor, config));
        let session = SessionId::new("s1");

        c.resolve("https://example.com/p", &session).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        c.resolve("https://example.com/p", &session).await.unwrap();
    }

    #[tokio::test]
    async fn lru_evicts_oldest_beyond_capacity() {
        let extractor = MockExtractorAdapter::new("plans: []\n");
        let config = CacheConfig {
            max_entries: 1,
            ..CacheConfig::default()
        };
        let c = cache(extractor, config);
        let session = SessionId::new("s1");

        c.resolve("https://a.example.com/p", &session).await.unwrap();
        c.resolve("https://b.example.com/p", &session).await.unwrap();

        assert_eq!(c.entry_count().await, 1);
    }
}
