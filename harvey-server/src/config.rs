//! Environment-driven configuration.
//!
//! Mirrors `brain::BrainConfig`'s struct-plus-`Default` shape: every
//! field has a spec-mandated default, and [`ServerConfig::from_env`]
//! overrides what the process environment sets, failing fast with a
//! [`ConfigError`] (exit code 2) rather than limping along on a
//! half-configured backend.

use std::time::Duration;

use thiserror::Error;

/// Default agent step budget (mirrors [`harvey_loop::DEFAULT_STEP_BUDGET`]).
pub const DEFAULT_STEP_BUDGET: u32 = harvey_loop::DEFAULT_STEP_BUDGET;
/// Default HTTP bind host.
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
/// Default HTTP bind port.
pub const DEFAULT_HTTP_PORT: u16 = 8080;
/// Default OpenAI-compatible model identifier.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
/// Default session idle TTL before GC (mirrors [`harvey_session::DEFAULT_IDLE_TTL`]).
pub const DEFAULT_SESSION_IDLE_TTL: Duration = harvey_session::DEFAULT_IDLE_TTL;
/// Default pricing-context cache TTL (mirrors [`harvey_cache::DEFAULT_TTL`]).
pub const DEFAULT_CACHE_TTL: Duration = harvey_cache::DEFAULT_TTL;
/// Default log level when `LOG_LEVEL` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration errors. Maps to [`harvey_types::FatalError::Config`]
/// (exit code 2).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable's value couldn't be parsed.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// The offending variable's name.
        key: &'static str,
        /// Human-readable parse failure.
        reason: String,
    },

    /// `CACHE_BACKEND` named a backend this build doesn't implement.
    #[error("unsupported cache backend: {0} (only \"memory\" is implemented)")]
    UnsupportedCacheBackend(String),
}

impl From<ConfigError> for harvey_types::FatalError {
    fn from(e: ConfigError) -> Self {
        harvey_types::FatalError::Config(e.to_string())
    }
}

/// Storage backend for the pricing-context cache (`CACHE_BACKEND`).
///
/// `redis` is a recognized value but not implemented — a persistent
/// database was never required, in-memory is sufficient — so
/// selecting it is a startup [`ConfigError`], not a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// The only implemented backend: `harvey-cache`'s in-process store.
    Memory,
}

impl std::str::FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(CacheBackend::Memory),
            "redis" => Err(ConfigError::UnsupportedCacheBackend(s.to_string())),
            other => Err(ConfigError::UnsupportedCacheBackend(other.to_string())),
        }
    }
}

/// Full process configuration, loaded from the recognized environment
/// keys plus the ambient numeric defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `OPENAI_MODEL`: LLM identifier for the agent.
    pub openai_model: String,
    /// `OPENAI_API_KEY`: LLM credential.
    pub openai_api_key: String,
    /// `AMINT_BASE_URL`: extractor base URL.
    pub amint_base_url: String,
    /// `ANALYSIS_BASE_URL`: analysis API base URL.
    pub analysis_base_url: String,
    /// `CACHE_BACKEND`: storage for the pricing-context cache.
    pub cache_backend: CacheBackend,
    /// `HTTP_HOST`: bind address.
    pub http_host: String,
    /// `HTTP_PORT`: bind port.
    pub http_port: u16,
    /// `LOG_LEVEL`: tracing env-filter directive.
    pub log_level: String,
    /// Agent step budget, overridable via `STEP_BUDGET`.
    pub step_budget: u32,
    /// Pricing-context cache TTL, overridable via `CACHE_TTL_SECONDS`.
    pub cache_ttl: Duration,
    /// Session idle TTL, overridable via `SESSION_IDLE_TTL_SECONDS`.
    pub session_idle_ttl: Duration,
}

fn env_var(key: &'static str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_duration_secs(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env_var(key) {
        None => Ok(default),
        Some(raw) => {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::Invalid {
                key,
                reason: format!("expected a non-negative integer, got {raw:?}"),
            })?;
            Ok(Duration::from_secs(secs))
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment. Fails closed:
    /// a missing credential or an unimplemented cache backend is a
    /// [`ConfigError`], never a silently-degraded default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let openai_api_key =
            env_var("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
        let amint_base_url =
            env_var("AMINT_BASE_URL").ok_or(ConfigError::Missing("AMINT_BASE_URL"))?;
        let analysis_base_url =
            env_var("ANALYSIS_BASE_URL").ok_or(ConfigError::Missing("ANALYSIS_BASE_URL"))?;

        let cache_backend = match env_var("CACHE_BACKEND") {
            None => CacheBackend::Memory,
            Some(raw) => raw.parse()?,
        };

        let http_port = match env_var("HTTP_PORT") {
            None => DEFAULT_HTTP_PORT,
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "HTTP_PORT",
                reason: format!("expected a u16, got {raw:?}"),
            })?,
        };

        let step_budget = match env_var("STEP_BUDGET") {
            None => DEFAULT_STEP_BUDGET,
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "STEP_BUDGET",
                reason: format!("expected a u32, got {raw:?}"),
            })?,
        };

        Ok(Self {
            openai_model: env_var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_api_key,
            amint_base_url,
            analysis_base_url,
            cache_backend,
            http_host: env_var("HTTP_HOST").unwrap_or_else(|| DEFAULT_HTTP_HOST.to_string()),
            http_port,
            log_level: env_var("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            step_budget,
            cache_ttl: env_duration_secs("CACHE_TTL_SECONDS", DEFAULT_CACHE_TTL)?,
            session_idle_ttl: env_duration_secs("SESSION_IDLE_TTL_SECONDS", DEFAULT_SESSION_IDLE_TTL)?,
        })
    }

    /// Socket address string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
