#![deny(missing_docs)]
//! # harvey-server — chat facade and process launcher (C8)
//!
//! Exposes the HTTP + SSE surface over `axum`, grounded
//! on `hi-youichi-loom/serve`'s router shape and `brain`'s CLI/launcher
//! conventions. The launcher ([`serve`]) loads configuration, wires
//! every other component crate together, binds the listener and runs
//! until a shutdown signal, mapping startup failures to the process
//! exit codes its configuration and startup failures are assigned.

pub mod app;
pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use std::time::Duration;

use tracing_subscriber::EnvFilter;

pub use config::{ConfigError, ServerConfig};
pub use state::AppState;

/// How often the idle-session GC sweep runs.
const SESSION_GC_INTERVAL: Duration = Duration::from_secs(60);

/// Initialize the global `tracing` subscriber from `log_level`
/// Safe to call once per process; a second call is a no-op
/// error we deliberately swallow (tests may call this repeatedly).
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_LEVEL));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Verify the configured upstreams are at least reachable before
/// binding the listener, so a misconfigured deployment fails fast with
/// exit code 4 rather than accepting chat requests doomed to fail on
/// their first tool call.
async fn check_upstreams_reachable(config: &ServerConfig) -> Result<(), harvey_types::FatalError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| harvey_types::FatalError::UpstreamUnreachable(e.to_string()))?;

    for (label, base_url) in [
        ("extractor", &config.amint_base_url),
        ("analysis", &config.analysis_base_url),
    ] {
        client.head(base_url).send().await.map_err(|e| {
            harvey_types::FatalError::UpstreamUnreachable(format!("{label} ({base_url}): {e}"))
        })?;
    }
    Ok(())
}

/// Run the Chat Facade to completion: load config, wire up every
/// component, bind, and serve until `ctrl_c`/`SIGTERM`.
///
/// Returns the [`harvey_types::FatalError`] that should determine the
/// process exit code on any startup failure; on a clean shutdown
/// returns `Ok(())`.
pub async fn serve() -> Result<(), harvey_types::FatalError> {
    let config = ServerConfig::from_env().map_err(harvey_types::FatalError::from)?;
    init_tracing(&config.log_level);

    check_upstreams_reachable(&config).await?;

    let bind_addr = config.bind_addr();
    let state = AppState::build(config)
        .await
        .map_err(|e| harvey_types::FatalError::Config(e.to_string()))?;

    tokio::spawn(state.sessions.clone().run_gc_loop(SESSION_GC_INTERVAL));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| harvey_types::FatalError::Bind(e.to_string()))?;
    tracing::info!(addr = %bind_addr, "harvey-server listening");

    let router = app::router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| harvey_types::FatalError::Bind(e.to_string()))?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}
