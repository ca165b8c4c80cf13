//! `tollgate serve`: load configuration, wire the gateway and run the HTTP
//! server until Ctrl+C or SIGTERM.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tollgate_infra::config::{ProviderCredentials, load_gateway_config, signing_secret_from_env};
use tollgate_infra::provider::ProviderRouter;

use crate::http::router::build_router;
use crate::state::AppState;

/// How often usage history and idle rate buckets are pruned.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

pub async fn serve(config_path: &Path, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let config = load_gateway_config(config_path).await?;
    let secret = signing_secret_from_env()?;

    let credentials = Arc::new(ProviderCredentials::from_env());
    let providers = credentials.enabled_providers();
    if providers.is_empty() {
        tracing::warn!("no provider API keys configured; completions will fail with 503");
    } else {
        tracing::info!(?providers, "provider credentials loaded");
    }

    let shutdown = CancellationToken::new();
    let state = AppState::new(
        &config,
        ProviderRouter::new(credentials),
        secret,
        shutdown.clone(),
    )?;
    let maintenance = spawn_maintenance(&state);

    let addr = resolve_listen_addr(&config.listen_addr, host.as_deref(), port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, models = state.gateway.catalog().all().len(), "gateway listening");
    println!("  Tollgate listening on http://{addr}");
    println!("  Press Ctrl+C to stop");

    let router = build_router(state);
    let stop = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("shutdown requested, closing open streams");
            stop.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = maintenance.await;
    println!("\n  Server stopped.");
    Ok(())
}

/// Apply `--host`/`--port` overrides to the configured `host:port`.
fn resolve_listen_addr(configured: &str, host: Option<&str>, port: Option<u16>) -> String {
    let (configured_host, configured_port) = configured
        .rsplit_once(':')
        .unwrap_or((configured, "8080"));
    let host = host.unwrap_or(configured_host);
    match port {
        Some(port) => format!("{host}:{port}"),
        None => format!("{host}:{configured_port}"),
    }
}

/// Periodically drop stale usage history and idle rate buckets.
fn spawn_maintenance(state: &AppState) -> JoinHandle<()> {
    let usage = Arc::clone(state.gateway.usage());
    let limiter = Arc::clone(&state.rate_limiter);
    let idle_after = state.completion_limit.refill_window();
    let shutdown = state.shutdown.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let pruned = usage.prune_at(Utc::now());
                    let evicted = limiter.evict_idle(idle_after, Instant::now());
                    tracing::debug!(pruned, evicted, "maintenance pass");
                }
            }
        }
    })
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_addr_overrides() {
        assert_eq!(resolve_listen_addr("0.0.0.0:8080", None, None), "0.0.0.0:8080");
        assert_eq!(resolve_listen_addr("0.0.0.0:8080", Some("127.0.0.1"), None), "127.0.0.1:8080");
        assert_eq!(resolve_listen_addr("0.0.0.0:8080", None, Some(9000)), "0.0.0.0:9000");
        assert_eq!(resolve_listen_addr("[::1]:8080", None, Some(1)), "[::1]:1");
        assert_eq!(resolve_listen_addr("localhost", None, None), "localhost:8080");
    }
}
