//! Wiring and serving

use crate::routes::{routes, AppState};
use anyhow::Context;
use forge_core::{ForgeConfig, ModelHandle, Orchestrator, StageCatalog, ToolImageLoader};
use forge_tools::ToolInvoker;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

/// Build the orchestrator and the shared image model from `config`
#[must_use]
pub fn build_state(config: &ForgeConfig) -> AppState {
    let catalog = Arc::new(StageCatalog::from_config(config));
    let executor = Arc::new(ToolInvoker::new());
    let model = Arc::new(ModelHandle::new(ToolImageLoader::new(
        catalog.image.clone(),
        executor.clone(),
    )));
    let orchestrator = Orchestrator::new(config, catalog, model.clone()).with_executor(executor);
    AppState {
        orchestrator: Arc::new(orchestrator),
        model,
    }
}

/// Load the image model ahead of the first request
///
/// A failed warm-up only logs; the next request retries the load.
pub async fn warm_up(state: &AppState) {
    tracing::info!("warming up image model");
    match state.model.warm_up().await {
        Ok(()) => tracing::info!("image model ready"),
        Err(e) => tracing::warn!(error = %e, "image model warm-up failed"),
    }
}

/// Serve until Ctrl-C
///
/// # Errors
/// Returns an error if the address does not parse or cannot be bound.
pub async fn serve(config: &ForgeConfig) -> anyhow::Result<()> {
    let addr = listen_addr(&config.server.host, config.server.port)?;

    let state = build_state(config);
    if config.server.warm_up {
        warm_up(&state).await;
    }

    let (bound, server) = warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    })?;
    tracing::info!(
        addr = %bound,
        storage = %config.storage_root.display(),
        "rigforge listening"
    );
    server.await;
    Ok(())
}

/// First socket address `host:port` resolves to (`localhost` included)
///
/// # Errors
/// Returns an error if the host does not resolve.
pub fn listen_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("cannot resolve {host}:{port}"))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("no address for {host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_addr_accepts_literal_ip() {
        let addr = listen_addr("127.0.0.1", 5000).unwrap();
        assert_eq!(addr.port(), 5000);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn listen_addr_resolves_localhost() {
        assert!(listen_addr("localhost", 5000).unwrap().ip().is_loopback());
    }
}
