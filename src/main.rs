use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use stat_sink::config::Config;
use stat_sink::metrics::run_volume_reporter;
use stat_sink::{logging, server, AppState, StreamRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    logging::init();

    // ── 1. Connect the configured backend ───────────────────────
    let mode = config.mode();
    info!(mode = %mode, "selecting persistence mode");
    let writers = config
        .writer_config()
        .await
        .with_context(|| format!("cannot set up {mode} backend"))?;

    // ── 2. Build shared state ────────────────────────────────────
    let registry = Arc::new(StreamRegistry::new(Arc::new(writers), config.stream_paths()));
    let state = Arc::new(AppState::new(registry.clone()));

    let reporter = tokio::spawn(run_volume_reporter(
        registry.clone(),
        state.metrics.clone(),
        config.report_interval(),
    ));

    // ── 3. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    // ── 5. Stop writers and their background tasks ───────────────
    reporter.abort();
    registry.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
