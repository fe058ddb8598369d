use axum::{extract::DefaultBodyLimit, middleware as axum_mw, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::handlers::ingest::MAX_BODY_BYTES;
use crate::metrics::stream;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router`: admin endpoints under `/api`, everything
/// else is stat ingestion keyed by the first path segment.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Streams ─────────────────────────────────────────────
        .route("/api/streams", get(handlers::streams::list_streams))
        // ── Metrics ─────────────────────────────────────────────
        .route("/api/metrics", get(stream::get_metrics))
        .route("/api/metrics/stream", get(stream::metrics_stream))
        // ── Ingestion: POST /<stream> ───────────────────────────
        .fallback(handlers::ingest::ingest)
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
