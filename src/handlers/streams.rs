use axum::{extract::State, Json};
use std::sync::Arc;

use crate::registry::StreamInfo;
use crate::AppState;

// ─── GET /api/streams ────────────────────────────────────────────

pub async fn list_streams(State(state): State<Arc<AppState>>) -> Json<Vec<StreamInfo>> {
    Json(state.registry.list().await)
}
