use axum::{
    body::Bytes,
    extract::State,
    http::{Method, Uri},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use crate::metrics::Sample;
use crate::stat::decode_stat;
use crate::AppState;

use super::AppError;

/// Request bodies above this are rejected with 413 before decoding.
pub const MAX_BODY_BYTES: usize = 4024 * 1024;

/// Path prefix owned by the administrative endpoints.
const RESERVED_KEY: &str = "api";

// ─── POST /<stream> ──────────────────────────────────────────────

/// Router fallback: every request that is not an admin endpoint is a stat
/// for the stream named by its first path segment.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Result<&'static str, AppError> {
    let t0 = Instant::now();
    let result = dispatch(&state, &method, uri.path(), &body).await;

    state.metrics.record(Sample {
        write_us: *result.as_ref().unwrap_or(&0),
        total_us: t0.elapsed().as_micros() as u64,
        success: result.is_ok(),
    });

    result.map(|_| "OK\n")
}

/// Returns the microseconds spent inside the writer.
async fn dispatch(
    state: &AppState,
    method: &Method,
    path: &str,
    body: &[u8],
) -> Result<u64, AppError> {
    let key = stream_key(path)?;
    if key == RESERVED_KEY {
        return Err(AppError::NotFound(format!("no endpoint at {path}")));
    }
    if *method != Method::POST {
        return Err(AppError::MethodNotAllowed);
    }

    let stream = state.registry.resolve(key).await.map_err(|e| {
        error!(stream = %key, error = %e, "error creating stats writer");
        AppError::Internal("error creating stats writer")
    })?;

    let stat = decode_stat(body).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let t_write = Instant::now();
    stream.write(std::slice::from_ref(&stat)).await.map_err(|e| {
        error!(stream = %key, error = %e, "error writing stats");
        AppError::Internal("error writing stats")
    })?;
    let write_us = t_write.elapsed().as_micros() as u64;

    debug!(stream = %key, write_us, "stat accepted");
    Ok(write_us)
}

/// First path segment, restricted to characters that are safe as a file
/// name component.
pub fn stream_key(path: &str) -> Result<&str, AppError> {
    let key = path
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();

    if key.is_empty() {
        return Err(AppError::BadRequest("invalid path".into()));
    }
    let valid = !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if !valid {
        return Err(AppError::BadRequest(format!("invalid stream key {key:?}")));
    }
    Ok(key)
}
