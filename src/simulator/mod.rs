//! Slow-upstream simulator.
//!
//! `GET /<duration>` sleeps for the duration in the last path segment and
//! then answers `200 ok`. Used to exercise timeouts, cancellation and
//! shutdown draining; not part of the gateway itself.

pub mod duration;

use axum::{
    extract::Path,
    http::StatusCode,
    routing::get,
    Router,
};

pub use duration::{parse_duration, DurationError};

/// Router for the sleep simulator.
pub fn router() -> Router {
    Router::new()
        .route("/", get(missing_duration))
        .route("/{*path}", get(sleep_then_ok))
}

async fn sleep_then_ok(Path(path): Path<String>) -> (StatusCode, &'static str) {
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    match parse_duration(segment) {
        Ok(delay) => {
            tracing::debug!(delay = ?delay, "Sleeping before reply");
            tokio::time::sleep(delay).await;
            (StatusCode::OK, "ok")
        }
        Err(e) => {
            tracing::warn!(segment, error = %e, "Bad duration");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

async fn missing_duration() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}
