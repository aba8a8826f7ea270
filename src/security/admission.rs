//! Global admission control for batch requests.
//!
//! A fixed pool of tokens shared by every request. Acquisition never waits:
//! when the pool is empty the request is answered with 429 immediately.
//! Tokens go back to the pool when dropped, so every exit path (success,
//! error, panic, client disconnect) releases exactly once.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::http::response::GatewayError;
use crate::observability::metrics;

/// Process-wide pool of admission tokens.
#[derive(Debug, Clone)]
pub struct Admission {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl Admission {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Take a token if one is free.
    pub fn try_acquire(&self) -> Option<AdmissionToken> {
        let permit = Arc::clone(&self.permits).try_acquire_owned().ok()?;
        metrics::set_batches_in_flight(self.in_flight());
        Some(AdmissionToken {
            _permit: permit,
            pool: self.clone(),
        })
    }

    /// Tokens currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Tokens currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A held admission slot. Released on drop.
#[derive(Debug)]
pub struct AdmissionToken {
    _permit: OwnedSemaphorePermit,
    pool: Admission,
}

impl AdmissionToken {
    /// Give the token back. Equivalent to dropping it.
    pub fn release(self) {}
}

impl Drop for AdmissionToken {
    fn drop(&mut self) {
        // The permit field is dropped after this body runs.
        metrics::set_batches_in_flight(self.pool.in_flight().saturating_sub(1));
    }
}

/// Middleware rejecting requests once the pool is exhausted.
pub async fn admission_middleware(
    State(admission): State<Admission>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(_token) = admission.try_acquire() else {
        tracing::warn!(
            capacity = admission.capacity(),
            path = %request.uri().path(),
            "Admission pool exhausted"
        );
        metrics::record_admission_rejected();
        return GatewayError::Overloaded.into_response();
    };

    next.run(request).await
}
