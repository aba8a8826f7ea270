//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Create the Axum router with the batch handler
//! - Wire up middleware (tracing, request ID, admission, body limit)
//! - Serve HTTP/1.1 and HTTP/2 connections from the bounded listener
//! - Two-phase shutdown: stop accepting, drain within the grace period,
//!   then force the remaining connections closed

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto::Builder, graceful::GracefulShutdown},
    service::TowerToHyperService,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::fetch::{Coordinator, Fetch, HttpFetcher};
use crate::http::request::{request_id, BatchRequest, RequestIdGenerator, X_REQUEST_ID};
use crate::http::response::{BatchResponse, GatewayError};
use crate::lifecycle::shutdown::{ShutdownOutcome, ShutdownSignal};
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::security::admission::{admission_middleware, Admission};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub max_urls: usize,
    /// Parent of every batch token; cancelled when shutdown is forced.
    pub root: CancellationToken,
}

/// HTTP server for the fetch gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    admission: Admission,
    root: CancellationToken,
}

impl HttpServer {
    /// Create a server that fetches upstreams over HTTP.
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let fetcher = HttpFetcher::new(&config.fetch)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    /// Create a server around any [`Fetch`] implementation.
    pub fn with_fetcher(config: GatewayConfig, fetcher: Arc<dyn Fetch>) -> Self {
        let admission = Admission::new(config.admission.max_in_flight);
        let root = CancellationToken::new();
        let state = AppState {
            coordinator: Coordinator::new(fetcher, config.batch.workers),
            max_urls: config.batch.max_urls,
            root: root.clone(),
        };

        let router = Self::build_router(&config, state, admission.clone());
        Self {
            router,
            config,
            admission,
            root,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState, admission: Admission) -> Router {
        let batch = post(batch_handler).fallback(method_not_allowed);
        Router::new()
            .route("/", batch.clone())
            .route("/{*path}", batch)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.batch.max_request_body_bytes))
            .layer(middleware::from_fn_with_state(admission, admission_middleware))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, RequestIdGenerator))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` fires, then drain.
    ///
    /// Connections get the configured grace period to finish in-flight
    /// requests; whatever is still open afterwards is closed and its fetches
    /// cancelled.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: ShutdownSignal,
    ) -> Result<ShutdownOutcome, std::io::Error> {
        let addr = listener.local_addr()?;
        let grace_period = self.config.shutdown.grace_period();
        tracing::info!(
            address = %addr,
            max_in_flight = self.admission.capacity(),
            workers = self.config.batch.workers,
            "HTTP server starting"
        );

        let service = TowerToHyperService::new(self.router);
        let builder = Builder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let tracker = ConnectionTracker::new();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Closed) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };

                    let guard = tracker.track();
                    let conn = builder
                        .serve_connection_with_upgrades(TokioIo::new(stream), service.clone())
                        .into_owned();
                    let conn = graceful.watch(conn);
                    connections.spawn(async move {
                        let _permit = permit;
                        if let Err(e) = conn.await {
                            tracing::debug!(connection_id = %guard.id(), peer = %peer, error = %e, "Connection error");
                        }
                        drop(guard);
                    });
                }
                _ = shutdown.recv() => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        tracing::info!(
            active_connections = tracker.active_count(),
            grace_period_secs = grace_period.as_secs(),
            "Stopped accepting connections, draining"
        );

        let outcome = match tokio::time::timeout(grace_period, graceful.shutdown()).await {
            Ok(()) => ShutdownOutcome::Graceful,
            Err(_) => {
                tracing::warn!(
                    remaining_connections = tracker.active_count(),
                    "Grace period elapsed, forcing connections closed"
                );
                self.root.cancel();
                connections.abort_all();
                ShutdownOutcome::Forced
            }
        };
        while connections.join_next().await.is_some() {}

        tracing::info!(%outcome, "HTTP server stopped");
        Ok(outcome)
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The admission pool shared by every request.
    pub fn admission(&self) -> &Admission {
        &self.admission
    }
}

/// Batch handler: validate, fan out, answer.
async fn batch_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let started = Instant::now();
    let request_id = request_id(&headers);

    let response = match process_batch(&state, request_id, &body).await {
        Ok(response) => response,
        Err(e) => {
            match &e {
                GatewayError::Upstream(cause) => {
                    tracing::warn!(request_id = %request_id, error = %cause, "Batch failed upstream")
                }
                other => tracing::debug!(request_id = %request_id, error = %other, "Batch rejected"),
            }
            e.into_response()
        }
    };

    metrics::record_batch(response.status().as_u16(), started);
    response
}

async fn process_batch(
    state: &AppState,
    request_id: &str,
    body: &[u8],
) -> Result<Response, GatewayError> {
    let batch = BatchRequest::parse(body, state.max_urls)?;
    tracing::debug!(request_id = %request_id, urls = batch.urls.len(), "Dispatching batch");

    let urls = state.coordinator.dispatch(&state.root, batch.urls).await?;
    BatchResponse { urls }.into_json()
}

async fn method_not_allowed() -> GatewayError {
    GatewayError::MethodNotAllowed
}
