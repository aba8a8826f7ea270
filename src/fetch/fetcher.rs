//! Single upstream fetch.
//!
//! # Responsibilities
//! - Issue one GET per URL with a hard deadline
//! - Abort as soon as the batch is cancelled
//! - Drain the whole body, then truncate it
//!
//! # Design Decisions
//! - Upstream status codes are not inspected; a 404 body is a result like any other
//! - Truncation is byte-level; a split UTF-8 sequence decodes to U+FFFD
//! - No retries

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::config::FetchConfig;
use crate::observability::metrics;

/// Why a fetch did not produce a body.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchCause {
    #[error("deadline exceeded")]
    Timeout,
    #[error("context canceled")]
    Cancelled,
    #[error(transparent)]
    Transport(Arc<reqwest::Error>),
    #[error("fetch task panicked: {0}")]
    Panicked(String),
}

/// A failed fetch: the URL plus the underlying cause.
#[derive(Debug, Clone, thiserror::Error)]
#[error("fetch {url}: {cause}")]
pub struct FetchFailed {
    pub url: String,
    #[source]
    pub cause: FetchCause,
}

impl FetchFailed {
    pub fn new(url: impl Into<String>, cause: FetchCause) -> Self {
        Self {
            url: url.into(),
            cause,
        }
    }

    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let cause = if err.is_timeout() {
            FetchCause::Timeout
        } else {
            FetchCause::Transport(Arc::new(err))
        };
        Self::new(url, cause)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, FetchCause::Cancelled)
    }
}

/// Something that can fetch a URL on behalf of a batch.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch `url`, giving up as soon as `ctx` is cancelled.
    async fn fetch(&self, ctx: &CancellationToken, url: &str) -> Result<String, FetchFailed>;
}

/// Fetcher backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder().timeout(config.timeout());
        if !config.honor_proxy_env {
            builder = builder.no_proxy();
        }

        Ok(Self {
            client: builder.build()?,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, ctx: &CancellationToken, url: &str) -> Result<String, FetchFailed> {
        let started = Instant::now();
        let request = async {
            let response = self.client.get(url).send().await?;
            response.bytes().await
        };

        let result = tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(FetchFailed::new(url, FetchCause::Cancelled)),
            body = request => body
                .map(|body| truncate_body(&body, self.max_body_bytes))
                .map_err(|e| FetchFailed::from_reqwest(url, e)),
        };

        match &result {
            Ok(body) => {
                tracing::trace!(url = %url, bytes = body.len(), "Fetched upstream");
                metrics::record_fetch("ok", started);
            }
            Err(e) if e.is_cancelled() => metrics::record_fetch("cancelled", started),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Upstream fetch failed");
                metrics::record_fetch("failed", started);
            }
        }
        result
    }
}

/// Keep at most `limit` bytes of `body`.
pub fn truncate_body(body: &[u8], limit: usize) -> String {
    let end = body.len().min(limit);
    String::from_utf8_lossy(&body[..end]).into_owned()
}
