//! Request parsing and identification.
//!
//! # Responsibilities
//! - Generate a request ID (UUID v4) unless the client supplied one
//! - Decode and validate the batch body
//!
//! # Design Decisions
//! - The body is decoded by hand rather than through `Json<T>` so every
//!   decode failure maps to 400, whatever the content type
//! - The URL count is checked before any fetch work starts

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use serde::Deserialize;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::http::response::GatewayError;

/// Header carrying the request ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdGenerator;

impl MakeRequestId for RequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Read the request ID set by the request-id layer.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Incoming batch: the URLs to fetch, in order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub urls: Vec<String>,
}

impl BatchRequest {
    /// Decode a body and enforce the URL limit.
    pub fn parse(body: &[u8], max_urls: usize) -> Result<Self, GatewayError> {
        let request: BatchRequest =
            serde_json::from_slice(body).map_err(GatewayError::MalformedBody)?;
        if request.urls.len() > max_urls {
            return Err(GatewayError::TooManyUrls {
                count: request.urls.len(),
                max: max_urls,
            });
        }
        Ok(request)
    }
}
