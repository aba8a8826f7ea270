//! Response bodies and error-to-status mapping.
//!
//! # Design Decisions
//! - Every failure is a `GatewayError`; its `IntoResponse` impl is the only
//!   place status codes are chosen
//! - Error bodies are short plain-text reasons

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::fetch::FetchFailed;

/// Successful batch result, index-aligned with the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResponse {
    pub urls: Vec<String>,
}

impl BatchResponse {
    /// Encode as a JSON response.
    pub fn into_json(self) -> Result<Response, GatewayError> {
        let body = serde_json::to_vec(&self).map_err(GatewayError::Encoding)?;
        Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response())
    }
}

/// Everything that can go wrong while serving a batch.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Method Not Allowed")]
    MethodNotAllowed,
    #[error("{0}")]
    MalformedBody(#[source] serde_json::Error),
    #[error("Unprocessable Entity: {count} urls exceeds the limit of {max}")]
    TooManyUrls { count: usize, max: usize },
    #[error("Too Many Requests")]
    Overloaded,
    #[error(transparent)]
    Upstream(#[from] FetchFailed),
    #[error("Internal Server Error")]
    Encoding(#[source] serde_json::Error),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            GatewayError::TooManyUrls { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::Overloaded => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Upstream(_) => StatusCode::FAILED_DEPENDENCY,
            GatewayError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let GatewayError::Encoding(e) = &self {
            tracing::error!(error = %e, "Failed to encode batch response");
        }
        (self.status(), self.to_string()).into_response()
    }
}
