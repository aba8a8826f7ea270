//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::Listener)
//!     → server.rs (hyper connection, Axum router, middleware)
//!     → security::admission (429 when the pool is empty)
//!     → request.rs (request ID, batch decoding and validation)
//!     → fetch::Coordinator
//!     → response.rs (JSON body or status-mapped error)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{BatchRequest, RequestIdGenerator, X_REQUEST_ID};
pub use response::{BatchResponse, GatewayError};
pub use server::{AppState, HttpServer};
