//! Batch fetch gateway library.

pub mod config;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;
pub mod simulator;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::{Shutdown, ShutdownOutcome};
