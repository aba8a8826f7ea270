//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → admission.rs (global in-flight ceiling, 429 when full)
//!     → request body size limit (tower-http, wired in http::server)
//!     → Pass to batch handler
//! ```
//!
//! # Design Decisions
//! - Fail fast: excess load is rejected, never queued

pub mod admission;

pub use admission::{admission_middleware, Admission, AdmissionToken};
