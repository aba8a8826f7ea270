//! Upstream fetching subsystem.
//!
//! # Data Flow
//! ```text
//! BatchRequest.urls
//!     → coordinator.rs (bounded fan-out, first-error-wins, ordered fan-in)
//!     → fetcher.rs (one GET per URL, deadline, truncation)
//!     → BatchResult.urls
//! ```

pub mod coordinator;
pub mod fetcher;

pub use coordinator::Coordinator;
pub use fetcher::{truncate_body, Fetch, FetchCause, FetchFailed, HttpFetcher};
