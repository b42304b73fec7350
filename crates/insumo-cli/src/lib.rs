//! Consumer-side client for the insumo API.
//!
//! The client mirrors the service's own caching discipline: responses to read
//! endpoints are cached locally with endpoint-tiered TTLs, identical in-flight
//! reads are deduplicated, and outbound requests pass through a small queue
//! that bounds concurrency and spaces dispatches out. The two cache tiers are
//! not coordinated; the client may serve data up to its own TTL stale even if
//! the server cache was just invalidated.

pub mod cache;
pub mod client;
pub mod error;
pub mod queue;

pub use cache::ResponseCache;
pub use client::ApiClient;
pub use error::CliError;
pub use queue::RequestQueue;
