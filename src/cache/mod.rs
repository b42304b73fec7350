//! In-process report cache.
//!
//! - **Store**: flat TTL map from derived key to JSON payload, with a
//!   logical-name index for exact invalidation.
//! - **Keys**: deterministic key derivation from `(query name, params)`.
//! - **Flight**: single-flight registry so concurrent misses for the same key
//!   share one warehouse execution.
//!
//! TTLs come from `insumo.toml`:
//!
//! ```toml
//! [cache]
//! projection_ttl_seconds = 300
//! historical_ttl_seconds = 600
//! catalog_ttl_seconds = 1800
//! sweep_interval_seconds = 600
//! ```

mod config;
mod flight;
mod keys;
mod lock;
mod store;

pub use config::{CacheConfig, TtlTier};
pub use flight::FlightGroup;
pub use keys::derive_key;
pub use store::TtlStore;
