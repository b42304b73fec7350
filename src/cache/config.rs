//! Cache configuration.
//!
//! TTLs are tiered by how quickly a report goes stale: near-real-time
//! projections, slower historical aggregates, and rarely-changing catalog
//! listings.

use std::time::Duration;

const DEFAULT_PROJECTION_TTL_SECS: u64 = 5 * 60;
const DEFAULT_HISTORICAL_TTL_SECS: u64 = 10 * 60;
const DEFAULT_CATALOG_TTL_SECS: u64 = 30 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10 * 60;

/// Staleness tier of a logical report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlTier {
    /// Current-month projections; recomputed often.
    Projection,
    /// Closed-month aggregates.
    Historical,
    /// Lookup listings that change rarely.
    Catalog,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub projection_ttl: Duration,
    pub historical_ttl: Duration,
    pub catalog_ttl: Duration,
    /// Interval of the periodic expired-entry sweep.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            projection_ttl: Duration::from_secs(DEFAULT_PROJECTION_TTL_SECS),
            historical_ttl: Duration::from_secs(DEFAULT_HISTORICAL_TTL_SECS),
            catalog_ttl: Duration::from_secs(DEFAULT_CATALOG_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            projection_ttl: settings.projection_ttl,
            historical_ttl: settings.historical_ttl,
            catalog_ttl: settings.catalog_ttl,
            sweep_interval: settings.sweep_interval,
        }
    }
}

impl CacheConfig {
    pub fn ttl_for(&self, tier: TtlTier) -> Duration {
        match tier {
            TtlTier::Projection => self.projection_ttl,
            TtlTier::Historical => self.historical_ttl,
            TtlTier::Catalog => self.catalog_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tiers_are_5_10_30_minutes() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_for(TtlTier::Projection), Duration::from_secs(300));
        assert_eq!(config.ttl_for(TtlTier::Historical), Duration::from_secs(600));
        assert_eq!(config.ttl_for(TtlTier::Catalog), Duration::from_secs(1800));
    }
}
