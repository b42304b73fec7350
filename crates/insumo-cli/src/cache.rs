//! Local response cache with endpoint-tiered TTLs.
//!
//! Keys are derived from the request path plus its sorted query pairs, so the
//! same logical read always maps to the same entry. TTLs are chosen by
//! substring match on the path: rarely changing lookups live longest,
//! near-real-time projections shortest.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

const PROJECTION_TTL: Duration = Duration::from_secs(5 * 60);
const HISTORICAL_TTL: Duration = Duration::from_secs(10 * 60);
const CATALOG_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// TTL tier for a request path.
pub fn ttl_for(path: &str) -> Duration {
    if path.contains("materials") {
        CATALOG_TTL
    } else if path.contains("history") || path.contains("average") || path.contains("cost-center")
    {
        HISTORICAL_TTL
    } else if path.contains("projection") {
        PROJECTION_TTL
    } else {
        DEFAULT_TTL
    }
}

/// Derive the local cache key for a read request.
pub fn request_key(path: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }

    let mut pairs: Vec<&(String, String)> = query.iter().collect();
    pairs.sort();

    let mut key = String::from(path);
    for (name, value) in pairs {
        key.push('|');
        key.push_str(name);
        key.push(':');
        key.push_str(value);
    }
    key
}

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// TTL map for decoded response payloads. Reads evict expired entries
/// lazily; there is no background sweep on the client side.
#[derive(Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<Value> {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.set_at(key, value, ttl, Instant::now());
    }

    pub fn set_at(&self, key: &str, value: Value, ttl: Duration, now: Instant) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    pub fn clear(&self) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.clear();
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tiers_follow_path_substrings() {
        assert_eq!(ttl_for("materials"), CATALOG_TTL);
        assert_eq!(ttl_for("monthly-consumption-history"), HISTORICAL_TTL);
        assert_eq!(ttl_for("six-month-average"), HISTORICAL_TTL);
        assert_eq!(ttl_for("consumption-by-cost-center"), HISTORICAL_TTL);
        assert_eq!(ttl_for("current-month-projection"), PROJECTION_TTL);
        assert_eq!(ttl_for("consumption-value"), DEFAULT_TTL);
    }

    #[test]
    fn key_is_independent_of_query_order() {
        let forward = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        let reverse = vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ];
        assert_eq!(request_key("q", &forward), request_key("q", &reverse));
        assert_eq!(request_key("q", &forward), "q|a:1|b:2");
    }

    #[test]
    fn entries_expire_at_their_ttl() {
        let cache = ResponseCache::new();
        let base = Instant::now();
        cache.set_at("k", json!(1), Duration::from_secs(60), base);

        assert_eq!(
            cache.get_at("k", base + Duration::from_secs(59)),
            Some(json!(1))
        );
        assert!(cache.get_at("k", base + Duration::from_secs(60)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = ResponseCache::new();
        cache.set("a", json!(1), Duration::from_secs(60));
        cache.set("b", json!(2), Duration::from_secs(60));
        cache.clear();
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 0);
    }
}
