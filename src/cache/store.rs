//! TTL-bounded response cache.
//!
//! One flat map from derived key to JSON payload, each entry carrying its own
//! expiry. Entries are logically absent the moment `now >= expires_at`, even
//! before the periodic sweep physically removes them; reads evict lazily.
//! A secondary index maps each logical query name to the set of derived keys
//! created for it, so invalidating "every variant of query X" is an exact
//! index lookup rather than a string-prefix scan.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use serde_json::Value;

use insumo_api_types::{CacheInfoBody, CacheStatsBody};

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
const INFO_KEY_SAMPLE: usize = 10;

struct CacheEntry {
    value: Value,
    query_name: String,
    #[allow(dead_code)]
    created_at: Instant,
    expires_at: Instant,
}

#[derive(Default)]
struct StoreInner {
    entries: HashMap<String, CacheEntry>,
    // logical query name -> derived keys created under it
    index: HashMap<String, HashSet<String>>,
}

impl StoreInner {
    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                if let Some(keys) = self.index.get_mut(&entry.query_name) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.index.remove(&entry.query_name);
                    }
                }
                true
            }
            None => false,
        }
    }
}

/// Shared in-process cache with per-entry TTL and hit/miss/set/delete
/// counters. Explicitly constructed and injected; there is no global
/// instance.
pub struct TtlStore {
    inner: RwLock<StoreInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl Default for TtlStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Look up `key`. An expired entry counts as a miss and is evicted on the
    /// spot.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<Value> {
        {
            let inner = rw_read(&self.inner, SOURCE, "get");
            match inner.entries.get(key) {
                Some(entry) if now < entry.expires_at => {
                    let value = entry.value.clone();
                    drop(inner);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    counter!("insumo_cache_hit_total").increment(1);
                    return Some(value);
                }
                Some(_) => {}
                None => {
                    drop(inner);
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    counter!("insumo_cache_miss_total").increment(1);
                    return None;
                }
            }
        }

        // Present but expired: evict lazily. Re-check under the write lock;
        // a concurrent set may have refreshed the entry in between.
        let mut inner = rw_write(&self.inner, SOURCE, "get.evict_expired");
        if let Some(entry) = inner.entries.get(key) {
            if now < entry.expires_at {
                let value = entry.value.clone();
                drop(inner);
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!("insumo_cache_hit_total").increment(1);
                return Some(value);
            }
            inner.remove(key);
            self.deletes.fetch_add(1, Ordering::Relaxed);
            counter!("insumo_cache_evict_total").increment(1);
        }
        drop(inner);
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("insumo_cache_miss_total").increment(1);
        None
    }

    /// Look up `key` without touching counters or evicting. For re-checks by
    /// callers that already counted the logical miss.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.peek_at(key, Instant::now())
    }

    pub fn peek_at(&self, key: &str, now: Instant) -> Option<Value> {
        let inner = rw_read(&self.inner, SOURCE, "peek");
        inner
            .entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    /// Store `value` under `key`, unconditionally overwriting. A zero TTL
    /// produces an entry that is already expired; that is accepted, not an
    /// error.
    pub fn set(&self, query_name: &str, key: &str, value: Value, ttl: Duration) {
        self.set_at(query_name, key, value, ttl, Instant::now());
    }

    pub fn set_at(&self, query_name: &str, key: &str, value: Value, ttl: Duration, now: Instant) {
        let entry = CacheEntry {
            value,
            query_name: query_name.to_string(),
            created_at: now,
            expires_at: now + ttl,
        };

        let mut inner = rw_write(&self.inner, SOURCE, "set");
        if let Some(previous) = inner.entries.insert(key.to_string(), entry) {
            // Re-home the index entry if the same key moved between logical
            // names (should not happen with derived keys, but keep it exact).
            if previous.query_name != query_name {
                if let Some(keys) = inner.index.get_mut(&previous.query_name) {
                    keys.remove(key);
                    if keys.is_empty() {
                        inner.index.remove(&previous.query_name);
                    }
                }
            }
        }
        inner
            .index
            .entry(query_name.to_string())
            .or_default()
            .insert(key.to_string());
        drop(inner);

        self.sets.fetch_add(1, Ordering::Relaxed);
        counter!("insumo_cache_set_total").increment(1);
    }

    /// Remove one exact key. Returns whether an entry was removed.
    pub fn invalidate_exact(&self, key: &str) -> bool {
        let removed = rw_write(&self.inner, SOURCE, "invalidate_exact").remove(key);
        if removed {
            self.deletes.fetch_add(1, Ordering::Relaxed);
            counter!("insumo_cache_delete_total").increment(1);
        }
        removed
    }

    /// Remove every parameter variant of one logical query name, via the
    /// secondary index. Returns the number of entries removed.
    pub fn invalidate_query(&self, query_name: &str) -> usize {
        let mut inner = rw_write(&self.inner, SOURCE, "invalidate_query");
        let Some(keys) = inner.index.remove(query_name) else {
            return 0;
        };
        let mut removed = 0;
        for key in keys {
            if inner.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        drop(inner);
        self.deletes.fetch_add(removed as u64, Ordering::Relaxed);
        counter!("insumo_cache_delete_total").increment(removed as u64);
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut inner = rw_write(&self.inner, SOURCE, "clear");
        let size = inner.entries.len();
        inner.entries.clear();
        inner.index.clear();
        drop(inner);
        self.deletes.fetch_add(size as u64, Ordering::Relaxed);
        counter!("insumo_cache_delete_total").increment(size as u64);
    }

    /// Sweep out every expired entry; returns the number removed. Invoked
    /// once at startup and then on a fixed interval.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let mut inner = rw_write(&self.inner, SOURCE, "cleanup");
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| now >= entry.expires_at)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        drop(inner);

        let removed = expired.len();
        self.deletes.fetch_add(removed as u64, Ordering::Relaxed);
        counter!("insumo_cache_evict_total").increment(removed as u64);
        removed
    }

    pub fn len(&self) -> usize {
        rw_read(&self.inner, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-only counter snapshot with a derived hit rate.
    pub fn stats(&self) -> CacheStatsBody {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            format!("{:.2}%", hits as f64 / total as f64 * 100.0)
        } else {
            "0.00%".to_string()
        };

        CacheStatsBody {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            hit_rate,
            size: self.len(),
            total_requests: total,
        }
    }

    /// Stats plus a small sample of resident keys, for operators.
    pub fn info(&self) -> CacheInfoBody {
        let keys: Vec<String> = {
            let inner = rw_read(&self.inner, SOURCE, "info");
            inner
                .entries
                .keys()
                .take(INFO_KEY_SAMPLE)
                .cloned()
                .collect()
        };
        let stats = self.stats();
        CacheInfoBody {
            size: stats.size,
            stats,
            keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_millis(600_000);

    #[test]
    fn set_then_get_returns_value_and_counts_hit() {
        let store = TtlStore::new();
        store.set("history", "history|material_code:7", json!({"rows": [1, 2, 3]}), TTL);

        let value = store.get("history|material_code:7");
        assert_eq!(value, Some(json!({"rows": [1, 2, 3]})));

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.sets, 1);
    }

    #[test]
    fn get_on_absent_key_counts_miss_only() {
        let store = TtlStore::new();
        assert!(store.get("nothing").is_none());

        let stats = store.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn peek_reads_without_touching_counters() {
        let store = TtlStore::new();
        let base = Instant::now();
        store.set_at("q", "q", json!(1), TTL, base);

        assert_eq!(store.peek_at("q", base), Some(json!(1)));
        assert!(store.peek_at("absent", base).is_none());
        assert!(store.peek_at("q", base + TTL).is_none());

        let stats = store.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn entry_is_live_one_tick_before_expiry_and_gone_at_expiry() {
        let store = TtlStore::new();
        let base = Instant::now();
        store.set_at("q", "q", json!(1), TTL, base);

        let just_before = base + TTL - Duration::from_millis(1);
        assert_eq!(store.get_at("q", just_before), Some(json!(1)));

        let at_expiry = base + TTL;
        assert!(store.get_at("q", at_expiry).is_none());
        // Lazy eviction removed the entry physically too.
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn expired_read_counts_as_miss_and_increments_deletes() {
        let store = TtlStore::new();
        let base = Instant::now();
        store.set_at("q", "q", json!(1), Duration::from_secs(1), base);

        assert!(store.get_at("q", base + Duration::from_secs(2)).is_none());

        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.deletes, 1);
    }

    #[test]
    fn zero_ttl_entry_is_immediately_expired() {
        let store = TtlStore::new();
        let base = Instant::now();
        store.set_at("q", "q", json!(1), Duration::ZERO, base);
        assert!(store.get_at("q", base).is_none());
    }

    #[test]
    fn set_overwrites_unconditionally() {
        let store = TtlStore::new();
        let base = Instant::now();
        store.set_at("q", "q", json!("old"), TTL, base);
        store.set_at("q", "q", json!("new"), TTL, base);

        assert_eq!(store.get_at("q", base), Some(json!("new")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().sets, 2);
    }

    #[test]
    fn invalidate_query_removes_all_variants_exactly() {
        let store = TtlStore::new();
        store.set("history", "history", json!(1), TTL);
        store.set("history", "history|material_code:1", json!(2), TTL);
        store.set("history", "history|material_code:2", json!(3), TTL);
        // A logical name that happens to share a string prefix must survive.
        store.set("history-extended", "history-extended", json!(4), TTL);

        let removed = store.invalidate_query("history");
        assert_eq!(removed, 3);
        assert!(store.get("history").is_none());
        assert!(store.get("history|material_code:1").is_none());
        assert_eq!(store.get("history-extended"), Some(json!(4)));
    }

    #[test]
    fn invalidate_exact_removes_only_one_variant() {
        let store = TtlStore::new();
        store.set("history", "history|material_code:1", json!(1), TTL);
        store.set("history", "history|material_code:2", json!(2), TTL);

        assert!(store.invalidate_exact("history|material_code:1"));
        assert!(!store.invalidate_exact("history|material_code:1"));
        assert_eq!(store.get("history|material_code:2"), Some(json!(2)));
    }

    #[test]
    fn cleanup_removes_only_expired_entries() {
        let store = TtlStore::new();
        let base = Instant::now();
        store.set_at("a", "a", json!(1), Duration::from_secs(1), base);
        store.set_at("b", "b", json!(2), Duration::from_secs(60), base);

        let removed = store.cleanup_at(base + Duration::from_secs(5));
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_at("b", base + Duration::from_secs(5)), Some(json!(2)));
    }

    #[test]
    fn clear_empties_store_and_index() {
        let store = TtlStore::new();
        store.set("a", "a", json!(1), TTL);
        store.set("b", "b|x:1", json!(2), TTL);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.invalidate_query("a"), 0);
        assert_eq!(store.stats().deletes, 2);
    }

    #[test]
    fn end_to_end_expiry_scenario() {
        let store = TtlStore::new();
        let base = Instant::now();
        store.set_at(
            "hist",
            "hist|mat:7",
            json!({"rows": [1, 2, 3]}),
            Duration::from_millis(600_000),
            base,
        );

        assert_eq!(
            store.get_at("hist|mat:7", base),
            Some(json!({"rows": [1, 2, 3]}))
        );
        let misses_before = store.stats().misses;

        let later = base + Duration::from_millis(600_001);
        assert!(store.get_at("hist|mat:7", later).is_none());
        assert_eq!(store.stats().misses, misses_before + 1);
    }

    #[test]
    fn info_exposes_key_sample() {
        let store = TtlStore::new();
        store.set("q", "q|a:1", json!(1), TTL);
        let info = store.info();
        assert_eq!(info.size, 1);
        assert_eq!(info.keys, vec!["q|a:1".to_string()]);
    }

    #[test]
    fn hit_rate_is_formatted_percentage() {
        let store = TtlStore::new();
        store.set("q", "q", json!(1), TTL);
        store.get("q");
        store.get("absent");

        assert_eq!(store.stats().hit_rate, "50.00%");
        assert_eq!(store.stats().total_requests, 2);
    }
}
