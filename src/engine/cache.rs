//! Content-addressed result cache with TTL and LRU eviction.
//!
//! Keys are SHA-256 digests of the framework id and the normalized source
//! text, so the same `(code, framework)` pair always maps to the same entry.
//! Recency is tracked with a monotonically increasing use tick: every hit
//! or write moves the entry to the newest tick, and eviction pops the
//! oldest tick first.

use crate::models::{AnalysisResponse, Framework};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Sizing for a [`ResultCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Point-in-time view of cache occupancy and effectiveness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses) since creation or the last `clear()`.
    pub hit_rate: f64,
}

struct CacheEntry {
    key: String,
    response: AnalysisResponse,
    inserted_at: Instant,
    hits: u64,
    tick: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// use tick -> key, oldest first
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }
}

/// Thread-safe memoization store for analysis responses.
pub struct ResultCache {
    state: Mutex<CacheState>,
    max_size: usize,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_size: config.max_size.max(1),
            ttl: config.ttl,
        }
    }

    /// Derive the cache key for a `(code, framework)` pair.
    pub fn cache_key(code: &str, framework: Framework) -> String {
        let mut hasher = Sha256::new();
        hasher.update(framework.id().as_bytes());
        hasher.update([0u8]);
        hasher.update(normalize_code(code).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a live entry. Hits are marked most-recently-used and come
    /// back tagged `cached = true`; expired entries count as misses.
    pub fn get(&self, code: &str, framework: Framework) -> Option<AnalysisResponse> {
        let key = Self::cache_key(code, framework);
        let now = Instant::now();
        let mut state = self.lock();

        let live = state
            .entries
            .get(&key)
            .map(|entry| now.duration_since(entry.inserted_at) < self.ttl);

        if live != Some(true) {
            state.misses += 1;
            return None;
        }

        let tick = state.bump();
        state.hits += 1;

        let entry = state.entries.get_mut(&key)?;
        let old_tick = std::mem::replace(&mut entry.tick, tick);
        entry.hits += 1;
        let mut response = entry.response.clone();
        response.metadata.cached = true;

        state.recency.remove(&old_tick);
        state.recency.insert(tick, key);

        Some(response)
    }

    /// Insert or overwrite an entry, then evict least-recently-used entries
    /// until the cache is back within `max_size`.
    pub fn set(&self, code: &str, framework: Framework, response: AnalysisResponse) {
        let key = Self::cache_key(code, framework);
        let now = Instant::now();
        let mut state = self.lock();

        let tick = state.bump();
        if let Some(previous) = state.entries.remove(&key) {
            state.recency.remove(&previous.tick);
        }

        state.recency.insert(tick, key.clone());
        state.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                response,
                inserted_at: now,
                hits: 0,
                tick,
            },
        );

        // The fresh entry holds the newest tick, so it is never the victim.
        while state.entries.len() > self.max_size {
            let Some((_, victim)) = state.recency.pop_first() else {
                break;
            };
            if let Some(evicted) = state.entries.remove(&victim) {
                debug!(
                    "Evicted cache entry {} after {} hits",
                    &evicted.key[..12],
                    evicted.hits
                );
            }
        }
    }

    /// Drop every entry and reset the hit/miss counters.
    #[allow(dead_code)] // For embedders that reuse one cache across batches
    pub fn clear(&self) {
        let mut state = self.lock();
        *state = CacheState::default();
    }

    /// Remove every entry whose age has reached the TTL. Returns how many
    /// were removed. Surviving entries keep their recency order.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();

        let expired: Vec<(String, u64)> = state
            .entries
            .values()
            .filter(|entry| now.duration_since(entry.inserted_at) >= self.ttl)
            .map(|entry| (entry.key.clone(), entry.tick))
            .collect();

        for (key, tick) in &expired {
            state.entries.remove(key);
            state.recency.remove(tick);
        }

        if !expired.is_empty() {
            debug!("Cache cleanup removed {} expired entries", expired.len());
        }

        expired.len()
    }

    pub fn get_stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;

        CacheStats {
            size: state.entries.len(),
            max_size: self.max_size,
            hits: state.hits,
            misses: state.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64
            },
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `cleanup()` every `interval` until the cache is dropped.
    pub fn spawn_janitor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.cleanup();
                    }
                    None => break,
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Line endings, trailing whitespace and surrounding blank lines do not
/// change the cache key. Leading indentation does.
fn normalize_code(code: &str) -> String {
    code.replace("\r\n", "\n")
        .lines()
        .map(str::trim_end)
        .skip_while(|line| line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResponseMetadata;
    use chrono::Utc;

    fn response(score: f64) -> AnalysisResponse {
        AnalysisResponse {
            compliant: score >= 80.0,
            score,
            violations: vec![],
            recommendations: vec!["Keep it up".to_string()],
            metadata: ResponseMetadata {
                analyzed_at: Utc::now(),
                duration_ms: 1200,
                tokens_used: 512,
                cached: false,
                model_version: "test-model".to_string(),
            },
        }
    }

    fn cache(max_size: usize, ttl_secs: u64) -> ResultCache {
        ResultCache::new(CacheConfig {
            max_size,
            ttl: Duration::from_secs(ttl_secs),
        })
    }

    #[test]
    fn test_key_is_stable_and_distinct() {
        let a = ResultCache::cache_key("const x=1;", Framework::Soc2);
        let b = ResultCache::cache_key("const x=1;", Framework::Soc2);
        let c = ResultCache::cache_key("const x=1;", Framework::Gdpr);
        let d = ResultCache::cache_key("const x=2;", Framework::Soc2);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_key_ignores_line_endings_and_trailing_space() {
        let unix = ResultCache::cache_key("fn a() {}\nfn b() {}\n", Framework::Soc2);
        let windows = ResultCache::cache_key("fn a() {}  \r\nfn b() {}\r\n", Framework::Soc2);
        assert_eq!(unix, windows);
    }

    #[test]
    fn test_key_keeps_first_line_indentation() {
        let nested = ResultCache::cache_key("    if x:\n        pass", Framework::Soc2);
        let top_level = ResultCache::cache_key("if x:\n        pass", Framework::Soc2);
        assert_ne!(nested, top_level);

        let padded = ResultCache::cache_key("\n\n    if x:\n        pass\n\n", Framework::Soc2);
        assert_eq!(nested, padded);
    }

    #[test]
    fn test_set_then_get_returns_cached_copy() {
        let cache = cache(10, 60);
        cache.set("let a = 1;", Framework::Soc2, response(90.0));

        let hit = cache.get("let a = 1;", Framework::Soc2).unwrap();
        assert!(hit.metadata.cached);
        assert_eq!(hit.score, 90.0);
        assert_eq!(hit.recommendations, vec!["Keep it up".to_string()]);
    }

    #[test]
    fn test_miss_on_other_framework() {
        let cache = cache(10, 60);
        cache.set("let a = 1;", Framework::Soc2, response(90.0));
        assert!(cache.get("let a = 1;", Framework::Hipaa).is_none());
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let cache = cache(10, 60);
        cache.set("x", Framework::Gdpr, response(10.0));
        cache.set("x", Framework::Gdpr, response(70.0));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("x", Framework::Gdpr).unwrap().score, 70.0);
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = cache(3, 60);
        for code in ["a", "b", "c"] {
            cache.set(code, Framework::Soc2, response(50.0));
        }

        // touch "a" so "b" becomes the oldest
        assert!(cache.get("a", Framework::Soc2).is_some());

        cache.set("d", Framework::Soc2, response(50.0));
        cache.set("e", Framework::Soc2, response(50.0));

        assert_eq!(cache.len(), 3);
        assert!(cache.get("b", Framework::Soc2).is_none());
        assert!(cache.get("c", Framework::Soc2).is_none());
        assert!(cache.get("a", Framework::Soc2).is_some());
        assert!(cache.get("d", Framework::Soc2).is_some());
        assert!(cache.get("e", Framework::Soc2).is_some());
    }

    #[test]
    fn test_overflow_by_k_evicts_exactly_k() {
        let cache = cache(5, 60);
        for i in 0..8 {
            cache.set(&format!("code-{}", i), Framework::Iso27001, response(60.0));
        }

        assert_eq!(cache.len(), 5);
        for i in 0..3 {
            assert!(cache.get(&format!("code-{}", i), Framework::Iso27001).is_none());
        }
        for i in 3..8 {
            assert!(cache.get(&format!("code-{}", i), Framework::Iso27001).is_some());
        }
    }

    #[test]
    fn test_size_one_keeps_newest() {
        let cache = cache(1, 60);
        cache.set("old", Framework::Soc2, response(50.0));
        cache.set("new", Framework::Soc2, response(50.0));

        assert_eq!(cache.len(), 1);
        assert!(cache.get("new", Framework::Soc2).is_some());
    }

    #[test]
    fn test_hit_rate_and_clear() {
        let cache = cache(10, 60);
        assert_eq!(cache.get_stats().hit_rate, 0.0);

        cache.set("a", Framework::Soc2, response(90.0));
        cache.get("a", Framework::Soc2);
        cache.get("a", Framework::Soc2);
        cache.get("b", Framework::Soc2);

        let stats = cache.get_stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.max_size, 10);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);

        cache.clear();
        let stats = cache.get_stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss_before_cleanup() {
        let cache = cache(10, 60);
        cache.set("a", Framework::Soc2, response(90.0));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("a", Framework::Soc2).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("a", Framework::Soc2).is_none());
        // still physically present until cleanup runs
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.cleanup(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_only_expired() {
        let cache = cache(10, 60);
        cache.set("old-1", Framework::Soc2, response(50.0));
        cache.set("old-2", Framework::Soc2, response(50.0));

        tokio::time::advance(Duration::from_secs(30)).await;
        cache.set("young", Framework::Soc2, response(50.0));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.cleanup(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("young", Framework::Soc2).is_some());
        assert_eq!(cache.cleanup(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_preserves_recency_of_survivors() {
        let cache = cache(2, 60);
        cache.set("stale", Framework::Soc2, response(50.0));
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.set("a", Framework::Soc2, response(50.0));
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(cache.cleanup(), 1);
        cache.set("b", Framework::Soc2, response(50.0));
        cache.set("c", Framework::Soc2, response(50.0));

        // "a" was the oldest survivor and is the one evicted
        assert!(cache.get("a", Framework::Soc2).is_none());
        assert!(cache.get("b", Framework::Soc2).is_some());
        assert!(cache.get("c", Framework::Soc2).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_sweeps_expired_entries() {
        let cache = Arc::new(cache(10, 10));
        cache.set("a", Framework::Soc2, response(50.0));
        let janitor = cache.spawn_janitor(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(cache.is_empty());

        janitor.abort();
    }

    #[test]
    fn test_concurrent_writers_respect_capacity() {
        let cache = Arc::new(cache(16, 60));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.set(&format!("{}-{}", t, i), Framework::Soc2, response(50.0));
                        assert!(cache.len() <= 16);
                        cache.get(&format!("{}-{}", t, i / 2), Framework::Soc2);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 16);
    }
}
