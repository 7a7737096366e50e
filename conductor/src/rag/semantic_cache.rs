//! Semantic cache: exact normalized-query memo with TTL.
//!
//! Key is the sha256 of the trimmed, lowercased query, so two queries that
//! differ only in case or surrounding whitespace share an entry. Entries are
//! immutable once written; expiry and explicit clear are the only removals.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

struct CacheEntry {
    response: String,
    expires_at: Instant,
}

/// TTL-bounded query-to-response memo.
///
/// **Interaction**: first and last stage of `RagPipeline::process_query`.
pub struct SemanticCache {
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

impl SemanticCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    fn key(query: &str) -> String {
        let normalized = query.trim().to_lowercase();
        let digest = Sha256::digest(normalized.as_bytes());
        format!("{digest:x}")
    }

    /// TTL-valid cached response, if any. Expired entries are evicted on read.
    pub fn get(&self, query: &str) -> Option<String> {
        let key = Self::key(query);
        let expired = match self.entries.get(&key) {
            Some(entry) => {
                if Instant::now() < entry.expires_at {
                    tracing::info!("semantic cache hit");
                    return Some(entry.response.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(&key);
        }
        None
    }

    pub fn insert(&self, query: &str, response: &str) {
        self.entries.insert(
            Self::key(query),
            CacheEntry {
                response: response.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: queries differing only by case/whitespace share one
    /// cache entry within the TTL window.
    #[test]
    fn normalized_queries_share_entry() {
        let cache = SemanticCache::new(Duration::from_secs(60));
        cache.insert("크리에이터 등급은?", "S~C 등급입니다.");
        assert_eq!(
            cache.get("  크리에이터 등급은?  "),
            Some("S~C 등급입니다.".to_string())
        );
        assert_eq!(cache.len(), 1);
    }

    /// **Scenario**: entries expire after the TTL and are evicted on read.
    #[test]
    fn entries_expire() {
        let cache = SemanticCache::new(Duration::from_millis(10));
        cache.insert("q", "a");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("q"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_empties_cache() {
        let cache = SemanticCache::new(Duration::from_secs(60));
        cache.insert("q", "a");
        cache.clear();
        assert!(cache.is_empty());
    }
}
