//! TTL-bounded response cache for first-turn queries.
//!
//! Only session-less (first-turn) queries are cached: once a query carries
//! session context, the same question can legitimately produce a different
//! answer, so those always go to the endpoint. Keys are normalized so that
//! trivially different phrasings of the same question share an entry.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use confab_types::inference::Answer;

/// Cache key: normalized question text plus whether the query was
/// session-less. A first-turn answer must never be served to an in-session
/// query, and vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    normalized: String,
    first_turn: bool,
}

impl CacheKey {
    /// Normalize a question: trim, lowercase, collapse internal whitespace.
    pub fn new(question: &str, first_turn: bool) -> Self {
        let normalized = question
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        Self {
            normalized,
            first_turn,
        }
    }
}

struct CachedAnswer {
    answer: Answer,
    inserted_at: Instant,
}

/// Bounded, TTL-expiring answer cache.
pub struct ResponseCache {
    entries: DashMap<CacheKey, CachedAnswer>,
    ttl: Duration,
    capacity: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity,
        }
    }

    /// Look up a cached answer, removing it if the TTL has elapsed.
    pub fn get(&self, key: &CacheKey) -> Option<Answer> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                if entry.inserted_at.elapsed() < self.ttl {
                    return Some(entry.answer.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Insert an answer, first purging expired entries and then evicting
    /// the oldest entry if the cache is still at capacity.
    pub fn insert(&self, key: CacheKey, answer: Answer) {
        self.entries
            .retain(|_, cached| cached.inserted_at.elapsed() < self.ttl);

        if self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().inserted_at)
                .map(|entry| entry.key().clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(
            key,
            CachedAnswer {
                answer,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
