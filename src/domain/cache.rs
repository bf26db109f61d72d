use crate::core::UserId;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Daily per-user counter bucket, e.g. routine generations on day 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub user: UserId,
    pub day: u32,
    pub bucket: &'static str,
}

/// Rate-limit counters kept outside the relational store
///
/// Behaves like an expiring key/value cache: least recently touched buckets
/// are evicted once capacity is reached.
pub struct RateLimitCache {
    entries: LruCache<RateKey, u32>,
}

impl RateLimitCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn count(&mut self, key: &RateKey) -> u32 {
        self.entries.get(key).copied().unwrap_or(0)
    }

    /// Increment the bucket if it is below `limit`; returns whether it was admitted
    pub fn try_acquire(&mut self, key: RateKey, limit: u32) -> bool {
        let current = self.count(&key);
        if current >= limit {
            return false;
        }
        self.entries.put(key, current + 1);
        true
    }

    /// Drop every bucket belonging to one of `users`
    pub fn clear_users(&mut self, users: &[UserId]) -> usize {
        let doomed: Vec<RateKey> = self
            .entries
            .iter()
            .filter(|(key, _)| users.contains(&key.user))
            .map(|(key, _)| *key)
            .collect();
        for key in &doomed {
            self.entries.pop(key);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(user: u64, day: u32) -> RateKey {
        RateKey {
            user: UserId(user),
            day,
            bucket: "routine",
        }
    }

    #[test]
    fn test_limit_enforced_per_day() {
        let mut cache = RateLimitCache::new(NonZeroUsize::new(16).unwrap());
        assert!(cache.try_acquire(key(1, 1), 2));
        assert!(cache.try_acquire(key(1, 1), 2));
        assert!(!cache.try_acquire(key(1, 1), 2));
        assert!(cache.try_acquire(key(1, 2), 2));
        assert_eq!(cache.count(&key(1, 1)), 2);
    }

    #[test]
    fn test_clear_users() {
        let mut cache = RateLimitCache::new(NonZeroUsize::new(16).unwrap());
        cache.try_acquire(key(1, 1), 3);
        cache.try_acquire(key(1, 2), 3);
        cache.try_acquire(key(2, 1), 3);

        assert_eq!(cache.clear_users(&[UserId(1)]), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.clear_users(&[UserId(1)]), 0);
    }
}
