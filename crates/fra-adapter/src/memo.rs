//! Small TTL memoization cache for adapter calls that rarely change
//! (symbol metadata, funding interval), backed by `dashmap`.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use std::hash::Hash;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: DashMap<K, Entry<V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.expires_at > Instant::now() {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Fetch-or-populate: returns the cached value if fresh, otherwise
    /// awaits `fetch` and caches the result.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(cached) = self.get(&key) {
            return Ok(cached);
        }
        let value = fetch().await?;
        self.insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn caches_until_ttl_expires() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(20));
        let mut calls = 0;

        let v1: Result<u32, ()> = cache
            .get_or_fetch("k".to_string(), || async {
                calls += 1;
                Ok(1)
            })
            .await;
        assert_eq!(v1.unwrap(), 1);
        assert_eq!(calls, 1);

        let v2: Result<u32, ()> = cache
            .get_or_fetch("k".to_string(), || async {
                calls += 1;
                Ok(2)
            })
            .await;
        assert_eq!(v2.unwrap(), 1);
        assert_eq!(calls, 1);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let v3: Result<u32, ()> = cache
            .get_or_fetch("k".to_string(), || async {
                calls += 1;
                Ok(2)
            })
            .await;
        assert_eq!(v3.unwrap(), 2);
        assert_eq!(calls, 2);
    }
}
