// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Injected submodel cache.
//!
//! The repository consults the cache on full-submodel reads and invalidates
//! the affected identifier after every committed mutation. Nothing is cached
//! unless a cache is injected with
//! [`SubmodelRepository::with_cache`](crate::SubmodelRepository::with_cache).

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::Submodel;

/// Submodel snapshots keyed by identifier.
///
/// Every `invalidate` bumps a per-identifier generation. A reader captures
/// the generation before it loads from the store and fills the cache with
/// [`put_if_current`](SubmodelCache::put_if_current), so a snapshot read
/// before a concurrent commit is never stored after that commit's
/// invalidation.
#[async_trait]
pub trait SubmodelCache: Send + Sync {
    async fn get(&self, id: &str) -> Option<Submodel>;
    async fn put(&self, submodel: &Submodel);
    /// Current generation of `id`; starts at 0.
    async fn generation(&self, id: &str) -> u64;
    /// Store `submodel` only if its generation still equals `generation`.
    /// Returns whether it was stored.
    async fn put_if_current(&self, submodel: &Submodel, generation: u64) -> bool;
    async fn invalidate(&self, id: &str);
    async fn clear(&self);
}

/// Process-local cache backed by a concurrent map.
///
/// Unbounded by default. With [`with_capacity`](Self::with_capacity) an
/// insert of a new identifier into a full cache evicts an arbitrary entry.
pub struct InMemorySubmodelCache {
    data: DashMap<String, Submodel>,
    generations: DashMap<String, u64>,
    capacity: Option<usize>,
}

impl InMemorySubmodelCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            generations: DashMap::new(),
            capacity: None,
        }
    }

    /// Hold at most `capacity` submodels (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new()
        }
    }

    /// Get current entry count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.data.contains_key(id)
    }

    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn insert(&self, submodel: &Submodel) {
        if let Some(capacity) = self.capacity {
            while self.data.len() >= capacity && !self.data.contains_key(&submodel.id) {
                let victim = self.data.iter().next().map(|entry| entry.key().clone());
                match victim {
                    Some(victim) => {
                        self.data.remove(&victim);
                    }
                    None => break,
                }
            }
        }
        self.data.insert(submodel.id.clone(), submodel.clone());
    }
}

impl Default for InMemorySubmodelCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubmodelCache for InMemorySubmodelCache {
    async fn get(&self, id: &str) -> Option<Submodel> {
        self.data.get(id).map(|r| r.value().clone())
    }

    async fn put(&self, submodel: &Submodel) {
        self.insert(submodel);
    }

    async fn generation(&self, id: &str) -> u64 {
        self.generations.get(id).map(|g| *g).unwrap_or(0)
    }

    async fn put_if_current(&self, submodel: &Submodel, generation: u64) -> bool {
        // The generation entry stays locked until the insert is done, so an
        // invalidate either lands before the check or after the insert.
        let current = self.generations.entry(submodel.id.clone()).or_insert(0);
        if *current != generation {
            return false;
        }
        self.insert(submodel);
        true
    }

    async fn invalidate(&self, id: &str) {
        let mut current = self.generations.entry(id.to_string()).or_insert(0);
        *current += 1;
        self.data.remove(id);
    }

    async fn clear(&self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_cache_is_empty() {
        let cache = InMemorySubmodelCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.len(), 0);
        assert!(cache.get("urn:sm:1").await.is_none());
    }

    #[tokio::test]
    async fn test_put_get_invalidate() {
        let cache = InMemorySubmodelCache::default();
        cache.put(&Submodel::new("urn:sm:1")).await;
        cache.put(&Submodel::new("urn:sm:2")).await;
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("urn:sm:1").await.unwrap().id, "urn:sm:1");

        cache.invalidate("urn:sm:1").await;
        assert!(!cache.contains("urn:sm:1"));
        assert!(cache.contains("urn:sm:2"));

        cache.clear().await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let cache = InMemorySubmodelCache::new();
        let mut sm = Submodel::new("urn:sm:1");
        cache.put(&sm).await;
        sm.id_short = Some("renamed".into());
        cache.put(&sm).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("urn:sm:1").await.unwrap().id_short.as_deref(), Some("renamed"));
    }

    #[tokio::test]
    async fn test_invalidate_rejects_stale_put() {
        let cache = InMemorySubmodelCache::new();
        let before = cache.generation("urn:sm:1").await;
        assert_eq!(before, 0);

        cache.invalidate("urn:sm:1").await;
        assert_eq!(cache.generation("urn:sm:1").await, 1);
        assert!(!cache.put_if_current(&Submodel::new("urn:sm:1"), before).await);
        assert!(!cache.contains("urn:sm:1"));

        assert!(cache.put_if_current(&Submodel::new("urn:sm:1"), 1).await);
        assert!(cache.contains("urn:sm:1"));
    }

    #[tokio::test]
    async fn test_capacity_evicts_when_full() {
        let cache = InMemorySubmodelCache::with_capacity(2);
        assert_eq!(cache.capacity(), Some(2));
        for i in 0..5 {
            cache.put(&Submodel::new(format!("urn:sm:{}", i))).await;
            assert!(cache.len() <= 2);
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("urn:sm:4"));

        // Overwriting a cached identifier evicts nothing
        cache.put(&Submodel::new("urn:sm:4")).await;
        assert_eq!(cache.len(), 2);
    }
}
