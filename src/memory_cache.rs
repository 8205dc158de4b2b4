use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::cache::{PermissionCache, ScopeCache};
use crate::types::{PermissionKey, ResourceId};

/// In-memory cache for parent sets and permission results.
///
/// Clones share the same maps, so one instance can be handed to several
/// engines. Entries are only dropped by explicit invalidation or clearing.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    parents: DashMap<ResourceId, Vec<ResourceId>>,
    permissions: DashMap<PermissionKey, bool>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached parent sets.
    pub fn scope_entries(&self) -> usize {
        self.inner.parents.len()
    }

    /// Number of cached permission results.
    pub fn permission_entries(&self) -> usize {
        self.inner.permissions.len()
    }
}

#[async_trait]
impl ScopeCache for MemoryCache {
    async fn get_parents(&self, resource: ResourceId) -> Option<Vec<ResourceId>> {
        self.inner
            .parents
            .get(&resource)
            .map(|entry| entry.value().clone())
    }

    async fn set_parents(&self, resource: ResourceId, parents: Vec<ResourceId>) {
        self.inner.parents.insert(resource, parents);
    }

    async fn invalidate_parents(&self, resource: ResourceId) {
        self.inner.parents.remove(&resource);
    }

    async fn clear_parents(&self) {
        self.inner.parents.clear();
    }
}

#[async_trait]
impl PermissionCache for MemoryCache {
    async fn get_permission(&self, key: &PermissionKey) -> Option<bool> {
        self.inner.permissions.get(key).map(|entry| *entry.value())
    }

    async fn set_permission(&self, key: PermissionKey, granted: bool) {
        self.inner.permissions.insert(key, granted);
    }

    async fn invalidate_permission(&self, key: &PermissionKey) {
        self.inner.permissions.remove(key);
    }

    async fn clear_permissions(&self) {
        self.inner.permissions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;
    use futures::executor::block_on;

    fn id(value: i64) -> ResourceId {
        ResourceId::new(value)
    }

    fn key(authorized: i64, target: i64, action: &str) -> PermissionKey {
        PermissionKey::new(id(authorized), id(target), Action::try_from(action).unwrap())
    }

    #[test]
    fn clones_should_share_entries() {
        let cache = MemoryCache::new();
        let other = cache.clone();

        block_on(cache.set_parents(id(1), vec![id(2)]));
        block_on(cache.set_permission(key(1, 2, "read"), true));

        assert_eq!(block_on(other.get_parents(id(1))), Some(vec![id(2)]));
        assert_eq!(block_on(other.get_permission(&key(1, 2, "read"))), Some(true));
    }

    #[test]
    fn negative_results_should_be_cached_distinctly_from_missing() {
        let cache = MemoryCache::new();
        block_on(cache.set_permission(key(1, 2, "read"), false));

        assert_eq!(block_on(cache.get_permission(&key(1, 2, "read"))), Some(false));
        assert_eq!(block_on(cache.get_permission(&key(1, 2, "write"))), None);
    }

    #[test]
    fn invalidate_should_touch_only_the_given_entry() {
        let cache = MemoryCache::new();
        block_on(cache.set_parents(id(1), vec![id(2)]));
        block_on(cache.set_parents(id(3), vec![]));
        block_on(cache.set_permission(key(1, 2, "read"), true));
        block_on(cache.set_permission(key(1, 2, "write"), true));

        block_on(cache.invalidate_parents(id(1)));
        block_on(cache.invalidate_permission(&key(1, 2, "read")));

        assert_eq!(block_on(cache.get_parents(id(1))), None);
        assert_eq!(block_on(cache.get_parents(id(3))), Some(vec![]));
        assert_eq!(block_on(cache.get_permission(&key(1, 2, "read"))), None);
        assert_eq!(block_on(cache.get_permission(&key(1, 2, "write"))), Some(true));
    }

    #[test]
    fn clear_should_empty_each_map() {
        let cache = MemoryCache::new();
        block_on(cache.set_parents(id(1), vec![id(2)]));
        block_on(cache.set_permission(key(1, 2, "read"), true));

        block_on(cache.clear_parents());
        assert_eq!(cache.scope_entries(), 0);
        assert_eq!(cache.permission_entries(), 1);

        block_on(cache.clear_permissions());
        assert_eq!(cache.permission_entries(), 0);
    }
}
