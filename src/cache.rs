use crate::types::{PermissionKey, ResourceId};
use async_trait::async_trait;

/// Cache of immediate parent sets, keyed by child resource.
#[async_trait]
pub trait ScopeCache: Send + Sync {
    /// Gets the cached immediate parents of a resource.
    async fn get_parents(&self, resource: ResourceId) -> Option<Vec<ResourceId>>;

    /// Sets the immediate parents of a resource.
    async fn set_parents(&self, resource: ResourceId, parents: Vec<ResourceId>);

    /// Invalidates the entry for a resource.
    async fn invalidate_parents(&self, resource: ResourceId);

    /// Removes every entry.
    async fn clear_parents(&self);
}

/// Cache of permission-check results, keyed by the permission triple.
#[async_trait]
pub trait PermissionCache: Send + Sync {
    /// Gets a cached grant result.
    async fn get_permission(&self, key: &PermissionKey) -> Option<bool>;

    /// Sets the grant result for a triple.
    async fn set_permission(&self, key: PermissionKey, granted: bool);

    /// Invalidates the entry for a triple.
    async fn invalidate_permission(&self, key: &PermissionKey);

    /// Removes every entry.
    async fn clear_permissions(&self);
}

/// Composite cache trait.
pub trait Cache: ScopeCache + PermissionCache {}

impl<T> Cache for T where T: ScopeCache + PermissionCache {}

/// No-op cache implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl ScopeCache for NoCache {
    async fn get_parents(&self, _resource: ResourceId) -> Option<Vec<ResourceId>> {
        None
    }

    async fn set_parents(&self, _resource: ResourceId, _parents: Vec<ResourceId>) {}

    async fn invalidate_parents(&self, _resource: ResourceId) {}

    async fn clear_parents(&self) {}
}

#[async_trait]
impl PermissionCache for NoCache {
    async fn get_permission(&self, _key: &PermissionKey) -> Option<bool> {
        None
    }

    async fn set_permission(&self, _key: PermissionKey, _granted: bool) {}

    async fn invalidate_permission(&self, _key: &PermissionKey) {}

    async fn clear_permissions(&self) {}
}
