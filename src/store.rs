use crate::error::StoreError;
use crate::types::{PermissionKey, ResourceId};
use async_trait::async_trait;

/// Row-level locking on the resource table.
#[async_trait]
pub trait ResourceLocks: Send {
    /// Locks the resource row for the rest of the transaction
    /// (`SELECT ... FOR UPDATE`) and returns whether the row exists.
    async fn lock_resource(&mut self, resource: ResourceId) -> Result<bool, StoreError>;
}

/// Store interface for permission inheritance edges.
#[async_trait]
pub trait InheritanceStore: Send {
    /// Returns the immediate parents of `child`.
    async fn parent_resources(&mut self, child: ResourceId) -> Result<Vec<ResourceId>, StoreError>;

    /// Inserts a `parent -> child` edge.
    async fn insert_inheritance(
        &mut self,
        parent: ResourceId,
        child: ResourceId,
    ) -> Result<(), StoreError>;

    /// Deletes a `parent -> child` edge; returns whether a row was removed.
    async fn delete_inheritance(
        &mut self,
        parent: ResourceId,
        child: ResourceId,
    ) -> Result<bool, StoreError>;
}

/// Store interface for permission triples.
#[async_trait]
pub trait PermissionStore: Send {
    /// Returns whether the exact triple is stored.
    async fn permission_exists(&mut self, key: &PermissionKey) -> Result<bool, StoreError>;

    /// Inserts a permission row.
    async fn insert_permission(&mut self, key: &PermissionKey) -> Result<(), StoreError>;

    /// Deletes a permission row; returns whether a row was removed.
    async fn delete_permission(&mut self, key: &PermissionKey) -> Result<bool, StoreError>;
}

/// An open transaction against the backing store.
#[async_trait]
pub trait Transaction: ResourceLocks + InheritanceStore + PermissionStore + Send {
    /// Commits the transaction.
    async fn commit(self) -> Result<(), StoreError>;

    /// Rolls the transaction back.
    async fn rollback(self) -> Result<(), StoreError>;
}

/// Source of new transactions.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Transaction type handed out by [`TransactionSource::begin`].
    type Tx: Transaction;

    /// Starts a new transaction.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// Registry that owns resource existence.
#[async_trait]
pub trait ResourceRegistry: Send + Sync {
    /// Creates a new resource and returns its id.
    async fn create_resource(&self) -> Result<ResourceId, StoreError>;
}

/// Key/value property store.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    /// Returns the stored value for `key`.
    async fn get_property(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key` unless a non-empty value is already present.
    ///
    /// Returns `None` when `value` was stored, otherwise the value that was
    /// already there. Implementations must make this atomic in the store.
    async fn add_property(&self, key: &str, value: &str) -> Result<Option<String>, StoreError>;
}

/// Composite store trait.
pub trait Store: TransactionSource + ResourceRegistry + PropertyStore {}

impl<T> Store for T where T: TransactionSource + ResourceRegistry + PropertyStore {}
