use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::predicate::AuthorizationPredicate;
use crate::store::{
    InheritanceStore, PermissionStore, PropertyStore, ResourceLocks, ResourceRegistry,
    Transaction, TransactionSource,
};
use crate::types::{Action, PermissionKey, ResourceId};

/// In-memory store implementation for tests and demos.
///
/// Transactions apply writes immediately and undo them on rollback. Locking
/// a resource row blocks the calling thread until no other transaction holds
/// it; locks are released when the transaction commits, rolls back or is
/// dropped.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: RwLock<Tables>,
    properties: RwLock<HashMap<String, String>>,
    next_resource: AtomicI64,
    row_locks: Mutex<HashSet<ResourceId>>,
    row_released: Condvar,
    reads: AtomicUsize,
    transactions: AtomicUsize,
    fail_writes: AtomicBool,
    fail_commits: AtomicBool,
}

impl Inner {
    fn acquire_row(&self, resource: ResourceId) {
        let mut held = self.row_locks.lock().expect("poisoned lock");
        while held.contains(&resource) {
            held = self.row_released.wait(held).expect("poisoned lock");
        }
        held.insert(resource);
    }

    fn release_rows(&self, resources: &[ResourceId]) {
        if resources.is_empty() {
            return;
        }
        let mut held = self.row_locks.lock().expect("poisoned lock");
        for resource in resources {
            held.remove(resource);
        }
        drop(held);
        self.row_released.notify_all();
    }
}

#[derive(Debug, Default)]
struct Tables {
    resources: BTreeSet<ResourceId>,
    permissions: HashSet<PermissionKey>,
    // child -> parents, in insertion order
    parents: HashMap<ResourceId, Vec<ResourceId>>,
}

impl Tables {
    fn require_resource(&self, resource: ResourceId) -> Result<(), StoreError> {
        if self.resources.contains(&resource) {
            Ok(())
        } else {
            Err(format!("foreign key violation: resource {resource} does not exist").into())
        }
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource row and returns its id.
    pub fn add_resource(&self) -> ResourceId {
        let id = ResourceId::new(self.inner.next_resource.fetch_add(1, Ordering::SeqCst) + 1);
        let mut guard = self.inner.tables.write().expect("poisoned lock");
        guard.resources.insert(id);
        id
    }

    /// Adds `N` resource rows.
    pub fn add_resources<const N: usize>(&self) -> [ResourceId; N] {
        std::array::from_fn(|_| self.add_resource())
    }

    /// Adds an inheritance edge without going through a transaction.
    pub fn add_inheritance(&self, parent: ResourceId, child: ResourceId) {
        let mut guard = self.inner.tables.write().expect("poisoned lock");
        let parents = guard.parents.entry(child).or_default();
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }

    /// Adds a permission row without going through a transaction.
    pub fn add_permission(&self, authorized: ResourceId, target: ResourceId, action: &str) {
        let mut guard = self.inner.tables.write().expect("poisoned lock");
        guard.permissions.insert(PermissionKey::new(
            authorized,
            target,
            Action::from_string(action.to_string()),
        ));
    }

    /// Sets a property value, replacing any previous one.
    pub fn set_property(&self, key: &str, value: &str) {
        let mut guard = self.inner.properties.write().expect("poisoned lock");
        guard.insert(key.to_string(), value.to_string());
    }

    /// Returns whether a resource row exists.
    pub fn resource_exists(&self, resource: ResourceId) -> bool {
        let guard = self.inner.tables.read().expect("poisoned lock");
        guard.resources.contains(&resource)
    }

    /// Number of resource rows.
    pub fn resource_count(&self) -> usize {
        let guard = self.inner.tables.read().expect("poisoned lock");
        guard.resources.len()
    }

    /// Returns whether the exact permission row is stored.
    pub fn permission_stored(&self, key: &PermissionKey) -> bool {
        let guard = self.inner.tables.read().expect("poisoned lock");
        guard.permissions.contains(key)
    }

    /// Number of permission rows.
    pub fn permission_count(&self) -> usize {
        let guard = self.inner.tables.read().expect("poisoned lock");
        guard.permissions.len()
    }

    /// Number of reads (locks, edge lookups, existence checks) served so far.
    pub fn read_count(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Number of transactions begun so far.
    pub fn transaction_count(&self) -> usize {
        self.inner.transactions.load(Ordering::SeqCst)
    }

    /// Makes every subsequent transactional write fail while `on` is set.
    pub fn fail_writes(&self, on: bool) {
        self.inner.fail_writes.store(on, Ordering::SeqCst);
    }

    /// Makes every subsequent commit fail and roll back while `on` is set.
    pub fn fail_commits(&self, on: bool) {
        self.inner.fail_commits.store(on, Ordering::SeqCst);
    }

    /// Begins a transaction without awaiting.
    pub fn open_transaction(&self) -> MemoryTransaction {
        self.inner.transactions.fetch_add(1, Ordering::SeqCst);
        MemoryTransaction {
            inner: Arc::clone(&self.inner),
            undo: Vec::new(),
            locked: Vec::new(),
            finished: false,
        }
    }

    /// Selects every resource row for which `predicate` holds, in id order.
    ///
    /// This plays the host query `SELECT resource_id FROM resource WHERE
    /// <predicate>`.
    pub fn select_resources<E>(&self, predicate: &AuthorizationPredicate<E>) -> Vec<ResourceId> {
        let guard = self.inner.tables.read().expect("poisoned lock");
        guard
            .resources
            .iter()
            .copied()
            .filter(|resource| predicate.matches(*resource, |key| guard.permissions.contains(key)))
            .collect()
    }
}

#[async_trait]
impl TransactionSource for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, StoreError> {
        Ok(self.open_transaction())
    }
}

#[async_trait]
impl ResourceRegistry for MemoryStore {
    async fn create_resource(&self) -> Result<ResourceId, StoreError> {
        Ok(self.add_resource())
    }
}

#[async_trait]
impl PropertyStore for MemoryStore {
    async fn get_property(&self, key: &str) -> Result<Option<String>, StoreError> {
        let guard = self.inner.properties.read().expect("poisoned lock");
        Ok(guard.get(key).cloned())
    }

    async fn add_property(&self, key: &str, value: &str) -> Result<Option<String>, StoreError> {
        let mut guard = self.inner.properties.write().expect("poisoned lock");
        if let Some(existing) = guard.get(key).filter(|existing| !existing.is_empty()) {
            return Ok(Some(existing.clone()));
        }
        guard.insert(key.to_string(), value.to_string());
        Ok(None)
    }
}

#[derive(Debug)]
enum Undo {
    InsertedPermission(PermissionKey),
    DeletedPermission(PermissionKey),
    InsertedEdge {
        parent: ResourceId,
        child: ResourceId,
    },
    DeletedEdge {
        parent: ResourceId,
        child: ResourceId,
        position: usize,
    },
}

/// Transaction over a [`MemoryStore`].
///
/// Dropping an unfinished transaction rolls it back.
#[derive(Debug)]
pub struct MemoryTransaction {
    inner: Arc<Inner>,
    undo: Vec<Undo>,
    locked: Vec<ResourceId>,
    finished: bool,
}

impl MemoryTransaction {
    /// Resources locked so far, in lock order, each listed once.
    pub fn locked_resources(&self) -> &[ResourceId] {
        &self.locked
    }

    fn record_read(&self) {
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err("injected write failure".into());
        }
        Ok(())
    }

    fn undo_all(&mut self) {
        let mut guard = self.inner.tables.write().expect("poisoned lock");
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::InsertedPermission(key) => {
                    guard.permissions.remove(&key);
                }
                Undo::DeletedPermission(key) => {
                    guard.permissions.insert(key);
                }
                Undo::InsertedEdge { parent, child } => {
                    if let Some(parents) = guard.parents.get_mut(&child) {
                        parents.retain(|existing| *existing != parent);
                    }
                }
                Undo::DeletedEdge {
                    parent,
                    child,
                    position,
                } => {
                    let parents = guard.parents.entry(child).or_default();
                    let position = position.min(parents.len());
                    parents.insert(position, parent);
                }
            }
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.undo_all();
        }
        self.inner.release_rows(&self.locked);
    }
}

#[async_trait]
impl ResourceLocks for MemoryTransaction {
    async fn lock_resource(&mut self, resource: ResourceId) -> Result<bool, StoreError> {
        self.record_read();
        if !self.locked.contains(&resource) {
            self.inner.acquire_row(resource);
            self.locked.push(resource);
        }
        let guard = self.inner.tables.read().expect("poisoned lock");
        Ok(guard.resources.contains(&resource))
    }
}

#[async_trait]
impl InheritanceStore for MemoryTransaction {
    async fn parent_resources(&mut self, child: ResourceId) -> Result<Vec<ResourceId>, StoreError> {
        self.record_read();
        let guard = self.inner.tables.read().expect("poisoned lock");
        Ok(guard.parents.get(&child).cloned().unwrap_or_default())
    }

    async fn insert_inheritance(
        &mut self,
        parent: ResourceId,
        child: ResourceId,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        {
            let mut guard = self.inner.tables.write().expect("poisoned lock");
            guard.require_resource(parent)?;
            guard.require_resource(child)?;
            let parents = guard.parents.entry(child).or_default();
            if parents.contains(&parent) {
                return Err(format!(
                    "primary key violation: inheritance {parent} -> {child} already exists"
                )
                .into());
            }
            parents.push(parent);
        }
        self.undo.push(Undo::InsertedEdge { parent, child });
        Ok(())
    }

    async fn delete_inheritance(
        &mut self,
        parent: ResourceId,
        child: ResourceId,
    ) -> Result<bool, StoreError> {
        self.check_writable()?;
        let position = {
            let mut guard = self.inner.tables.write().expect("poisoned lock");
            let Some(parents) = guard.parents.get_mut(&child) else {
                return Ok(false);
            };
            let Some(position) = parents.iter().position(|existing| *existing == parent) else {
                return Ok(false);
            };
            parents.remove(position);
            position
        };
        self.undo.push(Undo::DeletedEdge {
            parent,
            child,
            position,
        });
        Ok(true)
    }
}

#[async_trait]
impl PermissionStore for MemoryTransaction {
    async fn permission_exists(&mut self, key: &PermissionKey) -> Result<bool, StoreError> {
        self.record_read();
        let guard = self.inner.tables.read().expect("poisoned lock");
        Ok(guard.permissions.contains(key))
    }

    async fn insert_permission(&mut self, key: &PermissionKey) -> Result<(), StoreError> {
        self.check_writable()?;
        {
            let mut guard = self.inner.tables.write().expect("poisoned lock");
            guard.require_resource(key.authorized)?;
            guard.require_resource(key.target)?;
            if !guard.permissions.insert(key.clone()) {
                return Err(format!("primary key violation: permission {key} already exists").into());
            }
        }
        self.undo.push(Undo::InsertedPermission(key.clone()));
        Ok(())
    }

    async fn delete_permission(&mut self, key: &PermissionKey) -> Result<bool, StoreError> {
        self.check_writable()?;
        let removed = {
            let mut guard = self.inner.tables.write().expect("poisoned lock");
            guard.permissions.remove(key)
        };
        if removed {
            self.undo.push(Undo::DeletedPermission(key.clone()));
        }
        Ok(removed)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self) -> Result<(), StoreError> {
        let mut tx = self;
        if tx.inner.fail_commits.load(Ordering::SeqCst) {
            tx.undo_all();
            tx.finished = true;
            return Err("injected commit failure".into());
        }
        tx.undo.clear();
        tx.finished = true;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        let mut tx = self;
        tx.undo_all();
        tx.finished = true;
        Ok(())
    }
}
