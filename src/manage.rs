use crate::cache::Cache;
use crate::engine::{Engine, Joined};
use crate::error::{Error, Result};
use crate::store::{InheritanceStore, PermissionStore, ResourceLocks, Store, TransactionSource};
use crate::tx::Required;
use crate::types::{Action, PermissionKey, ResourceId};
use tracing::{debug, instrument};

type Tx<S> = <S as TransactionSource>::Tx;

impl<S, C> Engine<S, C>
where
    S: Store,
    C: Cache,
{
    /// Grants `action` on `target` to `authorized`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ResourceNotFound`] when `authorized` does not
    /// exist. Store failures (including a duplicate grant) propagate
    /// unchanged and leave the cache untouched.
    #[instrument(
        level = "debug",
        skip_all,
        fields(authorized = %authorized, target = %target, action = %action)
    )]
    pub async fn add_permission(
        &self,
        authorized: ResourceId,
        target: ResourceId,
        action: &str,
    ) -> Result<()> {
        self.grant(authorized, target, action, None).await
    }

    /// Revokes `action` on `target` from `authorized`; absent grants are
    /// not an error.
    #[instrument(
        level = "debug",
        skip_all,
        fields(authorized = %authorized, target = %target, action = %action)
    )]
    pub async fn remove_permission(
        &self,
        authorized: ResourceId,
        target: ResourceId,
        action: &str,
    ) -> Result<()> {
        self.revoke(authorized, target, action, None).await
    }

    /// Makes `child` inherit every grant held by `parent`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ResourceNotFound`] when either endpoint does not
    /// exist.
    #[instrument(level = "debug", skip_all, fields(parent = %parent, child = %child))]
    pub async fn add_permission_inheritance(
        &self,
        parent: ResourceId,
        child: ResourceId,
    ) -> Result<()> {
        self.link(parent, child, None).await
    }

    /// Removes the `parent -> child` inheritance edge; absent edges are not
    /// an error.
    #[instrument(level = "debug", skip_all, fields(parent = %parent, child = %child))]
    pub async fn remove_permission_inheritance(
        &self,
        parent: ResourceId,
        child: ResourceId,
    ) -> Result<()> {
        self.unlink(parent, child, None).await
    }

    /// Drops every cached parent set and permission result.
    ///
    /// No transaction is opened and the store is not touched. Parent sets are
    /// cleared before permissions; checks running concurrently may repopulate
    /// either map from the store in between.
    #[instrument(level = "debug", skip_all)]
    pub async fn clear_cache(&self) {
        self.cache.clear_parents().await;
        self.cache.clear_permissions().await;
    }

    pub(crate) async fn grant(
        &self,
        authorized: ResourceId,
        target: ResourceId,
        action: &str,
        ambient: Option<&mut Tx<S>>,
    ) -> Result<()> {
        let key = PermissionKey::new(authorized, target, Action::new(action)?);
        let mut required = Required::begin(&self.store, ambient).await?;
        let result = insert_permission(required.tx(), &key).await;
        let written = result.is_ok();
        // Cache writes happen while the authorized row is still locked.
        if written {
            self.cache.set_permission(key.clone(), true).await;
        }
        if let Err(error) = required.complete(result).await {
            if written {
                self.cache.invalidate_permission(&key).await;
            }
            return Err(error);
        }

        debug!(permission = %key, "permission granted");
        Ok(())
    }

    pub(crate) async fn revoke(
        &self,
        authorized: ResourceId,
        target: ResourceId,
        action: &str,
        ambient: Option<&mut Tx<S>>,
    ) -> Result<()> {
        let key = PermissionKey::new(authorized, target, Action::new(action)?);
        let mut required = Required::begin(&self.store, ambient).await?;
        let result = delete_permission(required.tx(), &key).await;
        let written = result.is_ok();
        if written {
            self.cache.set_permission(key.clone(), false).await;
        }
        let removed = match required.complete(result).await {
            Ok(removed) => removed,
            Err(error) => {
                if written {
                    self.cache.invalidate_permission(&key).await;
                }
                return Err(error);
            }
        };

        debug!(permission = %key, removed, "permission revoked");
        Ok(())
    }

    pub(crate) async fn link(
        &self,
        parent: ResourceId,
        child: ResourceId,
        ambient: Option<&mut Tx<S>>,
    ) -> Result<()> {
        let mut required = Required::begin(&self.store, ambient).await?;
        let result = insert_inheritance(required.tx(), parent, child).await;
        if result.is_ok() {
            self.cache.invalidate_parents(child).await;
        }
        required.complete(result).await
    }

    pub(crate) async fn unlink(
        &self,
        parent: ResourceId,
        child: ResourceId,
        ambient: Option<&mut Tx<S>>,
    ) -> Result<()> {
        let mut required = Required::begin(&self.store, ambient).await?;
        let result = delete_inheritance(required.tx(), parent, child).await;
        if result.is_ok() {
            self.cache.invalidate_parents(child).await;
        }
        let removed = required.complete(result).await?;

        debug!(removed, "inheritance removed");
        Ok(())
    }
}

async fn insert_permission<T>(tx: &mut T, key: &PermissionKey) -> Result<()>
where
    T: ResourceLocks + PermissionStore,
{
    if !tx.lock_resource(key.authorized).await? {
        return Err(Error::ResourceNotFound(key.authorized));
    }
    tx.insert_permission(key).await?;
    Ok(())
}

async fn delete_permission<T>(tx: &mut T, key: &PermissionKey) -> Result<bool>
where
    T: ResourceLocks + PermissionStore,
{
    tx.lock_resource(key.authorized).await?;
    Ok(tx.delete_permission(key).await?)
}

async fn insert_inheritance<T>(tx: &mut T, parent: ResourceId, child: ResourceId) -> Result<()>
where
    T: ResourceLocks + InheritanceStore,
{
    // Endpoints are locked in ascending id order.
    let (first, second) = if parent <= child {
        (parent, child)
    } else {
        (child, parent)
    };
    if !tx.lock_resource(first).await? {
        return Err(Error::ResourceNotFound(first));
    }
    if second != first && !tx.lock_resource(second).await? {
        return Err(Error::ResourceNotFound(second));
    }
    tx.insert_inheritance(parent, child).await?;
    Ok(())
}

async fn delete_inheritance<T>(tx: &mut T, parent: ResourceId, child: ResourceId) -> Result<bool>
where
    T: ResourceLocks + InheritanceStore,
{
    tx.lock_resource(child).await?;
    Ok(tx.delete_inheritance(parent, child).await?)
}

impl<S, C> Joined<'_, S, C>
where
    S: Store,
    C: Cache,
{
    /// See [`Engine::add_permission`].
    pub async fn add_permission(
        &mut self,
        authorized: ResourceId,
        target: ResourceId,
        action: &str,
    ) -> Result<()> {
        self.engine
            .grant(authorized, target, action, Some(&mut *self.tx))
            .await
    }

    /// See [`Engine::remove_permission`].
    pub async fn remove_permission(
        &mut self,
        authorized: ResourceId,
        target: ResourceId,
        action: &str,
    ) -> Result<()> {
        self.engine
            .revoke(authorized, target, action, Some(&mut *self.tx))
            .await
    }

    /// See [`Engine::add_permission_inheritance`].
    pub async fn add_permission_inheritance(
        &mut self,
        parent: ResourceId,
        child: ResourceId,
    ) -> Result<()> {
        self.engine.link(parent, child, Some(&mut *self.tx)).await
    }

    /// See [`Engine::remove_permission_inheritance`].
    pub async fn remove_permission_inheritance(
        &mut self,
        parent: ResourceId,
        child: ResourceId,
    ) -> Result<()> {
        self.engine.unlink(parent, child, Some(&mut *self.tx)).await
    }
}
