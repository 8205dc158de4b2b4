use crate::cache::Cache;
use crate::engine::{Engine, Joined};
use crate::error::Result;
use crate::store::{PermissionStore, ResourceLocks, Store, TransactionSource};
use crate::tx::Required;
use crate::types::{PermissionKey, ResourceId, validate_actions};
use tracing::{debug, instrument, trace};

type Tx<S> = <S as TransactionSource>::Tx;

impl<S, C> Engine<S, C>
where
    S: Store,
    C: Cache,
{
    /// Checks whether `authorized` may perform any of `actions` on `target`,
    /// directly or through inherited grants.
    ///
    /// Actions are tried in the given order and the authorized resource is
    /// tried before its ancestors; the first grant found ends the search, so
    /// put the most likely action first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingActions`](crate::Error::MissingActions) or
    /// [`Error::InvalidAction`](crate::Error::InvalidAction) before any store
    /// access when `actions` is empty or contains an empty entry. Actions are
    /// validated before the system-resource bypass, so the system resource
    /// gets the same errors for malformed input.
    #[instrument(
        level = "debug",
        skip_all,
        fields(authorized = %authorized, target = %target, actions = actions.len())
    )]
    pub async fn has_permission<A>(
        &self,
        authorized: ResourceId,
        target: ResourceId,
        actions: &[A],
    ) -> Result<bool>
    where
        A: AsRef<str>,
    {
        self.check_permission(authorized, target, actions, None).await
    }

    pub(crate) async fn check_permission<A>(
        &self,
        authorized: ResourceId,
        target: ResourceId,
        actions: &[A],
        mut ambient: Option<&mut Tx<S>>,
    ) -> Result<bool>
    where
        A: AsRef<str>,
    {
        let actions = validate_actions(actions)?;
        if authorized == self.system_resource {
            debug!("system resource bypass");
            return Ok(true);
        }

        let scope = self.resolve_scope(authorized, ambient.as_deref_mut()).await?;
        for action in &actions {
            for member in scope.iter() {
                if member == self.system_resource {
                    debug!(%member, "grant inherited from system resource");
                    return Ok(true);
                }

                let key = PermissionKey::new(member, target, action.clone());
                let granted = match self.cache.get_permission(&key).await {
                    Some(granted) => granted,
                    None => self.fetch_permission(key, ambient.as_deref_mut()).await?,
                };
                if granted {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn fetch_permission(
        &self,
        key: PermissionKey,
        ambient: Option<&mut Tx<S>>,
    ) -> Result<bool> {
        trace!(permission = %key, "permission cache miss");
        let mut required = Required::begin(&self.store, ambient).await?;
        let result = self.load_permission(required.tx(), key).await;
        required.complete(result).await
    }

    async fn load_permission(&self, tx: &mut Tx<S>, key: PermissionKey) -> Result<bool> {
        // Unknown resources hold no rows; leave them uncached.
        if !tx.lock_resource(key.authorized).await? {
            return Ok(false);
        }
        let granted = tx.permission_exists(&key).await?;
        self.cache.set_permission(key, granted).await;
        Ok(granted)
    }
}

impl<S, C> Joined<'_, S, C>
where
    S: Store,
    C: Cache,
{
    /// See [`Engine::has_permission`].
    pub async fn has_permission<A>(
        &mut self,
        authorized: ResourceId,
        target: ResourceId,
        actions: &[A],
    ) -> Result<bool>
    where
        A: AsRef<str>,
    {
        self.engine
            .check_permission(authorized, target, actions, Some(&mut *self.tx))
            .await
    }
}
