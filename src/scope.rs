use crate::cache::Cache;
use crate::engine::{Engine, Joined};
use crate::error::Result;
use crate::store::{InheritanceStore, ResourceLocks, Store, TransactionSource};
use crate::tx::Required;
use crate::types::{AuthorizationScope, ResourceId};
use tracing::{instrument, trace};

type Tx<S> = <S as TransactionSource>::Tx;

impl<S, C> Engine<S, C>
where
    S: Store,
    C: Cache,
{
    /// Resolves `resource` together with all of its transitive ancestors.
    ///
    /// Each member appears once, so cyclic inheritance graphs terminate.
    #[instrument(level = "debug", skip_all, fields(resource = %resource))]
    pub async fn authorization_scope(&self, resource: ResourceId) -> Result<AuthorizationScope> {
        self.resolve_scope(resource, None).await
    }

    pub(crate) async fn resolve_scope(
        &self,
        resource: ResourceId,
        mut ambient: Option<&mut Tx<S>>,
    ) -> Result<AuthorizationScope> {
        let mut scope = AuthorizationScope::new(resource);
        let parents = self.parents_of(resource, ambient.as_deref_mut()).await?;
        let mut stack = vec![parents.into_iter()];

        loop {
            let Some(next) = stack.last_mut().map(Iterator::next) else {
                break;
            };
            let Some(parent) = next else {
                stack.pop();
                continue;
            };
            if !scope.insert(parent) {
                continue;
            }
            let parents = self.parents_of(parent, ambient.as_deref_mut()).await?;
            stack.push(parents.into_iter());
        }

        Ok(scope)
    }

    async fn parents_of(
        &self,
        resource: ResourceId,
        ambient: Option<&mut Tx<S>>,
    ) -> Result<Vec<ResourceId>> {
        if let Some(parents) = self.cache.get_parents(resource).await {
            return Ok(parents);
        }
        trace!(resource = %resource, "scope cache miss");

        let mut required = Required::begin(&self.store, ambient).await?;
        let result = self.load_parents(required.tx(), resource).await;
        required.complete(result).await
    }

    async fn load_parents(&self, tx: &mut Tx<S>, resource: ResourceId) -> Result<Vec<ResourceId>> {
        tx.lock_resource(resource).await?;
        let parents = tx.parent_resources(resource).await?;
        self.cache.set_parents(resource, parents.clone()).await;
        Ok(parents)
    }
}

impl<S, C> Joined<'_, S, C>
where
    S: Store,
    C: Cache,
{
    /// See [`Engine::authorization_scope`].
    pub async fn authorization_scope(&mut self, resource: ResourceId) -> Result<AuthorizationScope> {
        self.engine.resolve_scope(resource, Some(&mut *self.tx)).await
    }
}

#[cfg(all(test, feature = "memory-store", feature = "memory-cache"))]
mod tests {
    use crate::{EngineBuilder, MemoryCache, MemoryStore, ResourceId};
    use futures::executor::block_on;

    fn engine(store: &MemoryStore) -> crate::Engine<MemoryStore, MemoryCache> {
        block_on(
            EngineBuilder::new(store.clone())
                .cache(MemoryCache::new())
                .build(),
        )
        .unwrap()
    }

    fn sorted(mut ids: Vec<ResourceId>) -> Vec<ResourceId> {
        ids.sort_unstable();
        ids
    }

    #[test]
    fn scope_without_edges_is_the_resource_itself() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let a = store.add_resource();

        let scope = block_on(engine.authorization_scope(a)).unwrap();

        assert_eq!(scope.into_vec(), vec![a]);
    }

    #[test]
    fn scope_lists_resource_first_then_ancestors() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let [a1, a2, a3, a4] = store.add_resources();
        store.add_inheritance(a1, a2);
        store.add_inheritance(a2, a3);
        store.add_inheritance(a4, a3);

        let scope = block_on(engine.authorization_scope(a3)).unwrap();

        assert_eq!(scope.resource(), a3);
        assert_eq!(sorted(scope.into_vec()), vec![a1, a2, a3, a4]);
    }

    #[test]
    fn cyclic_edges_terminate_with_each_member_once() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let [p, c, leaf] = store.add_resources();
        store.add_inheritance(p, c);
        store.add_inheritance(c, p);
        store.add_inheritance(p, leaf);
        store.add_inheritance(c, leaf);

        assert_eq!(
            sorted(block_on(engine.authorization_scope(p)).unwrap().into_vec()),
            vec![p, c]
        );
        assert_eq!(
            sorted(block_on(engine.authorization_scope(c)).unwrap().into_vec()),
            vec![p, c]
        );
        assert_eq!(
            sorted(block_on(engine.authorization_scope(leaf)).unwrap().into_vec()),
            vec![p, c, leaf]
        );
    }

    #[test]
    fn self_edge_does_not_duplicate_member() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let a = store.add_resource();
        store.add_inheritance(a, a);

        assert_eq!(block_on(engine.authorization_scope(a)).unwrap().into_vec(), vec![a]);
    }

    #[test]
    fn second_resolution_is_served_from_cache() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let [a1, a2, a3] = store.add_resources();
        store.add_inheritance(a1, a2);
        store.add_inheritance(a2, a3);

        block_on(engine.authorization_scope(a3)).unwrap();
        let reads = store.read_count();
        assert_eq!(engine.cache().scope_entries(), 3);

        block_on(engine.authorization_scope(a3)).unwrap();
        block_on(engine.authorization_scope(a2)).unwrap();
        assert_eq!(store.read_count(), reads);
    }

    #[test]
    fn each_cache_miss_uses_its_own_transaction() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let [a1, a2] = store.add_resources();
        store.add_inheritance(a1, a2);
        let before = store.transaction_count();

        block_on(engine.authorization_scope(a2)).unwrap();

        assert_eq!(store.transaction_count() - before, 2);
    }

    #[test]
    fn joined_resolution_reuses_the_ambient_transaction() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let [a1, a2] = store.add_resources();
        store.add_inheritance(a1, a2);

        let mut tx = store.open_transaction();
        let before = store.transaction_count();
        let scope = block_on(engine.join(&mut tx).authorization_scope(a2)).unwrap();
        block_on(crate::Transaction::commit(tx)).unwrap();

        assert_eq!(store.transaction_count(), before);
        assert_eq!(sorted(scope.into_vec()), vec![a1, a2]);
    }
}
