use crate::bootstrap::resolve_system_resource;
use crate::cache::{Cache, NoCache};
use crate::error::Result;
use crate::store::{Store, TransactionSource};
use crate::types::ResourceId;

/// Property key under which the system resource id is persisted.
pub const DEFAULT_SYSTEM_RESOURCE_PROPERTY: &str = "resource_authz.system_resource_id";

/// Permission engine over a transactional store and a shared cache.
///
/// Read operations consult the cache first and fall back to locked store
/// reads on a miss; mutations write through the store and then update or
/// invalidate the affected cache entries.
#[derive(Debug)]
pub struct Engine<S, C = NoCache> {
    pub(crate) store: S,
    pub(crate) cache: C,
    pub(crate) system_resource: ResourceId,
}

#[derive(Debug, Clone)]
enum SystemResource {
    Property(String),
    Fixed(ResourceId),
}

/// Builder for [`Engine`].
pub struct EngineBuilder<S, C = NoCache> {
    store: S,
    cache: C,
    system_resource: SystemResource,
}

impl<S> EngineBuilder<S, NoCache> {
    /// Creates a new builder with default configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: NoCache,
            system_resource: SystemResource::Property(DEFAULT_SYSTEM_RESOURCE_PROPERTY.to_string()),
        }
    }
}

impl<S, C> EngineBuilder<S, C> {
    /// Sets the property key used to persist the system resource id.
    pub fn system_resource_property(mut self, key: impl Into<String>) -> Self {
        self.system_resource = SystemResource::Property(key.into());
        self
    }

    /// Uses a known system resource id instead of the property store.
    pub fn system_resource_id(mut self, id: ResourceId) -> Self {
        self.system_resource = SystemResource::Fixed(id);
        self
    }

    /// Sets the cache implementation.
    pub fn cache<C2: Cache>(self, cache: C2) -> EngineBuilder<S, C2> {
        EngineBuilder {
            store: self.store,
            cache,
            system_resource: self.system_resource,
        }
    }
}

impl<S, C> EngineBuilder<S, C>
where
    S: Store,
    C: Cache,
{
    /// Resolves the system resource and builds the engine.
    ///
    /// When configured with a property key, the id is read from the property
    /// store and created on first use.
    pub async fn build(self) -> Result<Engine<S, C>> {
        let system_resource = match self.system_resource {
            SystemResource::Fixed(id) => id,
            SystemResource::Property(key) => resolve_system_resource(&self.store, &key).await?,
        };

        Ok(Engine {
            store: self.store,
            cache: self.cache,
            system_resource,
        })
    }
}

impl<S, C> Engine<S, C> {
    /// Returns the super-principal that is granted every permission.
    pub fn system_resource_id(&self) -> ResourceId {
        self.system_resource
    }

    /// Returns the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }
}

impl<S, C> Engine<S, C>
where
    S: Store,
    C: Cache,
{
    /// Runs subsequent operations inside the caller's transaction.
    ///
    /// The joined handle never commits or rolls back `tx`; cache updates made
    /// through it assume the caller commits.
    pub fn join<'a>(&'a self, tx: &'a mut <S as TransactionSource>::Tx) -> Joined<'a, S, C> {
        Joined { engine: self, tx }
    }
}

/// Engine operations bound to an ambient transaction.
///
/// Obtained from [`Engine::join`].
pub struct Joined<'a, S, C>
where
    S: Store,
{
    pub(crate) engine: &'a Engine<S, C>,
    pub(crate) tx: &'a mut <S as TransactionSource>::Tx,
}

impl<S, C> Joined<'_, S, C>
where
    S: Store,
{
    /// Returns the engine this handle was joined from.
    pub fn engine(&self) -> &Engine<S, C> {
        self.engine
    }
}
