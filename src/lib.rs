//! Resource-based permission engine.
//!
//! A principal is itself a resource. It may perform an action on a target
//! resource when a permission row grants it, either directly or through a
//! transitive inheritance graph that is allowed to contain cycles. One
//! designated system resource is granted everything.
//!
//! Results are cached per resource and per permission triple and kept in
//! step with a transactional store through pluggable async traits. Use
//! [`Engine`] for checks and mutations and
//! [`Engine::authorization_predicate`] to filter bulk queries with the same
//! logic.
//!
//! # Examples
//!
//! Basic flow using the in-memory store and cache:
//! ```no_run
//! # #[cfg(all(feature = "memory-store", feature = "memory-cache"))]
//! # futures::executor::block_on(async {
//! use resource_authz::{EngineBuilder, MemoryCache, MemoryStore};
//! let store = MemoryStore::new();
//! let engine = EngineBuilder::new(store.clone())
//!     .cache(MemoryCache::new())
//!     .build()
//!     .await?;
//! let [user, group, book] = store.add_resources();
//! engine.add_permission(group, book, "read").await?;
//! engine.add_permission_inheritance(group, user).await?;
//! assert!(engine.has_permission(user, book, &["read"]).await?);
//! # Ok::<(), resource_authz::Error>(())
//! # });
//! ```
#![forbid(unsafe_code)]

mod bootstrap;
mod cache;
mod check;
mod engine;
mod error;
mod manage;
mod predicate;
pub mod schema;
mod scope;
mod store;
mod tx;
mod types;
#[cfg(feature = "memory-cache")]
mod memory_cache;

#[cfg(feature = "memory-store")]
mod memory_store;

pub use crate::cache::{Cache, NoCache, PermissionCache, ScopeCache};
pub use crate::engine::{DEFAULT_SYSTEM_RESOURCE_PROPERTY, Engine, EngineBuilder, Joined};
pub use crate::error::{Error, Result, StoreError};
pub use crate::predicate::{AuthorizationPredicate, SqlFragment, SqlValue};
pub use crate::store::{
    InheritanceStore, PermissionStore, PropertyStore, ResourceLocks, ResourceRegistry, Store,
    Transaction, TransactionSource,
};
pub use crate::types::{Action, AuthorizationScope, PermissionKey, ResourceId};

#[cfg(feature = "memory-store")]
pub use crate::memory_store::{MemoryStore, MemoryTransaction};

#[cfg(feature = "memory-cache")]
pub use crate::memory_cache::MemoryCache;
