use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::ResourceId;
use tracing::{info, instrument, warn};

/// Reads the system resource id from the property store, creating and
/// persisting a new resource when none is stored yet.
#[instrument(level = "debug", skip(store))]
pub(crate) async fn resolve_system_resource<S>(store: &S, key: &str) -> Result<ResourceId>
where
    S: Store,
{
    if let Some(stored) = store.get_property(key).await?
        && !stored.is_empty()
    {
        return parse_resource_id(&stored);
    }

    let created = store.create_resource().await?;
    match store.add_property(key, &created.to_string()).await? {
        None => {
            info!(system_resource = %created, "created system resource");
            Ok(created)
        }
        Some(existing) => {
            warn!(
                orphan = %created,
                existing = %existing,
                "system resource was created concurrently; adopting the stored id"
            );
            parse_resource_id(&existing)
        }
    }
}

fn parse_resource_id(value: &str) -> Result<ResourceId> {
    value
        .trim()
        .parse::<i64>()
        .map(ResourceId::new)
        .map_err(|err| Error::InvalidSystemResource(format!("{value:?}: {err}")))
}
