use crate::types::ResourceId;
use thiserror::Error;

/// Store-layer error type.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Store error wrapper.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
    /// The action list passed to a check was empty.
    #[error("action list must contain at least one value")]
    MissingActions,
    /// Invalid action input.
    #[error("invalid action: {0}")]
    InvalidAction(String),
    /// A resource that must exist was not found under lock.
    #[error("resource does not exist with id {0}")]
    ResourceNotFound(ResourceId),
    /// The persisted system resource id could not be used.
    #[error("invalid system resource id: {0}")]
    InvalidSystemResource(String),
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}
