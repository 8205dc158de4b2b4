use crate::error::Result;
use crate::store::{Transaction, TransactionSource};
use tracing::warn;

/// Transaction handle with "required" propagation.
///
/// Joins the caller's transaction when one is supplied, otherwise owns a
/// fresh one that is committed or rolled back by [`Required::complete`].
pub(crate) enum Required<'a, T> {
    Joined(&'a mut T),
    Owned(T),
}

impl<'a, T> Required<'a, T>
where
    T: Transaction,
{
    pub(crate) async fn begin<S>(store: &S, ambient: Option<&'a mut T>) -> Result<Self>
    where
        S: TransactionSource<Tx = T>,
    {
        Ok(match ambient {
            Some(tx) => Self::Joined(tx),
            None => Self::Owned(store.begin().await?),
        })
    }

    pub(crate) fn tx(&mut self) -> &mut T {
        match self {
            Self::Joined(tx) => &mut **tx,
            Self::Owned(tx) => tx,
        }
    }

    /// Finishes an owned transaction according to `result`.
    ///
    /// A joined transaction is left to its owner.
    pub(crate) async fn complete<R>(self, result: Result<R>) -> Result<R> {
        let tx = match self {
            Self::Joined(_) => return result,
            Self::Owned(tx) => tx,
        };
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(error = %rollback_error, "transaction rollback failed");
                }
                Err(error)
            }
        }
    }
}
