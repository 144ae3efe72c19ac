use std::fmt;

use thiserror::Error;

use crate::Pooled;

/// Errors reported by the pools in this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The handle or address was not issued by this pool. This is what a [`ForeignHandle`]
    /// becomes when converted into a [`PoolError`].
    #[error("the object does not belong to this pool")]
    ForeignObject,

    /// An index-linked pool was configured with more chunks per block than its chunk index
    /// can address. The chunk count itself must be representable as it is the sentinel value.
    #[error("{requested} chunks per block exceeds the maximum of {max} for this item size")]
    ChunksPerBlockOutOfRange {
        /// The configured number of chunks per block.
        requested: usize,

        /// The largest supported number of chunks per block.
        max: usize,
    },

    /// The memory layout of a single block would exceed the limits of the platform.
    #[error("a block of {chunks_per_block} chunks of {chunk_size} bytes is too large to allocate")]
    BlockTooLarge {
        /// The configured number of chunks per block.
        chunks_per_block: usize,

        /// The size of each chunk in bytes.
        chunk_size: usize,
    },
}

/// A handle that was presented to a pool that did not issue it.
///
/// Returned by `try_delete_object()`. The object behind the handle is left untouched, so the
/// handle can be recovered with [`into_handle()`][Self::into_handle] and the object deleted
/// from the pool it belongs to.
///
/// # Example
///
/// ```
/// use chunk_pool::{DropPolicy, LinkedPool};
///
/// let mut owner = LinkedPool::<u64>::builder()
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
/// let mut stranger = LinkedPool::<u64>::default();
///
/// let handle = owner.new_object(5);
///
/// let rejected = stranger.try_delete_object(handle).unwrap_err();
/// owner.delete_object(rejected.into_handle());
/// ```
#[derive(Error)]
#[error("the object does not belong to this pool")]
pub struct ForeignHandle<T> {
    handle: Pooled<T>,
}

impl<T> ForeignHandle<T> {
    #[must_use]
    pub(crate) fn new(handle: Pooled<T>) -> Self {
        Self { handle }
    }

    /// Returns the rejected handle, which still refers to a live object in its own pool.
    #[must_use]
    pub fn into_handle(self) -> Pooled<T> {
        self.handle
    }
}

impl<T> fmt::Debug for ForeignHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignHandle")
            .field("handle", &self.handle)
            .finish()
    }
}

impl<T> From<ForeignHandle<T>> for PoolError {
    /// Discards the handle. The object it refers to stays alive in its own pool.
    fn from(_: ForeignHandle<T>) -> Self {
        Self::ForeignObject
    }
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`PoolError`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use std::fmt::Debug;
    use std::ptr::NonNull;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::PoolId;

    assert_impl_all!(PoolError: Send, Sync, Debug);
    assert_impl_all!(ForeignHandle<u64>: Send, Sync, Debug, std::error::Error);

    /// Not `Debug` itself, to show that the error does not need it from the item.
    struct Opaque;

    #[test]
    fn out_of_range_message_names_limits() {
        let error = PoolError::ChunksPerBlockOutOfRange {
            requested: 300,
            max: 255,
        };

        let message = error.to_string();
        assert!(message.contains("300"));
        assert!(message.contains("255"));
    }

    #[test]
    fn foreign_object_is_error() {
        let result: Result<()> = Err(PoolError::ForeignObject);
        assert!(matches!(result, Err(PoolError::ForeignObject)));
    }

    #[test]
    fn foreign_handle_gives_back_the_handle() {
        let mut value = Opaque;
        let ptr = NonNull::from(&mut value);
        let error = ForeignHandle::new(Pooled::new(PoolId::generate(), ptr));

        assert_eq!(error.to_string(), "the object does not belong to this pool");
        assert!(format!("{error:?}").contains("ForeignHandle"));

        assert_eq!(error.into_handle().ptr(), ptr);
    }

    #[test]
    fn foreign_handle_converts_to_pool_error() {
        fn delete_elsewhere(handle: Pooled<u64>) -> std::result::Result<(), ForeignHandle<u64>> {
            Err(ForeignHandle::new(handle))
        }

        fn forward(handle: Pooled<u64>) -> Result<()> {
            delete_elsewhere(handle)?;
            Ok(())
        }

        let mut value = 7_u64;
        let handle = Pooled::new(PoolId::generate(), NonNull::from(&mut value));

        assert!(matches!(forward(handle), Err(PoolError::ForeignObject)));
    }
}
