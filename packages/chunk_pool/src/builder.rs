use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZero;

use new_zealand::nz;

use crate::error::Result;
use crate::{DropPolicy, IndexedPool, LinkedPool};

/// Number of chunks per block used unless the builder is told otherwise.
#[cfg(not(miri))]
pub(crate) const DEFAULT_CHUNKS_PER_BLOCK: NonZero<usize> = nz!(128);

// Miri is slow, so we keep the blocks small to keep the tests tolerable.
#[cfg(miri)]
pub(crate) const DEFAULT_CHUNKS_PER_BLOCK: NonZero<usize> = nz!(4);

/// Builder for creating an instance of [`LinkedPool`] or [`IndexedPool`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// Obtain one from [`LinkedPool::builder()`] or [`IndexedPool::builder()`].
///
/// # Examples
///
/// ```
/// use chunk_pool::{DropPolicy, IndexedPool};
/// use new_zealand::nz;
///
/// let pool = IndexedPool::<u16>::builder()
///     .chunks_per_block(nz!(500))
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
///
/// assert_eq!(pool.chunks_per_block(), 500);
/// ```
#[must_use]
pub struct PoolBuilder<P> {
    chunks_per_block: NonZero<usize>,
    drop_policy: DropPolicy,

    _pool: PhantomData<fn() -> P>,
}

impl<P> fmt::Debug for PoolBuilder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("pool_type", &format_args!("{}", type_name::<P>()))
            .field("chunks_per_block", &self.chunks_per_block)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

impl<P> PoolBuilder<P> {
    pub(crate) fn new() -> Self {
        Self {
            chunks_per_block: DEFAULT_CHUNKS_PER_BLOCK,
            drop_policy: DropPolicy::default(),
            _pool: PhantomData,
        }
    }

    /// Sets the number of chunks in each block, which is how many objects the pool makes room
    /// for whenever it runs out of vacant chunks.
    pub fn chunks_per_block(mut self, chunks_per_block: NonZero<usize>) -> Self {
        self.chunks_per_block = chunks_per_block;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how
    /// to treat remaining objects in the pool when the pool is dropped.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }
}

impl<T> PoolBuilder<LinkedPool<T>> {
    /// Builds the pool with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if a block would be too large for the address space.
    #[must_use]
    pub fn build(self) -> LinkedPool<T> {
        self.try_build()
            .unwrap_or_else(|error| panic!("invalid pool configuration: {error}"))
    }

    /// Builds the pool with the specified configuration, reporting an invalid configuration as
    /// an error instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::BlockTooLarge`][crate::PoolError::BlockTooLarge] if a block would
    /// be too large for the address space.
    pub fn try_build(self) -> Result<LinkedPool<T>> {
        LinkedPool::new_inner(self.chunks_per_block, self.drop_policy)
    }
}

impl<T> PoolBuilder<IndexedPool<T>> {
    /// Builds the pool with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if the number of chunks per block exceeds
    /// [`IndexedPool::max_chunks_per_block()`] or a block would be too large for the address
    /// space.
    #[must_use]
    pub fn build(self) -> IndexedPool<T> {
        self.try_build()
            .unwrap_or_else(|error| panic!("invalid pool configuration: {error}"))
    }

    /// Builds the pool with the specified configuration, reporting an invalid configuration as
    /// an error instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ChunksPerBlockOutOfRange`][crate::PoolError::ChunksPerBlockOutOfRange]
    /// if the number of chunks per block exceeds [`IndexedPool::max_chunks_per_block()`] and
    /// [`PoolError::BlockTooLarge`][crate::PoolError::BlockTooLarge] if a block would be too
    /// large for the address space.
    pub fn try_build(self) -> Result<IndexedPool<T>> {
        IndexedPool::new_inner(self.chunks_per_block, self.drop_policy)
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(PoolBuilder<LinkedPool<u64>>: Send, Sync, fmt::Debug);

    #[test]
    fn defaults() {
        let pool = LinkedPool::<u64>::builder().build();

        assert_eq!(pool.chunks_per_block(), DEFAULT_CHUNKS_PER_BLOCK.get());
        assert_eq!(pool.block_count(), 0);
    }

    #[test]
    fn debug_output_names_pool_type() {
        let builder = IndexedPool::<u8>::builder().chunks_per_block(nz!(9));

        let output = format!("{builder:?}");

        assert!(output.contains("IndexedPool"));
        assert!(output.contains('9'));
    }

    #[test]
    #[should_panic]
    fn build_panics_on_invalid_configuration() {
        drop(
            IndexedPool::<u8>::builder()
                .chunks_per_block(nz!(300))
                .build(),
        );
    }
}
