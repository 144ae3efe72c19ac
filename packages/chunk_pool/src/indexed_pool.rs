use std::any::type_name;
use std::convert::Infallible;
use std::num::NonZero;
use std::ptr::NonNull;
use std::thread;

use scopeguard::ScopeGuard;
use tracing::debug;

use crate::builder::DEFAULT_CHUNKS_PER_BLOCK;
use crate::chunk_range::LINK_SIZE;
use crate::error::Result;
use crate::{
    BlockMemory, DropPolicy, ForeignHandle, IndexedBlock, PoolBuilder, PoolError, PoolId, Pooled,
};

/// An object pool for items smaller than a pointer, tracking vacant chunks with block-local
/// free lists of chunk indexes.
///
/// A vacant chunk cannot hold an address, so it instead stores the index of the next vacant
/// chunk in the same block, using the widest unsigned integer that fits into the chunk (one,
/// two or four bytes). This also caps the number of chunks per block: a block can have at most
/// as many chunks as its index type can count, minus one for the end-of-list sentinel.
///
/// The blocks that have at least one vacant chunk form an availability chain. Allocation takes
/// a chunk from the head of that chain in O(1). Deallocation first has to find the block that
/// owns the chunk, searching the blocks from the most recently allocated one, so it is O(number
/// of blocks).
///
/// Objects never move while they are in the pool.
///
/// Items at least as large as a pointer should use [`LinkedPool`][1] instead. Using such a type
/// (or a zero-sized type) with this pool fails to compile.
///
/// # Example
///
/// ```
/// use chunk_pool::IndexedPool;
/// use new_zealand::nz;
///
/// let mut pool = IndexedPool::<u16>::new(nz!(100));
///
/// let a = pool.new_object(1);
/// let b = pool.new_object(2);
///
/// *pool.get_mut(&a) += 10;
/// assert_eq!(*pool.get(&a), 11);
///
/// pool.delete_object(a);
/// pool.delete_object(b);
/// ```
///
/// [1]: crate::LinkedPool
#[derive(Debug)]
pub struct IndexedPool<T> {
    /// Blocks in the order they were allocated. Only ever appended to. Indexes into this list
    /// identify the blocks in the availability chain.
    blocks: Vec<IndexedBlock<T>>,

    /// Head of the availability chain. `None` when every chunk of every block is occupied.
    available: Option<usize>,

    chunks_per_block: NonZero<usize>,

    /// Number of live objects.
    length: usize,

    drop_policy: DropPolicy,

    pool_id: PoolId,
}

impl<T> IndexedPool<T> {
    /// Creates an empty pool that grows `chunks_per_block` chunks at a time.
    ///
    /// No memory is allocated until the first object is created.
    ///
    /// # Panics
    ///
    /// Panics if `chunks_per_block` exceeds [`max_chunks_per_block()`][Self::max_chunks_per_block].
    #[must_use]
    pub fn new(chunks_per_block: NonZero<usize>) -> Self {
        Self::builder().chunks_per_block(chunks_per_block).build()
    }

    /// Starts building a new [`IndexedPool`].
    ///
    /// ```
    /// use chunk_pool::{IndexedPool, PoolError};
    /// use new_zealand::nz;
    ///
    /// // A one-byte item uses one-byte indexes, so a block can have at most 255 chunks.
    /// let result = IndexedPool::<u8>::builder()
    ///     .chunks_per_block(nz!(256))
    ///     .try_build();
    ///
    /// assert!(matches!(
    ///     result,
    ///     Err(PoolError::ChunksPerBlockOutOfRange { requested: 256, max: 255 })
    /// ));
    /// ```
    pub fn builder() -> PoolBuilder<Self> {
        PoolBuilder::new()
    }

    /// The largest number of chunks a block of this pool may have.
    ///
    /// ```
    /// use chunk_pool::IndexedPool;
    ///
    /// assert_eq!(IndexedPool::<u8>::max_chunks_per_block(), 255);
    /// assert_eq!(IndexedPool::<u16>::max_chunks_per_block(), 65_535);
    /// ```
    #[must_use]
    pub fn max_chunks_per_block() -> usize {
        IndexedBlock::<T>::max_chunk_count()
    }

    pub(crate) fn new_inner(
        chunks_per_block: NonZero<usize>,
        drop_policy: DropPolicy,
    ) -> Result<Self> {
        const {
            assert!(
                size_of::<T>() > 0 && size_of::<T>() < LINK_SIZE,
                "IndexedPool requires non-zero items smaller than a pointer; use LinkedPool instead"
            );
        }

        let max = Self::max_chunks_per_block();

        if chunks_per_block.get() > max {
            return Err(PoolError::ChunksPerBlockOutOfRange {
                requested: chunks_per_block.get(),
                max,
            });
        }

        BlockMemory::<T>::layout(chunks_per_block)?;

        Ok(Self {
            blocks: Vec::new(),
            available: None,
            chunks_per_block,
            length: 0,
            drop_policy,
            pool_id: PoolId::generate(),
        })
    }

    /// The number of live objects in the pool.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the pool contains no live objects. An empty pool may still hold blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The number of objects the pool can hold without allocating another block.
    #[must_use]
    pub fn capacity(&self) -> usize {
        // Cannot overflow: every block has been allocated, so the chunks fit into memory.
        self.blocks.len().wrapping_mul(self.chunks_per_block.get())
    }

    /// The number of blocks allocated so far.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The number of chunks in each block.
    #[must_use]
    pub fn chunks_per_block(&self) -> usize {
        self.chunks_per_block.get()
    }

    /// Moves `value` into the pool and returns a handle to it.
    ///
    /// Allocates a new block if every chunk is occupied.
    pub fn new_object(&mut self, value: T) -> Pooled<T> {
        self.new_object_with(|| value)
    }

    /// Constructs an object with `f` and places it into the pool.
    ///
    /// A chunk is reserved before `f` runs. If `f` panics, the chunk is returned to its block
    /// and the panic continues unchanged.
    pub fn new_object_with(&mut self, f: impl FnOnce() -> T) -> Pooled<T> {
        let Ok(handle) = self.try_new_object_with(|| Ok::<T, Infallible>(f()));
        handle
    }

    /// Constructs an object with the fallible `f` and places it into the pool.
    ///
    /// A chunk is reserved before `f` runs. If `f` returns an error or panics, the chunk is
    /// returned to its block and the error is returned (or the panic continues) unchanged.
    pub fn try_new_object_with<E>(
        &mut self,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<Pooled<T>, E> {
        let (block_index, chunk) = self.allocate_chunk();

        let pool = scopeguard::guard(self, |pool| {
            // SAFETY: The chunk was allocated from this block above and never received a value.
            unsafe {
                pool.deallocate_chunk(block_index, chunk);
            }
        });

        let value = f()?;

        let pool = ScopeGuard::into_inner(pool);

        // SAFETY: The chunk is vacant, sized and aligned for T and no longer on a free list.
        unsafe {
            chunk.write(value);
        }

        // Cannot overflow: that would imply more objects than virtual memory can fit.
        pool.length = pool.length.wrapping_add(1);

        Ok(Pooled::new(pool.pool_id, chunk))
    }

    /// Drops the object and returns its chunk to the block it came from.
    ///
    /// The chunk is reclaimed even if dropping the object panics.
    ///
    /// # Panics
    ///
    /// Panics if the handle was issued by a different pool.
    #[allow(
        clippy::needless_pass_by_value,
        reason = "the handle must be consumed to prevent reuse"
    )]
    pub fn delete_object(&mut self, handle: Pooled<T>) {
        self.try_delete_object(handle)
            .expect("attempted to delete an object that does not belong to this pool");
    }

    /// Drops the object and returns its chunk to the block it came from, handing back a handle
    /// that was issued by a different pool instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns [`ForeignHandle`] if the handle was issued by a different pool or points into
    /// none of this pool's blocks. The object is left untouched in that case and the handle
    /// can be recovered from the error.
    #[allow(
        clippy::needless_pass_by_value,
        reason = "the handle must be consumed to prevent reuse"
    )]
    pub fn try_delete_object(
        &mut self,
        handle: Pooled<T>,
    ) -> std::result::Result<(), ForeignHandle<T>> {
        if handle.pool_id() != self.pool_id {
            return Err(ForeignHandle::new(handle));
        }

        let chunk = handle.ptr();
        let Some(block_index) = self.find_block(chunk) else {
            return Err(ForeignHandle::new(handle));
        };

        let _reclaim = scopeguard::guard(self, |pool| {
            // SAFETY: The value in the chunk has been dropped (or its drop has panicked, after
            // which it is considered dropped as well).
            unsafe {
                pool.deallocate_chunk(block_index, chunk);
            }

            // Cannot wrap: the handle proves that at least one object is alive.
            pool.length = pool.length.wrapping_sub(1);
        });

        // SAFETY: The handle proves that the chunk holds a live value of this pool and the
        // handle is consumed, so nothing can reference the value after this.
        unsafe {
            chunk.drop_in_place();
        }

        Ok(())
    }

    /// Moves the object out of the pool and returns its chunk to the block it came from.
    ///
    /// # Panics
    ///
    /// Panics if the handle was issued by a different pool.
    #[must_use]
    #[allow(
        clippy::needless_pass_by_value,
        reason = "the handle must be consumed to prevent reuse"
    )]
    pub fn take_object(&mut self, handle: Pooled<T>) -> T {
        self.assert_owns(&handle);

        let chunk = handle.ptr();
        let block_index = self
            .find_block(chunk)
            .expect("a handle issued by this pool points into one of its blocks");

        // SAFETY: The handle proves that the chunk holds a live value of this pool. Reading it
        // moves the value out, leaving the chunk without a live value.
        let value = unsafe { chunk.read() };

        // SAFETY: The chunk no longer holds a live value.
        unsafe {
            self.deallocate_chunk(block_index, chunk);
        }

        // Cannot wrap: the handle proves that at least one object is alive.
        self.length = self.length.wrapping_sub(1);

        value
    }

    /// Borrows the object behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle was issued by a different pool.
    #[must_use]
    pub fn get(&self, handle: &Pooled<T>) -> &T {
        self.assert_owns(handle);

        // SAFETY: The handle proves that the chunk holds a live value of this pool, which
        // stays alive at least as long as the borrow of the pool.
        unsafe { handle.ptr().as_ref() }
    }

    /// Exclusively borrows the object behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle was issued by a different pool.
    #[must_use]
    pub fn get_mut(&mut self, handle: &Pooled<T>) -> &mut T {
        self.assert_owns(handle);

        // SAFETY: The handle proves that the chunk holds a live value of this pool. Each live
        // value has exactly one handle and we hold the pool exclusively, so no other reference
        // to the value can be created through the pool for the duration of the borrow.
        unsafe { handle.ptr().as_mut() }
    }

    fn assert_owns(&self, handle: &Pooled<T>) {
        assert!(
            handle.pool_id() == self.pool_id,
            "attempted to use a handle from a different pool (handle pool ID: {}, current pool ID: {})",
            handle.pool_id(),
            self.pool_id
        );
    }

    /// Finds the block that owns `chunk`, starting from the most recently allocated block.
    #[must_use]
    fn find_block(&self, chunk: NonNull<T>) -> Option<usize> {
        self.blocks
            .iter()
            .rposition(|block| block.index_of(chunk).is_some())
    }

    /// Takes a chunk from the block at the head of the availability chain, growing the pool
    /// first if the chain is empty. Returns the block index together with the chunk.
    #[must_use]
    fn allocate_chunk(&mut self) -> (usize, NonNull<T>) {
        let block_index = match self.available {
            Some(block_index) => block_index,
            None => self.grow(),
        };

        let block = self
            .blocks
            .get_mut(block_index)
            .expect("availability chain only links to existing blocks");

        (block_index, block.allocate(&mut self.available))
    }

    /// # Safety
    ///
    /// The chunk must have been allocated from the block at `block_index`, must not have been
    /// deallocated since and must not hold a live value.
    unsafe fn deallocate_chunk(&mut self, block_index: usize, chunk: NonNull<T>) {
        let block = self
            .blocks
            .get_mut(block_index)
            .expect("caller guarantees the chunk came from an existing block");

        let chunk_index = block
            .index_of(chunk)
            .expect("caller guarantees the chunk belongs to this block");

        // SAFETY: Forwarding guarantee from caller.
        unsafe {
            block.deallocate(block_index, chunk_index, &mut self.available);
        }
    }

    /// Allocates a new block, makes it the (only) member of the availability chain and returns
    /// its index.
    #[must_use]
    fn grow(&mut self) -> usize {
        debug_assert!(self.available.is_none());

        let block = IndexedBlock::new(self.chunks_per_block);
        let chunk_count = block.chunk_count();

        let block_index = self.blocks.len();
        self.blocks.push(block);
        self.available = Some(block_index);

        debug!(
            pool_id = %self.pool_id,
            item_type = type_name::<T>(),
            block_count = self.blocks.len(),
            chunk_count,
            index_width = IndexedBlock::<T>::INDEX_WIDTH,
            "indexed pool allocated a new block"
        );

        block_index
    }

    /// Drops every object that is still alive.
    #[cfg_attr(test, mutants::skip)] // Mutations cause leaks that tests cannot observe.
    fn drop_live_objects(&mut self) {
        for block in &self.blocks {
            let vacant = block.vacant_chunks();

            for (chunk, _) in block
                .chunks()
                .zip(vacant)
                .filter(|(_, is_vacant)| !is_vacant)
            {
                // SAFETY: A chunk that is not on its block's free list holds a live value. The
                // pool is being dropped, so no handle can reach the value afterwards.
                unsafe {
                    chunk.drop_in_place();
                }
            }
        }

        self.length = 0;
    }
}

impl<T> Default for IndexedPool<T> {
    /// Creates an empty pool with the default block size, capped at what the item's index type
    /// can count.
    fn default() -> Self {
        let max = NonZero::new(Self::max_chunks_per_block())
            .expect("every index type can count at least one chunk");

        Self::new(DEFAULT_CHUNKS_PER_BLOCK.min(max))
    }
}

/// Pools are equal only to themselves.
impl<T> PartialEq for IndexedPool<T> {
    fn eq(&self, other: &Self) -> bool {
        self.pool_id == other.pool_id
    }
}

impl<T> Eq for IndexedPool<T> {}

impl<T> Drop for IndexedPool<T> {
    fn drop(&mut self) {
        let live_objects = self.length;

        if live_objects > 0 {
            debug!(
                pool_id = %self.pool_id,
                item_type = type_name::<T>(),
                live_objects,
                "dropping indexed pool that still contains objects"
            );

            self.drop_live_objects();
        }

        // Newest first, without recursion no matter how many blocks there are.
        while let Some(block) = self.blocks.pop() {
            drop(block);
        }

        // We do this check at the end so we clean up the memory first.
        //
        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was, leading to debug difficulties.
        if self.drop_policy == DropPolicy::MustNotDropItems && !thread::panicking() {
            assert!(
                live_objects == 0,
                "dropped a non-empty pool of {} with a policy that says it must be empty when dropped",
                type_name::<T>()
            );
        }
    }
}

// SAFETY: The pool exclusively owns its blocks and the objects in them. Nothing about the raw
// pointers ties the pool to a thread, so it can move between threads whenever T can.
unsafe impl<T: Send> Send for IndexedPool<T> {}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(IndexedPool<u8>: Send, PartialEq, Eq);
    assert_not_impl_any!(IndexedPool<u8>: Sync, Clone);

    #[test]
    fn smoke_test() {
        let mut pool = IndexedPool::<u16>::new(nz!(4));

        let a = pool.new_object(1);
        let b = pool.new_object(2);
        let c = pool.new_object(3);

        assert_eq!(pool.len(), 3);
        assert_eq!(*pool.get(&a), 1);
        assert_eq!(*pool.get(&b), 2);
        assert_eq!(*pool.get(&c), 3);

        pool.delete_object(b);
        let d = pool.new_object(4);

        assert_eq!(*pool.get(&d), 4);
        assert_eq!(pool.block_count(), 1);

        pool.delete_object(a);
        pool.delete_object(c);
        pool.delete_object(d);

        assert!(pool.is_empty());
    }

    #[test]
    fn grows_exactly_when_exhausted() {
        let mut pool = IndexedPool::<[u8; 3]>::new(nz!(3));

        let mut handles = Vec::new();

        for _ in 0..3 {
            handles.push(pool.new_object([1, 2, 3]));
            assert_eq!(pool.block_count(), 1);
        }

        handles.push(pool.new_object([4, 5, 6]));
        assert_eq!(pool.block_count(), 2);
        assert_eq!(pool.capacity(), 6);

        for handle in handles {
            pool.delete_object(handle);
        }
    }

    // u32 is only smaller than a pointer on 64-bit targets.
    #[cfg(target_pointer_width = "64")]
    #[test]
    fn chunk_of_full_block_is_reused_before_fresh_chunks() {
        let mut pool = IndexedPool::<u32>::new(nz!(3));

        let first = pool.new_object(1);
        let first_ptr = first.ptr();
        let second = pool.new_object(2);
        let third = pool.new_object(3);
        let fourth = pool.new_object(4);
        assert_eq!(pool.block_count(), 2);

        // The first block was full, so it rejoins the availability chain at the head.
        pool.delete_object(first);
        let reused = pool.new_object(5);

        assert_eq!(reused.ptr(), first_ptr);
        assert_eq!(pool.block_count(), 2);

        for handle in [second, third, fourth, reused] {
            pool.delete_object(handle);
        }
    }

    #[test]
    fn fills_current_block_before_growing() {
        let mut pool = IndexedPool::<u8>::new(nz!(2));

        let handles = (0..6).map(|x| pool.new_object(x)).collect::<Vec<_>>();
        assert_eq!(pool.block_count(), 3);

        for handle in handles {
            pool.delete_object(handle);
        }

        let handles = (0..6).map(|x| pool.new_object(x)).collect::<Vec<_>>();
        assert_eq!(pool.block_count(), 3);

        for handle in handles {
            pool.delete_object(handle);
        }
    }

    #[test]
    fn out_of_range_chunks_per_block_is_rejected() {
        let result = IndexedPool::<u8>::builder()
            .chunks_per_block(nz!(256))
            .try_build();

        assert!(matches!(
            result,
            Err(PoolError::ChunksPerBlockOutOfRange {
                requested: 256,
                max: 255
            })
        ));
    }

    #[test]
    fn largest_chunks_per_block_is_accepted() {
        let mut pool = IndexedPool::<u8>::new(nz!(255));

        let handles = (0..255_u32)
            .map(|x| pool.new_object(u8::try_from(x).unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(pool.block_count(), 1);

        for (expected, handle) in handles.iter().enumerate() {
            assert_eq!(usize::from(*pool.get(handle)), expected);
        }

        for handle in handles {
            pool.delete_object(handle);
        }
    }

    #[test]
    #[should_panic]
    fn out_of_range_chunks_per_block_panics_in_new() {
        drop(IndexedPool::<u8>::new(nz!(1000)));
    }

    #[test]
    fn default_is_capped_by_index_type() {
        let pool = IndexedPool::<u8>::default();
        assert!(pool.chunks_per_block() <= 255);

        let pool = IndexedPool::<u16>::default();
        assert_eq!(
            NonZero::new(pool.chunks_per_block()),
            Some(DEFAULT_CHUNKS_PER_BLOCK)
        );
    }

    #[test]
    fn failed_construction_returns_chunk() {
        let mut pool = IndexedPool::<u16>::new(nz!(1));

        let result = pool.try_new_object_with(|| Err::<u16, _>("nope"));

        assert!(matches!(result, Err("nope")));
        assert!(pool.is_empty());

        let handle = pool.new_object(5);
        assert_eq!(pool.block_count(), 1);
        pool.delete_object(handle);
    }

    #[test]
    fn panicking_construction_returns_chunk() {
        let mut pool = IndexedPool::<u16>::new(nz!(1));

        let result = catch_unwind(AssertUnwindSafe(|| {
            _ = pool.new_object_with(|| panic!("constructor failed"));
        }));

        assert!(result.is_err());

        let handle = pool.new_object(5);
        assert_eq!(pool.block_count(), 1);
        pool.delete_object(handle);
    }

    #[test]
    fn take_object_moves_value_out() {
        let mut pool = IndexedPool::<u16>::new(nz!(2));

        let handle = pool.new_object(999);

        assert_eq!(pool.take_object(handle), 999);
        assert!(pool.is_empty());
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let mut pool_a = IndexedPool::<u8>::builder()
            .chunks_per_block(nz!(2))
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();
        let mut pool_b = IndexedPool::<u8>::new(nz!(2));

        let handle = pool_a.new_object(1);

        let rejected = pool_b.try_delete_object(handle).unwrap_err();
        assert_eq!(pool_a.len(), 1);

        let handle = rejected.into_handle();
        assert_eq!(*pool_a.get(&handle), 1);

        pool_a.delete_object(handle);
        assert!(pool_a.is_empty());
    }

    #[test]
    fn handle_outside_every_block_is_rejected() {
        let mut pool = IndexedPool::<u8>::new(nz!(2));
        let _keep = pool.new_object(1);

        let mut elsewhere = 5_u8;
        let elsewhere_ptr = NonNull::from(&mut elsewhere);
        let handle = Pooled::new(pool.pool_id, elsewhere_ptr);

        let rejected = pool.try_delete_object(handle).unwrap_err();

        assert_eq!(rejected.into_handle().ptr(), elsewhere_ptr);
        assert_eq!(elsewhere, 5);
    }

    #[test]
    fn pool_equals_only_itself() {
        let a = IndexedPool::<u8>::default();
        let b = IndexedPool::<u8>::default();

        assert_eq!(a, a);
        assert_ne!(a, b);
    }

    #[test]
    fn drop_with_live_objects_drops_them_once() {
        // Items of this pool are too small to carry a shared counter, so count in a thread local.
        thread_local! {
            static DROPS: Cell<usize> = const { Cell::new(0) };
        }

        struct Small(#[allow(dead_code, reason = "only the size matters")] u16);

        impl Drop for Small {
            fn drop(&mut self) {
                DROPS.with(|drops| drops.set(drops.get() + 1));
            }
        }

        let mut pool = IndexedPool::<Small>::new(nz!(2));
        let handles = (0..5).map(|x| pool.new_object(Small(x))).collect::<Vec<_>>();

        let mut handles = handles.into_iter();
        pool.delete_object(handles.next().unwrap());
        pool.delete_object(handles.next().unwrap());
        assert_eq!(DROPS.with(Cell::get), 2);

        drop(pool);
        assert_eq!(DROPS.with(Cell::get), 5);
    }

    #[test]
    #[should_panic]
    fn drop_with_live_objects_and_forbidding_policy_panics() {
        let mut pool = IndexedPool::<u8>::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();

        _ = pool.new_object(1);
    }
}
