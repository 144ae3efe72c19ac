use std::any::type_name;
use std::convert::Infallible;
use std::num::NonZero;
use std::ptr::NonNull;
use std::thread;

use foldhash::{HashSet, HashSetExt};
use scopeguard::ScopeGuard;
use tracing::debug;

use crate::chunk_range::{LINK_SIZE, read_link, write_link};
use crate::error::Result;
use crate::{
    BlockMemory, DropPolicy, ForeignHandle, LinkedBlock, PoolBuilder, PoolId, Pooled,
};

/// An object pool for items at least as large as a pointer, tracking vacant chunks in a single
/// pool-wide free list of chunk addresses.
///
/// The pool allocates memory in blocks of [`chunks_per_block()`][Self::chunks_per_block]
/// chunks, each chunk exactly `size_of::<T>()` bytes. A vacant chunk stores the address of the
/// next vacant chunk, so both allocation and deallocation are O(1) no matter how many blocks
/// the pool has. A new block is only allocated when every existing chunk is occupied; memory
/// is only returned to the system when the pool is dropped.
///
/// Objects never move while they are in the pool.
///
/// Items smaller than a pointer cannot hold an address and must use [`IndexedPool`][1] instead.
/// Using such a type with this pool fails to compile.
///
/// # Example
///
/// ```
/// use chunk_pool::LinkedPool;
/// use new_zealand::nz;
///
/// let mut pool = LinkedPool::<String>::new(nz!(64));
///
/// let greeting = pool.new_object("Hello".to_string());
/// pool.get_mut(&greeting).push_str(", World!");
/// assert_eq!(pool.get(&greeting), "Hello, World!");
///
/// pool.delete_object(greeting);
/// assert!(pool.is_empty());
/// ```
///
/// [1]: crate::IndexedPool
#[derive(Debug)]
pub struct LinkedPool<T> {
    /// Blocks in the order they were allocated. Only ever appended to.
    blocks: Vec<LinkedBlock<T>>,

    /// Head of the pool-wide free list. The list may cross block boundaries freely.
    /// `None` when every chunk of every block is occupied.
    next_free: Option<NonNull<T>>,

    chunks_per_block: NonZero<usize>,

    /// Number of live objects.
    length: usize,

    drop_policy: DropPolicy,

    pool_id: PoolId,
}

impl<T> LinkedPool<T> {
    /// Creates an empty pool that grows `chunks_per_block` chunks at a time.
    ///
    /// No memory is allocated until the first object is created.
    ///
    /// # Panics
    ///
    /// Panics if a block of `chunks_per_block` items does not fit into the address space.
    #[must_use]
    pub fn new(chunks_per_block: NonZero<usize>) -> Self {
        Self::builder().chunks_per_block(chunks_per_block).build()
    }

    /// Starts building a new [`LinkedPool`].
    ///
    /// ```
    /// use chunk_pool::{DropPolicy, LinkedPool};
    /// use new_zealand::nz;
    ///
    /// let pool = LinkedPool::<u64>::builder()
    ///     .chunks_per_block(nz!(1024))
    ///     .drop_policy(DropPolicy::MustNotDropItems)
    ///     .build();
    ///
    /// assert_eq!(pool.chunks_per_block(), 1024);
    /// ```
    pub fn builder() -> PoolBuilder<Self> {
        PoolBuilder::new()
    }

    pub(crate) fn new_inner(
        chunks_per_block: NonZero<usize>,
        drop_policy: DropPolicy,
    ) -> Result<Self> {
        const {
            assert!(
                size_of::<T>() >= LINK_SIZE,
                "LinkedPool requires items at least as large as a pointer; use IndexedPool instead"
            );
        }

        // Validate once here so that growing the pool cannot fail on layout calculation.
        BlockMemory::<T>::layout(chunks_per_block)?;

        Ok(Self {
            blocks: Vec::new(),
            next_free: None,
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
    ///
    /// ```
    /// use chunk_pool::LinkedPool;
    ///
    /// let mut pool = LinkedPool::<u64>::default();
    ///
    /// let handle = pool.new_object(42);
    /// assert_eq!(*pool.get(&handle), 42);
    /// assert_eq!(pool.len(), 1);
    /// # pool.delete_object(handle);
    /// ```
    pub fn new_object(&mut self, value: T) -> Pooled<T> {
        self.new_object_with(|| value)
    }

    /// Constructs an object with `f` and places it into the pool.
    ///
    /// A chunk is reserved before `f` runs. If `f` panics, the chunk is returned to the free
    /// list and the panic continues unchanged.
    pub fn new_object_with(&mut self, f: impl FnOnce() -> T) -> Pooled<T> {
        let Ok(handle) = self.try_new_object_with(|| Ok::<T, Infallible>(f()));
        handle
    }

    /// Constructs an object with the fallible `f` and places it into the pool.
    ///
    /// A chunk is reserved before `f` runs. If `f` returns an error or panics, the chunk is
    /// returned to the free list and the error is returned (or the panic continues) unchanged.
    ///
    /// ```
    /// use chunk_pool::LinkedPool;
    ///
    /// let mut pool = LinkedPool::<u64>::default();
    ///
    /// let parsed = pool.try_new_object_with(|| "17".parse::<u64>());
    /// assert_eq!(*pool.get(parsed.as_ref().unwrap()), 17);
    ///
    /// let failed = pool.try_new_object_with(|| "x".parse::<u64>());
    /// assert!(failed.is_err());
    /// assert_eq!(pool.len(), 1);
    /// # pool.delete_object(parsed.unwrap());
    /// ```
    pub fn try_new_object_with<E>(
        &mut self,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<Pooled<T>, E> {
        let chunk = self.allocate_chunk();

        let pool = scopeguard::guard(self, |pool| {
            // SAFETY: The chunk was taken from the free list above and never received a value.
            unsafe {
                pool.deallocate_chunk(chunk);
            }
        });

        let value = f()?;

        let pool = ScopeGuard::into_inner(pool);

        // SAFETY: The chunk is vacant, sized and aligned for T and no longer on the free list.
        unsafe {
            chunk.write(value);
        }

        // Cannot overflow: that would imply more objects than virtual memory can fit.
        pool.length = pool.length.wrapping_add(1);

        Ok(Pooled::new(pool.pool_id, chunk))
    }

    /// Drops the object and returns its chunk to the free list.
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

    /// Drops the object and returns its chunk to the free list, handing back a handle that was
    /// issued by a different pool instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns [`ForeignHandle`] if the handle was issued by a different pool. The object is
    /// left untouched in that case and the handle can be recovered from the error.
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

        let _reclaim = scopeguard::guard(self, |pool| {
            // SAFETY: The value in the chunk has been dropped (or its drop has panicked, after
            // which it is considered dropped as well).
            unsafe {
                pool.deallocate_chunk(chunk);
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

    /// Moves the object out of the pool and returns its chunk to the free list.
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

        // SAFETY: The handle proves that the chunk holds a live value of this pool. Reading it
        // moves the value out, leaving the chunk without a live value.
        let value = unsafe { chunk.read() };

        // SAFETY: The chunk no longer holds a live value.
        unsafe {
            self.deallocate_chunk(chunk);
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

    /// Pops the head of the free list, growing the pool first if the list is empty.
    #[must_use]
    fn allocate_chunk(&mut self) -> NonNull<T> {
        let chunk = match self.next_free {
            Some(chunk) => chunk,
            None => self.grow(),
        };

        // SAFETY: Every chunk on the free list is vacant and holds a link.
        self.next_free = unsafe { read_link(chunk.cast()) }.map(NonNull::cast);

        chunk
    }

    /// Pushes a chunk onto the head of the free list.
    ///
    /// There is no check that the chunk belongs to this pool; handles are checked by the
    /// callers before reaching this point.
    ///
    /// # Safety
    ///
    /// The chunk must have been allocated from this pool, must not be on the free list already
    /// and must not hold a live value.
    unsafe fn deallocate_chunk(&mut self, chunk: NonNull<T>) {
        // SAFETY: Forwarding guarantee from caller. Every chunk can hold a link because the
        // block constructor refuses items smaller than a pointer.
        unsafe {
            write_link(chunk.cast(), self.next_free.map(NonNull::cast));
        }

        self.next_free = Some(chunk);
    }

    /// Allocates a new block and returns its first chunk.
    ///
    /// This only happens when the free list is empty, so the block's own free list simply
    /// becomes the pool-wide free list.
    #[must_use]
    fn grow(&mut self) -> NonNull<T> {
        debug_assert!(self.next_free.is_none());

        let block = LinkedBlock::new(self.chunks_per_block);
        let first_chunk = block.first_chunk();
        let chunk_count = block.chunk_count();
        self.blocks.push(block);

        debug!(
            pool_id = %self.pool_id,
            item_type = type_name::<T>(),
            block_count = self.blocks.len(),
            chunk_count,
            "linked pool allocated a new block"
        );

        first_chunk
    }

    /// Drops every object that is still alive.
    ///
    /// Occupancy is not tracked per chunk, so the vacant chunks are identified by walking the
    /// free list and every other chunk is considered occupied.
    #[cfg_attr(test, mutants::skip)] // Mutations cause leaks that tests cannot observe.
    fn drop_live_objects(&mut self) {
        let vacant_count = self.capacity().wrapping_sub(self.length);
        let mut vacant = HashSet::with_capacity(vacant_count);

        let mut next = self.next_free;

        while let Some(chunk) = next {
            assert!(
                vacant.insert(chunk),
                "free list of pool of {} contains a cycle",
                type_name::<T>()
            );

            // SAFETY: Every chunk on the free list is vacant and holds a link.
            next = unsafe { read_link(chunk.cast()) }.map(NonNull::cast);
        }

        for block in &self.blocks {
            for chunk in block.chunks().filter(|chunk| !vacant.contains(chunk)) {
                // SAFETY: A chunk that is not on the free list holds a live value. The pool is
                // being dropped, so no handle can reach the value afterwards.
                unsafe {
                    chunk.drop_in_place();
                }
            }
        }

        // The chunks are not put back on the free list because the blocks are released next.
        self.length = 0;
    }
}

impl<T> Default for LinkedPool<T> {
    /// Creates an empty pool with the default block size.
    fn default() -> Self {
        Self::builder().build()
    }
}

impl<T> Drop for LinkedPool<T> {
    fn drop(&mut self) {
        let live_objects = self.length;

        if live_objects > 0 {
            debug!(
                pool_id = %self.pool_id,
                item_type = type_name::<T>(),
                live_objects,
                "dropping linked pool that still contains objects"
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
unsafe impl<T: Send> Send for LinkedPool<T> {}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashSet as StdHashSet;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::PoolError;

    assert_impl_all!(LinkedPool<u64>: Send);
    assert_impl_all!(LinkedPool<String>: Send);
    assert_not_impl_any!(LinkedPool<u64>: Sync, Clone, PartialEq);
    assert_not_impl_any!(LinkedPool<Rc<u64>>: Send);

    type Item = [usize; 2];

    #[test]
    fn smoke_test() {
        let mut pool = LinkedPool::<u64>::new(nz!(4));

        assert_eq!(pool.len(), 0);
        assert!(pool.is_empty());
        assert_eq!(pool.capacity(), 0);

        let a = pool.new_object(42);
        let b = pool.new_object(43);
        let c = pool.new_object(44);

        assert_eq!(pool.len(), 3);
        assert_eq!(*pool.get(&a), 42);
        assert_eq!(*pool.get(&b), 43);
        assert_eq!(*pool.get(&c), 44);

        pool.delete_object(b);

        let d = pool.new_object(45);

        assert_eq!(*pool.get(&a), 42);
        assert_eq!(*pool.get(&c), 44);
        assert_eq!(*pool.get(&d), 45);
        assert_eq!(pool.block_count(), 1);

        pool.delete_object(a);
        pool.delete_object(c);
        pool.delete_object(d);

        assert!(pool.is_empty());
    }

    #[test]
    fn first_block_is_handed_out_in_address_order() {
        let mut pool = LinkedPool::<Item>::new(nz!(3));

        let handles = (0..3).map(|_| pool.new_object([0; 2])).collect::<Vec<_>>();
        let chunks = pool.blocks[0].chunks().collect::<Vec<_>>();

        assert_eq!(
            handles.iter().map(Pooled::ptr).collect::<Vec<_>>(),
            chunks
        );
    }

    #[test]
    fn grows_exactly_when_exhausted() {
        let mut pool = LinkedPool::<Item>::new(nz!(3));

        let mut handles = Vec::new();

        for _ in 0..3 {
            handles.push(pool.new_object([1, 2]));
            assert_eq!(pool.block_count(), 1);
        }

        handles.push(pool.new_object([3, 4]));
        assert_eq!(pool.block_count(), 2);
        assert_eq!(pool.capacity(), 6);

        // The fourth object lives in the new block.
        assert!(pool.blocks[1].contains(handles[3].ptr()));

        for handle in handles {
            pool.delete_object(handle);
        }
    }

    #[test]
    fn deleted_chunk_is_reused_first() {
        let mut pool = LinkedPool::<u64>::new(nz!(4));

        let a = pool.new_object(1);
        let b = pool.new_object(2);
        let b_ptr = b.ptr();

        pool.delete_object(b);
        let c = pool.new_object(3);

        assert_eq!(c.ptr(), b_ptr);

        pool.delete_object(a);
        pool.delete_object(c);
    }

    #[test]
    fn free_list_crosses_blocks() {
        let mut pool = LinkedPool::<u64>::new(nz!(2));

        let handles = (0..4).map(|x| pool.new_object(x)).collect::<Vec<_>>();
        assert_eq!(pool.block_count(), 2);

        let addresses = handles.iter().map(Pooled::ptr).collect::<StdHashSet<_>>();

        for handle in handles {
            pool.delete_object(handle);
        }

        // All four chunks come back before any growth, regardless of block.
        let reused = (0..4).map(|x| pool.new_object(x)).collect::<Vec<_>>();

        assert_eq!(pool.block_count(), 2);
        assert_eq!(
            reused.iter().map(Pooled::ptr).collect::<StdHashSet<_>>(),
            addresses
        );
    }

    #[test]
    fn failed_construction_returns_chunk() {
        let mut pool = LinkedPool::<u64>::new(nz!(1));

        let result = pool.try_new_object_with(|| Err::<u64, _>("nope"));

        assert!(matches!(result, Err("nope")));
        assert!(pool.is_empty());
        assert_eq!(pool.block_count(), 1);

        // The single chunk must still be available.
        let handle = pool.new_object(5);
        assert_eq!(pool.block_count(), 1);
        pool.delete_object(handle);
    }

    #[test]
    fn panicking_construction_returns_chunk() {
        let mut pool = LinkedPool::<u64>::new(nz!(1));

        let result = catch_unwind(AssertUnwindSafe(|| {
            _ = pool.new_object_with(|| panic!("constructor failed"));
        }));

        assert!(result.is_err());
        assert!(pool.is_empty());

        let handle = pool.new_object(5);
        assert_eq!(pool.block_count(), 1);
        pool.delete_object(handle);
    }

    #[test]
    fn delete_runs_drop_once() {
        struct Tracked(Rc<Cell<usize>>);

        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let mut pool = LinkedPool::<Tracked>::new(nz!(2));

        let handle = pool.new_object(Tracked(Rc::clone(&drops)));
        assert_eq!(drops.get(), 0);

        pool.delete_object(handle);
        assert_eq!(drops.get(), 1);

        drop(pool);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn panicking_drop_still_reclaims_chunk() {
        struct PanicOnDrop(#[allow(dead_code, reason = "only the size matters")] usize);

        impl Drop for PanicOnDrop {
            fn drop(&mut self) {
                panic!("drop failed");
            }
        }

        let mut pool = LinkedPool::<PanicOnDrop>::new(nz!(1));
        let handle = pool.new_object(PanicOnDrop(1));
        let ptr = handle.ptr();

        let result = catch_unwind(AssertUnwindSafe(|| pool.delete_object(handle)));
        assert!(result.is_err());
        assert!(pool.is_empty());

        // The chunk is back on the free list. Take the value back out without dropping it.
        let handle = pool.new_object(PanicOnDrop(2));
        assert_eq!(handle.ptr(), ptr);
        std::mem::forget(pool.take_object(handle));
    }

    #[test]
    fn take_object_moves_value_out() {
        let mut pool = LinkedPool::<String>::new(nz!(2));

        let handle = pool.new_object("moved".to_string());
        let value = pool.take_object(handle);

        assert_eq!(value, "moved");
        assert!(pool.is_empty());
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let mut pool_a = LinkedPool::<u64>::builder()
            .chunks_per_block(nz!(2))
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();
        let mut pool_b = LinkedPool::<u64>::new(nz!(2));

        let handle = pool_a.new_object(1);

        let rejected = pool_b.try_delete_object(handle).unwrap_err();

        assert_eq!(pool_a.len(), 1);
        assert!(pool_b.is_empty());

        // The handle comes back and the object can still be deleted from its own pool,
        // leaving nothing behind for the strict drop policy to complain about.
        let handle = rejected.into_handle();
        assert_eq!(*pool_a.get(&handle), 1);

        pool_a.delete_object(handle);
        assert!(pool_a.is_empty());
    }

    #[test]
    fn rejected_handle_converts_to_pool_error() {
        let mut pool_a = LinkedPool::<u64>::new(nz!(2));
        let mut pool_b = LinkedPool::<u64>::new(nz!(2));

        let handle = pool_a.new_object(1);

        let error = PoolError::from(pool_b.try_delete_object(handle).unwrap_err());

        assert!(matches!(error, PoolError::ForeignObject));
        assert_eq!(pool_a.len(), 1);
    }

    #[test]
    #[should_panic]
    fn foreign_handle_get_panics() {
        let mut pool_a = LinkedPool::<u64>::new(nz!(2));
        let pool_b = LinkedPool::<u64>::new(nz!(2));

        let handle = pool_a.new_object(1);
        _ = pool_b.get(&handle);
    }

    #[test]
    #[should_panic]
    fn foreign_handle_delete_panics() {
        let mut pool_a = LinkedPool::<u64>::new(nz!(2));
        let mut pool_b = LinkedPool::<u64>::new(nz!(2));

        let handle = pool_a.new_object(1);
        pool_b.delete_object(handle);
    }

    #[test]
    fn moved_pool_keeps_handles_valid() {
        let mut pool = LinkedPool::<u64>::new(nz!(2));
        let handle = pool.new_object(77);

        let mut moved = pool;

        assert_eq!(*moved.get(&handle), 77);
        moved.delete_object(handle);
    }

    #[test]
    fn drop_with_live_objects_drops_them_once() {
        let drops = Rc::new(Cell::new(0));

        struct Tracked(Rc<Cell<usize>>);

        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut pool = LinkedPool::<Tracked>::new(nz!(2));

        let handles = (0..5)
            .map(|_| pool.new_object(Tracked(Rc::clone(&drops))))
            .collect::<Vec<_>>();

        let mut handles = handles.into_iter();
        pool.delete_object(handles.next().unwrap());
        pool.delete_object(handles.next().unwrap());
        assert_eq!(drops.get(), 2);

        drop(pool);
        assert_eq!(drops.get(), 5);
    }

    #[test]
    #[should_panic]
    fn drop_with_live_objects_and_forbidding_policy_panics() {
        let mut pool = LinkedPool::<u64>::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();

        _ = pool.new_object(1);
    }

    #[test]
    fn drop_empty_with_forbidding_policy_is_ok() {
        let mut pool = LinkedPool::<u64>::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();

        let handle = pool.new_object(1);
        pool.delete_object(handle);
    }

    #[test]
    fn oversized_block_is_rejected() {
        let result = LinkedPool::<u64>::builder()
            .chunks_per_block(NonZero::<usize>::MAX)
            .try_build();

        assert!(matches!(result, Err(PoolError::BlockTooLarge { .. })));
    }

    #[test]
    fn get_mut_modifies_in_place() {
        let mut pool = LinkedPool::<Item>::default();
        let handle = pool.new_object([1, 2]);

        pool.get_mut(&handle)[1] = 20;

        assert_eq!(*pool.get(&handle), [1, 20]);
        pool.delete_object(handle);
    }
}
