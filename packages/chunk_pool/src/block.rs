use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::any::type_name;
use std::num::NonZero;
use std::ptr::NonNull;

use num_integer::Integer;

use crate::PoolError;
use crate::error::Result;

/// One contiguous heap allocation holding `chunk_count` chunks of `size_of::<T>()` bytes.
///
/// Every chunk is aligned for `T`. The memory is not initialized here; the block types built
/// on top of this thread their free lists through it immediately after allocation.
#[derive(Debug)]
pub(crate) struct BlockMemory<T> {
    first_chunk: NonNull<T>,
    chunk_count: NonZero<usize>,
}

impl<T> BlockMemory<T> {
    /// Calculates the layout of a block, failing if it would not fit into the address space.
    pub(crate) fn layout(chunk_count: NonZero<usize>) -> Result<Layout> {
        Layout::array::<T>(chunk_count.get()).or(Err(PoolError::BlockTooLarge {
            chunks_per_block: chunk_count.get(),
            chunk_size: size_of::<T>(),
        }))
    }

    /// # Panics
    ///
    /// Panics if `T` is zero-sized or if the layout is too large. Pools validate the layout
    /// when they are built, so the latter cannot happen for a block requested by a pool.
    #[must_use]
    pub(crate) fn allocate(chunk_count: NonZero<usize>) -> Self {
        assert!(
            size_of::<T>() > 0,
            "blocks of zero-sized {} cannot be allocated",
            type_name::<T>()
        );

        let layout = Self::layout(chunk_count)
            .expect("block layout is validated when the pool is built");

        // SAFETY: The layout is valid (calculated above) and not zero-sized because both the
        // item size and the chunk count are non-zero.
        let ptr = unsafe { alloc(layout) };

        let Some(first_chunk) = NonNull::new(ptr.cast::<T>()) else {
            handle_alloc_error(layout)
        };

        Self {
            first_chunk,
            chunk_count,
        }
    }

    #[must_use]
    pub(crate) fn chunk_count(&self) -> usize {
        self.chunk_count.get()
    }

    #[must_use]
    pub(crate) fn first_chunk(&self) -> NonNull<T> {
        self.first_chunk
    }

    /// Pointer to chunk number `index`.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    #[must_use]
    pub(crate) fn chunk(&self, index: usize) -> NonNull<T> {
        assert!(
            index < self.chunk_count.get(),
            "chunk {index} index out of bounds in block of {}",
            type_name::<T>()
        );

        // SAFETY: Guarded by bounds check above, so the pointer stays within the allocation.
        unsafe { self.first_chunk.add(index) }
    }

    /// The index of the chunk at `ptr`, or `None` if `ptr` does not point to the start of a
    /// chunk in this block.
    #[must_use]
    pub(crate) fn index_of(&self, ptr: NonNull<T>) -> Option<usize> {
        let offset = ptr
            .addr()
            .get()
            .checked_sub(self.first_chunk.addr().get())?;

        let (index, misalignment) = offset.div_rem(&size_of::<T>());

        (misalignment == 0 && index < self.chunk_count.get()).then_some(index)
    }

    /// All chunks of the block in address order.
    pub(crate) fn chunks(&self) -> impl Iterator<Item = NonNull<T>> + '_ {
        (0..self.chunk_count.get()).map(|index| self.chunk(index))
    }
}

impl<T> Drop for BlockMemory<T> {
    fn drop(&mut self) {
        let layout = Self::layout(self.chunk_count)
            .expect("layout was valid when the block was allocated");

        // SAFETY: The layout matches the one used to allocate the memory.
        unsafe {
            dealloc(self.first_chunk.as_ptr().cast(), layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn chunks_are_contiguous_and_aligned() {
        let block = BlockMemory::<u64>::allocate(nz!(4));

        assert_eq!(block.chunk_count(), 4);

        for (index, chunk) in block.chunks().enumerate() {
            assert_eq!(chunk, block.chunk(index));
            assert!(chunk.as_ptr().is_aligned());
        }

        assert_eq!(block.chunk(0), block.first_chunk());
    }

    #[test]
    fn index_of_finds_own_chunks() {
        let block = BlockMemory::<[u8; 3]>::allocate(nz!(5));

        for index in 0..5 {
            assert_eq!(block.index_of(block.chunk(index)), Some(index));
        }
    }

    #[test]
    fn index_of_rejects_foreign_and_interior_pointers() {
        let block = BlockMemory::<[u8; 3]>::allocate(nz!(5));
        let other = BlockMemory::<[u8; 3]>::allocate(nz!(5));

        assert_eq!(block.index_of(other.first_chunk()), None);

        // SAFETY: One byte into the first chunk is still inside the allocation.
        let interior = unsafe { block.first_chunk().cast::<u8>().add(1) }.cast::<[u8; 3]>();
        assert_eq!(block.index_of(interior), None);

        let past_end = NonNull::new(block.first_chunk().as_ptr().wrapping_add(5)).unwrap();
        assert_eq!(block.index_of(past_end), None);
    }

    #[test]
    fn oversized_layout_is_error() {
        let result = BlockMemory::<u64>::layout(NonZero::<usize>::MAX);

        assert!(matches!(
            result,
            Err(PoolError::BlockTooLarge {
                chunks_per_block: usize::MAX,
                chunk_size: 8
            })
        ));
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_chunk_panics() {
        let block = BlockMemory::<u32>::allocate(nz!(2));

        _ = block.chunk(2);
    }

    #[test]
    #[should_panic]
    fn zero_sized_item_panics() {
        drop(BlockMemory::<()>::allocate(nz!(2)));
    }
}
