use std::num::NonZero;
use std::ptr::NonNull;

use crate::BlockMemory;
use crate::chunk_range::{LINK_SIZE, thread_links};

/// A block whose chunks are threaded into a null-terminated list of chunk addresses.
///
/// The block has no free-list state of its own. Once created, its chunks are handed to the
/// owning [`LinkedPool`][1] as the new pool-wide free list and from then on the links may point
/// into any block of the pool.
///
/// [1]: crate::LinkedPool
#[derive(Debug)]
pub(crate) struct LinkedBlock<T> {
    memory: BlockMemory<T>,
}

impl<T> LinkedBlock<T> {
    /// Allocates a block of `chunk_count` chunks, all of them linked into a free list that
    /// starts at [`first_chunk()`][Self::first_chunk] and ends with a null link.
    #[must_use]
    pub(crate) fn new(chunk_count: NonZero<usize>) -> Self {
        const {
            assert!(
                size_of::<T>() >= LINK_SIZE,
                "pointer-linked blocks require items at least as large as a pointer"
            );
        }

        let memory = BlockMemory::<T>::allocate(chunk_count);

        // SAFETY: The memory was just allocated for `chunk_count` chunks of `size_of::<T>()`
        // bytes and every chunk can hold a link (asserted above).
        unsafe {
            thread_links(
                memory.first_chunk().cast::<u8>(),
                memory.chunk_count(),
                size_of::<T>(),
            );
        }

        Self { memory }
    }

    #[must_use]
    pub(crate) fn first_chunk(&self) -> NonNull<T> {
        self.memory.first_chunk()
    }

    #[must_use]
    pub(crate) fn chunk_count(&self) -> usize {
        self.memory.chunk_count()
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn contains(&self, ptr: NonNull<T>) -> bool {
        self.memory.index_of(ptr).is_some()
    }

    pub(crate) fn chunks(&self) -> impl Iterator<Item = NonNull<T>> + '_ {
        self.memory.chunks()
    }
}

#[cfg(test)]
mod tests {
    use new_zealand::nz;

    use super::*;
    use crate::chunk_range::read_link;

    #[test]
    fn fresh_block_is_one_free_list_in_address_order() {
        let block = LinkedBlock::<[usize; 2]>::new(nz!(4));

        let mut chunk = Some(block.first_chunk().cast::<u8>());
        let mut visited = Vec::new();

        while let Some(current) = chunk {
            visited.push(current.cast::<[usize; 2]>());

            // SAFETY: Every chunk of a fresh block holds a link.
            chunk = unsafe { read_link(current) };
        }

        assert_eq!(visited, block.chunks().collect::<Vec<_>>());
        assert_eq!(block.chunk_count(), 4);
    }

    #[test]
    fn single_chunk_block_links_to_null() {
        let block = LinkedBlock::<u64>::new(nz!(1));

        // SAFETY: Every chunk of a fresh block holds a link.
        let next = unsafe { read_link(block.first_chunk().cast()) };

        assert_eq!(next, None);
    }

    #[test]
    fn contains_only_own_chunks() {
        let block = LinkedBlock::<u64>::new(nz!(3));
        let other = LinkedBlock::<u64>::new(nz!(3));

        assert!(block.chunks().all(|chunk| block.contains(chunk)));
        assert!(!block.contains(other.first_chunk()));
    }
}
