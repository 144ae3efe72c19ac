use std::any::type_name;
use std::num::NonZero;
use std::ptr::NonNull;

use crate::chunk_range::{LINK_SIZE, read_index, thread_index_links, write_index};
use crate::width::max_index;
use crate::{BlockMemory, UnsignedOfBits, index_width_bytes};

/// Evaluates `$body` with `$index` naming the chunk index type that is `$width` bytes wide.
macro_rules! with_index_type {
    ($width:expr, $index:ident => $body:expr) => {
        match $width {
            1 => {
                type $index = UnsignedOfBits<8>;
                $body
            }
            2 => {
                type $index = UnsignedOfBits<16>;
                $body
            }
            4 => {
                type $index = UnsignedOfBits<32>;
                $body
            }
            width => unreachable!("no chunk index type is {width} bytes wide"),
        }
    };
}

/// A block whose free chunks are threaded into a block-local free list of chunk indexes.
///
/// Each vacant chunk stores the index of the next vacant chunk of the same block. The index
/// is [`INDEX_WIDTH`][Self::INDEX_WIDTH] bytes wide, which always fits into a chunk even when
/// a pointer would not. The chunk count doubles as the sentinel that terminates the list.
///
/// The owning [`IndexedPool`][1] keeps the blocks that have at least one vacant chunk in an
/// availability chain, threaded through [`next_available`][Self::next_available] as indexes
/// into the pool's list of blocks. The block maintains its own membership in that chain: it
/// leaves when its last vacant chunk is allocated and rejoins at the head when a chunk of a
/// full block is deallocated.
///
/// [1]: crate::IndexedPool
#[derive(Debug)]
pub(crate) struct IndexedBlock<T> {
    memory: BlockMemory<T>,

    /// Index of the next vacant chunk in this block. Think of this as a virtual stack of the most
    /// recently freed chunks, with the stack entries stored in the chunks themselves. Equal to
    /// the chunk count (the sentinel) when the block is full.
    next_free_index: usize,

    /// The next block in the pool's availability chain. Only meaningful while this block is a
    /// member of the chain, `None` otherwise.
    next_available: Option<usize>,
}

impl<T> IndexedBlock<T> {
    /// Width in bytes of the chunk index stored in vacant chunks.
    pub(crate) const INDEX_WIDTH: usize = index_width_bytes(size_of::<T>());

    /// The largest number of chunks a block can have, limited by the chunk index type having
    /// to represent the chunk count itself as the sentinel.
    #[must_use]
    pub(crate) fn max_chunk_count() -> usize {
        with_index_type!(Self::INDEX_WIDTH, I => max_index::<I>())
    }

    /// Allocates a block of `chunk_count` chunks, all of them vacant and linked in address order.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_count` exceeds [`max_chunk_count()`][Self::max_chunk_count].
    #[must_use]
    pub(crate) fn new(chunk_count: NonZero<usize>) -> Self {
        const {
            assert!(
                size_of::<T>() > 0 && size_of::<T>() < LINK_SIZE,
                "index-linked blocks require non-zero items smaller than a pointer"
            );
        }

        assert!(
            chunk_count.get() <= Self::max_chunk_count(),
            "{chunk_count} chunks exceeds the maximum of {} per block of {}",
            Self::max_chunk_count(),
            type_name::<T>()
        );

        let memory = BlockMemory::<T>::allocate(chunk_count);
        let base = memory.first_chunk().cast::<u8>();

        // SAFETY: The memory was just allocated for `chunk_count` chunks of `size_of::<T>()`
        // bytes, INDEX_WIDTH never exceeds the chunk size and we asserted above that the
        // sentinel is representable.
        with_index_type!(Self::INDEX_WIDTH, I => unsafe {
            thread_index_links::<I>(base, chunk_count.get(), size_of::<T>());
        });

        Self {
            memory,
            next_free_index: 0,
            next_available: None,
        }
    }

    #[must_use]
    pub(crate) fn chunk_count(&self) -> usize {
        self.memory.chunk_count()
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.next_free_index == self.memory.chunk_count()
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn next_available(&self) -> Option<usize> {
        self.next_available
    }

    /// The index of the chunk at `ptr`, or `None` if the pointer does not belong to this block.
    #[must_use]
    pub(crate) fn index_of(&self, ptr: NonNull<T>) -> Option<usize> {
        self.memory.index_of(ptr)
    }

    /// Takes the next vacant chunk of this block.
    ///
    /// `available` is the head of the pool's availability chain and must currently point to
    /// this block. If this allocation fills the block, the block removes itself from the chain
    /// by advancing the head to the next available block.
    ///
    /// # Panics
    ///
    /// Panics if the block is full.
    #[must_use]
    pub(crate) fn allocate(&mut self, available: &mut Option<usize>) -> NonNull<T> {
        assert!(
            !self.is_full(),
            "cannot allocate from a full block of {}",
            type_name::<T>()
        );

        let chunk = self.memory.chunk(self.next_free_index);

        // SAFETY: The chunk at the cursor is vacant, so it holds the index of the next vacant
        // chunk (or the sentinel).
        self.next_free_index = unsafe { Self::read_next(chunk) };

        if self.is_full() {
            *available = self.next_available.take();
        }

        chunk
    }

    /// Returns chunk number `chunk_index` to this block's free list.
    ///
    /// `self_index` is the position of this block in the pool's list of blocks and `available`
    /// is the head of the pool's availability chain. A block that was full rejoins the chain at
    /// its head.
    ///
    /// # Safety
    ///
    /// The chunk must have been handed out by [`allocate()`][Self::allocate] on this block, must
    /// not have been deallocated since and must no longer hold a live value.
    pub(crate) unsafe fn deallocate(
        &mut self,
        self_index: usize,
        chunk_index: usize,
        available: &mut Option<usize>,
    ) {
        if self.is_full() {
            self.next_available = *available;
            *available = Some(self_index);
        }

        let chunk = self.memory.chunk(chunk_index);

        // SAFETY: The caller guarantees the chunk is ours and holds no live value, so we may
        // overwrite its first bytes with the link.
        unsafe {
            Self::write_next(chunk, self.next_free_index);
        }

        self.next_free_index = chunk_index;
    }

    /// Marks which chunks of the block are vacant, by walking the block-local free list.
    #[must_use]
    pub(crate) fn vacant_chunks(&self) -> Vec<bool> {
        let chunk_count = self.memory.chunk_count();
        let mut vacant = vec![false; chunk_count];
        let mut index = self.next_free_index;

        while index != chunk_count {
            let slot = vacant
                .get_mut(index)
                .expect("free list only links to indexes within the block or the sentinel");

            assert!(
                !*slot,
                "free list of block of {} contains a cycle at chunk {index}",
                type_name::<T>()
            );

            *slot = true;

            // SAFETY: Every chunk on the free list is vacant and holds a link.
            index = unsafe { Self::read_next(self.memory.chunk(index)) };
        }

        vacant
    }

    pub(crate) fn chunks(&self) -> impl Iterator<Item = NonNull<T>> + '_ {
        self.memory.chunks()
    }

    /// # Safety
    ///
    /// The chunk must belong to this block and be vacant.
    unsafe fn read_next(chunk: NonNull<T>) -> usize {
        // SAFETY: Forwarding guarantee from caller.
        with_index_type!(Self::INDEX_WIDTH, I => unsafe { read_index::<I>(chunk.cast()) })
    }

    /// # Safety
    ///
    /// The chunk must belong to this block and hold no live value.
    unsafe fn write_next(chunk: NonNull<T>, next_free_index: usize) {
        // SAFETY: Forwarding guarantee from caller. The index is at most the chunk count, which
        // is representable as validated in the constructor.
        with_index_type!(Self::INDEX_WIDTH, I => unsafe {
            write_index::<I>(chunk.cast(), next_free_index);
        });
    }
}

#[cfg(test)]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn index_width_follows_item_size() {
        assert_eq!(IndexedBlock::<u8>::INDEX_WIDTH, 1);
        assert_eq!(IndexedBlock::<[u8; 3]>::INDEX_WIDTH, 2);
        assert_eq!(IndexedBlock::<u16>::INDEX_WIDTH, 2);
    }

    // Four-byte items are only smaller than a pointer on 64-bit targets.
    #[cfg(target_pointer_width = "64")]
    #[test]
    fn four_byte_items_use_four_byte_indexes() {
        assert_eq!(IndexedBlock::<u32>::INDEX_WIDTH, 4);
        assert_eq!(IndexedBlock::<[u8; 7]>::INDEX_WIDTH, 4);
        assert_eq!(IndexedBlock::<u32>::max_chunk_count(), usize::try_from(u32::MAX).unwrap());
    }

    #[test]
    fn max_chunk_count_follows_index_width() {
        assert_eq!(IndexedBlock::<u8>::max_chunk_count(), 255);
        assert_eq!(IndexedBlock::<[u8; 3]>::max_chunk_count(), 65_535);
    }

    #[test]
    fn allocates_in_address_order_then_leaves_chain() {
        let mut block = IndexedBlock::<u16>::new(nz!(3));
        let mut available = Some(0);

        let chunks = block.chunks().collect::<Vec<_>>();

        assert_eq!(block.allocate(&mut available), chunks[0]);
        assert_eq!(block.allocate(&mut available), chunks[1]);
        assert_eq!(available, Some(0));
        assert!(!block.is_full());

        assert_eq!(block.allocate(&mut available), chunks[2]);
        assert!(block.is_full());
        assert_eq!(available, None);
    }

    #[test]
    fn full_block_leaves_chain_to_next_member() {
        let mut block = IndexedBlock::<u8>::new(nz!(1));
        block.next_available = Some(7);
        let mut available = Some(3);

        _ = block.allocate(&mut available);

        assert_eq!(available, Some(7));
        assert_eq!(block.next_available(), None);
    }

    #[test]
    fn deallocating_from_full_block_rejoins_chain_at_head() {
        let mut block = IndexedBlock::<u8>::new(nz!(2));
        let mut available = Some(4);

        _ = block.allocate(&mut available);
        let second = block.allocate(&mut available);
        // The block was the head so its successor (none) takes over.
        assert_eq!(available, None);

        available = Some(9);
        let index = block.index_of(second).unwrap();

        // SAFETY: The chunk was allocated from this block and holds no value.
        unsafe {
            block.deallocate(4, index, &mut available);
        }

        assert_eq!(available, Some(4));
        assert_eq!(block.next_available(), Some(9));
        assert!(!block.is_full());
    }

    #[test]
    fn freed_chunks_are_reused_most_recent_first() {
        let mut block = IndexedBlock::<[u8; 3]>::new(nz!(4));
        let mut available = Some(0);

        let a = block.allocate(&mut available);
        let b = block.allocate(&mut available);

        // SAFETY: Both chunks were allocated from this block and hold no value.
        unsafe {
            block.deallocate(0, block.index_of(a).unwrap(), &mut available);
            block.deallocate(0, block.index_of(b).unwrap(), &mut available);
        }

        assert_eq!(block.allocate(&mut available), b);
        assert_eq!(block.allocate(&mut available), a);
    }

    #[test]
    fn vacant_chunks_tracks_free_list() {
        let mut block = IndexedBlock::<u16>::new(nz!(4));
        let mut available = Some(0);

        assert_eq!(block.vacant_chunks(), vec![true; 4]);

        let a = block.allocate(&mut available);
        _ = block.allocate(&mut available);
        _ = block.allocate(&mut available);

        assert_eq!(block.vacant_chunks(), vec![false, false, false, true]);

        // SAFETY: The chunk was allocated from this block and holds no value.
        unsafe {
            block.deallocate(0, block.index_of(a).unwrap(), &mut available);
        }

        assert_eq!(block.vacant_chunks(), vec![true, false, false, true]);
    }

    #[test]
    #[should_panic]
    fn allocate_from_full_block_panics() {
        let mut block = IndexedBlock::<u8>::new(nz!(1));
        let mut available = Some(0);

        _ = block.allocate(&mut available);
        _ = block.allocate(&mut available);
    }

    #[test]
    #[should_panic]
    fn unrepresentable_chunk_count_panics() {
        drop(IndexedBlock::<u8>::new(nz!(256)));
    }
}
