use std::num::NonZero;
use std::ptr::NonNull;

use num_traits::NumCast;

use crate::ChunkIndex;
use crate::width::max_index;

/// The free-list link stored in a vacant pointer-linked chunk. `None` terminates the list.
pub(crate) type ChunkLink = Option<NonNull<u8>>;

/// Minimum chunk size that can hold a [`ChunkLink`].
pub(crate) const LINK_SIZE: usize = size_of::<ChunkLink>();

/// Threads every chunk of `bytes` into a null-terminated free list of chunk addresses.
///
/// The buffer is divided into chunks of `chunk_size` bytes; trailing bytes that do not form a
/// whole chunk are left untouched. The first bytes of each chunk receive the address of the
/// following chunk, with the last chunk receiving a null address. Use [`chunk_link()`] to read
/// the links back.
///
/// Returns the number of chunks that were threaded.
///
/// # Example
///
/// ```
/// use std::num::NonZero;
///
/// use chunk_pool::{chunk_link, init_chunk_range};
///
/// let chunk_size = NonZero::new(size_of::<usize>()).unwrap();
/// let mut buffer = vec![0_u8; chunk_size.get() * 3];
///
/// assert_eq!(init_chunk_range(&mut buffer, chunk_size), 3);
///
/// let second = chunk_link(&buffer, chunk_size, 0).unwrap();
/// assert_eq!(second.as_ptr().cast_const(), buffer[chunk_size.get()..].as_ptr());
/// assert!(chunk_link(&buffer, chunk_size, 2).is_none());
/// ```
///
/// # Panics
///
/// Panics if `chunk_size` is smaller than a pointer.
pub fn init_chunk_range(bytes: &mut [u8], chunk_size: NonZero<usize>) -> usize {
    assert!(
        chunk_size.get() >= LINK_SIZE,
        "chunk size {chunk_size} cannot hold a {LINK_SIZE}-byte chunk link"
    );

    let chunk_count = whole_chunks(bytes.len(), chunk_size);
    let base = NonNull::from(bytes).cast::<u8>();

    // SAFETY: The slice is valid for writes of `chunk_count * chunk_size` bytes and we asserted
    // above that every chunk is large enough to hold a link.
    unsafe {
        thread_links(base, chunk_count, chunk_size.get());
    }

    chunk_count
}

/// Threads every chunk of `bytes` into a free list of chunk indexes of type `I`.
///
/// Chunk `k` receives the index `k + 1`, so the last chunk receives the chunk count itself.
/// That value is the sentinel meaning "no further free chunk". Trailing bytes that do not form
/// a whole chunk are left untouched. Use [`chunk_index()`] to read the links back.
///
/// Returns the number of chunks that were threaded.
///
/// # Example
///
/// ```
/// use std::num::NonZero;
///
/// use chunk_pool::{chunk_index, init_chunk_index_range};
///
/// let chunk_size = NonZero::new(4).unwrap();
/// let mut buffer = [0_u8; 12];
///
/// assert_eq!(init_chunk_index_range::<u32>(&mut buffer, chunk_size), 3);
///
/// assert_eq!(chunk_index::<u32>(&buffer, chunk_size, 0), 1);
/// assert_eq!(chunk_index::<u32>(&buffer, chunk_size, 2), 3);
/// ```
///
/// # Panics
///
/// Panics if `chunk_size` is smaller than `I` or if the chunk count cannot be represented by `I`.
pub fn init_chunk_index_range<I: ChunkIndex>(bytes: &mut [u8], chunk_size: NonZero<usize>) -> usize {
    assert!(
        chunk_size.get() >= size_of::<I>(),
        "chunk size {chunk_size} cannot hold a {}-byte chunk index",
        size_of::<I>()
    );

    let chunk_count = whole_chunks(bytes.len(), chunk_size);

    assert!(
        chunk_count <= max_index::<I>(),
        "{chunk_count} chunks cannot be addressed by a {}-byte chunk index",
        size_of::<I>()
    );

    let base = NonNull::from(bytes).cast::<u8>();

    // SAFETY: The slice is valid for writes of `chunk_count * chunk_size` bytes, every chunk can
    // hold an `I` and we asserted above that the sentinel is representable.
    unsafe {
        thread_index_links::<I>(base, chunk_count, chunk_size.get());
    }

    chunk_count
}

/// Reads the free-list link stored in chunk number `chunk` of a buffer threaded by
/// [`init_chunk_range()`].
///
/// # Panics
///
/// Panics if `chunk_size` is smaller than a pointer or if `chunk` is not a whole chunk
/// within `bytes`.
#[must_use]
pub fn chunk_link(bytes: &[u8], chunk_size: NonZero<usize>, chunk: usize) -> Option<NonNull<u8>> {
    let link_bytes = chunk_prefix(bytes, chunk_size, chunk, LINK_SIZE);

    // SAFETY: `chunk_prefix` returned exactly LINK_SIZE readable bytes and any bit pattern
    // is a valid (if possibly dangling) pointer value.
    unsafe { link_bytes.as_ptr().cast::<ChunkLink>().read_unaligned() }
}

/// Reads the free-list index stored in chunk number `chunk` of a buffer threaded by
/// [`init_chunk_index_range()`].
///
/// # Panics
///
/// Panics if `chunk_size` is smaller than `I` or if `chunk` is not a whole chunk within `bytes`.
/// Also panics if the stored index does not fit in `usize`, which cannot happen for indexes
/// written by [`init_chunk_index_range()`].
#[must_use]
pub fn chunk_index<I: ChunkIndex>(bytes: &[u8], chunk_size: NonZero<usize>, chunk: usize) -> usize {
    let index_bytes = chunk_prefix(bytes, chunk_size, chunk, size_of::<I>());

    // SAFETY: `chunk_prefix` returned exactly size_of::<I>() readable bytes and every bit
    // pattern is a valid unsigned integer.
    let value = unsafe { index_bytes.as_ptr().cast::<I>().read_unaligned() };

    value
        .to_usize()
        .expect("chunk index does not fit in usize")
}

#[allow(
    clippy::integer_division,
    reason = "trailing bytes that do not form a whole chunk are not part of any chunk"
)]
fn whole_chunks(len: usize, chunk_size: NonZero<usize>) -> usize {
    len / chunk_size
}

fn chunk_prefix(bytes: &[u8], chunk_size: NonZero<usize>, chunk: usize, prefix_len: usize) -> &[u8] {
    assert!(
        chunk_size.get() >= prefix_len,
        "chunk size {chunk_size} cannot hold a {prefix_len}-byte chunk link"
    );

    let chunk_count = whole_chunks(bytes.len(), chunk_size);

    assert!(
        chunk < chunk_count,
        "chunk {chunk} out of bounds in a range of {chunk_count} chunks"
    );

    // Cannot overflow: the chunk lies within the slice, so its offset fits in usize.
    let start = chunk.wrapping_mul(chunk_size.get());

    bytes
        .get(start..start.wrapping_add(prefix_len))
        .expect("guarded by chunk bounds check above")
}

/// Writes a null-terminated chain of chunk addresses into raw block memory.
///
/// # Safety
///
/// `base` must be valid for writes of `chunk_count * chunk_size` bytes and `chunk_size` must be
/// at least [`LINK_SIZE`].
pub(crate) unsafe fn thread_links(base: NonNull<u8>, chunk_count: usize, chunk_size: usize) {
    for index in 0..chunk_count {
        // Cannot overflow: the offset lies within the buffer described by the caller.
        let next_index = index.wrapping_add(1);

        // SAFETY: `index < chunk_count`, so the chunk lies within the buffer.
        let chunk = unsafe { base.add(index.wrapping_mul(chunk_size)) };

        let next = (next_index < chunk_count).then(|| {
            // SAFETY: `next_index < chunk_count`, so the next chunk lies within the buffer.
            unsafe { base.add(next_index.wrapping_mul(chunk_size)) }
        });

        // SAFETY: The chunk lies within the buffer and the caller guarantees it can hold a link.
        unsafe {
            write_link(chunk, next);
        }
    }
}

/// Writes the chain `0 -> 1 -> ... -> chunk_count` of chunk indexes into raw block memory.
///
/// # Safety
///
/// `base` must be valid for writes of `chunk_count * chunk_size` bytes, `chunk_size` must be
/// at least `size_of::<I>()` and `chunk_count` must be representable by `I`.
pub(crate) unsafe fn thread_index_links<I: ChunkIndex>(
    base: NonNull<u8>,
    chunk_count: usize,
    chunk_size: usize,
) {
    for index in 0..chunk_count {
        // SAFETY: `index < chunk_count`, so the chunk lies within the buffer.
        let chunk = unsafe { base.add(index.wrapping_mul(chunk_size)) };

        // For the last chunk this is `chunk_count`, the sentinel.
        // SAFETY: The chunk lies within the buffer and the caller guarantees it can hold an `I`
        // and that the value is representable.
        unsafe {
            write_index::<I>(chunk, index.wrapping_add(1));
        }
    }
}

/// # Safety
///
/// `chunk` must be valid for reads of [`LINK_SIZE`] bytes holding a link.
#[must_use]
pub(crate) unsafe fn read_link(chunk: NonNull<u8>) -> ChunkLink {
    // SAFETY: Forwarding guarantee from caller.
    unsafe { chunk.cast::<ChunkLink>().read_unaligned() }
}

/// # Safety
///
/// `chunk` must be valid for writes of [`LINK_SIZE`] bytes.
pub(crate) unsafe fn write_link(chunk: NonNull<u8>, next: ChunkLink) {
    // SAFETY: Forwarding guarantee from caller.
    unsafe {
        chunk.cast::<ChunkLink>().write_unaligned(next);
    }
}

/// # Safety
///
/// `chunk` must be valid for reads of `size_of::<I>()` bytes holding an index.
#[must_use]
pub(crate) unsafe fn read_index<I: ChunkIndex>(chunk: NonNull<u8>) -> usize {
    // SAFETY: Forwarding guarantee from caller.
    let value = unsafe { chunk.cast::<I>().read_unaligned() };

    value
        .to_usize()
        .expect("indexes are only ever written from usize values")
}

/// # Safety
///
/// `chunk` must be valid for writes of `size_of::<I>()` bytes.
pub(crate) unsafe fn write_index<I: ChunkIndex>(chunk: NonNull<u8>, index: usize) {
    let value = <I as NumCast>::from(index)
        .expect("chunk count is validated against the index type when the block is created");

    // SAFETY: Forwarding guarantee from caller.
    unsafe {
        chunk.cast::<I>().write_unaligned(value);
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use new_zealand::nz;

    use super::*;

    const LINK_CHUNK: NonZero<usize> = NonZero::new(LINK_SIZE).unwrap();

    #[test]
    fn pointer_form_chains_addresses_in_order() {
        let chunk_size = LINK_CHUNK;
        let mut buffer = vec![0_u8; LINK_SIZE * 5];

        assert_eq!(init_chunk_range(&mut buffer, chunk_size), 5);

        for chunk in 0..4 {
            let next = chunk_link(&buffer, chunk_size, chunk).expect("not the last chunk");
            let expected = buffer[(chunk + 1) * LINK_SIZE..].as_ptr();

            assert_eq!(next.as_ptr().cast_const(), expected, "chunk {chunk}");
        }

        assert_eq!(chunk_link(&buffer, chunk_size, 4), None);
    }

    #[test]
    fn pointer_form_with_wide_chunks() {
        let chunk_size = NonZero::new(LINK_SIZE * 3).unwrap();
        let mut buffer = vec![0_u8; LINK_SIZE * 6];

        assert_eq!(init_chunk_range(&mut buffer, chunk_size), 2);

        let next = chunk_link(&buffer, chunk_size, 0).expect("first chunk links to second");
        assert_eq!(
            next.as_ptr().cast_const(),
            buffer[LINK_SIZE * 3..].as_ptr()
        );
        assert_eq!(chunk_link(&buffer, chunk_size, 1), None);
    }

    #[test]
    fn pointer_form_ignores_remainder() {
        let chunk_size = LINK_CHUNK;
        let mut buffer = vec![0xAB_u8; LINK_SIZE * 2 + 3];

        assert_eq!(init_chunk_range(&mut buffer, chunk_size), 2);
        assert_eq!(chunk_link(&buffer, chunk_size, 1), None);

        assert!(buffer[LINK_SIZE * 2..].iter().all(|b| *b == 0xAB));
    }

    #[test]
    fn pointer_form_on_empty_buffer_is_noop() {
        let mut buffer: [u8; 0] = [];

        assert_eq!(init_chunk_range(&mut buffer, LINK_CHUNK), 0);
    }

    #[test]
    #[should_panic]
    fn pointer_form_rejects_small_chunks() {
        let mut buffer = [0_u8; 16];

        _ = init_chunk_range(&mut buffer, NonZero::new(LINK_SIZE - 1).unwrap());
    }

    #[test]
    fn index_form_links_to_next_index() {
        let chunk_size = nz!(2);
        let mut buffer = [0_u8; 20];

        assert_eq!(init_chunk_index_range::<u16>(&mut buffer, chunk_size), 10);

        for chunk in 0..10 {
            assert_eq!(chunk_index::<u16>(&buffer, chunk_size, chunk), chunk + 1);
        }
    }

    #[test]
    fn index_form_with_narrow_index_in_wide_chunk() {
        let chunk_size = nz!(3);
        let mut buffer = [0xFF_u8; 9];

        assert_eq!(init_chunk_index_range::<u8>(&mut buffer, chunk_size), 3);

        assert_eq!(buffer, [1, 0xFF, 0xFF, 2, 0xFF, 0xFF, 3, 0xFF, 0xFF]);
    }

    #[test]
    fn index_form_accepts_largest_representable_count() {
        let mut buffer = [0_u8; 255];

        assert_eq!(init_chunk_index_range::<u8>(&mut buffer, nz!(1)), 255);
        assert_eq!(chunk_index::<u8>(&buffer, nz!(1), 254), 255);
    }

    #[test]
    #[should_panic]
    fn index_form_rejects_unrepresentable_sentinel() {
        let mut buffer = [0_u8; 256];

        _ = init_chunk_index_range::<u8>(&mut buffer, nz!(1));
    }

    #[test]
    #[should_panic]
    fn index_form_rejects_small_chunks() {
        let mut buffer = [0_u8; 12];

        _ = init_chunk_index_range::<u32>(&mut buffer, nz!(2));
    }

    #[test]
    #[should_panic]
    fn reading_out_of_bounds_chunk_panics() {
        let mut buffer = [0_u8; 4];
        _ = init_chunk_index_range::<u8>(&mut buffer, nz!(2));

        _ = chunk_index::<u8>(&buffer, nz!(2), 2);
    }

    #[test]
    #[should_panic]
    fn reading_index_wider_than_usize_panics() {
        // Not written by init_chunk_index_range(): an all-ones u128 exceeds every usize.
        let buffer = [0xFF_u8; 16];

        _ = chunk_index::<u128>(&buffer, nz!(16), 0);
    }

    #[test]
    fn raw_links_round_trip() {
        let mut buffer = [0_u8; LINK_SIZE * 2];
        let base = NonNull::from(&mut buffer).cast::<u8>();

        // SAFETY: Both chunks lie within the buffer and are LINK_SIZE bytes long.
        unsafe {
            let second = base.add(LINK_SIZE);
            write_link(base, Some(second));
            write_link(second, None);

            assert_eq!(read_link(base), Some(second));
            assert_eq!(read_link(second), None);
        }
    }
}
