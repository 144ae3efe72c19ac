use std::fmt::Debug;

use num_traits::{PrimInt, Unsigned};

/// An unsigned integer type that can serve as the free-list link of an index-linked chunk.
///
/// Implemented for every primitive unsigned integer. The type used by [`IndexedPool`][1] is
/// chosen automatically from the size of the pooled type; this trait is only named directly
/// when calling [`init_chunk_index_range()`][2] on a caller-managed buffer.
///
/// [1]: crate::IndexedPool
/// [2]: crate::init_chunk_index_range
pub trait ChunkIndex: PrimInt + Unsigned + Debug {}

impl<I> ChunkIndex for I where I: PrimInt + Unsigned + Debug {}

/// The largest index value representable by `I`, saturated to `usize`.
#[must_use]
pub(crate) fn max_index<I: ChunkIndex>() -> usize {
    I::max_value().to_usize().unwrap_or(usize::MAX)
}

/// Marker for a bit width, mapped to an unsigned integer type by [`SelectUnsigned`].
#[derive(Debug)]
pub struct Bits<const N: u32>;

/// Maps a bit width to an unsigned integer type. See [`UnsignedOfBits`].
pub trait SelectUnsigned {
    /// The unsigned integer type of the selected width.
    type Unsigned: ChunkIndex;
}

impl SelectUnsigned for Bits<8> {
    type Unsigned = u8;
}

impl SelectUnsigned for Bits<16> {
    type Unsigned = u16;
}

impl SelectUnsigned for Bits<32> {
    type Unsigned = u32;
}

impl SelectUnsigned for Bits<64> {
    type Unsigned = u64;
}

impl SelectUnsigned for Bits<128> {
    type Unsigned = u128;
}

/// The unsigned integer type that is exactly `N` bits wide.
///
/// ```
/// use chunk_pool::UnsignedOfBits;
///
/// let index: UnsignedOfBits<16> = 513;
/// assert_eq!(size_of_val(&index), 2);
/// ```
pub type UnsignedOfBits<const N: u32> = <Bits<N> as SelectUnsigned>::Unsigned;

/// Width in bytes of the index stored in a free chunk of `chunk_size` bytes.
///
/// This is the largest power of two that does not exceed `chunk_size`, which keeps the link
/// as small as possible while guaranteeing that it fits into the chunk. Returns zero for a
/// zero-sized chunk.
///
/// ```
/// use chunk_pool::index_width_bytes;
///
/// assert_eq!(index_width_bytes(1), 1);
/// assert_eq!(index_width_bytes(3), 2);
/// assert_eq!(index_width_bytes(7), 4);
/// ```
#[must_use]
pub const fn index_width_bytes(chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }

    1_usize
        .checked_shl(chunk_size.ilog2())
        .expect("the base-2 logarithm of a usize is always less than usize::BITS")
}

#[cfg(test)]
#[allow(
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::any::TypeId;

    use super::*;

    #[test]
    fn selects_type_by_width() {
        assert_eq!(TypeId::of::<UnsignedOfBits<8>>(), TypeId::of::<u8>());
        assert_eq!(TypeId::of::<UnsignedOfBits<16>>(), TypeId::of::<u16>());
        assert_eq!(TypeId::of::<UnsignedOfBits<32>>(), TypeId::of::<u32>());
        assert_eq!(TypeId::of::<UnsignedOfBits<64>>(), TypeId::of::<u64>());
        assert_eq!(TypeId::of::<UnsignedOfBits<128>>(), TypeId::of::<u128>());
    }

    #[test]
    fn index_width_is_bit_floor() {
        let expected = [
            (0, 0),
            (1, 1),
            (2, 2),
            (3, 2),
            (4, 4),
            (5, 4),
            (7, 4),
            (8, 8),
            (9, 8),
            (16, 16),
            (17, 16),
        ];

        for (chunk_size, width) in expected {
            assert_eq!(
                index_width_bytes(chunk_size),
                width,
                "chunk size {chunk_size}"
            );
        }
    }

    #[test]
    fn index_width_of_largest_chunk_is_top_bit() {
        let top_bit = 1_usize << (usize::BITS - 1);

        assert_eq!(index_width_bytes(usize::MAX), top_bit);
        assert_eq!(index_width_bytes(top_bit), top_bit);
        assert_eq!(index_width_bytes(top_bit - 1), top_bit >> 1);
    }

    #[test]
    fn index_width_never_exceeds_chunk() {
        for chunk_size in 1..1024 {
            let width = index_width_bytes(chunk_size);
            assert!(width <= chunk_size);
            assert!(width.is_power_of_two());
            assert!(width * 2 > chunk_size);
        }
    }

    #[test]
    fn max_index_matches_type() {
        assert_eq!(max_index::<u8>(), 255);
        assert_eq!(max_index::<u16>(), 65_535);
        assert_eq!(max_index::<u128>(), usize::MAX);
    }
}
