//! Fixed-size object pools that carve large memory blocks into equal chunks and track the
//! vacant chunks with intrusive free lists stored inside the chunks themselves.
//!
//! Allocating many small objects of one type from the global allocator one at a time costs
//! a round trip per object and spreads the objects over the heap. The pools in this crate
//! instead allocate a block of many chunks at once and hand those chunks out one by one. A
//! vacant chunk stores the link to the next vacant chunk in its own bytes, so tracking free
//! space costs no memory beyond the chunks.
//!
//! There are two pools, and which one fits depends only on the size of the pooled type:
//!
//! * [`LinkedPool`] is for items at least as large as a pointer. Vacant chunks store the
//!   address of the next vacant chunk, forming one pool-wide free list. Both allocation and
//!   deallocation are O(1).
//! * [`IndexedPool`] is for items smaller than a pointer. Vacant chunks store the index of the
//!   next vacant chunk in the same block, using the widest unsigned integer that fits into the
//!   chunk. Allocation is O(1) and deallocation is O(number of blocks).
//!
//! Using a type with the wrong pool is a compile-time error, as is using a zero-sized type.
//! The [`ObjectPool`] trait covers what both pools have in common.
//!
//! Both pools grow by one block at a time and only when every chunk is occupied. Memory is
//! returned to the system only when a pool is dropped. Objects never move while they are in
//! a pool and the pools never hold references to their contents.
//!
//! # Handles
//!
//! Creating an object returns a [`Pooled<T>`] handle. The handle is the only way to reach the
//! object: access goes through `get()` and `get_mut()` on the pool that issued it and the
//! handle is consumed when the object is deleted. Each pool has a unique identity that its
//! handles carry, so a handle presented to the wrong pool is always detected.
//!
//! # Example
//!
//! ```
//! use chunk_pool::{IndexedPool, LinkedPool};
//! use new_zealand::nz;
//!
//! // u64 is pointer-sized on 64-bit targets.
//! let mut large = LinkedPool::<u64>::new(nz!(256));
//! // [u8; 3] is smaller than any pointer.
//! let mut small = IndexedPool::<[u8; 3]>::new(nz!(256));
//!
//! let a = large.new_object(1234);
//! let b = small.new_object([1, 2, 3]);
//!
//! assert_eq!(*large.get(&a), 1234);
//! assert_eq!(*small.get(&b), [1, 2, 3]);
//!
//! large.delete_object(a);
//! small.delete_object(b);
//! ```
//!
//! # Caller-managed buffers
//!
//! The free-list layout used inside the blocks is also available for memory the caller manages
//! itself, via [`init_chunk_range()`] and [`init_chunk_index_range()`] with the matching
//! readers [`chunk_link()`] and [`chunk_index()`].
//!
//! # Thread safety
//!
//! The pools are [`Send`] if `T` is [`Send`] but never [`Sync`]. All mutation requires an
//! exclusive reference to the pool; wrap it in a mutex to share it between threads.

mod block;
mod builder;
mod chunk_range;
mod drop_policy;
mod error;
mod indexed_block;
mod indexed_pool;
mod linked_block;
mod linked_pool;
mod object_pool;
mod pooled;
mod width;

pub(crate) use block::*;
pub use builder::*;
pub use chunk_range::*;
pub use drop_policy::*;
pub use error::*;
pub(crate) use indexed_block::*;
pub use indexed_pool::*;
pub(crate) use linked_block::*;
pub use linked_pool::*;
pub use object_pool::*;
pub use pooled::*;
pub use width::*;
