/// Determines what happens to live objects that remain in a pool when the pool is dropped.
///
/// By default, the pool drops any remaining objects before releasing its blocks.
///
/// # Examples
///
/// ```
/// use chunk_pool::{DropPolicy, LinkedPool};
///
/// let pool = LinkedPool::<u64>::builder()
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Remaining objects are dropped when the pool is dropped. This is the default.
    #[default]
    MayDropItems,

    /// The pool panics if it still contains objects when it is dropped.
    ///
    /// Useful when objects are referenced out of band via [`Pooled::ptr()`][1] and must be
    /// deleted explicitly before the pool goes away.
    ///
    /// [1]: crate::Pooled::ptr
    MustNotDropItems,
}
