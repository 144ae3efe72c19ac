use std::any::type_name;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique pool IDs.
static POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a pool, carried by every handle the pool issues.
///
/// The identity travels with the pool when the pool is moved, unlike its address.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct PoolId(u64);

impl PoolId {
    #[must_use]
    pub(crate) fn generate() -> Self {
        Self(POOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exclusive handle to an object that lives in a [`LinkedPool`][1] or [`IndexedPool`][2].
///
/// The handle is returned by `new_object()` and consumed by `delete_object()` or
/// `take_object()`, so it cannot be used to delete the same object twice. It is not
/// [`Copy`] or [`Clone`].
///
/// Access to the object goes through the pool that issued the handle (`get()` and
/// `get_mut()`). A handle only works with the pool that issued it; presenting it to any
/// other pool is detected and rejected.
///
/// Dropping a handle without deleting the object leaves the object alive until the pool
/// itself is dropped, at which point the pool's [`DropPolicy`][3] applies.
///
/// [1]: crate::LinkedPool
/// [2]: crate::IndexedPool
/// [3]: crate::DropPolicy
pub struct Pooled<T> {
    /// Ensures this handle can only be returned to the pool it came from.
    pool_id: PoolId,

    ptr: NonNull<T>,
}

impl<T> Pooled<T> {
    #[must_use]
    pub(crate) fn new(pool_id: PoolId, ptr: NonNull<T>) -> Self {
        Self { pool_id, ptr }
    }

    /// Returns a pointer to the object.
    ///
    /// The object never moves while it is in the pool, so the pointer stays valid until the
    /// object is deleted or the pool is dropped. The owner of the handle may use the pointer
    /// for out of band access from unsafe code, as long as it does not create references
    /// that conflict with ones obtained from the pool via `get()` or `get_mut()`.
    ///
    /// # Example
    ///
    /// ```
    /// use chunk_pool::LinkedPool;
    ///
    /// let mut pool = LinkedPool::<u64>::default();
    /// let handle = pool.new_object(7);
    ///
    /// // SAFETY: The object is alive and no other references to it exist.
    /// let value = unsafe { handle.ptr().read() };
    /// assert_eq!(value, 7);
    ///
    /// pool.delete_object(handle);
    /// ```
    #[must_use]
    #[inline]
    pub fn ptr(&self) -> NonNull<T> {
        self.ptr
    }

    #[must_use]
    #[inline]
    pub(crate) fn pool_id(&self) -> PoolId {
        self.pool_id
    }
}

impl<T> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("pool_id", &self.pool_id)
            .field("ptr", &self.ptr)
            .finish()
    }
}

// SAFETY: The handle grants access to the object only through the issuing pool, which is
// itself Send only if T is Send. Moving the handle between threads moves nothing else.
unsafe impl<T: Send> Send for Pooled<T> {}

// SAFETY: A shared reference to the handle only exposes the pointer value, never the object.
unsafe impl<T: Sync> Sync for Pooled<T> {}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(Pooled<u64>: Send, Sync, fmt::Debug);
    assert_impl_all!(Pooled<String>: Send, Sync);
    assert_not_impl_any!(Pooled<u64>: Clone, Copy);
    assert_not_impl_any!(Pooled<Rc<u64>>: Send, Sync);

    #[test]
    fn pool_ids_are_unique() {
        let ids = (0..100).map(|_| PoolId::generate()).collect::<HashSet<_>>();

        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn debug_output_names_item_type() {
        let mut value = 5_u32;
        let handle = Pooled::new(PoolId::generate(), NonNull::from(&mut value));

        let output = format!("{handle:?}");
        assert!(output.contains("u32"));
    }
}
