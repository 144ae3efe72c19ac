use crate::{IndexedPool, LinkedPool, Pooled};

/// Operations shared by both pool flavors, for code that does not care how the pool tracks its
/// vacant chunks.
///
/// Which flavor fits depends only on the size of `T`: [`LinkedPool`] for items at least as
/// large as a pointer, [`IndexedPool`] for smaller ones.
///
/// # Examples
///
/// ```
/// use chunk_pool::{IndexedPool, LinkedPool, ObjectPool};
///
/// fn fill<P: ObjectPool<T>, T: Clone>(pool: &mut P, value: &T, count: usize) -> Vec<chunk_pool::Pooled<T>> {
///     (0..count).map(|_| pool.new_object(value.clone())).collect()
/// }
///
/// let mut small = IndexedPool::<u8>::default();
/// let mut large = LinkedPool::<u64>::default();
///
/// let small_handles = fill(&mut small, &1, 10);
/// let large_handles = fill(&mut large, &1, 10);
///
/// assert_eq!(small.len(), large.len());
/// # for handle in small_handles { small.delete_object(handle); }
/// # for handle in large_handles { large.delete_object(handle); }
/// ```
pub trait ObjectPool<T> {
    /// Moves `value` into the pool and returns a handle to it.
    fn new_object(&mut self, value: T) -> Pooled<T>;

    /// Drops the object and returns its chunk to the pool.
    ///
    /// # Panics
    ///
    /// Panics if the handle was issued by a different pool.
    fn delete_object(&mut self, handle: Pooled<T>);

    /// Borrows the object behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle was issued by a different pool.
    fn get(&self, handle: &Pooled<T>) -> &T;

    /// Exclusively borrows the object behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle was issued by a different pool.
    fn get_mut(&mut self, handle: &Pooled<T>) -> &mut T;

    /// The number of live objects in the pool.
    fn len(&self) -> usize;

    /// Whether the pool contains no live objects.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of objects the pool can hold without allocating another block.
    fn capacity(&self) -> usize;

    /// The number of blocks allocated so far.
    fn block_count(&self) -> usize;
}

impl<T> ObjectPool<T> for LinkedPool<T> {
    fn new_object(&mut self, value: T) -> Pooled<T> {
        Self::new_object(self, value)
    }

    fn delete_object(&mut self, handle: Pooled<T>) {
        Self::delete_object(self, handle);
    }

    fn get(&self, handle: &Pooled<T>) -> &T {
        Self::get(self, handle)
    }

    fn get_mut(&mut self, handle: &Pooled<T>) -> &mut T {
        Self::get_mut(self, handle)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn capacity(&self) -> usize {
        Self::capacity(self)
    }

    fn block_count(&self) -> usize {
        Self::block_count(self)
    }
}

impl<T> ObjectPool<T> for IndexedPool<T> {
    fn new_object(&mut self, value: T) -> Pooled<T> {
        Self::new_object(self, value)
    }

    fn delete_object(&mut self, handle: Pooled<T>) {
        Self::delete_object(self, handle);
    }

    fn get(&self, handle: &Pooled<T>) -> &T {
        Self::get(self, handle)
    }

    fn get_mut(&mut self, handle: &Pooled<T>) -> &mut T {
        Self::get_mut(self, handle)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn capacity(&self) -> usize {
        Self::capacity(self)
    }

    fn block_count(&self) -> usize {
        Self::block_count(self)
    }
}

#[cfg(test)]
mod tests {
    use new_zealand::nz;

    use super::*;

    fn churn<P: ObjectPool<u16>>(pool: &mut P) {
        let handles = (0..10).map(|x| pool.new_object(x)).collect::<Vec<_>>();

        for (expected, handle) in (0..10).zip(&handles) {
            assert_eq!(*pool.get(handle), expected);
            *pool.get_mut(handle) += 1;
        }

        assert_eq!(pool.len(), 10);
        assert!(!pool.is_empty());
        assert!(pool.capacity() >= 10);

        for handle in handles {
            pool.delete_object(handle);
        }

        assert!(pool.is_empty());
    }

    #[test]
    fn both_pools_behave_alike() {
        let mut indexed = IndexedPool::<u16>::new(nz!(3));
        churn(&mut indexed);
        assert_eq!(ObjectPool::block_count(&indexed), 4);

        // u16 is too small for pointer links, so exercise the linked pool with a wider item.
        let mut linked = LinkedPool::<u64>::new(nz!(3));
        let handle = ObjectPool::new_object(&mut linked, 5);
        assert_eq!(*ObjectPool::get(&linked, &handle), 5);
        ObjectPool::delete_object(&mut linked, handle);
        assert_eq!(ObjectPool::block_count(&linked), 1);
    }
}
