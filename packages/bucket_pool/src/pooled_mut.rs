use std::fmt;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::ptr::NonNull;

use crate::{BucketPool, Deleter, Pooled, SizeClass};

/// Exclusive handle to a value (or slice of values) stored in a [`BucketPool`] block.
///
/// `PooledMut<T>` is the single owner of its value. It cannot be copied or cloned; ownership
/// moves with the handle. When the handle is dropped, the value is dropped (for slices, every
/// element is dropped) and the block goes back to the free list it came from.
///
/// The value never moves while it is in the pool, so pinned access is available through
/// [`as_pin()`](Self::as_pin) and [`as_pin_mut()`](Self::as_pin_mut).
///
/// Use [`into_shared()`](Self::into_shared) to convert the handle into a reference-counted
/// [`Pooled<T>`]. The conversion is one way.
///
/// # Examples
///
/// ```
/// use bucket_pool::BucketPool;
///
/// let pool = BucketPool::new();
///
/// let mut item = pool.make_owned("Hello".to_string())?;
///
/// // Direct access through Deref and DerefMut.
/// item.push_str(", World!");
/// assert_eq!(&*item, "Hello, World!");
///
/// // Dropping the handle drops the String and keeps the block for reuse.
/// drop(item);
/// assert_eq!(pool.pooled_total(), 1);
/// # Ok::<(), bucket_pool::Error>(())
/// ```
///
/// # Thread safety
///
/// The handle is [`Send`] if `T` is [`Send`] and [`Sync`] if `T` is [`Sync`], just like the
/// value it owns.
pub struct PooledMut<T: ?Sized> {
    ptr: NonNull<T>,
    deleter: Deleter,

    // Keeps the pool (and thus the free list the block returns to) alive.
    pool: BucketPool,
}

impl<T: ?Sized> PooledMut<T> {
    #[must_use]
    pub(crate) fn new(ptr: NonNull<T>, deleter: Deleter, pool: BucketPool) -> Self {
        Self { ptr, deleter, pool }
    }

    /// Returns a pointer to the stored value.
    ///
    /// The owner of the handle has exclusive access to the value and may create both `&`
    /// shared and `&mut` exclusive references to it, as long as Rust's aliasing rules are
    /// respected. The pointer must not be used after the handle is dropped.
    #[must_use]
    #[inline]
    pub fn ptr(&self) -> NonNull<T> {
        self.ptr
    }

    /// The size class of the block that holds the value.
    #[must_use]
    #[inline]
    pub fn size_class(&self) -> SizeClass {
        self.deleter.size_class()
    }

    /// Returns a pinned reference to the value.
    #[must_use]
    #[inline]
    pub fn as_pin(&self) -> Pin<&T> {
        // SAFETY: The value stays at the same address until the handle is dropped, and no
        // method of the handle moves it out.
        unsafe { Pin::new_unchecked(&**self) }
    }

    /// Returns a pinned exclusive reference to the value.
    #[must_use]
    #[inline]
    pub fn as_pin_mut(&mut self) -> Pin<&mut T> {
        // SAFETY: The value stays at the same address until the handle is dropped, and no
        // method of the handle moves it out.
        unsafe { Pin::new_unchecked(&mut **self) }
    }

    /// Converts this exclusive handle into a shared handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use bucket_pool::BucketPool;
    ///
    /// let pool = BucketPool::new();
    ///
    /// let shared = pool.make_owned(42_u64)?.into_shared();
    /// let copy = shared.clone();
    ///
    /// assert_eq!(*copy, 42);
    /// # Ok::<(), bucket_pool::Error>(())
    /// ```
    #[must_use]
    #[inline]
    pub fn into_shared(self) -> Pooled<T> {
        Pooled::new(self)
    }
}

impl<T: ?Sized> Deref for PooledMut<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        // SAFETY: The value is initialized for as long as the handle exists and the handle
        // grants shared access through a shared borrow of itself.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ?Sized> DerefMut for PooledMut<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: The value is initialized for as long as the handle exists and the handle
        // is its only owner, so an exclusive borrow of the handle is exclusive access.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: ?Sized> Drop for PooledMut<T> {
    fn drop(&mut self) {
        // SAFETY: The value was fully constructed before the handle was created, the
        // deleter describes how it was placed, and the handle is going away so nothing can
        // access the value afterwards.
        unsafe {
            self.deleter.run(self.ptr, &self.pool);
        }
    }
}

impl<T: ?Sized> fmt::Debug for PooledMut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledMut")
            .field("ptr", &self.ptr)
            .field("size_class", &self.size_class())
            .finish_non_exhaustive()
    }
}

// SAFETY: The handle owns its value, so it can move between threads whenever the value can.
// The pool it refers to is thread-safe.
unsafe impl<T: ?Sized + Send> Send for PooledMut<T> {}

// SAFETY: Shared access to the handle only grants shared access to the value.
unsafe impl<T: ?Sized + Sync> Sync for PooledMut<T> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(PooledMut<u32>: Send, Sync, fmt::Debug);
    assert_impl_all!(PooledMut<[String]>: Send, Sync);
    assert_impl_all!(PooledMut<Cell<u32>>: Send);
    assert_not_impl_any!(PooledMut<Cell<u32>>: Sync);
    assert_not_impl_any!(PooledMut<Rc<u32>>: Send, Sync);
    assert_not_impl_any!(PooledMut<u32>: Clone, Copy);

    #[test]
    fn deref_mut_changes_value() {
        let pool = BucketPool::new();
        let mut item = pool.make_owned(10_i32).unwrap();

        *item += 5;

        assert_eq!(*item, 15);
    }

    #[test]
    fn slice_handle_supports_indexing() {
        let pool = BucketPool::new();
        let mut items = pool.make_owned_array::<u64>(4).unwrap();

        items[2] = 7;

        assert_eq!(items.len(), 4);
        assert_eq!(&*items, &[0, 0, 7, 0]);
    }

    #[test]
    fn ptr_points_to_value() {
        let pool = BucketPool::new();
        let item = pool.make_owned(99_u16).unwrap();

        // SAFETY: The handle is alive and we only read.
        assert_eq!(unsafe { item.ptr().read() }, 99);
    }

    #[test]
    fn pinned_access() {
        let pool = BucketPool::new();
        let mut item = pool.make_owned(String::from("pinned")).unwrap();

        assert_eq!(&*item.as_pin(), "pinned");

        item.as_pin_mut().get_mut().push('!');
        assert_eq!(&*item, "pinned!");
    }

    #[test]
    fn handle_can_be_sent_to_another_thread() {
        let pool = BucketPool::new();
        let item = pool.make_owned(vec![1, 2, 3]).unwrap();

        let sum = std::thread::spawn(move || item.iter().sum::<i32>())
            .join()
            .unwrap();

        assert_eq!(sum, 6);
        assert_eq!(pool.pooled_total(), 1);
    }

    #[test]
    fn debug_does_not_require_debug_value() {
        struct Opaque;

        let pool = BucketPool::new();
        let item = pool.make_owned(Opaque).unwrap();

        let output = format!("{item:?}");
        assert!(output.starts_with("PooledMut"));
        assert!(output.ends_with(", .. }"));
    }
}
