use std::fmt;
use std::ops::Deref;
use std::pin::Pin;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::{PooledMut, SizeClass};

/// Shared, reference-counted handle to a value (or slice of values) stored in a
/// [`BucketPool`][crate::BucketPool] block.
///
/// Cloning the handle adds another reference to the same value. The value is dropped and its
/// block goes back to the pool when the last clone is dropped.
///
/// Created via [`PooledMut::into_shared()`] or the `make_shared*` methods of the pool.
///
/// # Examples
///
/// ```
/// use bucket_pool::BucketPool;
///
/// let pool = BucketPool::new();
///
/// let value_handle = pool.make_shared(42_u32)?;
/// let cloned_handle = value_handle.clone();
///
/// // Value remains in use until all handles are dropped.
/// drop(value_handle);
/// assert_eq!(*cloned_handle, 42);
/// assert_eq!(pool.pooled_total(), 0);
///
/// drop(cloned_handle);
/// assert_eq!(pool.pooled_total(), 1);
/// # Ok::<(), bucket_pool::Error>(())
/// ```
///
/// # Thread safety
///
/// Like [`Arc<T>`], the handle is [`Send`] and [`Sync`] if `T` is both [`Send`] and
/// [`Sync`].
pub struct Pooled<T: ?Sized> {
    inner: Arc<PooledMut<T>>,
}

impl<T: ?Sized> Pooled<T> {
    pub(crate) fn new(inner: PooledMut<T>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Returns a pointer to the stored value.
    ///
    /// Other handles may refer to the same value, so the caller must only create shared
    /// references through this pointer. The pointer must not be used after the last handle
    /// is dropped.
    #[must_use]
    #[inline]
    pub fn ptr(&self) -> NonNull<T> {
        self.inner.ptr()
    }

    /// The size class of the block that holds the value.
    #[must_use]
    #[inline]
    pub fn size_class(&self) -> SizeClass {
        self.inner.size_class()
    }

    /// Returns a pinned reference to the value.
    #[must_use]
    #[inline]
    pub fn as_pin(&self) -> Pin<&T> {
        self.inner.as_pin()
    }

    /// Number of handles that currently refer to the value.
    #[must_use]
    #[inline]
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<T: ?Sized> Clone for Pooled<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized> Deref for Pooled<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T: ?Sized> From<PooledMut<T>> for Pooled<T> {
    fn from(value: PooledMut<T>) -> Self {
        Self::new(value)
    }
}

impl<T: ?Sized> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("ptr", &self.ptr())
            .field("size_class", &self.size_class())
            .field("handle_count", &self.handle_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::sync::Barrier;
    use std::thread;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::BucketPool;

    assert_impl_all!(Pooled<u32>: Send, Sync, Clone, fmt::Debug);
    assert_impl_all!(Pooled<[u8]>: Send, Sync, Clone);
    assert_not_impl_any!(Pooled<Cell<u32>>: Send, Sync);

    #[test]
    fn clones_share_the_value() {
        let pool = BucketPool::new();
        let first = pool.make_shared(String::from("shared")).unwrap();
        let second = first.clone();

        assert_eq!(first.ptr(), second.ptr());
        assert_eq!(first.handle_count(), 2);

        drop(first);
        assert_eq!(second.handle_count(), 1);
        assert_eq!(&*second, "shared");
    }

    #[test]
    fn from_exclusive_handle() {
        let pool = BucketPool::new();
        let exclusive = pool.make_owned(3_u8).unwrap();
        let address = exclusive.ptr();

        let shared = Pooled::from(exclusive);

        assert_eq!(shared.ptr(), address);
        assert_eq!(*shared.as_pin(), 3);
    }

    #[test]
    fn last_clone_on_another_thread_releases_block() {
        const THREADS: usize = 4;

        let pool = BucketPool::new();
        let shared = pool.make_shared_array::<u64>(16).unwrap();
        let barrier = Arc::new(Barrier::new(THREADS));

        let threads = (0..THREADS)
            .map(|_| {
                let shared = shared.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    assert_eq!(shared.iter().sum::<u64>(), 0);
                })
            })
            .collect::<Vec<_>>();

        drop(shared);

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(pool.pooled_total(), 1);
    }

    #[test]
    fn debug_marks_omitted_value() {
        struct Opaque;

        let pool = BucketPool::new();
        let shared = pool.make_shared(Opaque).unwrap();

        let output = format!("{shared:?}");
        assert!(output.starts_with("Pooled"));
        assert!(output.contains("handle_count: 1"));
        assert!(output.ends_with(", .. }"));
    }
}
