use std::any::type_name;
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use scopeguard::ScopeGuard;
use tracing::{debug, trace};

use crate::array::ArrayHeader;
use crate::{
    ArrayLayout, Block, BucketPoolBuilder, Deleter, Diagnostics, Error, FreeList, MissPolicy,
    Pooled, PooledMut, Result, ReuseStats, SizeClass,
};

/// A thread-safe pool that recycles memory blocks by power-of-two size class.
///
/// The pool keeps one free list per size class. Values are placed into blocks taken from the
/// matching free list when one is available and into fresh blocks from the system allocator
/// otherwise. When the handle owning a value is dropped, the value is destroyed and its block
/// goes back onto its free list, ready for the next value of a similar size.
///
/// Blocks only ever return to the system allocator through [`reclaim_all()`](Self::reclaim_all),
/// which also runs automatically once the pool and every handle created from it are gone.
///
/// This type acts as a cloneable handle to a shared pool instance. Every value handle also
/// keeps the pool alive, so values may outlive the `BucketPool` they were created from.
///
/// # Thread safety
///
/// This type is thread-safe. Each size class has its own lock, so operations on different
/// size classes never wait for each other.
///
/// # Examples
///
/// ```
/// use bucket_pool::BucketPool;
///
/// let pool = BucketPool::new();
///
/// let greeting = pool.make_owned("hello".to_string())?;
/// assert_eq!(*greeting, "hello");
///
/// let numbers = pool.make_owned_array_with(4, |index| index * 10)?;
/// assert_eq!(&*numbers, &[0, 10, 20, 30]);
///
/// // Dropping the handles destroys the values and keeps their blocks for reuse.
/// drop(greeting);
/// drop(numbers);
/// assert_eq!(pool.pooled_total(), 2);
///
/// // Gives the pooled blocks back to the system allocator.
/// assert_eq!(pool.reclaim_all(), 2);
/// # Ok::<(), bucket_pool::Error>(())
/// ```
#[derive(Clone)]
pub struct BucketPool {
    core: Arc<PoolCore>,
}

struct PoolCore {
    free_list: FreeList,
    diagnostics: Diagnostics,
    miss_policy: MissPolicy,
}

impl BucketPool {
    /// Creates a new pool with default configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use bucket_pool::BucketPool;
    ///
    /// let pool = BucketPool::new();
    /// assert_eq!(pool.pooled_total(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder for creating a pool with custom configuration.
    pub fn builder() -> BucketPoolBuilder {
        BucketPoolBuilder::new()
    }

    pub(crate) fn new_inner(miss_policy: MissPolicy) -> Self {
        debug!(?miss_policy, "creating bucket pool");

        Self {
            core: Arc::new(PoolCore {
                free_list: FreeList::new(),
                diagnostics: Diagnostics::default(),
                miss_policy,
            }),
        }
    }

    /// The policy applied when an acquisition finds no free block.
    #[must_use]
    pub fn miss_policy(&self) -> MissPolicy {
        self.core.miss_policy
    }

    /// Takes a free block of the given size class, if the pool has one.
    ///
    /// This never allocates, regardless of the [miss policy][MissPolicy]. The most recently
    /// released block is returned first. The attempt is counted in [`stats()`](Self::stats).
    ///
    /// The block is uninitialized memory owned by the caller. Give it back with
    /// [`release()`](Self::release) or turn it into a value handle with
    /// [`wrap()`](Self::wrap) / [`wrap_array()`](Self::wrap_array).
    ///
    /// # Examples
    ///
    /// ```
    /// use bucket_pool::{BucketPool, SizeClass};
    ///
    /// let pool = BucketPool::new();
    /// let size_class = SizeClass::for_size(24)?;
    ///
    /// assert!(pool.try_acquire(size_class).is_none());
    ///
    /// let block = pool.acquire(size_class)?;
    /// let address = block.as_ptr();
    /// pool.release(block);
    ///
    /// let block = pool.try_acquire(SizeClass::for_size(20)?).unwrap();
    /// assert_eq!(block.as_ptr(), address);
    /// # Ok::<(), bucket_pool::Error>(())
    /// ```
    #[must_use]
    pub fn try_acquire(&self, size_class: SizeClass) -> Option<Block> {
        let block = self.core.free_list.pop(size_class);
        self.core.diagnostics.record_acquisition(block.is_some());
        block
    }

    /// Obtains a block of the given size class.
    ///
    /// A free block is reused if available. Otherwise, the [miss policy][MissPolicy] decides
    /// whether a fresh block is allocated. The attempt is counted in [`stats()`](Self::stats).
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the system allocator cannot provide a fresh
    /// block and [`Error::PoolMiss`] if there is no free block and the miss policy is
    /// [`MissPolicy::Signal`].
    pub fn acquire(&self, size_class: SizeClass) -> Result<Block> {
        if let Some(block) = self.try_acquire(size_class) {
            return Ok(block);
        }

        match self.core.miss_policy {
            MissPolicy::Allocate => {
                let block = Block::allocate(size_class)?;
                self.core.diagnostics.record_fresh_allocation();

                trace!(
                    bucket = size_class.index(),
                    address = ?block.as_ptr(),
                    "allocated fresh block"
                );

                Ok(block)
            }
            MissPolicy::Signal => Err(Error::PoolMiss { size_class }),
        }
    }

    /// Returns a block to the free list of its size class.
    ///
    /// Any value that was placed into the block must already have been destroyed or moved
    /// out. The pool never drops the contents of a block.
    pub fn release(&self, block: Block) {
        self.core.free_list.push(block);
    }

    /// Gives every pooled block back to the system allocator, returning how many were freed.
    ///
    /// Buckets are drained one after another in ascending order. Blocks held by live handles
    /// are not affected; they return to the (now empty) free lists when their handles are
    /// dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use bucket_pool::BucketPool;
    ///
    /// let pool = BucketPool::new();
    /// drop(pool.make_owned(1_u8)?);
    /// drop(pool.make_owned(2_u64)?);
    ///
    /// assert_eq!(pool.reclaim_all(), 2);
    /// assert_eq!(pool.pooled_total(), 0);
    /// # Ok::<(), bucket_pool::Error>(())
    /// ```
    pub fn reclaim_all(&self) -> usize {
        self.core.reclaim_all()
    }

    /// Returns a snapshot of the reuse counters.
    #[must_use]
    pub fn stats(&self) -> ReuseStats {
        self.core.diagnostics.snapshot()
    }

    /// Number of free blocks of the given size class currently held by the pool.
    #[must_use]
    pub fn pooled_len(&self, size_class: SizeClass) -> usize {
        self.core.free_list.len(size_class)
    }

    /// Number of free blocks of all size classes currently held by the pool.
    #[must_use]
    pub fn pooled_total(&self) -> usize {
        self.core.free_list.total_len()
    }

    /// Places `value` into a pooled block and returns an exclusive handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeClassOverflow`] or [`Error::UnsupportedAlignment`] if `T` cannot
    /// be stored in any bucket, and otherwise the errors of [`acquire()`](Self::acquire).
    /// The value is dropped if an error is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use bucket_pool::BucketPool;
    ///
    /// let pool = BucketPool::new();
    ///
    /// let mut item = pool.make_owned(vec![1, 2, 3])?;
    /// item.push(4);
    /// assert_eq!(item.len(), 4);
    /// # Ok::<(), bucket_pool::Error>(())
    /// ```
    pub fn make_owned<T>(&self, value: T) -> Result<PooledMut<T>> {
        self.make_owned_with(|| value)
    }

    /// Constructs a value directly in a pooled block and returns an exclusive handle to it.
    ///
    /// The block is acquired before `f` is called. If `f` panics, the block goes back to
    /// the pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeClassOverflow`] or [`Error::UnsupportedAlignment`] if `T` cannot
    /// be stored in any bucket, and otherwise the errors of [`acquire()`](Self::acquire).
    /// `f` is not called if an error is returned.
    pub fn make_owned_with<T>(&self, f: impl FnOnce() -> T) -> Result<PooledMut<T>> {
        let block = self.acquire(SizeClass::of::<T>()?)?;
        let block = scopeguard::guard(block, |block| self.release(block));

        // SAFETY: The block belongs to the size class of T, so it is large and aligned enough.
        unsafe {
            block.as_ptr().cast::<T>().write(f());
        }

        let block = ScopeGuard::into_inner(block);

        // SAFETY: We just initialized a T at the start of the block.
        Ok(unsafe { self.wrap(block) })
    }

    /// Places `len` default values into a pooled block and returns an exclusive handle to the
    /// resulting slice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeClassOverflow`] or [`Error::UnsupportedAlignment`] if the array
    /// cannot be stored in any bucket, and otherwise the errors of
    /// [`acquire()`](Self::acquire).
    ///
    /// # Examples
    ///
    /// ```
    /// use bucket_pool::BucketPool;
    ///
    /// let pool = BucketPool::new();
    ///
    /// let mut names = pool.make_owned_array::<String>(3)?;
    /// names[1].push_str("middle");
    /// assert_eq!(&*names, &["", "middle", ""]);
    /// # Ok::<(), bucket_pool::Error>(())
    /// ```
    pub fn make_owned_array<T: Default>(&self, len: usize) -> Result<PooledMut<[T]>> {
        self.make_owned_array_with(len, |_| T::default())
    }

    /// Constructs `len` values directly in a pooled block and returns an exclusive handle to
    /// the resulting slice. `f` is called with the index of each element, in order.
    ///
    /// If `f` panics, the elements constructed so far are dropped and the block goes back to
    /// the pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeClassOverflow`] or [`Error::UnsupportedAlignment`] if the array
    /// cannot be stored in any bucket, and otherwise the errors of
    /// [`acquire()`](Self::acquire). `f` is not called if an error is returned.
    pub fn make_owned_array_with<T>(
        &self,
        len: usize,
        mut f: impl FnMut(usize) -> T,
    ) -> Result<PooledMut<[T]>> {
        let layout = ArrayLayout::new::<T>(len)?;
        let block = self.acquire(layout.size_class())?;

        // SAFETY: The block has the capacity required by the layout.
        let data = unsafe { layout.data_ptr::<T>(block.as_ptr()) };

        let mut progress = scopeguard::guard((block, 0_usize), |(block, initialized)| {
            // SAFETY: Exactly the first `initialized` elements have been written.
            unsafe {
                ptr::drop_in_place(ptr::slice_from_raw_parts_mut(data.as_ptr(), initialized));
            }

            self.release(block);
        });

        for index in 0..len {
            // SAFETY: The index is within the array described by the layout.
            unsafe {
                data.add(index).write(f(index));
            }

            progress.1 = index.wrapping_add(1);
        }

        let (block, _) = ScopeGuard::into_inner(progress);

        // SAFETY: All `len` elements are initialized at the positions given by the layout.
        Ok(unsafe { self.wrap_array(block, layout) })
    }

    /// Places `value` into a pooled block and returns a shared handle to it.
    ///
    /// Equivalent to [`make_owned()`](Self::make_owned) followed by
    /// [`into_shared()`](PooledMut::into_shared).
    ///
    /// # Errors
    ///
    /// Same as [`make_owned()`](Self::make_owned).
    pub fn make_shared<T>(&self, value: T) -> Result<Pooled<T>> {
        self.make_owned(value).map(PooledMut::into_shared)
    }

    /// Places `len` default values into a pooled block and returns a shared handle to the
    /// resulting slice.
    ///
    /// # Errors
    ///
    /// Same as [`make_owned_array()`](Self::make_owned_array).
    pub fn make_shared_array<T: Default>(&self, len: usize) -> Result<Pooled<[T]>> {
        self.make_owned_array(len).map(PooledMut::into_shared)
    }

    /// Takes ownership of a value that the caller constructed at the start of `block`.
    ///
    /// When the returned handle is dropped, the value is dropped and the block is released
    /// to this pool.
    ///
    /// # Panics
    ///
    /// Panics if the block is too small for `T` or `T` requires stricter alignment than
    /// blocks provide.
    ///
    /// # Safety
    ///
    /// The caller must ensure that a fully initialized `T` is stored at the start of the
    /// block and that nothing else accesses it except through the returned handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use bucket_pool::BucketPool;
    ///
    /// let pool = BucketPool::new();
    ///
    /// let block = pool.acquire(bucket_pool::SizeClass::of::<u64>()?)?;
    ///
    /// // SAFETY: The block was acquired for the size class of u64.
    /// unsafe { block.as_ptr().cast::<u64>().write(13) };
    ///
    /// // SAFETY: We initialized a u64 at the start of the block.
    /// let item = unsafe { pool.wrap::<u64>(block) };
    /// assert_eq!(*item, 13);
    /// # Ok::<(), bucket_pool::Error>(())
    /// ```
    #[must_use]
    pub unsafe fn wrap<T>(&self, block: Block) -> PooledMut<T> {
        assert!(
            block.size_class().fits::<T>(),
            "{} does not fit into {}",
            type_name::<T>(),
            block.size_class()
        );

        let deleter = Deleter::Single {
            size_class: block.size_class(),
        };

        PooledMut::new(block.into_raw().cast::<T>(), deleter, self.clone())
    }

    /// Takes ownership of an array that the caller constructed in `block`.
    ///
    /// The caller places `layout.len()` elements starting at `layout.data_offset()`. This
    /// writes the array header (if the layout has one) and returns a handle to the slice.
    /// When the handle is dropped, every element is dropped and the block is released to
    /// this pool.
    ///
    /// # Panics
    ///
    /// Panics if the block does not belong to the size class of the layout.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// 1. `layout` was created by [`ArrayLayout::new::<T>()`](ArrayLayout::new).
    /// 2. All `layout.len()` elements are fully initialized at the positions given by the
    ///    layout, and nothing else accesses them except through the returned handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use bucket_pool::{ArrayLayout, BucketPool};
    ///
    /// let pool = BucketPool::new();
    ///
    /// let layout = ArrayLayout::new::<u32>(3)?;
    /// let block = pool.acquire(layout.size_class())?;
    ///
    /// // SAFETY: The block was acquired for the size class of the layout.
    /// unsafe {
    ///     let data = block.as_ptr().add(layout.data_offset()).cast::<u32>();
    ///     for (index, value) in [11, 12, 13].into_iter().enumerate() {
    ///         data.add(index).write(value);
    ///     }
    /// }
    ///
    /// // SAFETY: The layout is for u32 and all three elements are initialized.
    /// let items = unsafe { pool.wrap_array::<u32>(block, layout) };
    /// assert_eq!(&*items, &[11, 12, 13]);
    /// # Ok::<(), bucket_pool::Error>(())
    /// ```
    #[must_use]
    pub unsafe fn wrap_array<T>(&self, block: Block, layout: ArrayLayout) -> PooledMut<[T]> {
        assert_eq!(
            block.size_class(),
            layout.size_class(),
            "block does not belong to the size class of the array layout"
        );

        let base = block.into_raw();

        if layout.has_header() {
            // SAFETY: The block is ours and large enough for the header per the layout.
            unsafe {
                ArrayHeader::write(base, layout.len());
            }
        }

        // SAFETY: The block has the capacity required by the layout.
        let data = unsafe { layout.data_ptr::<T>(base) };

        PooledMut::new(
            NonNull::slice_from_raw_parts(data, layout.len()),
            Deleter::Array { layout },
            self.clone(),
        )
    }
}

impl Default for BucketPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BucketPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("miss_policy", &self.core.miss_policy)
            .field("free_list", &self.core.free_list)
            .field("stats", &self.core.diagnostics.snapshot())
            .finish()
    }
}

impl PoolCore {
    fn reclaim_all(&self) -> usize {
        let reclaimed = self.free_list.reclaim_all();
        self.diagnostics.record_reclaimed(reclaimed);
        reclaimed
    }
}

impl Drop for PoolCore {
    fn drop(&mut self) {
        let reclaimed = self.reclaim_all();
        debug!(reclaimed, "bucket pool dropped");
    }
}
