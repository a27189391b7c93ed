use std::alloc::{self, Layout};
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use crate::{BLOCK_ALIGNMENT, Error, Result, SizeClass};

/// A raw memory region whose capacity is exactly that of its [`SizeClass`].
///
/// A block is owned either by a pool (while it sits in a bucket) or by whoever acquired it.
/// The contents of a block are uninitialized from the point of view of the pool; the pool
/// never reads or drops anything stored in a block.
///
/// Blocks are returned to a pool via [`BucketPool::release()`][crate::BucketPool::release].
/// Dropping a block instead gives its memory straight back to the system allocator.
///
/// # Thread safety
///
/// A block is an exclusively owned allocation and may be moved and shared between threads.
#[derive(Debug)]
pub struct Block {
    ptr: NonNull<u8>,
    size_class: SizeClass,
}

impl Block {
    /// Obtains a fresh block from the system allocator.
    #[cfg_attr(test, mutants::skip)] // Allocation failure cannot be provoked in tests.
    pub(crate) fn allocate(size_class: SizeClass) -> Result<Self> {
        let layout = size_class.block_layout()?;

        // SAFETY: Block layouts always have a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };

        let ptr = NonNull::new(ptr).ok_or(Error::AllocationFailure {
            capacity: size_class.capacity(),
        })?;

        Ok(Self { ptr, size_class })
    }

    /// Reassembles a block from a pointer obtained via [`into_raw()`](Self::into_raw).
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// 1. `ptr` was returned by [`into_raw()`](Self::into_raw) on a block of `size_class`.
    /// 2. No other `Block` exists for the same memory, i.e. each `into_raw()` is matched by
    ///    at most one `from_raw()`.
    /// 3. Nothing that still lives in the memory region is accessed after the block is
    ///    released or dropped.
    #[must_use]
    pub unsafe fn from_raw(ptr: NonNull<u8>, size_class: SizeClass) -> Self {
        Self { ptr, size_class }
    }

    /// Gives up ownership of the block, returning a pointer to its first byte.
    ///
    /// The memory stays allocated until the pointer is turned back into a block with
    /// [`from_raw()`](Self::from_raw). Nothing tracks the pointer in the meantime; losing it
    /// leaks the block.
    #[must_use]
    pub fn into_raw(self) -> NonNull<u8> {
        ManuallyDrop::new(self).ptr
    }

    /// Returns a pointer to the first byte of the block.
    ///
    /// The pointer is aligned to [`BLOCK_ALIGNMENT`][crate::BLOCK_ALIGNMENT] and is valid for
    /// reads and writes of [`capacity()`](Self::capacity) bytes for as long as the block
    /// is owned by the caller.
    #[must_use]
    #[inline]
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// The size class this block belongs to.
    #[must_use]
    #[inline]
    pub fn size_class(&self) -> SizeClass {
        self.size_class
    }

    /// The number of bytes in the block.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.size_class.capacity()
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: A block only exists if `allocate()` succeeded for its size class (directly
        // or, via the `from_raw()` contract, for the block it was taken apart from), so the
        // size and alignment already formed a valid layout once.
        let layout = unsafe {
            Layout::from_size_align_unchecked(self.size_class.capacity(), BLOCK_ALIGNMENT)
        };

        // SAFETY: The pointer was allocated with this exact layout and is not used again.
        unsafe {
            alloc::dealloc(self.ptr.as_ptr(), layout);
        }
    }
}

// SAFETY: A block is an exclusively owned heap allocation; nothing else refers to it.
unsafe impl Send for Block {}

// SAFETY: Shared access to a block only exposes its address and size class.
unsafe impl Sync for Block {}
