use std::alloc::Layout;
use std::fmt;
use std::mem;

use crate::{Error, Result};

/// Number of buckets in every pool. Bucket `i` holds blocks of `2^i` bytes.
pub const BUCKET_COUNT: usize = 32;

/// Index of the largest bucket.
pub const MAX_BUCKET_INDEX: u8 = 31;

/// Capacity of the largest bucket, in bytes.
pub const MAX_BLOCK_SIZE: usize = 1 << MAX_BUCKET_INDEX;

/// Alignment of every block handed out by a pool.
///
/// Types with a stricter alignment requirement cannot be stored in a pool.
pub const BLOCK_ALIGNMENT: usize = 16;

/// Identifies one bucket of a pool: the set of blocks with capacity `2^index` bytes.
///
/// A size class is always the smallest power of two that can hold the request it was
/// derived from, so requests of 17 to 32 bytes all share [`SizeClass`] 5.
///
/// # Examples
///
/// ```
/// use bucket_pool::SizeClass;
///
/// let size_class = SizeClass::for_size(24)?;
/// assert_eq!(size_class.index(), 5);
/// assert_eq!(size_class.capacity(), 32);
/// # Ok::<(), bucket_pool::Error>(())
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SizeClass {
    index: u8,
}

impl SizeClass {
    /// Returns the size class of the smallest bucket that holds `bytes` bytes.
    ///
    /// A request for zero bytes is served from the smallest bucket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeClassOverflow`] if `bytes` is larger than [`MAX_BLOCK_SIZE`].
    pub fn for_size(bytes: usize) -> Result<Self> {
        // The bucket is one past the highest set bit of `bytes - 1`, except for the
        // requests of 0 and 1 bytes that have no such bit and go to bucket 0.
        let index = match bytes.saturating_sub(1).checked_ilog2() {
            None => 0,
            Some(highest_bit) => highest_bit.saturating_add(1),
        };

        Self::from_index(index).ok_or(Error::SizeClassOverflow { requested: bytes })
    }

    /// Returns the size class that stores a single value of type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedAlignment`] if `T` requires an alignment greater than
    /// [`BLOCK_ALIGNMENT`] or [`Error::SizeClassOverflow`] if `T` is too large.
    pub fn of<T>() -> Result<Self> {
        Self::for_layout(Layout::new::<T>())
    }

    /// Returns the size class that stores a value with the given layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedAlignment`] if the layout requires an alignment greater
    /// than [`BLOCK_ALIGNMENT`] or [`Error::SizeClassOverflow`] if it is too large.
    pub fn for_layout(layout: Layout) -> Result<Self> {
        if layout.align() > BLOCK_ALIGNMENT {
            return Err(Error::UnsupportedAlignment {
                align: layout.align(),
            });
        }

        Self::for_size(layout.size())
    }

    /// Returns the size class with the given bucket index, if the index is in range.
    #[must_use]
    pub fn from_index(index: impl TryInto<u8>) -> Option<Self> {
        index
            .try_into()
            .ok()
            .filter(|index| *index <= MAX_BUCKET_INDEX)
            .map(|index| Self { index })
    }

    /// Iterates over every size class in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..=MAX_BUCKET_INDEX).map(|index| Self { index })
    }

    /// The bucket index, in `0..=31`.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u8 {
        self.index
    }

    /// The capacity of every block in this size class, in bytes.
    #[must_use]
    #[inline]
    pub const fn capacity(self) -> usize {
        1 << self.index
    }

    /// The allocation layout used for blocks of this size class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the platform cannot describe an allocation of
    /// this capacity. On 32-bit targets this is the case for the largest bucket, whose
    /// capacity exceeds `isize::MAX`.
    pub(crate) fn block_layout(self) -> Result<Layout> {
        Layout::from_size_align(self.capacity(), BLOCK_ALIGNMENT).or(Err(
            Error::AllocationFailure {
                capacity: self.capacity(),
            },
        ))
    }

    /// Whether a value of type `T` can be placed at the start of a block of this size class.
    #[must_use]
    pub(crate) fn fits<T>(self) -> bool {
        mem::size_of::<T>() <= self.capacity() && mem::align_of::<T>() <= BLOCK_ALIGNMENT
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bucket {} ({} bytes)", self.index, self.capacity())
    }
}
