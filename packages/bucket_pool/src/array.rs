use std::mem;
use std::ptr::NonNull;

use crate::{BLOCK_ALIGNMENT, Error, Result, SizeClass};

/// Metadata word stored at offset 0 of an array block whose element type needs dropping.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub(crate) struct ArrayHeader {
    len: usize,
}

impl ArrayHeader {
    pub(crate) const SIZE: usize = mem::size_of::<Self>();

    pub(crate) fn len(self) -> usize {
        self.len
    }

    /// # Safety
    ///
    /// `block_base` must be the start of a block of at least [`Self::SIZE`] bytes that the
    /// caller owns.
    pub(crate) unsafe fn write(block_base: NonNull<u8>, len: usize) {
        // SAFETY: Blocks are aligned to BLOCK_ALIGNMENT, which satisfies the header alignment,
        // and the caller guarantees the block is large enough and owned by them.
        unsafe {
            block_base.cast::<Self>().write(Self { len });
        }
    }

    /// # Safety
    ///
    /// `block_base` must be the start of a block whose header was written by
    /// [`write()`](Self::write).
    pub(crate) unsafe fn read(block_base: NonNull<u8>) -> Self {
        // SAFETY: Forwarding the caller's guarantee that a header lives here.
        unsafe { block_base.cast::<Self>().read() }
    }
}

/// Describes where the elements of an array live inside a block.
///
/// Arrays whose element type needs dropping start with a one-word header that records the
/// element count, followed by padding up to the element alignment, followed by the
/// elements. Arrays of other element types have no header and the elements start at the
/// beginning of the block.
///
/// # Examples
///
/// ```
/// use bucket_pool::ArrayLayout;
///
/// // Three 8-byte elements that need dropping: 8 header bytes + 24 data bytes.
/// let layout = ArrayLayout::new::<String>(3)?;
/// # #[cfg(target_pointer_width = "64")]
/// # {
/// assert!(layout.has_header());
/// assert_eq!(layout.data_offset(), 8);
/// assert_eq!(layout.size_class().capacity(), 128);
/// # }
///
/// // Plain data needs no header.
/// let layout = ArrayLayout::new::<u64>(3)?;
/// assert!(!layout.has_header());
/// assert_eq!(layout.size_class().capacity(), 32);
/// # Ok::<(), bucket_pool::Error>(())
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ArrayLayout {
    len: usize,
    data_offset: usize,
    total_size: usize,
    size_class: SizeClass,
}

impl ArrayLayout {
    /// Calculates the layout of an array of `len` elements of type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedAlignment`] if `T` requires an alignment greater than
    /// [`BLOCK_ALIGNMENT`] or [`Error::SizeClassOverflow`] if the array does not fit into
    /// the largest bucket.
    pub fn new<T>(len: usize) -> Result<Self> {
        let align = mem::align_of::<T>();

        if align > BLOCK_ALIGNMENT {
            return Err(Error::UnsupportedAlignment { align });
        }

        let data_offset = if mem::needs_drop::<T>() {
            ArrayHeader::SIZE.next_multiple_of(align)
        } else {
            0
        };

        let total_size = mem::size_of::<T>()
            .checked_mul(len)
            .and_then(|data_size| data_size.checked_add(data_offset))
            .ok_or(Error::SizeClassOverflow {
                requested: usize::MAX,
            })?;

        Ok(Self {
            len,
            data_offset,
            total_size,
            size_class: SizeClass::for_size(total_size)?,
        })
    }

    /// Number of elements in the array.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array has no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the block starts with a header recording the element count.
    #[must_use]
    #[inline]
    pub fn has_header(&self) -> bool {
        self.data_offset != 0
    }

    /// Offset of the first element from the start of the block, in bytes.
    #[must_use]
    #[inline]
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Number of bytes used, including the header.
    #[must_use]
    #[inline]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// The size class of the blocks that can hold the array.
    #[must_use]
    #[inline]
    pub fn size_class(&self) -> SizeClass {
        self.size_class
    }

    /// Returns a pointer to the first element, given the start of the block.
    ///
    /// # Safety
    ///
    /// `block_base` must point to the start of a block of at least
    /// [`size_class()`](Self::size_class) capacity.
    #[must_use]
    pub(crate) unsafe fn data_ptr<T>(&self, block_base: NonNull<u8>) -> NonNull<T> {
        // SAFETY: The offset stays inside the block per the caller's guarantee.
        unsafe { block_base.add(self.data_offset).cast::<T>() }
    }

    /// Returns the start of the block, given a pointer to the first element.
    ///
    /// # Safety
    ///
    /// `data` must have been obtained from [`data_ptr()`](Self::data_ptr) of this layout.
    #[must_use]
    pub(crate) unsafe fn block_base<T>(&self, data: NonNull<T>) -> NonNull<u8> {
        // SAFETY: Reverses the offset applied by data_ptr().
        unsafe { data.cast::<u8>().sub(self.data_offset) }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::Block;

    #[allow(dead_code, reason = "only the layout matters")]
    struct NeedsDrop(u64);

    impl Drop for NeedsDrop {
        fn drop(&mut self) {}
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn header_size_is_one_word() {
        assert_eq!(ArrayHeader::SIZE, 8);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn three_droppable_words_fill_bucket_five() {
        let layout = ArrayLayout::new::<NeedsDrop>(3).unwrap();

        assert!(layout.has_header());
        assert_eq!(layout.data_offset(), 8);
        assert_eq!(layout.total_size(), 3 * 8 + 8);
        assert_eq!(layout.size_class().index(), 5);
        assert_eq!(layout.len(), 3);
    }

    #[test]
    fn plain_data_has_no_header() {
        let layout = ArrayLayout::new::<u64>(3).unwrap();

        assert!(!layout.has_header());
        assert_eq!(layout.data_offset(), 0);
        assert_eq!(layout.total_size(), 24);
        assert_eq!(layout.size_class().index(), 5);
    }

    #[test]
    fn header_padding_respects_element_alignment() {
        #[repr(align(16))]
        #[allow(dead_code, reason = "only the layout matters")]
        struct Wide(Vec<u8>);

        let layout = ArrayLayout::new::<Wide>(1).unwrap();

        assert_eq!(layout.data_offset(), 16);
        assert_eq!(layout.total_size(), 16 + size_of::<Wide>());
    }

    #[test]
    fn empty_array_still_has_a_size_class() {
        let layout = ArrayLayout::new::<u32>(0).unwrap();

        assert!(layout.is_empty());
        assert_eq!(layout.total_size(), 0);
        assert_eq!(layout.size_class().index(), 0);
    }

    #[test]
    fn overflowing_element_count_is_rejected() {
        assert_eq!(
            ArrayLayout::new::<u64>(usize::MAX),
            Err(Error::SizeClassOverflow {
                requested: usize::MAX
            })
        );
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn array_larger_than_biggest_bucket_is_rejected() {
        let len = crate::MAX_BLOCK_SIZE / 8 + 1;

        assert_eq!(
            ArrayLayout::new::<u64>(len),
            Err(Error::SizeClassOverflow {
                requested: len * 8
            })
        );
    }

    #[test]
    fn over_aligned_elements_are_rejected() {
        #[repr(align(32))]
        #[allow(dead_code, reason = "only the layout matters")]
        struct OverAligned;

        assert_eq!(
            ArrayLayout::new::<OverAligned>(2),
            Err(Error::UnsupportedAlignment { align: 32 })
        );
    }

    #[test]
    fn header_round_trips_through_block() {
        let layout = ArrayLayout::new::<NeedsDrop>(3).unwrap();
        let block = Block::allocate(layout.size_class()).unwrap();

        // SAFETY: The block is ours and larger than a header.
        unsafe {
            ArrayHeader::write(block.as_ptr(), layout.len());
        }

        // SAFETY: We just wrote the header.
        let header = unsafe { ArrayHeader::read(block.as_ptr()) };
        assert_eq!(header.len(), 3);

        // SAFETY: The block has the capacity required by the layout.
        let data = unsafe { layout.data_ptr::<NeedsDrop>(block.as_ptr()) };
        assert_eq!(
            data.cast::<u8>().as_ptr().addr() - block.as_ptr().as_ptr().addr(),
            layout.data_offset()
        );

        // SAFETY: The data pointer came from this layout.
        let base = unsafe { layout.block_base(data) };
        assert_eq!(base, block.as_ptr());
    }
}
