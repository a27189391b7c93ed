use std::ptr::{self, NonNull};

use tracing::trace;

use crate::array::ArrayHeader;
use crate::{ArrayLayout, Block, BucketPool, SizeClass};

/// The release callback bound into every [`PooledMut`][crate::PooledMut].
///
/// It knows the bucket the value came from and, for arrays, the element count, so nothing
/// needs to be recovered from raw memory when the value is destroyed. Running the deleter
/// consumes it, so each handle releases its block at most once.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Deleter {
    /// A single value stored at the start of the block.
    Single { size_class: SizeClass },

    /// An array of `layout.len()` elements stored at `layout.data_offset()`.
    Array { layout: ArrayLayout },
}

impl Deleter {
    pub(crate) fn size_class(self) -> SizeClass {
        match self {
            Self::Single { size_class } => size_class,
            Self::Array { layout } => layout.size_class(),
        }
    }

    /// Destroys the value(s) at `value` and returns their block to `pool`.
    ///
    /// If a destructor panics, the block is still returned to the pool while unwinding.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// 1. `value` points to fully initialized value(s) placed in a block as described by
    ///    this deleter (for arrays, `value` is the slice of all `layout.len()` elements).
    /// 2. Nothing accesses the value(s) or the block after this call.
    pub(crate) unsafe fn run<T: ?Sized>(self, value: NonNull<T>, pool: &BucketPool) {
        let block_base = match self {
            Self::Single { .. } => value.cast::<u8>(),
            Self::Array { layout } => {
                // SAFETY: The caller guarantees the elements were placed using this layout.
                let block_base = unsafe { layout.block_base(value.cast::<u8>()) };

                if layout.has_header() {
                    // SAFETY: Array blocks with a header always have it written before the
                    // handle is created.
                    let header = unsafe { ArrayHeader::read(block_base) };

                    debug_assert_eq!(
                        header.len(),
                        layout.len(),
                        "array header does not match the element count of the handle"
                    );
                }

                block_base
            }
        };

        trace!(
            bucket = self.size_class().index(),
            address = ?block_base,
            "destroying pooled value"
        );

        // SAFETY: The caller guarantees this is the only remaining claim on the block.
        let block = unsafe { Block::from_raw(block_base, self.size_class()) };
        let block = scopeguard::guard(block, |block| pool.release(block));

        // SAFETY: The caller guarantees the value(s) are initialized and never used again.
        // For slices this runs one destructor per element.
        unsafe {
            ptr::drop_in_place(value.as_ptr());
        }

        drop(block);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    /// Test helper that counts how many times it has been dropped.
    struct DropCounter {
        drops: Rc<Cell<usize>>,
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn single_deleter_drops_value_and_releases_block() {
        let pool = BucketPool::new();
        let drops = Rc::new(Cell::new(0));

        let size_class = SizeClass::of::<DropCounter>().unwrap();
        let block = pool.acquire(size_class).unwrap();
        let address = block.as_ptr();
        let value = block.into_raw().cast::<DropCounter>();

        // SAFETY: The block fits the value.
        unsafe {
            value.write(DropCounter {
                drops: Rc::clone(&drops),
            });
        }

        // SAFETY: The value was placed at the start of a block of this size class.
        unsafe {
            Deleter::Single { size_class }.run(value, &pool);
        }

        assert_eq!(drops.get(), 1);
        assert_eq!(pool.pooled_len(size_class), 1);
        assert_eq!(pool.try_acquire(size_class).unwrap().as_ptr(), address);
    }

    #[test]
    fn array_deleter_drops_every_element() {
        let pool = BucketPool::new();
        let drops = Rc::new(Cell::new(0));

        let layout = ArrayLayout::new::<DropCounter>(3).unwrap();
        let block = pool.acquire(layout.size_class()).unwrap();
        let base = block.into_raw();

        // SAFETY: The block matches the layout and is exclusively ours.
        let data = unsafe {
            ArrayHeader::write(base, 3);
            layout.data_ptr::<DropCounter>(base)
        };

        for index in 0..3 {
            // SAFETY: The index is within the array described by the layout.
            unsafe {
                data.add(index).write(DropCounter {
                    drops: Rc::clone(&drops),
                });
            }
        }

        let slice = NonNull::slice_from_raw_parts(data, 3);

        // SAFETY: All three elements are initialized and placed using the layout.
        unsafe {
            Deleter::Array { layout }.run(slice, &pool);
        }

        assert_eq!(drops.get(), 3);
        assert_eq!(pool.pooled_len(layout.size_class()), 1);
        assert_eq!(
            pool.try_acquire(layout.size_class()).unwrap().as_ptr(),
            base
        );
    }

    #[test]
    fn block_returns_to_pool_when_destructor_panics() {
        struct PanicOnDrop;

        impl Drop for PanicOnDrop {
            fn drop(&mut self) {
                panic!("destructor failure");
            }
        }

        let pool = BucketPool::new();
        let size_class = SizeClass::of::<PanicOnDrop>().unwrap();
        let value = pool
            .acquire(size_class)
            .unwrap()
            .into_raw()
            .cast::<PanicOnDrop>();

        // SAFETY: The block fits the value.
        unsafe {
            value.write(PanicOnDrop);
        }

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            // SAFETY: The value was placed at the start of a block of this size class.
            unsafe {
                Deleter::Single { size_class }.run(value, &pool);
            }
        }));

        assert!(result.is_err());
        assert_eq!(pool.pooled_len(size_class), 1);
    }

    #[test]
    fn array_block_returns_to_pool_when_element_destructor_panics() {
        struct MaybePanicOnDrop {
            panics: bool,
            drops: Rc<Cell<usize>>,
        }

        impl Drop for MaybePanicOnDrop {
            fn drop(&mut self) {
                self.drops.set(self.drops.get() + 1);
                assert!(!self.panics, "destructor failure");
            }
        }

        let pool = BucketPool::new();
        let drops = Rc::new(Cell::new(0));

        let values = pool
            .make_owned_array_with(3, |index| MaybePanicOnDrop {
                panics: index == 1,
                drops: Rc::clone(&drops),
            })
            .unwrap();
        let size_class = values.size_class();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| drop(values)));

        assert!(result.is_err());

        // The remaining elements are still dropped while unwinding.
        assert_eq!(drops.get(), 3);
        assert_eq!(pool.pooled_len(size_class), 1);
    }
}
