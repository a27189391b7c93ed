use thiserror::Error;

use crate::{MAX_BLOCK_SIZE, SizeClass};

/// Errors that can occur when obtaining storage from a [`BucketPool`][crate::BucketPool].
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The requested storage does not fit into the largest bucket.
    ///
    /// This is detected before the system allocator is involved.
    #[error("a request for {requested} bytes exceeds the largest block size of {max} bytes", max = MAX_BLOCK_SIZE)]
    SizeClassOverflow {
        /// The number of bytes that was requested. Requests whose byte count does not
        /// even fit into `usize` are reported as `usize::MAX`.
        requested: usize,
    },

    /// The type to be stored requires a stricter alignment than any block provides.
    #[error("alignment of {align} bytes exceeds the block alignment of {max} bytes", max = crate::BLOCK_ALIGNMENT)]
    UnsupportedAlignment {
        /// The alignment required by the type.
        align: usize,
    },

    /// The pool had no free block and the system allocator could not provide a new one.
    #[error("the system allocator failed to provide a block of {capacity} bytes")]
    AllocationFailure {
        /// The capacity of the block that could not be allocated.
        capacity: usize,
    },

    /// The pool had no free block and is configured to report misses instead of
    /// allocating. See [`MissPolicy::Signal`][crate::MissPolicy::Signal].
    #[error("no free block available in {size_class}")]
    PoolMiss {
        /// The size class that had no free block.
        size_class: SizeClass,
    },
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug, Copy);

    #[test]
    fn overflow_message_names_limit() {
        let error = Error::SizeClassOverflow {
            requested: MAX_BLOCK_SIZE + 1,
        };

        let message = error.to_string();
        assert!(message.contains(&(MAX_BLOCK_SIZE + 1).to_string()));
        assert!(message.contains(&MAX_BLOCK_SIZE.to_string()));
    }

    #[test]
    fn pool_miss_names_bucket() {
        let size_class = SizeClass::for_size(24).unwrap();
        let error = Error::PoolMiss { size_class };

        assert!(error.to_string().contains("bucket 5"));
    }
}
