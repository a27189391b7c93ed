/// Determines what a pool does when the bucket for a request has no free block.
///
/// By default, the pool obtains a fresh block from the system allocator.
///
/// # Examples
///
/// ```
/// use bucket_pool::{BucketPool, Error, MissPolicy};
///
/// let pool = BucketPool::builder()
///     .miss_policy(MissPolicy::Signal)
///     .build();
///
/// // Nothing has been released yet, so there is nothing to reuse.
/// assert!(matches!(pool.make_owned(42_u32), Err(Error::PoolMiss { .. })));
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum MissPolicy {
    /// A miss is served by a fresh block from the system allocator. This is the default.
    #[default]
    Allocate,

    /// A miss is reported to the caller as [`Error::PoolMiss`][crate::Error::PoolMiss] and
    /// no memory is allocated.
    ///
    /// This may be valuable if the caller wants to cap memory usage at whatever has been
    /// released into the pool and decide for itself how to proceed when that runs out.
    Signal,
}
