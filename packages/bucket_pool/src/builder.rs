use std::cell::Cell;
use std::marker::PhantomData;

use crate::{BucketPool, MissPolicy};

/// Builder for creating an instance of [`BucketPool`].
///
/// All settings are optional.
///
/// # Examples
///
/// ```
/// use bucket_pool::{BucketPool, MissPolicy};
///
/// let pool = BucketPool::builder()
///     .miss_policy(MissPolicy::Allocate)
///     .build();
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) and can be safely transferred between threads,
/// allowing pool configuration to happen on different threads than where the pool is used.
/// However, it is not thread-safe ([`Sync`]) as it contains mutable configuration state.
#[derive(Debug)]
#[must_use]
pub struct BucketPoolBuilder {
    miss_policy: MissPolicy,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl BucketPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            miss_policy: MissPolicy::default(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the [miss policy][MissPolicy] for the pool. This governs what happens when an
    /// acquisition finds no free block in its bucket.
    ///
    /// # Examples
    ///
    /// ```
    /// use bucket_pool::{BucketPool, MissPolicy};
    ///
    /// let pool = BucketPool::builder()
    ///     .miss_policy(MissPolicy::Signal)
    ///     .build();
    ///
    /// assert_eq!(pool.miss_policy(), MissPolicy::Signal);
    /// ```
    #[inline]
    pub fn miss_policy(mut self, policy: MissPolicy) -> Self {
        self.miss_policy = policy;
        self
    }

    /// Builds the pool with the specified configuration.
    #[must_use]
    #[inline]
    pub fn build(self) -> BucketPool {
        BucketPool::new_inner(self.miss_policy)
    }
}
