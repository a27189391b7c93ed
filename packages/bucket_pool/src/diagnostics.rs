#[cfg(feature = "instrumentation")]
use std::sync::atomic::{AtomicU64, Ordering};

/// Reuse counters of one pool.
///
/// With the `instrumentation` feature disabled this type has no fields and every method
/// compiles to nothing.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    #[cfg(feature = "instrumentation")]
    reuse_attempts: AtomicU64,

    #[cfg(feature = "instrumentation")]
    reuse_successes: AtomicU64,

    #[cfg(feature = "instrumentation")]
    fresh_allocations: AtomicU64,

    #[cfg(feature = "instrumentation")]
    reclaimed: AtomicU64,
}

impl Diagnostics {
    /// Records one acquisition attempt and whether a free block satisfied it.
    #[inline]
    pub(crate) fn record_acquisition(&self, reused: bool) {
        #[cfg(feature = "instrumentation")]
        {
            self.reuse_attempts.fetch_add(1, Ordering::Relaxed);

            if reused {
                // Release pairs with the Acquire in `snapshot()` so that a reader who sees
                // this success also sees the attempt above.
                self.reuse_successes.fetch_add(1, Ordering::Release);
            }
        }

        #[cfg(not(feature = "instrumentation"))]
        let _ = reused;
    }

    #[inline]
    pub(crate) fn record_fresh_allocation(&self) {
        #[cfg(feature = "instrumentation")]
        self.fresh_allocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_reclaimed(&self, count: usize) {
        #[cfg(feature = "instrumentation")]
        self.reclaimed
            .fetch_add(u64::try_from(count).unwrap_or(u64::MAX), Ordering::Relaxed);

        #[cfg(not(feature = "instrumentation"))]
        let _ = count;
    }

    pub(crate) fn snapshot(&self) -> ReuseStats {
        #[cfg(feature = "instrumentation")]
        {
            let reuse_successes = self.reuse_successes.load(Ordering::Acquire);
            let reuse_attempts = self.reuse_attempts.load(Ordering::Relaxed);

            ReuseStats {
                reuse_attempts,
                reuse_successes,
                fresh_allocations: self.fresh_allocations.load(Ordering::Relaxed),
                reclaimed: self.reclaimed.load(Ordering::Relaxed),
            }
        }

        #[cfg(not(feature = "instrumentation"))]
        ReuseStats::default()
    }
}

/// A point-in-time copy of the reuse counters of a [`BucketPool`][crate::BucketPool].
///
/// All counters only ever increase over the lifetime of a pool, and
/// `reuse_successes() <= reuse_attempts()` holds for every snapshot.
///
/// The counters are only maintained when the `instrumentation` feature is enabled (the
/// default). Otherwise every snapshot is all zeros.
///
/// # Examples
///
/// ```
/// use bucket_pool::BucketPool;
///
/// let pool = BucketPool::new();
///
/// drop(pool.make_owned(42_u64)?);
/// drop(pool.make_owned(43_u64)?);
///
/// let stats = pool.stats();
/// # #[cfg(feature = "instrumentation")]
/// # {
/// assert_eq!(stats.reuse_attempts(), 2);
/// assert_eq!(stats.reuse_successes(), 1);
/// assert_eq!(stats.reuse_rate(), Some(0.5));
/// # }
/// # Ok::<(), bucket_pool::Error>(())
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReuseStats {
    reuse_attempts: u64,
    reuse_successes: u64,
    fresh_allocations: u64,
    reclaimed: u64,
}

impl ReuseStats {
    /// Number of acquisitions, whether or not they were satisfied from a bucket.
    #[must_use]
    #[inline]
    pub fn reuse_attempts(&self) -> u64 {
        self.reuse_attempts
    }

    /// Number of acquisitions satisfied by a previously released block.
    #[must_use]
    #[inline]
    pub fn reuse_successes(&self) -> u64 {
        self.reuse_successes
    }

    /// Number of blocks obtained from the system allocator.
    #[must_use]
    #[inline]
    pub fn fresh_allocations(&self) -> u64 {
        self.fresh_allocations
    }

    /// Number of pooled blocks given back to the system allocator by reclaiming.
    #[must_use]
    #[inline]
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed
    }

    /// Fraction of acquisitions that reused a block, or `None` before the first acquisition.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "a ratio does not need every bit of a 64-bit counter"
    )]
    pub fn reuse_rate(&self) -> Option<f64> {
        if self.reuse_attempts == 0 {
            return None;
        }

        Some(self.reuse_successes as f64 / self.reuse_attempts as f64)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Diagnostics: Send, Sync);
    assert_impl_all!(ReuseStats: Send, Sync, Copy);

    #[test]
    fn rate_is_none_without_attempts() {
        assert_eq!(ReuseStats::default().reuse_rate(), None);
    }

    #[cfg(feature = "instrumentation")]
    #[test]
    fn counts_hits_and_misses() {
        let diagnostics = Diagnostics::default();

        diagnostics.record_acquisition(false);
        diagnostics.record_fresh_allocation();
        diagnostics.record_acquisition(true);
        diagnostics.record_acquisition(true);
        diagnostics.record_reclaimed(5);

        let stats = diagnostics.snapshot();
        assert_eq!(stats.reuse_attempts(), 3);
        assert_eq!(stats.reuse_successes(), 2);
        assert_eq!(stats.fresh_allocations(), 1);
        assert_eq!(stats.reclaimed(), 5);

        let rate = stats.reuse_rate().unwrap();
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[cfg(not(feature = "instrumentation"))]
    #[test]
    fn counters_stay_zero_without_instrumentation() {
        let diagnostics = Diagnostics::default();

        diagnostics.record_acquisition(true);
        diagnostics.record_fresh_allocation();
        diagnostics.record_reclaimed(5);

        assert_eq!(diagnostics.snapshot(), ReuseStats::default());
    }
}
