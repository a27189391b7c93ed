#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A thread-safe pool that recycles heap blocks by power-of-two size class.
//!
//! Programs that perform many short-lived allocations of similar sizes can use a
//! [`BucketPool`] to keep freed memory around and hand it out again, instead of going back to
//! the system allocator every time. This is not a garbage collector: the pool never scans for
//! reachability, never moves memory and only ever reuses memory that a handle has released.
//!
//! # Key Features
//!
//! - **Power-of-two size classes**: 32 buckets with capacities from 1 byte to 2 GiB; each
//!   request is served from the smallest bucket that fits it
//! - **Last-in-first-out reuse**: the most recently released block of a bucket is handed out
//!   first, which keeps reused memory warm in caches
//! - **Two handle types**: [`PooledMut<T>`] for exclusive ownership, [`Pooled<T>`] for shared
//!   reference-counted ownership; both work for single values and slices
//! - **Automatic release**: dropping the last handle drops the value(s) and returns the block
//!   to its bucket
//! - **Per-bucket locking**: threads working with different size classes never contend
//! - **Explicit reclaim**: [`BucketPool::reclaim_all()`] returns every pooled block to the
//!   system allocator
//! - **Reuse statistics**: [`BucketPool::stats()`] reports how often acquisitions reused
//!   memory (requires the default `instrumentation` feature)
//! - **Configurable miss handling**: see [`MissPolicy`]
//!
//! # Examples
//!
//! ```
//! use bucket_pool::BucketPool;
//!
//! let pool = BucketPool::new();
//!
//! // A 24-byte value is stored in a 32-byte block.
//! let first = pool.make_owned([7_u8; 24])?;
//! let address = first.ptr().cast::<u8>();
//! drop(first);
//!
//! // A 20-byte value fits the same bucket and reuses the released block.
//! let second = pool.make_owned([9_u8; 20])?;
//! assert_eq!(second.ptr().cast::<u8>(), address);
//! # #[cfg(feature = "instrumentation")]
//! assert_eq!(pool.stats().reuse_successes(), 1);
//!
//! // Arrays of values are supported as well.
//! let mut names = pool.make_owned_array::<String>(3)?;
//! names[0].push_str("first");
//! assert_eq!(names.len(), 3);
//! # Ok::<(), bucket_pool::Error>(())
//! ```
//!
//! # Manual placement
//!
//! For callers that construct values themselves, [`BucketPool::try_acquire()`] and
//! [`BucketPool::acquire()`] hand out raw [`Block`]s, [`BucketPool::release()`] takes them
//! back, and [`BucketPool::wrap()`] / [`BucketPool::wrap_array()`] turn an initialized block
//! into a handle. These are the only ways to bypass the handle types; the `unsafe` ones
//! document what the caller has to guarantee.

mod array;
mod block;
mod builder;
mod deleter;
mod diagnostics;
mod error;
mod free_list;
mod miss_policy;
mod pool;
mod pooled;
mod pooled_mut;
mod size_class;

pub use array::ArrayLayout;
pub use block::*;
pub use builder::*;
pub(crate) use deleter::Deleter;
pub(crate) use diagnostics::Diagnostics;
pub use diagnostics::ReuseStats;
pub use error::*;
pub(crate) use free_list::FreeList;
pub use miss_policy::*;
pub use pool::*;
pub use pooled::*;
pub use pooled_mut::*;
pub use size_class::*;
