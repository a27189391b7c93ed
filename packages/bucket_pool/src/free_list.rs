use std::array;
use std::fmt;
use std::mem;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{BUCKET_COUNT, Block, SizeClass};

/// Per-bucket stacks of free blocks, each guarded by its own lock.
///
/// Operations never hold more than one bucket lock at a time. Bucket locks are only ever
/// taken in ascending index order when more than one bucket is visited.
pub(crate) struct FreeList {
    buckets: [Mutex<Vec<Block>>; BUCKET_COUNT],
}

impl FreeList {
    pub(crate) fn new() -> Self {
        Self {
            buckets: array::from_fn(|_| Mutex::new(Vec::new())),
        }
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "size class indexes are always below BUCKET_COUNT"
    )]
    fn bucket(&self, size_class: SizeClass) -> &Mutex<Vec<Block>> {
        &self.buckets[usize::from(size_class.index())]
    }

    /// Takes the most recently pushed block of the size class, if there is one.
    pub(crate) fn pop(&self, size_class: SizeClass) -> Option<Block> {
        let block = self.bucket(size_class).lock().pop();

        trace!(
            bucket = size_class.index(),
            hit = block.is_some(),
            "free list pop"
        );

        block
    }

    /// Pushes a block onto the stack of its size class.
    pub(crate) fn push(&self, block: Block) {
        let size_class = block.size_class();

        trace!(
            bucket = size_class.index(),
            address = ?block.as_ptr(),
            "free list push"
        );

        self.bucket(size_class).lock().push(block);
    }

    /// Number of free blocks in one bucket.
    pub(crate) fn len(&self, size_class: SizeClass) -> usize {
        self.bucket(size_class).lock().len()
    }

    /// Number of free blocks across all buckets.
    ///
    /// Buckets are counted one after another, so concurrent activity may make the total
    /// describe no single instant.
    pub(crate) fn total_len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.lock().len()).sum()
    }

    /// Empties every bucket in ascending order, returning the blocks to the system allocator.
    ///
    /// Returns the number of blocks freed.
    pub(crate) fn reclaim_all(&self) -> usize {
        let mut reclaimed = 0_usize;

        for (index, bucket) in self.buckets.iter().enumerate() {
            let blocks = mem::take(&mut *bucket.lock());

            if blocks.is_empty() {
                continue;
            }

            debug!(bucket = index, count = blocks.len(), "reclaiming free blocks");
            reclaimed = reclaimed.saturating_add(blocks.len());

            // Most recently released blocks go first, mirroring the stack order.
            for block in blocks.into_iter().rev() {
                drop(block);
            }
        }

        reclaimed
    }
}

impl fmt::Debug for FreeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeList")
            .field("pooled_total", &self.total_len())
            .finish()
    }
}
