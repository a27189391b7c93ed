//! Example demonstrating basic usage of `BucketPool`.
//!
//! Values of similar size share a bucket, so memory released by one value is reused by the
//! next one instead of going back to the system allocator.

use bucket_pool::{BucketPool, Error, MissPolicy, SizeClass};

fn main() -> Result<(), Error> {
    println!("=== BucketPool: size-class block reuse ===");

    let pool = BucketPool::new();

    // A 24-byte value lives in the 32-byte bucket.
    let first = pool.make_owned([1_u64; 3])?;
    println!("First value: {:?} in {}", *first, first.size_class());

    let address = first.ptr().cast::<u8>();
    drop(first);

    // A 20-byte value lands in the same bucket and reuses the same block.
    let second = pool.make_owned([2_u8; 20])?;
    println!(
        "Second value reuses the block: {}",
        second.ptr().cast::<u8>() == address
    );
    drop(second);

    // Arrays of types with destructors are dropped element by element.
    let mut names = pool.make_owned_array::<String>(3)?;
    names[0].push_str("alpha");
    names[2].push_str("gamma");
    println!("Names: {:?}", &*names);

    // Shared handles release the block when the last clone is gone.
    let shared = names.into_shared();
    let clone = shared.clone();
    std::thread::spawn(move || println!("From thread: {:?}", &*clone))
        .join()
        .expect("printing thread panicked");
    drop(shared);

    println!("Pooled blocks: {}", pool.pooled_total());

    let stats = pool.stats();
    println!(
        "Reuse: {} of {} acquisitions, {} fresh allocations",
        stats.reuse_successes(),
        stats.reuse_attempts(),
        stats.fresh_allocations()
    );

    println!("Reclaimed blocks: {}", pool.reclaim_all());

    println!("\n=== MissPolicy::Signal ===");

    let strict = BucketPool::builder()
        .miss_policy(MissPolicy::Signal)
        .build();

    match strict.acquire(SizeClass::for_size(100)?) {
        Ok(_) => println!("Unexpected reuse"),
        Err(error) => println!("Empty bucket reported: {error}"),
    }

    Ok(())
}
