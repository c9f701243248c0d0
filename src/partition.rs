//! Round-robin striping of a job batch across pool lanes
//!
//! Jobs usually arrive grouped by source directory, so neighbouring jobs tend
//! to have similar cost. Striping index `i` onto lane `i % lanes` spreads any
//! contiguous run of expensive jobs over every lane.

/// Split `items` into `lanes` stripes; item `i` lands in stripe `i % lanes`.
/// Order inside a stripe follows the input order.
///
/// # Panics
///
/// Panics if `lanes` is zero. The pool validates the lane count before it
/// ever partitions.
pub fn stripe<T>(items: Vec<T>, lanes: usize) -> Vec<Vec<T>> {
    assert!(lanes > 0, "lane count must be at least 1");
    let per_lane = items.len().div_ceil(lanes);
    let mut stripes: Vec<Vec<T>> = (0..lanes).map(|_| Vec::with_capacity(per_lane)).collect();
    for (i, item) in items.into_iter().enumerate() {
        stripes[i % lanes].push(item);
    }
    stripes
}

/// Stripes concatenated in lane order: lane 0's jobs first, then lane 1's, ...
pub fn interleave<T>(items: Vec<T>, lanes: usize) -> Vec<T> {
    stripe(items, lanes).into_iter().flatten().collect()
}
