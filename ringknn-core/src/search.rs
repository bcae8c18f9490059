//! Local brute-force k-nearest-neighbour kernel.
//!
//! Computes, for every row of a query chunk, the k nearest rows of a data
//! chunk, tagging each neighbour with its global index via the data chunk's
//! offset. Query rows are independent, so the kernel is data-parallel across
//! them; within a row a bounded max-heap keyed by the pair ordering keeps the
//! k best candidates at `O(log k)` per data row.

use std::collections::BinaryHeap;

use rayon::prelude::*;
use tracing::debug;

use crate::{
    error::{Result, RingKnnError},
    matrix::Matrix,
    neighbour::{NeighbourPair, NeighbourTable},
};

/// Finds the k nearest rows of `data` for every row of `queries`.
///
/// Neighbour indices are global: local data row `d` is reported as
/// `data.chunk_offset() + d`. When `data` holds fewer than `k` rows the
/// unfilled tail of each result row keeps the [`NeighbourPair::EMPTY`]
/// sentinel, which loses every later merge. Each result row is sorted
/// ascending by distance, ties broken by ascending global index.
///
/// Distances are true Euclidean; the square root is taken before any
/// comparison so stored distances match what callers compare against.
///
/// # Errors
/// Returns [`RingKnnError::InvalidArgument`] when `k` is zero, when the two
/// chunks disagree on column count, or when a global index would not fit the
/// wire's `i32`.
pub fn knn_search(data: &Matrix, queries: &Matrix, k: usize) -> Result<NeighbourTable> {
    if k == 0 {
        return Err(RingKnnError::InvalidArgument {
            reason: "k must be at least 1".to_owned(),
        });
    }
    if data.cols() != queries.cols() {
        return Err(RingKnnError::InvalidArgument {
            reason: format!(
                "data chunk has {} columns but query chunk has {}",
                data.cols(),
                queries.cols()
            ),
        });
    }
    let base = global_base(data)?;

    let mut results = NeighbourTable::filled_with_empty(queries.rows(), k);
    debug!(
        query_rows = queries.rows(),
        data_rows = data.rows(),
        k,
        chunk_offset = data.chunk_offset(),
        "brute-force search"
    );

    results
        .pairs_mut()
        .par_chunks_mut(k)
        .enumerate()
        .for_each(|(point, out)| {
            let query = queries.row(point);
            let mut best: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
            for d in 0..data.rows() {
                let pair = NeighbourPair::new(euclidean(query, data.row(d)), base + d as i32);
                if best.len() < k {
                    best.push(Candidate(pair));
                } else if best
                    .peek()
                    .is_some_and(|worst| pair.cmp_by_distance(&worst.0).is_lt())
                {
                    best.push(Candidate(pair));
                    best.pop();
                }
            }
            let mut found = best.into_vec();
            found.sort();
            for (slot, Candidate(pair)) in out.iter_mut().zip(found) {
                *slot = pair;
            }
        });

    Ok(results)
}

fn global_base(data: &Matrix) -> Result<i32> {
    let beyond = data.chunk_offset() + data.rows();
    if i32::try_from(beyond).is_err() {
        return Err(RingKnnError::InvalidArgument {
            reason: format!("global row index {beyond} does not fit the wire format"),
        });
    }
    i32::try_from(data.chunk_offset()).map_err(|_| RingKnnError::InvalidArgument {
        reason: format!(
            "chunk offset {} does not fit the wire format",
            data.chunk_offset()
        ),
    })
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum();
    sum.sqrt()
}

/// Max-heap entry so the heap's root is the current worst candidate.
#[derive(Clone, Copy, Debug)]
struct Candidate(NeighbourPair);

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.0.cmp_by_distance(&other.0).is_eq()
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp_by_distance(&other.0)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
