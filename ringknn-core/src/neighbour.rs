//! Neighbour pairs and per-point top-k tables.
//!
//! A [`NeighbourTable`] holds the k nearest neighbours of every query point a
//! rank owns. Rows live in one contiguous `points * k` allocation with
//! row-stride access; the jagged per-row allocations this replaces are gone.
//!
//! All orderings over pairs are total: ascending distance compared with
//! [`f64::total_cmp`], ties broken by ascending global index. This keeps
//! merges and searches deterministic when several neighbours sit at the same
//! distance.

use std::cmp::Ordering;

use crate::error::{Result, RingKnnError};

/// One neighbour of a query point: its distance and its global row index.
///
/// The sentinel [`NeighbourPair::EMPTY`] marks a slot no data row has filled
/// yet; it carries an infinite distance so it loses every comparison.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighbourPair {
    /// Euclidean distance from the query point to this neighbour.
    pub distance: f64,
    /// Global row index of the neighbour in the concatenated dataset.
    pub index: i32,
}

impl NeighbourPair {
    /// The unfilled-slot sentinel.
    pub const EMPTY: Self = Self {
        distance: f64::INFINITY,
        index: -1,
    };

    /// Builds a pair from a distance and a global row index.
    #[must_use]
    pub fn new(distance: f64, index: i32) -> Self {
        Self { distance, index }
    }

    /// Returns whether this slot holds the sentinel rather than a data row.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index < 0
    }

    /// Total order by ascending distance, ties broken by ascending index.
    #[must_use]
    pub fn cmp_by_distance(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.index.cmp(&other.index))
    }

    /// Total order by ascending global index.
    #[must_use]
    pub fn cmp_by_index(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

/// Merges two top-k runs for the same query point, overwriting `current`.
///
/// Both slices must be sorted by [`NeighbourPair::cmp_by_distance`]. The
/// result is again sorted, holds the `current.len()` smallest pairs of the
/// union, and collapses entries that name the same data row, so merging a
/// row with itself leaves it unchanged. When dedup leaves fewer pairs than
/// slots the tail is padded with [`NeighbourPair::EMPTY`].
pub fn merge_into(current: &mut [NeighbourPair], incoming: &[NeighbourPair]) {
    let k = current.len();
    let mut both = Vec::with_capacity(k + incoming.len());
    both.extend_from_slice(current);
    both.extend_from_slice(incoming);
    both.sort_by(NeighbourPair::cmp_by_distance);
    both.dedup_by(|a, b| a.index == b.index);
    both.truncate(k);
    both.resize(k, NeighbourPair::EMPTY);
    current.copy_from_slice(&both);
}

/// The k nearest neighbours of every query point a rank owns.
///
/// # Examples
/// ```
/// use ringknn_core::{NeighbourPair, NeighbourTable};
///
/// let mut table = NeighbourTable::filled_with_empty(1, 2);
/// table.row_mut(0)[0] = NeighbourPair::new(0.5, 3);
/// table.row_mut(0)[1] = NeighbourPair::new(1.5, 7);
/// assert_eq!(table.row(0)[1].index, 7);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct NeighbourTable {
    points: usize,
    k: usize,
    pairs: Vec<NeighbourPair>,
}

impl NeighbourTable {
    /// Creates a `points x k` table where every slot holds the sentinel.
    #[must_use]
    pub fn filled_with_empty(points: usize, k: usize) -> Self {
        Self {
            points,
            k,
            pairs: vec![NeighbourPair::EMPTY; points * k],
        }
    }

    /// Returns the number of query points.
    #[must_use]
    pub fn points(&self) -> usize {
        self.points
    }

    /// Returns the number of neighbours kept per query point.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Returns the neighbours of one query point. Callers must pass
    /// `point < self.points()`.
    #[must_use]
    pub fn row(&self, point: usize) -> &[NeighbourPair] {
        debug_assert!(point < self.points);
        &self.pairs[point * self.k..(point + 1) * self.k]
    }

    /// Returns one row mutably. Callers must pass `point < self.points()`.
    #[must_use]
    pub fn row_mut(&mut self, point: usize) -> &mut [NeighbourPair] {
        debug_assert!(point < self.points);
        &mut self.pairs[point * self.k..(point + 1) * self.k]
    }

    /// Iterates over all rows in point order.
    pub fn rows(&self) -> impl Iterator<Item = &[NeighbourPair]> {
        self.pairs.chunks_exact(self.k.max(1))
    }

    pub(crate) fn pairs_mut(&mut self) -> &mut [NeighbourPair] {
        &mut self.pairs
    }

    /// Folds another table of partial results into this one, row by row.
    ///
    /// # Errors
    /// Returns [`RingKnnError::InvalidArgument`] when the shapes differ.
    pub fn merge_from(&mut self, other: &Self) -> Result<()> {
        if self.points != other.points || self.k != other.k {
            return Err(RingKnnError::InvalidArgument {
                reason: format!(
                    "cannot merge a {}x{} table into a {}x{} one",
                    other.points, other.k, self.points, self.k
                ),
            });
        }
        for point in 0..self.points {
            merge_into(self.row_mut(point), other.row(point));
        }
        Ok(())
    }

    /// Re-sorts every row by ascending global index, as the labeling pass
    /// requires.
    pub fn sort_rows_by_index(&mut self) {
        for row in self.pairs.chunks_exact_mut(self.k.max(1)) {
            row.sort_by(NeighbourPair::cmp_by_index);
        }
    }

    /// Copies this table into a fresh one that is one column narrower,
    /// dropping each row's own query point.
    ///
    /// `query_offset` is the chunk offset of the query points, so row `p`
    /// describes the point with global index `query_offset + p`. When that
    /// index is present in the row it is removed; when duplicates crowded it
    /// out entirely, the furthest pair is dropped instead. The retained
    /// columns are copied by value; nothing aliases the source table.
    ///
    /// # Errors
    /// Returns [`RingKnnError::InvalidArgument`] when the table is too
    /// narrow to lose a column.
    pub fn without_self_matches(&self, query_offset: usize) -> Result<Self> {
        if self.k < 2 {
            return Err(RingKnnError::InvalidArgument {
                reason: format!("cannot drop the self-match from rows of width {}", self.k),
            });
        }
        let mut out = Self::filled_with_empty(self.points, self.k - 1);
        for point in 0..self.points {
            let global = (query_offset + point) as i64;
            let row = self.row(point);
            let drop_at = row
                .iter()
                .position(|pair| i64::from(pair.index) == global)
                .unwrap_or(self.k - 1);
            let dst = out.row_mut(point);
            let mut filled = 0;
            for (slot, pair) in row.iter().enumerate() {
                if slot == drop_at {
                    continue;
                }
                dst[filled] = *pair;
                filled += 1;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(distance: f64, index: i32) -> NeighbourPair {
        NeighbourPair::new(distance, index)
    }

    #[test]
    fn merge_keeps_the_k_smallest_sorted() {
        let mut current = [pair(1.0, 4), pair(3.0, 9)];
        let incoming = [pair(0.5, 2), pair(2.0, 7)];
        merge_into(&mut current, &incoming);
        assert_eq!(current, [pair(0.5, 2), pair(1.0, 4)]);
    }

    #[test]
    fn merge_breaks_distance_ties_by_smaller_index() {
        let mut current = [pair(1.0, 9), pair(2.0, 4)];
        let incoming = [pair(1.0, 3), pair(5.0, 6)];
        merge_into(&mut current, &incoming);
        assert_eq!(current, [pair(1.0, 3), pair(1.0, 9)]);
    }

    #[test]
    fn merge_with_itself_is_idempotent() {
        let row = [pair(0.25, 1), pair(0.5, 8), pair(4.0, 2)];
        let mut merged = row;
        merge_into(&mut merged, &row);
        assert_eq!(merged, row);
    }

    #[test]
    fn merge_collapses_sentinels_and_pads() {
        let mut current = [pair(1.0, 4), NeighbourPair::EMPTY];
        let incoming = [pair(2.0, 6), NeighbourPair::EMPTY];
        merge_into(&mut current, &incoming);
        assert_eq!(current, [pair(1.0, 4), pair(2.0, 6)]);

        let mut lone = [pair(1.0, 4), NeighbourPair::EMPTY];
        let empties = [NeighbourPair::EMPTY, NeighbourPair::EMPTY];
        merge_into(&mut lone, &empties);
        assert_eq!(lone, [pair(1.0, 4), NeighbourPair::EMPTY]);
    }

    #[test]
    fn merge_from_rejects_mismatched_shapes() {
        let mut wide = NeighbourTable::filled_with_empty(2, 3);
        let narrow = NeighbourTable::filled_with_empty(2, 2);
        let err = wide.merge_from(&narrow).expect_err("widths differ");
        assert!(matches!(err, RingKnnError::InvalidArgument { .. }));
    }

    #[test]
    fn sort_rows_by_index_orders_each_row() {
        let mut table = NeighbourTable::filled_with_empty(1, 3);
        table.row_mut(0).copy_from_slice(&[pair(0.5, 9), pair(1.0, 2), pair(2.0, 5)]);
        table.sort_rows_by_index();
        let indexes: Vec<i32> = table.row(0).iter().map(|p| p.index).collect();
        assert_eq!(indexes, [2, 5, 9]);
    }

    #[test]
    fn self_match_is_removed_wherever_it_sits() {
        // Query point 1 of a chunk at offset 4 has global index 5; a
        // duplicate at distance zero sorts before it.
        let mut table = NeighbourTable::filled_with_empty(2, 3);
        table.row_mut(0).copy_from_slice(&[pair(0.0, 4), pair(1.0, 5), pair(2.0, 6)]);
        table.row_mut(1).copy_from_slice(&[pair(0.0, 2), pair(0.0, 5), pair(1.0, 6)]);
        let trimmed = table.without_self_matches(4).expect("width is 3");
        assert_eq!(trimmed.row(0), [pair(1.0, 5), pair(2.0, 6)]);
        assert_eq!(trimmed.row(1), [pair(0.0, 2), pair(1.0, 6)]);
    }

    #[test]
    fn crowded_out_self_match_drops_the_furthest_pair() {
        // Many duplicates at distance zero can push the query point itself
        // out of the widened row; the furthest entry goes instead.
        let mut table = NeighbourTable::filled_with_empty(1, 3);
        table.row_mut(0).copy_from_slice(&[pair(0.0, 0), pair(0.0, 1), pair(0.0, 2)]);
        let trimmed = table.without_self_matches(7).expect("width is 3");
        assert_eq!(trimmed.row(0), [pair(0.0, 0), pair(0.0, 1)]);
    }
}
