//! Oracle comparison utilities.
//!
//! Runs can be checked against precomputed oracle files: a 1x1 matrix
//! holding the expected accuracy percentage, and a `total_rows x k` matrix
//! of expected global neighbour indices. A missing or undersized oracle is
//! a skip, not a failure.

use std::{fmt, io, path::Path};

use ringknn_core::{Matrix, NeighbourTable, RingKnnError, load_chunk};
use tracing::debug;

/// How much the achieved accuracy may drift from the oracle, in
/// percentage points.
const ACCURACY_TOLERANCE_PCT: f64 = 0.1;

/// Outcome of one oracle comparison.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verification {
    /// The run matched the oracle.
    Passed,
    /// The run disagreed with the oracle.
    Failed,
    /// The oracle was absent or too small to compare against.
    Skipped,
}

impl Verification {
    /// Folds two outcomes: any failure dominates, then any pass; only
    /// all-skipped stays skipped.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Self::Failed, _) | (_, Self::Failed) => Self::Failed,
            (Self::Passed, _) | (_, Self::Passed) => Self::Passed,
            (Self::Skipped, Self::Skipped) => Self::Skipped,
        }
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "SUCCESS",
            Self::Failed => "FAIL",
            Self::Skipped => "SKIPPED",
        })
    }
}

/// Compares the achieved accuracy percentage against a 1x1 oracle matrix.
///
/// # Errors
/// Returns [`RingKnnError::Io`] for oracle read failures other than the
/// skippable absent-or-truncated cases.
pub fn accuracy(path: &Path, achieved_pct: f64) -> Result<Verification, RingKnnError> {
    let Some(oracle) = load_oracle(path)? else {
        return Ok(Verification::Skipped);
    };
    if oracle.rows() < 1 || oracle.cols() < 1 {
        return Ok(Verification::Skipped);
    }

    let expected = oracle.get(0, 0);
    debug!(expected, achieved_pct, "accuracy oracle comparison");
    if (expected - achieved_pct).abs() <= ACCURACY_TOLERANCE_PCT {
        Ok(Verification::Passed)
    } else {
        Ok(Verification::Failed)
    }
}

/// Compares one rank's neighbour table against the oracle rows it owns.
///
/// Row `p` of the table describes the point with global index
/// `chunk_offset + p`. Expected and actual indices are compared as per-row
/// sets, since neighbours at equal distance may legitimately reorder.
///
/// # Errors
/// Returns [`RingKnnError::Io`] for oracle read failures other than the
/// skippable absent-or-truncated cases.
pub fn indexes(
    path: &Path,
    knns: &NeighbourTable,
    chunk_offset: usize,
) -> Result<Verification, RingKnnError> {
    let Some(oracle) = load_oracle(path)? else {
        return Ok(Verification::Skipped);
    };
    if oracle.rows() < chunk_offset + knns.points() || oracle.cols() < knns.k() {
        return Ok(Verification::Skipped);
    }

    for point in 0..knns.points() {
        let mut expected: Vec<i64> = (0..knns.k())
            .map(|column| oracle.get(chunk_offset + point, column) as i64)
            .collect();
        expected.sort_unstable();
        let mut actual: Vec<i64> = knns
            .row(point)
            .iter()
            .map(|pair| i64::from(pair.index))
            .collect();
        actual.sort_unstable();
        if expected != actual {
            debug!(point, ?expected, ?actual, "neighbour oracle mismatch");
            return Ok(Verification::Failed);
        }
    }
    Ok(Verification::Passed)
}

fn load_oracle(path: &Path) -> Result<Option<Matrix>, RingKnnError> {
    match load_chunk(path, 1, 0) {
        Ok(oracle) => Ok(Some(oracle)),
        Err(RingKnnError::Io { source, .. })
            if matches!(
                source.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::UnexpectedEof
            ) =>
        {
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
