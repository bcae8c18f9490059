//! Shared fixtures for ringknn tests.
//!
//! Writes matrix files in the on-disk layout the loader reads
//! (`total_rows:i32 || cols:i32` then little-endian row-major `f64` cells)
//! and builds the small line datasets the end-to-end scenarios use.

use std::{fs, io, path::Path};

/// Writes `cells` as a matrix file with `cols` cells per row.
///
/// The row count is inferred from `cells.len() / cols`; the slice must
/// divide evenly.
///
/// # Errors
/// Returns any [`io::Error`] raised while writing the file.
///
/// # Panics
/// Panics when `cols` is zero or does not divide `cells.len()`; fixtures
/// are expected to be well formed.
pub fn write_matrix_file(path: &Path, cols: usize, cells: &[f64]) -> io::Result<()> {
    assert!(cols > 0, "fixture matrices need at least one column");
    assert_eq!(
        cells.len() % cols,
        0,
        "fixture cells must divide evenly into rows"
    );
    let rows = cells.len() / cols;

    let mut bytes = Vec::with_capacity(8 + 8 * cells.len());
    bytes.extend_from_slice(&(rows as i32).to_le_bytes());
    bytes.extend_from_slice(&(cols as i32).to_le_bytes());
    for cell in cells {
        bytes.extend_from_slice(&cell.to_le_bytes());
    }
    fs::write(path, bytes)
}

/// Writes a one-column label file, one label per point.
///
/// # Errors
/// Returns any [`io::Error`] raised while writing the file.
pub fn write_labels_file(path: &Path, labels: &[f64]) -> io::Result<()> {
    write_matrix_file(path, 1, labels)
}

/// Builds two-dimensional points `(x, 0)` along a line, row-major.
#[must_use]
pub fn points_on_line(xs: &[f64]) -> Vec<f64> {
    xs.iter().flat_map(|&x| [x, 0.0]).collect()
}
