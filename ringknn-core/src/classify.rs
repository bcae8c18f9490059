//! Majority-vote classification over labelled neighbour matrices.

use crate::{
    error::{Result, RingKnnError},
    matrix::Matrix,
};

/// Largest class label the classifier will count.
///
/// Labels index a per-point counter array, so an absurd label would demand
/// an absurd allocation.
pub const MAX_LABEL: i64 = 1 << 20;

/// Predicts one class per point from a `points x k` matrix of neighbour
/// labels.
///
/// Cells hold positive integer class ids encoded as `f64`; the id is read by
/// truncating toward zero. Each point receives the most frequent label among
/// its k neighbours; when several labels tie, the smallest id wins.
///
/// # Errors
/// Returns [`RingKnnError::InvalidArgument`] when the input has no columns
/// or a cell does not truncate to a label in `[1, MAX_LABEL]`.
///
/// # Examples
/// ```
/// use ringknn_core::{majority_vote, Matrix};
///
/// let labelled = Matrix::from_vec(2, 3, vec![1.0, 2.0, 1.0, 2.0, 3.0, 3.0])?;
/// let predicted = majority_vote(&labelled)?;
/// assert_eq!(predicted.get(0, 0), 1.0);
/// assert_eq!(predicted.get(1, 0), 3.0);
/// # Ok::<(), ringknn_core::RingKnnError>(())
/// ```
pub fn majority_vote(labelled: &Matrix) -> Result<Matrix> {
    if labelled.cols() == 0 {
        return Err(RingKnnError::InvalidArgument {
            reason: "cannot classify points with no neighbour labels".to_owned(),
        });
    }

    let mut max_label: i64 = 0;
    for &cell in labelled.data() {
        let label = cell as i64;
        if label < 1 || label > MAX_LABEL {
            return Err(RingKnnError::InvalidArgument {
                reason: format!("cell {cell} does not hold a class label in [1, {MAX_LABEL}]"),
            });
        }
        max_label = max_label.max(label);
    }

    let mut predicted = Matrix::zeros(labelled.rows(), 1)?;
    let mut counts = vec![0_u32; max_label as usize];
    for point in 0..labelled.rows() {
        counts.fill(0);
        for column in 0..labelled.cols() {
            let label = labelled.get(point, column) as i64;
            counts[(label - 1) as usize] += 1;
        }

        // First maximum wins, so ties resolve to the smallest label id.
        let mut best = 0;
        for (slot, &count) in counts.iter().enumerate() {
            if count > counts[best] {
                best = slot;
            }
        }
        predicted.set(point, 0, (best + 1) as f64);
    }

    Ok(predicted)
}
