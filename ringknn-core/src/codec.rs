//! Wire codec for matrix chunks.
//!
//! Frames use a fixed little-endian layout:
//! `rows:i32 || cols:i32 || chunk_offset:i32 || data[rows*cols]:f64` in
//! row-major order, for a total of `12 + 8 * rows * cols` bytes. There is no
//! length prefix; the transport delivers whole frames.

use crate::{
    error::{Result, RingKnnError},
    matrix::Matrix,
};

/// Byte length of the fixed frame header.
pub const HEADER_LEN: usize = 12;

/// Encodes a matrix chunk into a contiguous frame.
///
/// # Errors
/// Returns [`RingKnnError::InvalidArgument`] when a dimension or the chunk
/// offset does not fit the wire's `i32` fields.
///
/// # Examples
/// ```
/// use ringknn_core::{codec, Matrix};
///
/// let chunk = Matrix::zeros(7, 3)?.with_chunk_offset(12);
/// assert_eq!(codec::serialize(&chunk)?.len(), 180);
/// # Ok::<(), ringknn_core::RingKnnError>(())
/// ```
pub fn serialize(matrix: &Matrix) -> Result<Vec<u8>> {
    let rows = wire_dimension(matrix.rows(), "row count")?;
    let cols = wire_dimension(matrix.cols(), "column count")?;
    let chunk_offset = wire_dimension(matrix.chunk_offset(), "chunk offset")?;

    let mut frame = Vec::with_capacity(HEADER_LEN + 8 * matrix.data().len());
    frame.extend_from_slice(&rows.to_le_bytes());
    frame.extend_from_slice(&cols.to_le_bytes());
    frame.extend_from_slice(&chunk_offset.to_le_bytes());
    for cell in matrix.data() {
        frame.extend_from_slice(&cell.to_le_bytes());
    }
    Ok(frame)
}

/// Decodes a frame produced by [`serialize`].
///
/// # Errors
/// Returns [`RingKnnError::MalformedFrame`] whenever the supplied byte length
/// disagrees with the length implied by the header, or the header itself is
/// nonsensical (negative or overflowing dimensions).
pub fn deserialize(frame: &[u8]) -> Result<Matrix> {
    if frame.len() < HEADER_LEN {
        return Err(RingKnnError::MalformedFrame {
            expected: HEADER_LEN,
            actual: frame.len(),
        });
    }

    let rows = read_i32(&frame[0..4]);
    let cols = read_i32(&frame[4..8]);
    let chunk_offset = read_i32(&frame[8..12]);
    if rows < 0 || cols < 0 || chunk_offset < 0 {
        return Err(RingKnnError::MalformedFrame {
            expected: HEADER_LEN,
            actual: frame.len(),
        });
    }

    let rows = rows as usize;
    let cols = cols as usize;
    let expected = rows
        .checked_mul(cols)
        .and_then(|cells| cells.checked_mul(8))
        .and_then(|bytes| bytes.checked_add(HEADER_LEN))
        .ok_or(RingKnnError::AllocationFailure { rows, cols })?;
    if frame.len() != expected {
        return Err(RingKnnError::MalformedFrame {
            expected,
            actual: frame.len(),
        });
    }

    let data = frame[HEADER_LEN..]
        .chunks_exact(8)
        .map(read_f64)
        .collect::<Vec<f64>>();
    Ok(Matrix::from_vec(rows, cols, data)?.with_chunk_offset(chunk_offset as usize))
}

fn wire_dimension(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| RingKnnError::InvalidArgument {
        reason: format!("{what} {value} does not fit the wire format"),
    })
}

fn read_i32(bytes: &[u8]) -> i32 {
    let mut buf = [0_u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    i32::from_le_bytes(buf)
}

fn read_f64(bytes: &[u8]) -> f64 {
    let mut buf = [0_u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    f64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix {
        Matrix::from_vec(2, 2, vec![0.5, -1.25, f64::MIN_POSITIVE, 3.0])
            .expect("shape matches")
            .with_chunk_offset(2)
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let original = sample();
        let decoded = deserialize(&serialize(&original).expect("dimensions fit"))
            .expect("frame is well formed");
        assert_eq!(decoded, original);
    }

    #[test]
    fn seven_by_three_frame_is_180_bytes() {
        let chunk = Matrix::zeros(7, 3)
            .expect("shape is small")
            .with_chunk_offset(12);
        let frame = serialize(&chunk).expect("dimensions fit");
        assert_eq!(frame.len(), 180);
        let decoded = deserialize(&frame).expect("frame is well formed");
        assert_eq!(decoded.chunk_offset(), 12);
    }

    #[test]
    fn two_by_two_frame_is_44_bytes() {
        let frame = serialize(&sample()).expect("dimensions fit");
        assert_eq!(frame.len(), HEADER_LEN + 8 * 4);
        assert_eq!(frame.len(), 44);
    }

    #[test]
    fn truncated_frame_is_malformed() {
        let mut frame = serialize(&sample()).expect("dimensions fit");
        frame.pop();
        let err = deserialize(&frame).expect_err("length disagrees with header");
        assert!(matches!(
            err,
            RingKnnError::MalformedFrame {
                expected: 44,
                actual: 43,
            }
        ));
    }

    #[test]
    fn oversized_frame_is_malformed() {
        let mut frame = serialize(&sample()).expect("dimensions fit");
        frame.push(0);
        assert!(matches!(
            deserialize(&frame),
            Err(RingKnnError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn negative_header_is_malformed() {
        let mut frame = serialize(&sample()).expect("dimensions fit");
        frame[0..4].copy_from_slice(&(-1_i32).to_le_bytes());
        assert!(matches!(
            deserialize(&frame),
            Err(RingKnnError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn short_header_is_malformed() {
        assert!(matches!(
            deserialize(&[0_u8; 5]),
            Err(RingKnnError::MalformedFrame {
                expected: HEADER_LEN,
                actual: 5,
            })
        ));
    }
}
