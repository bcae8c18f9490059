//! Chunked matrix file loader.
//!
//! A matrix file is `total_rows:i32 || cols:i32` followed by
//! `total_rows * cols` little-endian `f64` cells in row-major order. Each
//! rank reads only its own chunk: the file splits into `chunks` equal parts,
//! with one extra row for each of the first `total_rows % chunks` chunks,
//! and the returned matrix is stamped with its global row offset.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use tracing::debug;

use crate::{
    error::{Result, RingKnnError},
    matrix::Matrix,
};

/// Reads the `index`-th of `chunks` row chunks of a matrix file.
///
/// # Errors
/// Returns [`RingKnnError::InvalidArgument`] when `index` is not a valid
/// chunk of `chunks` or the file declares a negative shape,
/// [`RingKnnError::Io`] when the file cannot be opened or read, and
/// [`RingKnnError::AllocationFailure`] when the declared chunk would
/// overflow a byte count.
pub fn load_chunk(path: &Path, chunks: usize, index: usize) -> Result<Matrix> {
    if chunks == 0 || index >= chunks {
        return Err(RingKnnError::InvalidArgument {
            reason: format!("chunk {index} of {chunks} does not exist"),
        });
    }

    let file = File::open(path).map_err(|source| RingKnnError::Io {
        action: "open",
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let total_rows = read_header_i32(&mut reader, path)?;
    let cols = read_header_i32(&mut reader, path)?;
    if total_rows < 0 || cols < 0 {
        return Err(RingKnnError::InvalidArgument {
            reason: format!(
                "matrix file `{}` declares a negative {total_rows}x{cols} shape",
                path.display()
            ),
        });
    }
    let total_rows = total_rows as usize;
    let cols = cols as usize;

    // Remainder rows go one each to the leading chunks, so offsets stay
    // contiguous in ascending chunk order.
    let mut rows = total_rows / chunks;
    let remaining = total_rows % chunks;
    let offset = if index < remaining {
        rows += 1;
        index * rows
    } else {
        (rows + 1) * remaining + rows * (index - remaining)
    };

    let skipped = offset
        .checked_mul(cols)
        .and_then(|cells| cells.checked_mul(8))
        .ok_or(RingKnnError::AllocationFailure { rows: offset, cols })?;
    reader
        .seek_relative(skipped as i64)
        .map_err(|source| RingKnnError::Io {
            action: "seek within",
            path: path.to_path_buf(),
            source,
        })?;

    let bytes_needed = rows
        .checked_mul(cols)
        .and_then(|cells| cells.checked_mul(8))
        .ok_or(RingKnnError::AllocationFailure { rows, cols })?;
    let mut bytes = vec![0_u8; bytes_needed];
    reader
        .read_exact(&mut bytes)
        .map_err(|source| RingKnnError::Io {
            action: "read rows of",
            path: path.to_path_buf(),
            source,
        })?;

    let data = bytes
        .chunks_exact(8)
        .map(|cell| {
            let mut buf = [0_u8; 8];
            buf.copy_from_slice(cell);
            f64::from_le_bytes(buf)
        })
        .collect::<Vec<f64>>();

    debug!(
        path = %path.display(),
        rows,
        cols,
        chunk_offset = offset,
        "loaded matrix chunk"
    );
    Ok(Matrix::from_vec(rows, cols, data)?.with_chunk_offset(offset))
}

fn read_header_i32<R: Read>(reader: &mut R, path: &Path) -> Result<i32> {
    let mut buf = [0_u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|source| RingKnnError::Io {
            action: "read header of",
            path: path.to_path_buf(),
            source,
        })?;
    Ok(i32::from_le_bytes(buf))
}
