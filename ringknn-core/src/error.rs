//! Error types for the ringknn core library.
//!
//! Defines the error enum exposed by the public API and a convenient result
//! alias. Transport failures carry their own [`TransportError`] and are
//! wrapped transparently.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

use crate::ring::TransportError;

/// Stable codes describing [`RingKnnError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum RingKnnErrorCode {
    /// A caller-supplied argument made the requested operation nonsensical.
    InvalidArgument,
    /// A buffer or matrix could not be sized without overflowing.
    AllocationFailure,
    /// A file could not be opened or read.
    Io,
    /// A wire frame's byte length disagreed with its declared header.
    MalformedFrame,
    /// A ring send or receive failed.
    Transport,
}

impl RingKnnErrorCode {
    /// Return the stable machine-readable representation of this error code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::AllocationFailure => "ALLOCATION_FAILURE",
            Self::Io => "IO_FAILURE",
            Self::MalformedFrame => "MALFORMED_FRAME",
            Self::Transport => "TRANSPORT_FAILURE",
        }
    }
}

impl fmt::Display for RingKnnErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error produced while loading, exchanging, or searching matrix chunks.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RingKnnError {
    /// A caller-supplied argument made the requested operation nonsensical.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Human-readable description of the rejected argument.
        reason: String,
    },
    /// A buffer or matrix could not be sized without overflowing.
    #[error("allocating {rows}x{cols} cells would overflow")]
    AllocationFailure {
        /// Requested row count.
        rows: usize,
        /// Requested column count.
        cols: usize,
    },
    /// A file could not be opened or read.
    #[error("failed to {action} `{path}`: {source}")]
    Io {
        /// Short verb phrase naming the failed step.
        action: &'static str,
        /// Path that triggered the failure.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// A wire frame's byte length disagreed with its declared header.
    #[error("frame is {actual} bytes but its header declares {expected}")]
    MalformedFrame {
        /// Byte length implied by the frame header.
        expected: usize,
        /// Byte length actually supplied.
        actual: usize,
    },
    /// A ring send or receive failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RingKnnError {
    /// Retrieve the stable [`RingKnnErrorCode`] for this error.
    pub const fn code(&self) -> RingKnnErrorCode {
        match self {
            Self::InvalidArgument { .. } => RingKnnErrorCode::InvalidArgument,
            Self::AllocationFailure { .. } => RingKnnErrorCode::AllocationFailure,
            Self::Io { .. } => RingKnnErrorCode::Io,
            Self::MalformedFrame { .. } => RingKnnErrorCode::MalformedFrame,
            Self::Transport(_) => RingKnnErrorCode::Transport,
        }
    }
}

/// Convenient alias for results returned by the core API.
pub type Result<T> = core::result::Result<T, RingKnnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_strings() {
        let err = RingKnnError::MalformedFrame {
            expected: 44,
            actual: 12,
        };
        assert_eq!(err.code(), RingKnnErrorCode::MalformedFrame);
        assert_eq!(err.code().as_str(), "MALFORMED_FRAME");
    }

    #[test]
    fn transport_errors_wrap_transparently() {
        let err = RingKnnError::from(TransportError::PeerLost {
            peer: 3,
            operation: "receive",
        });
        assert_eq!(err.code(), RingKnnErrorCode::Transport);
        assert!(err.to_string().contains("rank 3"));
    }
}
