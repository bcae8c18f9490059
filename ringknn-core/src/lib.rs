//! Ringknn core library.
//!
//! Exact k-nearest-neighbour classification of a dataset partitioned
//! row-wise across P ranks arranged in a unidirectional ring. Chunks of
//! point data circulate around the ring while every rank folds each
//! visiting chunk into the top-k of its own points; a second ring pass
//! sweeps the label chunks past so neighbour indices resolve to class
//! labels; a majority vote then classifies each owned point.
//!
//! The transport is a seam: pipelines depend only on [`RingTransport`],
//! and the crate ships [`ChannelRing`] plus the [`run_ring`] harness to
//! wire a whole ring inside one process.

pub mod codec;

mod classify;
mod cluster;
mod error;
mod loader;
mod matrix;
mod neighbour;
mod pipeline;
mod ring;
mod search;

pub use crate::{
    classify::{MAX_LABEL, majority_vote},
    cluster::{RankContext, run_ring},
    error::{Result, RingKnnError, RingKnnErrorCode},
    loader::load_chunk,
    matrix::Matrix,
    neighbour::{NeighbourPair, NeighbourTable, merge_into},
    pipeline::{ExchangeMode, distributed_knn_search, distributed_labeling},
    ring::{
        ChannelRing, RecvTicket, RingTopology, RingTransport, RingWiring, SendTicket,
        TransportError, TransportErrorCode,
    },
    search::knn_search,
};
