//! Ring-pipelined distributed k-NN search and labeling.
//!
//! Both passes run the same double-buffered loop for P iterations: serialise
//! the currently held chunk, post its send to the successor and a receive
//! from the predecessor, compute against the held chunk while the frames are
//! in flight, then drain the exchange and rotate the received chunk in. The
//! final iteration has nothing left to exchange. After P iterations every
//! chunk of the dataset has visited every rank exactly once.
//!
//! Chunk ownership follows the rotation: the local chunk is borrowed for
//! the whole pass, while each received chunk lives for exactly one
//! iteration and is dropped when its successor rotates in.

use std::borrow::Cow;

use tracing::{debug, instrument};

use crate::{
    codec,
    error::{Result, RingKnnError},
    matrix::Matrix,
    neighbour::NeighbourTable,
    ring::{RecvTicket, RingTransport, SendTicket},
    search::knn_search,
};

/// When the pipeline waits on posted frame exchanges.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExchangeMode {
    /// Post both operations, compute, then wait: communication overlaps the
    /// per-iteration compute.
    Overlapped,
    /// Wait immediately after each post, ordered by the parity of the
    /// successor rank so a ring of blocking exchanges cannot deadlock.
    Blocking,
}

enum Exchange {
    InFlight {
        send: SendTicket,
        recv: RecvTicket,
    },
    Complete {
        frame: Vec<u8>,
    },
}

fn begin_exchange<T: RingTransport>(
    transport: &mut T,
    mode: ExchangeMode,
    frame: Vec<u8>,
) -> Result<Exchange> {
    match mode {
        ExchangeMode::Overlapped => {
            let send = transport.post_send(frame)?;
            let recv = transport.post_recv()?;
            Ok(Exchange::InFlight { send, recv })
        }
        ExchangeMode::Blocking => {
            // Ranks whose successor is even receive first; the rest send
            // first. Each rank performs exactly two operations, so every
            // blocked sender always has a matching receiver somewhere in
            // the ring.
            let incoming = if transport.topology().next() % 2 == 0 {
                let recv = transport.post_recv()?;
                let incoming = transport.wait_recv(recv)?;
                let send = transport.post_send(frame)?;
                transport.wait_send(send)?;
                incoming
            } else {
                let send = transport.post_send(frame)?;
                transport.wait_send(send)?;
                let recv = transport.post_recv()?;
                transport.wait_recv(recv)?
            };
            Ok(Exchange::Complete { frame: incoming })
        }
    }
}

fn finish_exchange<T: RingTransport>(transport: &mut T, exchange: Exchange) -> Result<Matrix> {
    let frame = match exchange {
        Exchange::InFlight { send, recv } => {
            transport.wait_send(send)?;
            transport.wait_recv(recv)?
        }
        Exchange::Complete { frame } => frame,
    };
    codec::deserialize(&frame)
}

/// Computes the exact global top-k neighbours of every point this rank owns.
///
/// The rank's query points are the rows of `local_data`; their global
/// indices start at `local_data.chunk_offset()`. The search against the
/// rank's own chunk asks for `k + 1` neighbours and drops each point's
/// self-match, so the result never contains a point as its own neighbour.
/// Every returned row is sorted ascending by distance.
///
/// # Errors
/// Returns [`RingKnnError::InvalidArgument`] for a nonsensical `k`,
/// [`RingKnnError::MalformedFrame`] when a received frame is corrupt, and
/// [`RingKnnError::Transport`] when a peer is lost.
#[instrument(skip_all, fields(
    rank = transport.topology().rank(),
    ranks = transport.topology().ranks(),
    k,
))]
pub fn distributed_knn_search<T: RingTransport>(
    transport: &mut T,
    local_data: &Matrix,
    k: usize,
    mode: ExchangeMode,
) -> Result<NeighbourTable> {
    if k == 0 {
        return Err(RingKnnError::InvalidArgument {
            reason: "k must be at least 1".to_owned(),
        });
    }
    let ranks = transport.topology().ranks();
    if ranks == 1 && k >= local_data.rows() {
        return Err(RingKnnError::InvalidArgument {
            reason: format!(
                "a lone chunk of {} rows cannot supply {k} neighbours besides each point itself",
                local_data.rows()
            ),
        });
    }

    let mut cur: Cow<'_, Matrix> = Cow::Borrowed(local_data);

    // Iteration 0 searches the rank's own chunk one column wider, then
    // drops the self-matches by value.
    let exchange = if ranks > 1 {
        Some(begin_exchange(transport, mode, codec::serialize(cur.as_ref())?)?)
    } else {
        None
    };
    let seeded = knn_search(cur.as_ref(), local_data, k + 1)?;
    let mut knns = seeded.without_self_matches(local_data.chunk_offset())?;
    if let Some(exchange) = exchange {
        cur = Cow::Owned(finish_exchange(transport, exchange)?);
    }
    debug!(iteration = 0, "ring step complete");

    for iteration in 1..ranks {
        let exchange = if iteration + 1 < ranks {
            Some(begin_exchange(transport, mode, codec::serialize(cur.as_ref())?)?)
        } else {
            None
        };
        let partial = knn_search(cur.as_ref(), local_data, k)?;
        knns.merge_from(&partial)?;
        if let Some(exchange) = exchange {
            cur = Cow::Owned(finish_exchange(transport, exchange)?);
        }
        debug!(iteration, "ring step complete");
    }

    Ok(knns)
}

/// Attaches a class label to every neighbour in `knns`.
///
/// The label chunks of all ranks sweep past in a second ring pass. Each row
/// of `knns` is first re-sorted by ascending global index; for every chunk
/// that arrives, the row positions whose indices fall inside the chunk's
/// window form one contiguous span, found by binary search and filled from
/// the chunk. Returns a `points x k` matrix aligned with the (index-sorted)
/// rows of `knns`.
///
/// # Errors
/// Returns [`RingKnnError::InvalidArgument`] when `local_labels` is not one
/// label per owned point, [`RingKnnError::MalformedFrame`] when a received
/// frame is corrupt, and [`RingKnnError::Transport`] when a peer is lost.
#[instrument(skip_all, fields(
    rank = transport.topology().rank(),
    ranks = transport.topology().ranks(),
))]
pub fn distributed_labeling<T: RingTransport>(
    transport: &mut T,
    knns: &mut NeighbourTable,
    local_labels: &Matrix,
    mode: ExchangeMode,
) -> Result<Matrix> {
    if local_labels.cols() != 1 {
        return Err(RingKnnError::InvalidArgument {
            reason: format!(
                "label chunks must have exactly one column, not {}",
                local_labels.cols()
            ),
        });
    }
    if knns.points() != local_labels.rows() {
        return Err(RingKnnError::InvalidArgument {
            reason: format!(
                "{} neighbour rows cannot be labelled by a chunk of {} labels",
                knns.points(),
                local_labels.rows()
            ),
        });
    }

    knns.sort_rows_by_index();
    let mut labelled = Matrix::zeros(knns.points(), knns.k())?;

    let ranks = transport.topology().ranks();
    let mut cur: Cow<'_, Matrix> = Cow::Borrowed(local_labels);
    for iteration in 0..ranks {
        let exchange = if iteration + 1 < ranks {
            Some(begin_exchange(transport, mode, codec::serialize(cur.as_ref())?)?)
        } else {
            None
        };
        apply_labels(knns, &mut labelled, cur.as_ref());
        if let Some(exchange) = exchange {
            cur = Cow::Owned(finish_exchange(transport, exchange)?);
        }
        debug!(iteration, "ring step complete");
    }

    Ok(labelled)
}

/// Fills the cells of `labelled` whose neighbour indices fall inside the
/// window of global rows that `labels` covers.
fn apply_labels(knns: &NeighbourTable, labelled: &mut Matrix, labels: &Matrix) {
    let lo = labels.chunk_offset() as i64;
    let hi = lo + labels.rows() as i64;
    for point in 0..knns.points() {
        let row = knns.row(point);
        // Rows are sorted by index, so the covered cells are contiguous.
        let start = row.partition_point(|pair| i64::from(pair.index) < lo);
        let end = row.partition_point(|pair| i64::from(pair.index) < hi);
        for slot in start..end {
            let local = (i64::from(row[slot].index) - lo) as usize;
            labelled.set(point, slot, labels.get(local, 0));
        }
    }
}
