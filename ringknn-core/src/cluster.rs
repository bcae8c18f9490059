//! In-process ring harness.
//!
//! Stands in for a multi-process launch environment: one scoped thread per
//! rank, each holding a connected [`ChannelRing`], a shared barrier for
//! phase boundaries, and a gather collective that delivers per-rank counts
//! to rank 0. Ranks share nothing else; all dataset state stays rank-local
//! and moves only through the transport.
//!
//! Failure handling is minimal: a rank that errors stops participating,
//! its peers abort with a transport error the next time they touch the
//! ring, and a rank that dies between transport calls leaves any peer
//! already waiting at a barrier blocked. Jobs either complete or abort.

use std::sync::{Arc, Barrier, mpsc};
use std::thread;

use crate::{
    error::Result,
    ring::{ChannelRing, RingTransport, RingWiring, TransportError},
};

type Counts = (u64, u64);

struct Collector {
    receiver: mpsc::Receiver<(usize, Counts)>,
    /// Messages from ranks that raced ahead into a later gather round.
    pending: Vec<(usize, Counts)>,
}

struct GatherPoint {
    sender: mpsc::Sender<(usize, Counts)>,
    collector: Option<Collector>,
}

/// Everything one rank needs to participate in the ring.
pub struct RankContext {
    transport: ChannelRing,
    barrier: Arc<Barrier>,
    gather: GatherPoint,
}

impl RankContext {
    /// Returns this rank's id.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.transport.topology().rank()
    }

    /// Returns the number of ranks in the ring.
    #[must_use]
    pub fn ranks(&self) -> usize {
        self.transport.topology().ranks()
    }

    /// Returns the rank's transport for driving the pipelines.
    pub fn transport_mut(&mut self) -> &mut ChannelRing {
        &mut self.transport
    }

    /// Blocks until every rank has reached the same barrier call.
    pub fn barrier(&self) {
        self.barrier.wait();
    }

    /// Gathers one `(valid, total)` count pair per rank to rank 0.
    ///
    /// Every rank must call this the same number of times. Rank 0 receives
    /// the pairs indexed by rank; all other ranks receive `None`.
    ///
    /// # Errors
    /// Returns [`TransportError::PeerLost`] when rank 0 is gone.
    pub fn gather_counts(&mut self, valid: u64, total: u64) -> Result<Option<Vec<Counts>>> {
        let rank = self.rank();
        let ranks = self.ranks();
        self.gather
            .sender
            .send((rank, (valid, total)))
            .map_err(|_| TransportError::PeerLost {
                peer: 0,
                operation: "gather",
            })?;

        let Some(collector) = &mut self.gather.collector else {
            return Ok(None);
        };

        let mut slots: Vec<Option<Counts>> = vec![None; ranks];
        // Messages stashed by an earlier round belong to this one; per-rank
        // send order makes the first unclaimed message per rank current.
        collector.pending.retain(|&(from, counts)| {
            if slots[from].is_none() {
                slots[from] = Some(counts);
                false
            } else {
                true
            }
        });
        let mut filled = slots.iter().filter(|slot| slot.is_some()).count();
        while filled < ranks {
            let (from, counts) =
                collector
                    .receiver
                    .recv()
                    .map_err(|_| TransportError::PeerLost {
                        peer: 0,
                        operation: "gather",
                    })?;
            if slots[from].is_none() {
                slots[from] = Some(counts);
                filled += 1;
            } else {
                collector.pending.push((from, counts));
            }
        }
        Ok(Some(slots.into_iter().flatten().collect()))
    }
}

/// Runs `f` once per rank of a freshly wired ring, one thread per rank.
///
/// Results come back indexed by rank. A rank that fails stops
/// participating; its peers abort with a transport error the next time they
/// touch the ring, and the first error by rank order is returned. A rank
/// that panics re-raises the panic here.
///
/// # Errors
/// Returns the lowest-ranked error any rank produced.
///
/// # Examples
/// ```
/// use ringknn_core::{run_ring, RingWiring};
///
/// let doubled = run_ring(3, RingWiring::Buffered, |ctx| Ok(ctx.rank() * 2))?;
/// assert_eq!(doubled, vec![0, 2, 4]);
/// # Ok::<(), ringknn_core::RingKnnError>(())
/// ```
pub fn run_ring<T, F>(ranks: usize, wiring: RingWiring, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(RankContext) -> Result<T> + Sync,
{
    let rings = ChannelRing::connected(ranks, wiring)?;
    let barrier = Arc::new(Barrier::new(ranks));
    let (sender, receiver) = mpsc::channel();
    let mut collector = Some(Collector {
        receiver,
        pending: Vec::new(),
    });

    let contexts: Vec<RankContext> = rings
        .into_iter()
        .map(|transport| {
            let owns_collector = transport.topology().rank() == 0;
            RankContext {
                transport,
                barrier: Arc::clone(&barrier),
                gather: GatherPoint {
                    sender: sender.clone(),
                    collector: if owns_collector {
                        collector.take()
                    } else {
                        None
                    },
                },
            }
        })
        .collect();
    drop(sender);

    let f = &f;
    thread::scope(|scope| {
        let handles: Vec<_> = contexts
            .into_iter()
            .map(|ctx| scope.spawn(move || f(ctx)))
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(outcome) => outcome,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    })
}
