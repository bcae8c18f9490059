//! Ring topology and the transport seam between ranks.
//!
//! Every rank talks to exactly two peers: it sends to its successor and
//! receives from its predecessor, and every frame is an opaque byte buffer.
//! The [`RingTransport`] trait exposes a post/wait surface; the overlap and
//! blocking variants of the original design differ only in *when* a post
//! completes, so pipelines stay generic over the trait and a scheduling
//! policy.
//!
//! [`ChannelRing`] is the shipped implementation, wiring the ranks of one
//! process together over `std::sync::mpsc`. The buffered wiring never blocks
//! a post, giving communication/computation overlap; the rendezvous wiring
//! blocks every post until the peer arrives, so orderings that would
//! deadlock a real blocking transport deadlock here too.

use std::{fmt, sync::mpsc};

use thiserror::Error;

/// Stable codes describing [`TransportError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum TransportErrorCode {
    /// A ring cannot have zero ranks.
    EmptyRing,
    /// A rank id fell outside the ring.
    InvalidRank,
    /// A peer disappeared mid-operation.
    PeerLost,
}

impl TransportErrorCode {
    /// Return the stable machine-readable representation of this error code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyRing => "EMPTY_RING",
            Self::InvalidRank => "INVALID_RANK",
            Self::PeerLost => "PEER_LOST",
        }
    }
}

impl fmt::Display for TransportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error produced by ring construction or frame exchange.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum TransportError {
    /// A ring cannot have zero ranks.
    #[error("a ring needs at least one rank")]
    EmptyRing,
    /// A rank id fell outside the ring.
    #[error("rank {rank} is not valid in a ring of {ranks}")]
    InvalidRank {
        /// The offending rank id.
        rank: usize,
        /// Number of ranks in the ring.
        ranks: usize,
    },
    /// A peer disappeared mid-operation; the job cannot continue.
    #[error("rank {peer} disconnected during {operation}")]
    PeerLost {
        /// The peer whose end of the link is gone.
        peer: usize,
        /// The operation that observed the loss.
        operation: &'static str,
    },
}

impl TransportError {
    /// Retrieve the stable [`TransportErrorCode`] for this error.
    pub const fn code(&self) -> TransportErrorCode {
        match self {
            Self::EmptyRing => TransportErrorCode::EmptyRing,
            Self::InvalidRank { .. } => TransportErrorCode::InvalidRank,
            Self::PeerLost { .. } => TransportErrorCode::PeerLost,
        }
    }
}

/// A rank's place in the ring: its id, the ring size, and its two peers.
///
/// # Examples
/// ```
/// use ringknn_core::RingTopology;
///
/// let topology = RingTopology::new(0, 3)?;
/// assert_eq!(topology.next(), 1);
/// assert_eq!(topology.prev(), 2);
/// # Ok::<(), ringknn_core::TransportError>(())
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RingTopology {
    rank: usize,
    ranks: usize,
}

impl RingTopology {
    /// Places `rank` in a ring of `ranks` processes.
    ///
    /// # Errors
    /// Returns [`TransportError::EmptyRing`] for a zero-size ring and
    /// [`TransportError::InvalidRank`] when `rank >= ranks`.
    pub fn new(rank: usize, ranks: usize) -> Result<Self, TransportError> {
        if ranks == 0 {
            return Err(TransportError::EmptyRing);
        }
        if rank >= ranks {
            return Err(TransportError::InvalidRank { rank, ranks });
        }
        Ok(Self { rank, ranks })
    }

    /// Returns this rank's id.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Returns the number of ranks in the ring.
    #[must_use]
    pub fn ranks(&self) -> usize {
        self.ranks
    }

    /// Returns the successor rank, the one this rank sends to.
    #[must_use]
    pub fn next(&self) -> usize {
        (self.rank + 1) % self.ranks
    }

    /// Returns the predecessor rank, the one this rank receives from.
    #[must_use]
    pub fn prev(&self) -> usize {
        (self.rank + self.ranks - 1) % self.ranks
    }
}

/// Witness of a posted send; redeem it with [`RingTransport::wait_send`].
#[derive(Debug)]
#[must_use]
pub struct SendTicket(());

impl SendTicket {
    /// Creates a ticket for a freshly posted send.
    pub fn new() -> Self {
        Self(())
    }
}

impl Default for SendTicket {
    fn default() -> Self {
        Self::new()
    }
}

/// Witness of a posted receive; redeem it with [`RingTransport::wait_recv`].
#[derive(Debug)]
#[must_use]
pub struct RecvTicket {
    frame: Option<Vec<u8>>,
}

impl RecvTicket {
    /// Creates a ticket whose frame will arrive at wait time.
    pub fn pending() -> Self {
        Self { frame: None }
    }

    /// Creates a ticket whose frame already arrived at post time.
    pub fn ready(frame: Vec<u8>) -> Self {
        Self { frame: Some(frame) }
    }

    /// Consumes the ticket, yielding the frame when it already arrived.
    #[must_use]
    pub fn into_frame(self) -> Option<Vec<u8>> {
        self.frame
    }
}

/// Paired send-to-successor / receive-from-predecessor frame exchange.
///
/// Frames between one (sender, receiver) pair arrive in the order they were
/// sent; nothing is guaranteed across pairs. A lost peer surfaces as
/// [`TransportError::PeerLost`] and aborts the job.
pub trait RingTransport {
    /// Returns this rank's place in the ring.
    fn topology(&self) -> RingTopology;

    /// Starts sending a frame to the successor rank.
    ///
    /// # Errors
    /// Returns [`TransportError::PeerLost`] when the successor is gone.
    fn post_send(&mut self, frame: Vec<u8>) -> Result<SendTicket, TransportError>;

    /// Starts receiving a frame from the predecessor rank.
    ///
    /// # Errors
    /// Returns [`TransportError::PeerLost`] when the predecessor is gone.
    fn post_recv(&mut self) -> Result<RecvTicket, TransportError>;

    /// Blocks until a posted send has completed.
    ///
    /// # Errors
    /// Returns [`TransportError::PeerLost`] when the successor is gone.
    fn wait_send(&mut self, ticket: SendTicket) -> Result<(), TransportError>;

    /// Blocks until a posted receive has completed, yielding the frame.
    ///
    /// # Errors
    /// Returns [`TransportError::PeerLost`] when the predecessor is gone.
    fn wait_recv(&mut self, ticket: RecvTicket) -> Result<Vec<u8>, TransportError>;
}

/// How the channels of a [`ChannelRing`] are buffered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RingWiring {
    /// Unbounded links: posts complete immediately, waits drain. Pairs with
    /// overlapped pipeline scheduling.
    Buffered,
    /// Zero-capacity links: every post blocks until the peer arrives. Pairs
    /// with the parity-scheduled blocking pipeline, and genuinely deadlocks
    /// when that schedule is violated.
    Rendezvous,
}

enum SendLink {
    Buffered(mpsc::Sender<Vec<u8>>),
    Rendezvous(mpsc::SyncSender<Vec<u8>>),
}

/// In-process ring transport over `std::sync::mpsc` channels.
pub struct ChannelRing {
    topology: RingTopology,
    to_next: SendLink,
    from_prev: mpsc::Receiver<Vec<u8>>,
}

impl fmt::Debug for ChannelRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRing")
            .field("topology", &self.topology)
            .finish_non_exhaustive()
    }
}

impl ChannelRing {
    /// Builds one connected transport per rank of a `ranks`-sized ring.
    ///
    /// The returned vector is indexed by rank; hand each element to the
    /// thread driving that rank.
    ///
    /// # Errors
    /// Returns [`TransportError::EmptyRing`] when `ranks` is zero.
    pub fn connected(ranks: usize, wiring: RingWiring) -> Result<Vec<Self>, TransportError> {
        if ranks == 0 {
            return Err(TransportError::EmptyRing);
        }

        // Link r carries frames from rank r to rank (r + 1) % ranks.
        let mut senders = Vec::with_capacity(ranks);
        let mut receivers = Vec::with_capacity(ranks);
        for _ in 0..ranks {
            match wiring {
                RingWiring::Buffered => {
                    let (sender, receiver) = mpsc::channel();
                    senders.push(SendLink::Buffered(sender));
                    receivers.push(receiver);
                }
                RingWiring::Rendezvous => {
                    let (sender, receiver) = mpsc::sync_channel(0);
                    senders.push(SendLink::Rendezvous(sender));
                    receivers.push(receiver);
                }
            }
        }

        // Rank r receives from link prev(r).
        receivers.rotate_right(1);

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (to_next, from_prev))| {
                Ok(Self {
                    topology: RingTopology::new(rank, ranks)?,
                    to_next,
                    from_prev,
                })
            })
            .collect()
    }

    fn recv_frame(&self) -> Result<Vec<u8>, TransportError> {
        self.from_prev.recv().map_err(|_| TransportError::PeerLost {
            peer: self.topology.prev(),
            operation: "receive",
        })
    }
}

impl RingTransport for ChannelRing {
    fn topology(&self) -> RingTopology {
        self.topology
    }

    fn post_send(&mut self, frame: Vec<u8>) -> Result<SendTicket, TransportError> {
        let lost = TransportError::PeerLost {
            peer: self.topology.next(),
            operation: "send",
        };
        match &self.to_next {
            SendLink::Buffered(sender) => sender.send(frame).map_err(|_| lost)?,
            SendLink::Rendezvous(sender) => sender.send(frame).map_err(|_| lost)?,
        }
        Ok(SendTicket::new())
    }

    fn post_recv(&mut self) -> Result<RecvTicket, TransportError> {
        match &self.to_next {
            // Rendezvous posts are themselves blocking, so the frame is in
            // hand before the post returns.
            SendLink::Rendezvous(_) => Ok(RecvTicket::ready(self.recv_frame()?)),
            SendLink::Buffered(_) => Ok(RecvTicket::pending()),
        }
    }

    fn wait_send(&mut self, _ticket: SendTicket) -> Result<(), TransportError> {
        Ok(())
    }

    fn wait_recv(&mut self, ticket: RecvTicket) -> Result<Vec<u8>, TransportError> {
        match ticket.into_frame() {
            Some(frame) => Ok(frame),
            None => self.recv_frame(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 3, 1, 2)]
    #[case(2, 3, 0, 1)]
    #[case(0, 1, 0, 0)]
    #[case(4, 5, 0, 3)]
    fn topology_wraps_both_ways(
        #[case] rank: usize,
        #[case] ranks: usize,
        #[case] next: usize,
        #[case] prev: usize,
    ) {
        let topology = RingTopology::new(rank, ranks).expect("rank is in range");
        assert_eq!(topology.next(), next);
        assert_eq!(topology.prev(), prev);
    }

    #[test]
    fn out_of_range_ranks_are_rejected() {
        assert_eq!(
            RingTopology::new(3, 3).expect_err("rank 3 of 3 is invalid").code(),
            TransportErrorCode::InvalidRank,
        );
        assert_eq!(
            RingTopology::new(0, 0).expect_err("empty rings are invalid").code(),
            TransportErrorCode::EmptyRing,
        );
    }

    #[test]
    fn buffered_frames_arrive_in_send_order() {
        let mut ring = ChannelRing::connected(2, RingWiring::Buffered).expect("ring is non-empty");
        let mut second = ring.pop().expect("two transports");
        let mut first = ring.pop().expect("two transports");

        let send_a = first.post_send(vec![1]).expect("peer is alive");
        let send_b = first.post_send(vec![2]).expect("peer is alive");
        first.wait_send(send_a).expect("send completes");
        first.wait_send(send_b).expect("send completes");

        let recv = second.post_recv().expect("peer is alive");
        assert_eq!(second.wait_recv(recv).expect("frame arrives"), vec![1]);
        let recv = second.post_recv().expect("peer is alive");
        assert_eq!(second.wait_recv(recv).expect("frame arrives"), vec![2]);
    }

    #[test]
    fn a_dropped_peer_surfaces_as_peer_lost() {
        let mut ring = ChannelRing::connected(2, RingWiring::Buffered).expect("ring is non-empty");
        let mut second = ring.pop().expect("two transports");
        drop(ring);

        let ticket = second.post_recv().expect("post succeeds while undrained");
        let err = second.wait_recv(ticket).expect_err("sender is gone");
        assert_eq!(err.code(), TransportErrorCode::PeerLost);
    }
}
