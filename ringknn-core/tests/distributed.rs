//! End-to-end classification scenarios over the in-process ring harness.

use ringknn_core::{
    ChannelRing, ExchangeMode, Matrix, RecvTicket, RingTopology, RingTransport, RingWiring,
    SendTicket, TransportError, distributed_knn_search, distributed_labeling, majority_vote,
    run_ring,
};
use ringknn_test_support::points_on_line;
use rstest::rstest;

/// Mirrors the loader's split: remainder rows go to the leading chunks.
fn chunk_shape(total: usize, chunks: usize, index: usize) -> (usize, usize) {
    let mut rows = total / chunks;
    let remaining = total % chunks;
    let offset = if index < remaining {
        rows += 1;
        index * rows
    } else {
        (rows + 1) * remaining + rows * (index - remaining)
    };
    (rows, offset)
}

fn chunked(cells: &[f64], cols: usize, chunks: usize) -> Vec<Matrix> {
    let total = cells.len() / cols;
    (0..chunks)
        .map(|index| {
            let (rows, offset) = chunk_shape(total, chunks, index);
            Matrix::from_vec(rows, cols, cells[offset * cols..(offset + rows) * cols].to_vec())
                .expect("chunk shape matches")
                .with_chunk_offset(offset)
        })
        .collect()
}

/// Runs both pipelines and the classifier on every rank, returning the
/// neighbour indices (per point, sorted ascending) and the predicted labels
/// in global point order.
fn classify_ring(
    cells: &[f64],
    labels: &[f64],
    k: usize,
    ranks: usize,
    wiring: RingWiring,
    mode: ExchangeMode,
) -> (Vec<Vec<i32>>, Vec<f64>) {
    let data_chunks = chunked(cells, 2, ranks);
    let label_chunks = chunked(labels, 1, ranks);

    let outcomes = run_ring(ranks, wiring, |mut ctx| {
        let rank = ctx.rank();
        let data = data_chunks[rank].clone();
        let local_labels = label_chunks[rank].clone();

        let mut knns = distributed_knn_search(ctx.transport_mut(), &data, k, mode)?;
        let labelled = distributed_labeling(ctx.transport_mut(), &mut knns, &local_labels, mode)?;
        let predicted = majority_vote(&labelled)?;

        let indexes: Vec<Vec<i32>> = (0..knns.points())
            .map(|point| knns.row(point).iter().map(|pair| pair.index).collect())
            .collect();
        let predictions: Vec<f64> = (0..predicted.rows())
            .map(|point| predicted.get(point, 0))
            .collect();
        Ok((indexes, predictions))
    })
    .expect("the scenario completes");

    let mut indexes = Vec::new();
    let mut predictions = Vec::new();
    for (rank_indexes, rank_predictions) in outcomes {
        indexes.extend(rank_indexes);
        predictions.extend(rank_predictions);
    }
    (indexes, predictions)
}

fn accuracy(predictions: &[f64], labels: &[f64]) -> f64 {
    let valid = predictions
        .iter()
        .zip(labels)
        .filter(|(p, l)| p == l)
        .count();
    valid as f64 / labels.len() as f64 * 100.0
}

#[test]
fn single_rank_collapses_to_a_local_search() {
    let cells = points_on_line(&[0.0, 1.0, 3.0, 10.0]);
    let labels = [1.0, 1.0, 2.0, 2.0];
    let (indexes, predictions) = classify_ring(
        &cells,
        &labels,
        1,
        1,
        RingWiring::Buffered,
        ExchangeMode::Overlapped,
    );

    assert_eq!(indexes, vec![vec![1], vec![0], vec![1], vec![2]]);
    assert_eq!(predictions, vec![1.0, 1.0, 1.0, 2.0]);
    assert_eq!(accuracy(&predictions, &labels), 75.0);
}

#[rstest]
#[case(RingWiring::Buffered, ExchangeMode::Overlapped)]
#[case(RingWiring::Rendezvous, ExchangeMode::Blocking)]
fn two_ranks_match_the_single_rank_answer(
    #[case] wiring: RingWiring,
    #[case] mode: ExchangeMode,
) {
    let cells = points_on_line(&[0.0, 1.0, 3.0, 10.0]);
    let labels = [1.0, 1.0, 2.0, 2.0];
    let (indexes, predictions) = classify_ring(&cells, &labels, 1, 2, wiring, mode);

    assert_eq!(indexes, vec![vec![1], vec![0], vec![1], vec![2]]);
    assert_eq!(predictions, vec![1.0, 1.0, 1.0, 2.0]);
}

#[test]
fn six_points_with_three_neighbours() {
    let cells = points_on_line(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    let labels = [1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
    let (indexes, predictions) = classify_ring(
        &cells,
        &labels,
        3,
        2,
        RingWiring::Buffered,
        ExchangeMode::Overlapped,
    );

    assert_eq!(indexes[0], vec![1, 2, 3]);
    assert_eq!(indexes[5], vec![2, 3, 4]);
    // The two middle points sit at equal distance from both classes; the
    // deterministic smaller-index tie-break hands x = 3 the neighbour set
    // {1, 2, 4} and therefore the left class.
    assert_eq!(predictions, vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0]);
}

#[rstest]
#[case(RingWiring::Buffered, ExchangeMode::Overlapped)]
#[case(RingWiring::Rendezvous, ExchangeMode::Blocking)]
fn uneven_chunks_span_the_whole_dataset(#[case] wiring: RingWiring, #[case] mode: ExchangeMode) {
    // 5 points over 3 ranks chunk as 2/2/1; the lone point on the last rank
    // still finds both of its neighbours in other ranks' chunks.
    let cells = points_on_line(&[0.0, 1.0, 2.0, 3.0, 4.0]);
    let labels = [1.0, 1.0, 2.0, 2.0, 2.0];
    let (indexes, predictions) = classify_ring(&cells, &labels, 2, 3, wiring, mode);

    assert_eq!(indexes[4], vec![2, 3]);
    assert_eq!(indexes[0], vec![1, 2]);
    assert_eq!(indexes[2], vec![1, 3]);
    assert!(indexes.iter().flatten().all(|&index| index >= 0));
    assert_eq!(predictions, vec![1.0, 1.0, 1.0, 2.0, 2.0]);
}

#[test]
fn neighbours_never_include_the_query_point() {
    let cells = points_on_line(&[0.0, 0.0, 0.0, 7.0]);
    let labels = [1.0, 1.0, 1.0, 2.0];
    let (indexes, _) = classify_ring(
        &cells,
        &labels,
        2,
        2,
        RingWiring::Buffered,
        ExchangeMode::Overlapped,
    );

    for (point, row) in indexes.iter().enumerate() {
        assert!(
            !row.contains(&(point as i32)),
            "point {point} lists itself: {row:?}"
        );
    }
    // Duplicates of the query point remain acceptable neighbours.
    assert_eq!(indexes[0], vec![1, 2]);
}

#[test]
fn blocking_exchange_completes_on_a_three_rank_ring() {
    // Successor parities on P = 3 are 1, 0, 1, so the parity schedule pairs
    // a receiver with every blocked sender; a misordered schedule would
    // rendezvous-deadlock here rather than fail.
    let outcomes = run_ring(3, RingWiring::Rendezvous, |mut ctx| {
        let rank = ctx.rank();
        let transport = ctx.transport_mut();
        if transport.topology().next() % 2 == 0 {
            let recv = transport.post_recv()?;
            let frame = transport.wait_recv(recv)?;
            let send = transport.post_send(vec![rank as u8])?;
            transport.wait_send(send)?;
            Ok(frame)
        } else {
            let send = transport.post_send(vec![rank as u8])?;
            transport.wait_send(send)?;
            let recv = transport.post_recv()?;
            Ok(transport.wait_recv(recv)?)
        }
    })
    .expect("one parity-scheduled round completes");
    assert_eq!(outcomes, vec![vec![2], vec![0], vec![1]]);
}

/// Delegating wrapper that records the size of every sent frame.
struct CountingRing {
    inner: ChannelRing,
    sent: Vec<usize>,
}

impl RingTransport for CountingRing {
    fn topology(&self) -> RingTopology {
        self.inner.topology()
    }

    fn post_send(&mut self, frame: Vec<u8>) -> Result<SendTicket, TransportError> {
        self.sent.push(frame.len());
        self.inner.post_send(frame)
    }

    fn post_recv(&mut self) -> Result<RecvTicket, TransportError> {
        self.inner.post_recv()
    }

    fn wait_send(&mut self, ticket: SendTicket) -> Result<(), TransportError> {
        self.inner.wait_send(ticket)
    }

    fn wait_recv(&mut self, ticket: RecvTicket) -> Result<Vec<u8>, TransportError> {
        self.inner.wait_recv(ticket)
    }
}

#[test]
fn two_ranks_exchange_exactly_one_44_byte_frame_each() {
    let cells = points_on_line(&[0.0, 1.0, 3.0, 10.0]);
    let chunks = chunked(&cells, 2, 2);

    let rings = ChannelRing::connected(2, RingWiring::Buffered).expect("ring is non-empty");
    std::thread::scope(|scope| {
        let handles: Vec<_> = rings
            .into_iter()
            .map(|inner| {
                let chunk = chunks[inner.topology().rank()].clone();
                scope.spawn(move || {
                    let mut transport = CountingRing {
                        inner,
                        sent: Vec::new(),
                    };
                    distributed_knn_search(&mut transport, &chunk, 1, ExchangeMode::Overlapped)
                        .expect("the search completes");
                    transport.sent
                })
            })
            .collect();
        for handle in handles {
            let sent = handle.join().expect("rank does not panic");
            assert_eq!(sent, vec![44]);
        }
    });
}
