//! Command implementation and argument parsing for the ringknn CLI.

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use tracing::info;

use ringknn_core::{
    ExchangeMode, RankContext, RingKnnError, RingWiring, distributed_knn_search,
    distributed_labeling, load_chunk, majority_vote, run_ring,
};

use crate::verify::{self, Verification};

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser, Clone)]
#[command(
    name = "ringknn",
    about = "Classify every point of a dataset by its k nearest neighbours, \
             distributed over a ring of ranks."
)]
pub struct Cli {
    /// Matrix file holding the point coordinates.
    pub data_file: PathBuf,

    /// Matrix file holding one class label per point.
    pub labels_file: PathBuf,

    /// Number of nearest neighbours per point.
    pub k: usize,

    /// Oracle matrix file holding the expected accuracy percentage.
    pub expected_accuracy_file: Option<PathBuf>,

    /// Oracle matrix file holding the expected global neighbour indices.
    pub expected_indexes_file: Option<PathBuf>,

    /// Number of ranks in the ring.
    #[arg(long, default_value_t = 1)]
    pub ranks: usize,

    /// Transport scheduling variant.
    #[arg(long, value_enum, default_value_t = Transport::Overlapped)]
    pub transport: Transport,
}

/// Selectable transport variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Asynchronous sends and receives overlapping the per-iteration
    /// compute.
    Overlapped,
    /// Blocking exchanges scheduled by successor parity.
    Blocking,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Overlapped => "overlapped",
            Self::Blocking => "blocking",
        })
    }
}

impl Transport {
    fn wiring(self) -> RingWiring {
        match self {
            Self::Overlapped => RingWiring::Buffered,
            Self::Blocking => RingWiring::Rendezvous,
        }
    }

    fn mode(self) -> ExchangeMode {
        match self {
            Self::Overlapped => ExchangeMode::Overlapped,
            Self::Blocking => ExchangeMode::Blocking,
        }
    }
}

/// Summarises the outcome of one classification run.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    /// Number of ranks that ran.
    pub ranks: usize,
    /// Neighbour count per point.
    pub k: usize,
    /// Wall time of the distributed search phase.
    pub search_time: Duration,
    /// Wall time of the labeling-and-voting phase.
    pub classification_time: Duration,
    /// Fraction of points whose predicted label matched their own, as a
    /// percentage.
    pub accuracy_pct: f64,
    /// Accuracy oracle comparison, when one was requested.
    pub accuracy_check: Option<Verification>,
    /// Neighbour index oracle comparison, when one was requested.
    pub indexes_check: Option<Verification>,
}

/// What each rank reports back to the driver.
struct RankOutcome {
    search_time: Duration,
    classification_time: Duration,
    /// Overall accuracy; `Some` only on rank 0, which holds the gather.
    accuracy_pct: Option<f64>,
    accuracy_check: Option<Verification>,
    indexes_check: Option<Verification>,
}

/// Executes the classification run described by `cli`.
///
/// # Errors
/// Returns [`RingKnnError`] when loading, exchanging, or classifying fails
/// on any rank.
pub fn run_cli(cli: &Cli) -> Result<ExecutionSummary, RingKnnError> {
    let mode = cli.transport.mode();
    let outcomes = run_ring(cli.ranks, cli.transport.wiring(), |mut ctx| {
        run_rank(cli, mode, &mut ctx)
    })?;

    let indexes_check = outcomes
        .iter()
        .filter_map(|outcome| outcome.indexes_check)
        .reduce(Verification::combine);
    let root = outcomes
        .into_iter()
        .next()
        .ok_or(ringknn_core::TransportError::EmptyRing)?;

    Ok(ExecutionSummary {
        ranks: cli.ranks,
        k: cli.k,
        search_time: root.search_time,
        classification_time: root.classification_time,
        accuracy_pct: root.accuracy_pct.unwrap_or(0.0),
        accuracy_check: root.accuracy_check,
        indexes_check,
    })
}

fn run_rank(
    cli: &Cli,
    mode: ExchangeMode,
    ctx: &mut RankContext,
) -> Result<RankOutcome, RingKnnError> {
    let rank = ctx.rank();
    let ranks = ctx.ranks();

    let data = load_chunk(&cli.data_file, ranks, rank)?;

    ctx.barrier();
    let started = Instant::now();
    let mut knns = distributed_knn_search(ctx.transport_mut(), &data, cli.k, mode)?;
    ctx.barrier();
    let search_time = started.elapsed();
    info!(rank, secs = search_time.as_secs_f64(), "knn search complete");

    let labels = load_chunk(&cli.labels_file, ranks, rank)?;

    ctx.barrier();
    let started = Instant::now();
    let labelled = distributed_labeling(ctx.transport_mut(), &mut knns, &labels, mode)?;
    let classified = majority_vote(&labelled)?;
    ctx.barrier();
    let classification_time = started.elapsed();
    info!(
        rank,
        secs = classification_time.as_secs_f64(),
        "classification complete"
    );

    // Score the rank's own points and gather the counts to rank 0.
    let valid = (0..classified.rows())
        .filter(|&point| classified.get(point, 0) == labels.get(point, 0))
        .count() as u64;
    let gathered = ctx.gather_counts(valid, classified.rows() as u64)?;

    let indexes_check = match &cli.expected_indexes_file {
        Some(path) => Some(verify::indexes(path, &knns, data.chunk_offset())?),
        None => None,
    };

    let (accuracy_pct, accuracy_check) = match gathered {
        Some(counts) => {
            let valid_total: u64 = counts.iter().map(|(valid, _)| valid).sum();
            let points_total: u64 = counts.iter().map(|(_, total)| total).sum();
            let pct = if points_total == 0 {
                0.0
            } else {
                valid_total as f64 / points_total as f64 * 100.0
            };
            let check = match &cli.expected_accuracy_file {
                Some(path) => Some(verify::accuracy(path, pct)?),
                None => None,
            };
            (Some(pct), check)
        }
        None => (None, None),
    };

    Ok(RankOutcome {
        search_time,
        classification_time,
        accuracy_pct,
        accuracy_check,
        indexes_check,
    })
}

/// Renders `summary` to `writer` in the driver's line format.
///
/// # Errors
/// Returns [`io::Error`] if writing to the supplied writer fails.
pub fn render_summary(summary: &ExecutionSummary, mut writer: impl Write) -> io::Result<()> {
    writeln!(
        writer,
        "knn search using {} ranks took: {:.2} secs.",
        summary.ranks,
        summary.search_time.as_secs_f64()
    )?;
    writeln!(
        writer,
        "knn classification using {} ranks took: {:.2} secs.",
        summary.ranks,
        summary.classification_time.as_secs_f64()
    )?;
    writeln!(
        writer,
        "k = {} - classification accuracy: {:.1} %",
        summary.k, summary.accuracy_pct
    )?;
    if let Some(check) = summary.accuracy_check {
        writeln!(writer, "accuracy check: {check}")?;
    }
    if let Some(check) = summary.indexes_check {
        writeln!(writer, "neighbour index check: {check}")?;
    }
    Ok(())
}
