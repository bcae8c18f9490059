//! CLI entry point for the ringknn classification driver.
//!
//! Parses command-line arguments with clap, runs the distributed
//! classification over an in-process ring of ranks, renders the timing and
//! accuracy lines to stdout, and maps errors to appropriate exit codes.
//! Logging is initialized eagerly so subsequent operations can emit
//! structured diagnostics via `tracing`.

use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use ringknn_cli::{
    cli::{Cli, render_summary, run_cli},
    logging::{self, LoggingError},
};
use ringknn_core::RingKnnError;
use tracing::error;

/// Parse CLI arguments, execute the run, render the summary, and flush the
/// output stream.
fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let summary = run_cli(&cli).context("failed to execute run")?;
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    render_summary(&summary, &mut writer).context("failed to render summary")?;
    writer.flush().context("failed to flush output")?;
    Ok(())
}

fn main() -> ExitCode {
    if let Err(err) = logging::init_logging() {
        report_logging_init_error(&err);
        return ExitCode::FAILURE;
    }

    if let Err(err) = try_main() {
        // Walk the context chain for the structured core code, so wrappers
        // do not obscure it.
        let code = err
            .chain()
            .find_map(|cause| {
                let cause: &(dyn std::error::Error + 'static) = cause;
                cause.downcast_ref::<RingKnnError>().map(RingKnnError::code)
            })
            .map(|code| code.as_str());

        error!(error = %err, code = ?code, "run failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Emit a fallback diagnostic to stderr when tracing initialization fails.
fn report_logging_init_error(err: &LoggingError) {
    eprintln!("failed to initialize logging: {err}");
}
