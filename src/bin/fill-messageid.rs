//! `fill-messageid`: populate the message-id table of existing environments.
//!
//! ```text
//! fill-messageid [-v] [--rebuild | -n] <environment>...
//! ```

use clap::Parser;
use std::io;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use threadline::fill::{fill_paths, FillArgs};

fn setup_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = FillArgs::parse();
    setup_logging(args.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match fill_paths(&args.environments, args.options(), &mut out) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Backfill failed");
            eprintln!("fill-messageid: {e}");
            ExitCode::FAILURE
        }
    }
}
