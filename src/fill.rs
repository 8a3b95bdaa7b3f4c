//! Backfill of the message-id table.
//!
//! For trackers that ran without this crate, or before switching sender
//! domain, this computes the Message-ID each ticket's creation notification
//! was sent with and stores it, so follow-ups reply into the existing thread.
//!
//! Each environment is processed in its own transaction: an interrupted run
//! leaves the current environment untouched and keeps environments already
//! done.

use std::io::Write;
use std::path::PathBuf;

use crate::env::Environment;
use crate::error::Error;
use crate::msgid::{HashedMessageIdGenerator, MessageIdGenerator};
use crate::{schema, store};

/// Backfill options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillOptions {
    /// Print each computed mapping.
    pub verbose: bool,
    /// Clear the table first.
    pub rebuild: bool,
    /// Compute and print, but write nothing.
    pub dry_run: bool,
}

impl FillOptions {
    /// Reject contradictory options.
    pub fn validate(&self) -> Result<(), Error> {
        if self.rebuild && self.dry_run {
            return Err(Error::Configuration(
                "options --rebuild and --dry-run are mutually exclusive".into(),
            ));
        }
        Ok(())
    }
}

/// What a backfill run did to one environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillSummary {
    /// Rows removed by `--rebuild`.
    pub cleared: usize,
    /// Tickets that had no Message-ID.
    pub candidates: usize,
    /// Rows inserted (zero on a dry run).
    pub inserted: usize,
}

/// Backfill one environment using the tracker's own id generator.
pub fn fill_environment(
    env: &Environment,
    options: FillOptions,
    out: &mut dyn Write,
) -> Result<FillSummary, Error> {
    let generator = HashedMessageIdGenerator::from_config(env.config())?;
    fill_environment_with(env, &generator, options, out)
}

/// Backfill one environment, computing ids with `generator`.
pub fn fill_environment_with(
    env: &Environment,
    generator: &dyn MessageIdGenerator,
    options: FillOptions,
    out: &mut dyn Write,
) -> Result<FillSummary, Error> {
    options.validate()?;
    let from = env.config().notification.smtp_from.clone();

    let summary = env.db_transaction(|tx| {
        if schema::needs_upgrade(tx, schema::SCHEMA_VERSION, schema::SCHEMA_NAME)? {
            return Err(Error::Configuration(
                "the message-id table is missing or outdated; upgrade the environment first"
                    .into(),
            ));
        }

        let mut summary = FillSummary::default();
        if options.rebuild {
            summary.cleared = store::clear_all(tx)?;
        }

        let tickets = store::tickets_without_message_id(tx)?;
        summary.candidates = tickets.len();
        for ticket_id in tickets {
            let message_id = generator.creation_message_id(ticket_id, &from);
            if options.verbose {
                writeln!(out, "{ticket_id} -> {message_id}")?;
            }
            if !options.dry_run && store::insert_if_absent(tx, ticket_id, &message_id)? {
                summary.inserted += 1;
            }
        }
        Ok(summary)
    })?;

    tracing::info!(
        env = ?env.path(),
        cleared = summary.cleared,
        candidates = summary.candidates,
        inserted = summary.inserted,
        dry_run = options.dry_run,
        "Backfilled Message-IDs"
    );
    Ok(summary)
}

/// Backfill each environment in order, stopping at the first failure.
pub fn fill_paths(
    paths: &[PathBuf],
    options: FillOptions,
    out: &mut dyn Write,
) -> Result<Vec<FillSummary>, Error> {
    options.validate()?;
    if paths.is_empty() {
        return Err(Error::Configuration("no environment specified".into()));
    }

    let mut summaries = Vec::with_capacity(paths.len());
    for path in paths {
        let env = Environment::open(path)?;
        summaries.push(fill_environment(&env, options, out)?);
    }
    Ok(summaries)
}

/// Command-line arguments of `fill-messageid`.
#[cfg(feature = "cli")]
#[derive(clap::Parser, Debug)]
#[command(
    name = "fill-messageid",
    version,
    about = "Populate the message-id table of existing environments with computed values"
)]
pub struct FillArgs {
    /// Print each computed ticket -> Message-ID mapping
    #[arg(short, long)]
    pub verbose: bool,

    /// Clear the message-id table first (use with care)
    #[arg(long, conflicts_with = "dry_run")]
    pub rebuild: bool,

    /// Do not modify the database
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Environment directories to process, in order
    #[arg(required = true, value_name = "ENVIRONMENT")]
    pub environments: Vec<PathBuf>,
}

#[cfg(feature = "cli")]
impl FillArgs {
    pub fn options(&self) -> FillOptions {
        FillOptions {
            verbose: self.verbose,
            rebuild: self.rebuild,
            dry_run: self.dry_run,
        }
    }
}
