//! nmdedupe - node_modules package deduplicator
//!
//! Finds copies of the same package version installed in different
//! `node_modules` trees on one device and replaces all but one of them with
//! filesystem links to the survivor. Links created are remembered in a
//! reference store so later runs can verify and prune them.

pub mod actions;
pub mod cli;
pub mod config;
pub mod context;
pub mod dedupe;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod refs;
pub mod scanner;
pub mod signal;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::{Cli, OutputFormat};
use crate::config::Config;
use crate::dedupe::{DedupeConfig, Deduplicator};
use crate::error::ExitCode;
use crate::output::{JsonOutput, ScriptOutput, TextOutput};
use crate::progress::{Progress, ProgressCallback};
use crate::refs::ReferenceStore;
use crate::signal::CancelToken;

/// Run one invocation described by `cli`.
///
/// # Errors
///
/// Returns an error for invalid configuration, an unreadable scan root or a
/// failure to save the reference store. Link failures are not errors; they
/// are reported through [`ExitCode::PartialSuccess`].
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config =
        Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.overrides().apply(&mut config);
    config.validate().context("Invalid command-line options")?;
    let refs_path = config
        .refs_path()
        .context("Failed to locate the reference store")?;
    log::debug!("Effective configuration: {:?}", config);

    let cancel = match signal::install_handler() {
        Ok(token) => token,
        Err(e) => {
            log::warn!("Ctrl+C handling unavailable: {}", e);
            CancelToken::new()
        }
    };

    let mode = cli.link_mode();
    let hide_progress = cli.quiet || cli.no_progress;
    let progress: Arc<dyn ProgressCallback> =
        Arc::new(Progress::new(hide_progress, config.console_width));

    let dedupe = Deduplicator::new(
        DedupeConfig::default()
            .with_tree_depth(config.tree_depth)
            .with_min_size(config.min_size)
            .with_policy(config.link_type)
            .with_mode(mode)
            .with_concurrency(config.concurrent_ops)
            .with_progress_callback(progress)
            .with_cancel_token(cancel),
    )
    .context("Failed to start worker threads")?;

    let mut store = ReferenceStore::load(&refs_path);
    let result = dedupe.run(&cli.paths, cli.prune, &mut store);

    // Persist whatever completed, even when the scan itself failed.
    let store_updated = if mode.mutates() {
        store
            .save_if_changed()
            .with_context(|| format!("Failed to save reference store {}", refs_path.display()))?
    } else {
        false
    };

    let mut summary = result.context("Scan failed")?;
    summary.store_updated = store_updated;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.output {
        OutputFormat::Json => JsonOutput::new(&summary, &refs_path).write_to(&mut out)?,
        OutputFormat::Text if mode == actions::LinkMode::Commands => {
            ScriptOutput::new(&summary).write_to(&mut out)?;
        }
        OutputFormat::Text if !cli.quiet => {
            TextOutput::new(&summary, &refs_path).write_to(&mut out)?;
        }
        OutputFormat::Text => {}
    }
    out.flush()?;

    Ok(summary.exit_code())
}
