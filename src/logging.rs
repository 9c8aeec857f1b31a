//! Logging infrastructure for nmdedupe.
//!
//! Logging uses the `log` facade with the `env_logger` backend, writing to
//! stderr so stdout stays clean for summaries and generated commands.
//! Log levels are determined by (in priority order):
//!
//! 1. `RUST_LOG` environment variable (if set)
//! 2. CLI flags: `--quiet` (error only) or `--verbose` (debug/trace)
//! 3. Default: info level
//!
//! # Build-specific Formatting
//!
//! - **Debug builds**: Timestamp and level, plus the module path from `-v` on
//! - **Release builds**: Level and message only
//!
//! # Example
//!
//! ```rust,no_run
//! use nmdedupe::logging::init_logging;
//!
//! // Debug level (-v)
//! init_logging(1, false);
//! log::debug!("Scanning {}", "/home/user/projects");
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Initialize the logging subsystem based on CLI verbosity flags.
///
/// Only the first call in a process installs a logger; later calls (e.g.
/// from tests driving `run_app` repeatedly) are ignored.
///
/// # Arguments
///
/// * `verbose` - Verbosity count from CLI (0=normal, 1=debug, 2+=trace)
/// * `quiet` - If true, only show errors (overridden by RUST_LOG)
pub fn init_logging(verbose: u8, quiet: bool) {
    let from_env = env::var("RUST_LOG").ok();

    let mut builder = Builder::new();
    match &from_env {
        Some(_) => {
            builder.parse_default_env();
        }
        None => {
            builder.filter_level(determine_level(verbose, quiet));
            // jwalk reports every unreadable directory on its own
            builder.filter_module("jwalk", LevelFilter::Warn);
        }
    }
    configure_format(&mut builder, verbose);

    if builder.try_init().is_err() {
        return;
    }

    match from_env {
        Some(spec) => log::debug!("Logging initialized from RUST_LOG={}", spec),
        None => log::debug!(
            "Logging initialized at level: {:?}",
            determine_level(verbose, quiet)
        ),
    }
}

/// Determine the log level from CLI flags.
///
/// `quiet` wins over any verbosity.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn configure_format(builder: &mut Builder, verbose: u8) {
    #[cfg(debug_assertions)]
    {
        builder.format(move |buf, record| {
            let timestamp = buf.timestamp_seconds();
            let level = record.level();
            let level_style = buf.default_level_style(level);

            if verbose >= 1 {
                writeln!(
                    buf,
                    "{} {level_style}{:<5}{level_style:#} [{}] {}",
                    timestamp,
                    level,
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            } else {
                writeln!(
                    buf,
                    "{} {level_style}{:<5}{level_style:#} {}",
                    timestamp,
                    level,
                    record.args()
                )
            }
        });
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = verbose;
        builder.format(|buf, record| {
            let level = record.level();
            let level_style = buf.default_level_style(level);
            writeln!(
                buf,
                "{level_style}{:<5}{level_style:#} {}",
                level,
                record.args()
            )
        });
    }
}
