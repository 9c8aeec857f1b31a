//! Command-line interface definitions for nmdedupe.
//!
//! This module defines all CLI arguments using the clap derive API. Every
//! option that also exists in the config file is optional here, so an unset
//! flag leaves the config (or environment) value in place.
//!
//! # Example
//!
//! ```bash
//! # Link duplicate packages below ~/projects
//! nmdedupe ~/projects
//!
//! # Show what would be linked, without touching anything
//! nmdedupe --dry-run ~/projects ~/work
//!
//! # Write an equivalent shell script instead
//! nmdedupe --commands --link-type symlink ~/projects > link.sh
//!
//! # Drop stale records from the reference store
//! nmdedupe --prune
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::actions::{LinkMode, LinkPolicy};
use crate::config::ConfigOverrides;

/// Deduplicate installed node_modules packages with filesystem links.
///
/// nmdedupe finds copies of the same package version in different
/// node_modules trees on one device and links all but one of them to the
/// survivor.
#[derive(Debug, Parser)]
#[command(name = "nmdedupe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Directories to scan for node_modules trees
    #[arg(value_name = "PATH", required_unless_present = "prune")]
    pub paths: Vec<PathBuf>,

    /// Drop reference-store records whose links no longer exist
    #[arg(long)]
    pub prune: bool,

    /// Report what would be linked without changing anything
    #[arg(short = 'n', long, conflicts_with = "commands")]
    pub dry_run: bool,

    /// Print shell commands that perform the linking instead of running them
    #[arg(long)]
    pub commands: bool,

    /// Kind of link to create
    #[arg(long, value_enum, value_name = "TYPE")]
    pub link_type: Option<LinkPolicy>,

    /// Minimum package size to link (e.g., 10KB, 1MB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Maximum directory depth below each path (0 = unlimited)
    #[arg(long, value_name = "N")]
    pub tree_depth: Option<usize>,

    /// Number of concurrent filesystem operations
    #[arg(long, value_name = "N")]
    pub concurrent_ops: Option<usize>,

    /// Reference store file
    #[arg(long, value_name = "PATH")]
    pub refs_file: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Terminal width used for progress messages
    #[arg(long, value_name = "COLUMNS")]
    pub console_width: Option<usize>,

    /// Output format for the run summary
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Report errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,
}

impl Cli {
    /// The execution mode selected by `--dry-run` / `--commands`.
    #[must_use]
    pub fn link_mode(&self) -> LinkMode {
        if self.commands {
            LinkMode::Commands
        } else if self.dry_run {
            LinkMode::DryRun
        } else {
            LinkMode::Apply
        }
    }

    /// Config fields given on the command line.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            refs_file: self.refs_file.clone(),
            concurrent_ops: self.concurrent_ops,
            min_size: self.min_size,
            tree_depth: self.tree_depth,
            console_width: self.console_width,
            link_type: self.link_type,
        }
    }
}

/// Output format for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON for scripting
    Json,
}

/// Parse a human-readable size string into bytes.
///
/// Supports the following formats:
/// - Plain numbers: "1024" (bytes)
/// - Decimal units: "1KB", "1MB", "1GB", "1TB" (powers of 1000)
/// - Binary units: "1KiB", "1MiB", "1GiB", "1TiB" (powers of 1024)
///
/// # Errors
///
/// Returns an error if the string is empty, the number is invalid or the
/// suffix is unknown.
///
/// # Examples
///
/// ```
/// use nmdedupe::cli::parse_size;
///
/// assert_eq!(parse_size("1KB").unwrap(), 1_000);
/// assert_eq!(parse_size("1KiB").unwrap(), 1_024);
/// ```
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    // Find where the number ends and the suffix begins
    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
