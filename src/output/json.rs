//! JSON output formatter for run summaries.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "summary": {
//!     "packages_scanned": 1834,
//!     "distinct_packages": 612,
//!     "duplicate_groups": 240,
//!     "planned_groups": 198,
//!     "groups_linked": 198,
//!     "duplicates_linked": 1012,
//!     "bytes_saved": 418381824,
//!     "link_failures": 0,
//!     "records_added": 1012,
//!     "prune": null,
//!     "store_updated": true,
//!     "interrupted": false,
//!     "dry_run": false,
//!     "duration_ms": 5230
//!   },
//!   "refs_file": "/home/user/.local/share/nmdedupe/refs.json",
//!   "exit_code": 0,
//!   "exit_code_name": "ND000"
//! }
//! ```

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::dedupe::RunSummary;
use crate::error::ExitCode;

/// Complete JSON output structure.
#[derive(Debug, Serialize)]
pub struct JsonOutput<'a> {
    /// Run statistics (and dry-run lines, when present)
    pub summary: &'a RunSummary,
    /// Reference store location
    pub refs_file: &'a Path,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "ND000")
    pub exit_code_name: &'static str,
}

impl<'a> JsonOutput<'a> {
    /// Create the output for a finished run.
    #[must_use]
    pub fn new(summary: &'a RunSummary, refs_file: &'a Path) -> Self {
        let exit_code: ExitCode = summary.exit_code();
        Self {
            summary,
            refs_file,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix(),
        }
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writeln!(writer)
    }
}
