//! Output formatters for run results.
//!
//! This module provides different renderings of a [`RunSummary`]:
//! - Text for people ([`TextOutput`])
//! - JSON for automation and scripting ([`json::JsonOutput`])
//! - A POSIX shell script for `--commands` mode ([`script::ScriptOutput`])
//!
//! # Example
//!
//! ```no_run
//! use nmdedupe::dedupe::{DedupeConfig, Deduplicator};
//! use nmdedupe::output::TextOutput;
//! use nmdedupe::refs::ReferenceStore;
//! use std::path::{Path, PathBuf};
//!
//! let mut store = ReferenceStore::load(Path::new("refs.json"));
//! let dedupe = Deduplicator::new(DedupeConfig::default()).unwrap();
//! let summary = dedupe.run(&[PathBuf::from(".")], false, &mut store).unwrap();
//! TextOutput::new(&summary, store.path()).write_to(&mut std::io::stdout()).unwrap();
//! ```

pub mod json;
pub mod script;

use std::io::Write;
use std::path::Path;

use bytesize::ByteSize;

use crate::dedupe::RunSummary;

pub use json::JsonOutput;
pub use script::ScriptOutput;

/// Human-readable summary, with dry-run lines first.
pub struct TextOutput<'a> {
    summary: &'a RunSummary,
    refs_file: &'a Path,
}

impl<'a> TextOutput<'a> {
    /// Create a text formatter.
    #[must_use]
    pub fn new(summary: &'a RunSummary, refs_file: &'a Path) -> Self {
        Self { summary, refs_file }
    }

    /// Write the summary.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let s = self.summary;

        for line in &s.lines {
            writeln!(writer, "{line}")?;
        }
        if !s.lines.is_empty() {
            writeln!(writer)?;
        }

        if let Some(prune) = &s.prune {
            writeln!(
                writer,
                "Pruned {} of {} reference records",
                prune.removed, prune.checked
            )?;
        }

        if s.packages_scanned > 0 || s.distinct_packages > 0 {
            writeln!(
                writer,
                "Scanned {} packages ({} distinct, {} duplicated)",
                s.packages_scanned, s.distinct_packages, s.duplicate_groups
            )?;
            if s.dry_run {
                writeln!(
                    writer,
                    "Would link {} duplicates in {} groups, saving {}",
                    s.duplicates_linked,
                    s.planned_groups,
                    ByteSize::b(s.bytes_saved)
                )?;
            } else {
                writeln!(
                    writer,
                    "Linked {} duplicates in {} groups, saved {}",
                    s.duplicates_linked,
                    s.groups_linked,
                    ByteSize::b(s.bytes_saved)
                )?;
            }
        }

        if s.link_failures > 0 {
            writeln!(
                writer,
                "{} duplicates could not be linked (run with -v for details)",
                s.link_failures
            )?;
        }
        if s.store_updated {
            writeln!(writer, "Reference store updated: {}", self.refs_file.display())?;
        }
        if s.interrupted {
            writeln!(writer, "Interrupted; results are partial")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::PruneStats;

    fn render(summary: &RunSummary) -> String {
        let mut buf = Vec::new();
        TextOutput::new(summary, Path::new("/tmp/refs.json"))
            .write_to(&mut buf)
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_text_applied_run() {
        let text = render(&RunSummary {
            packages_scanned: 10,
            distinct_packages: 6,
            duplicate_groups: 2,
            groups_linked: 2,
            duplicates_linked: 4,
            bytes_saved: 2 * 1024 * 1024,
            store_updated: true,
            ..RunSummary::default()
        });

        assert!(text.contains("Scanned 10 packages (6 distinct, 2 duplicated)"));
        assert!(text.contains("Linked 4 duplicates in 2 groups, saved 2.0 MiB"));
        assert!(text.contains("Reference store updated: /tmp/refs.json"));
        assert!(!text.contains("Interrupted"));
    }

    #[test]
    fn test_text_dry_run_lists_lines_first() {
        let text = render(&RunSummary {
            packages_scanned: 2,
            distinct_packages: 1,
            dry_run: true,
            lines: vec!["would symlink /b -> /a (1.0 KiB)".to_string()],
            ..RunSummary::default()
        });

        assert!(text.starts_with("would symlink /b -> /a"));
        assert!(text.contains("Would link"));
    }

    #[test]
    fn test_text_prune_only() {
        let text = render(&RunSummary {
            prune: Some(PruneStats {
                checked: 5,
                removed: 2,
            }),
            ..RunSummary::default()
        });

        assert_eq!(text.trim(), "Pruned 2 of 5 reference records");
    }

    #[test]
    fn test_text_failures_and_interrupt() {
        let text = render(&RunSummary {
            link_failures: 3,
            interrupted: true,
            ..RunSummary::default()
        });
        assert!(text.contains("3 duplicates could not be linked"));
        assert!(text.contains("Interrupted"));
    }
}
