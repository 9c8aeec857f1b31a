//! Shell script generation for `--commands` mode.
//!
//! Instead of linking, the run emits POSIX shell commands that do the same
//! thing, so they can be reviewed or run on another machine.
//!
//! # Usage
//!
//! ```rust,ignore
//! use nmdedupe::output::script::ScriptOutput;
//!
//! let output = ScriptOutput::new(&summary);
//! output.write_to(&mut std::io::stdout()).unwrap();
//! ```

use std::io::Write;
use std::path::Path;

use crate::dedupe::RunSummary;

/// Formatter for a link command script.
pub struct ScriptOutput<'a> {
    summary: &'a RunSummary,
}

impl<'a> ScriptOutput<'a> {
    /// Create a script from a commands-mode summary.
    #[must_use]
    pub fn new(summary: &'a RunSummary) -> Self {
        Self { summary }
    }

    /// Write the script.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "#!/bin/sh")?;
        writeln!(writer, "# nmdedupe link commands")?;
        writeln!(
            writer,
            "# Generated on: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(writer, "#")?;
        writeln!(
            writer,
            "# Packages scanned: {}",
            self.summary.packages_scanned
        )?;
        writeln!(
            writer,
            "# Duplicates to link: {} in {} groups",
            self.summary.duplicates_linked, self.summary.planned_groups
        )?;
        writeln!(
            writer,
            "# Reclaimable space: {}",
            bytesize::ByteSize::b(self.summary.bytes_saved)
        )?;
        if self.summary.interrupted {
            writeln!(writer, "# WARNING: the scan was interrupted; this list is incomplete.")?;
        }
        writeln!(writer)?;
        writeln!(writer, "set -e")?;
        writeln!(writer)?;

        for line in &self.summary.lines {
            writeln!(writer, "{line}")?;
        }
        Ok(())
    }

    /// Render the script to a string.
    #[must_use]
    pub fn to_script(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Command replacing `target` with a hard link to `source`.
#[must_use]
pub fn hardlink_command(source: &Path, target: &Path) -> String {
    format!("ln -f {} {}", escape_posix(source), escape_posix(target))
}

/// Command replacing the `duplicate` directory with a symlink to `canonical`.
#[must_use]
pub fn symlink_command(canonical: &Path, duplicate: &Path) -> String {
    let duplicate = escape_posix(duplicate);
    format!(
        "rm -rf {duplicate} && ln -s {} {duplicate}",
        escape_posix(canonical)
    )
}

fn escape_posix(path: &Path) -> String {
    let s = path.to_string_lossy();
    // Wrap in single quotes, escape single quotes as '\''
    format!("'{}'", s.replace('\'', "'\\''"))
}
