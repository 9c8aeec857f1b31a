//! Progress reporting utilities using indicatif.
//!
//! The pipeline reports through the [`ProgressCallback`] trait; [`Progress`]
//! renders it as terminal progress bars on stderr. Phases run one after the
//! other, so one bar is active at a time:
//!
//! | Phase   | Total             | Item                          |
//! |---------|-------------------|-------------------------------|
//! | `prune` | store records     | one record checked            |
//! | `scan`  | unknown (spinner) | one package found, by its key |
//! | `link`  | qualifying groups | one group linked, by its key  |

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Progress callback for pipeline phases.
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (`prune`, `scan` or `link`)
    /// * `total` - Number of items, or `0` if unknown
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Items processed so far (1-based)
    /// * `key` - The package key just processed
    fn on_progress(&self, current: usize, key: &str);

    /// Called when an item has been processed, with the bytes it reclaimed.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);
}

/// Columns taken by the fixed part of each template.
const TEMPLATE_WIDTH: usize = 48;

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    active: Mutex<Option<ProgressBar>>,
    reclaimed: Mutex<u64>,
    console_width: usize,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    /// * `console_width` - Width that messages are truncated to fit.
    ///
    /// # Examples
    ///
    /// ```
    /// use nmdedupe::progress::Progress;
    ///
    /// let progress = Progress::new(false, 80);
    /// ```
    #[must_use]
    pub fn new(quiet: bool, console_width: usize) -> Self {
        let multi = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self {
            multi,
            active: Mutex::new(None),
            reclaimed: Mutex::new(0),
            console_width,
            quiet,
        }
    }

    fn message_width(&self) -> usize {
        self.console_width.saturating_sub(TEMPLATE_WIDTH).max(10)
    }

    fn scan_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} Scanning [{elapsed_precise}] {pos} packages {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn bar_style(label: &str) -> ProgressStyle {
        ProgressStyle::with_template(&format!(
            "{label} [{{elapsed_precise}}] [{{bar:30.cyan/blue}}] {{pos}}/{{len}} {{msg}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn replace_active(&self, bar: ProgressBar) {
        if let Ok(mut active) = self.active.lock() {
            if let Some(old) = active.replace(bar) {
                old.finish_and_clear();
            }
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        let bar = match phase {
            "scan" => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(Self::scan_style());
                pb.enable_steady_tick(Duration::from_millis(100));
                pb
            }
            "prune" => {
                let pb = self.multi.add(ProgressBar::new(total as u64));
                pb.set_style(Self::bar_style("Pruning"));
                pb
            }
            "link" => {
                if let Ok(mut reclaimed) = self.reclaimed.lock() {
                    *reclaimed = 0;
                }
                let pb = self.multi.add(ProgressBar::new(total as u64));
                pb.set_style(Self::bar_style("Linking"));
                pb
            }
            other => {
                let pb = self.multi.add(ProgressBar::new(total as u64));
                pb.set_style(Self::bar_style(other));
                pb
            }
        };
        self.replace_active(bar);
    }

    fn on_progress(&self, current: usize, key: &str) {
        if self.quiet {
            return;
        }
        if let Ok(active) = self.active.lock() {
            if let Some(pb) = active.as_ref() {
                pb.set_position(current as u64);
                pb.set_message(truncate_message(key, self.message_width()));
            }
        }
    }

    fn on_item_completed(&self, bytes: u64) {
        if let Ok(mut reclaimed) = self.reclaimed.lock() {
            *reclaimed += bytes;
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        let Some(pb) = self.active.lock().ok().and_then(|mut a| a.take()) else {
            return;
        };

        match phase {
            "scan" => pb.finish_with_message(format!("({} packages)", pb.position())),
            "link" => {
                let reclaimed = self.reclaimed.lock().map(|r| *r).unwrap_or(0);
                pb.finish_with_message(format!("{} reclaimed", bytesize::ByteSize::b(reclaimed)));
            }
            _ => pb.finish_with_message("done"),
        }
    }
}

/// Truncate a message to at most `max_len` characters, keeping the end.
///
/// Package keys end in the distinguishing `@version#device`, so the start
/// is cut.
#[must_use]
pub fn truncate_message(msg: &str, max_len: usize) -> String {
    let count = msg.chars().count();
    if count <= max_len {
        return msg.to_string();
    }
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let tail: String = msg.chars().skip(count - (max_len - 3)).collect();
    format!("...{tail}")
}
