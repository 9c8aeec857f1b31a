//! Per-run counters, limits and the cancellation token.
//!
//! One [`RunContext`] is created by the orchestrator for each invocation and
//! passed by reference into every stage. Counters are atomics so stages on
//! the worker pool can update them without locks.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::signal::CancelToken;

/// Shared state for one deduplication run.
#[derive(Debug)]
pub struct RunContext {
    bytes_saved: AtomicU64,
    packages_scanned: AtomicUsize,
    link_failures: AtomicUsize,
    cancel: CancelToken,
    concurrency: usize,
}

impl RunContext {
    /// Create a context with zeroed counters.
    ///
    /// `concurrency` is clamped to at least 1.
    #[must_use]
    pub fn new(concurrency: usize, cancel: CancelToken) -> Self {
        Self {
            bytes_saved: AtomicU64::new(0),
            packages_scanned: AtomicUsize::new(0),
            link_failures: AtomicUsize::new(0),
            cancel,
            concurrency: concurrency.max(1),
        }
    }

    /// Maximum number of in-flight filesystem operations per stage.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// The shared cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Shorthand for `cancel_token().is_cancelled()`.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Build the bounded worker pool used by the manifest, link and prune
    /// stages.
    ///
    /// # Errors
    ///
    /// Returns the rayon error if the threads cannot be spawned.
    pub fn build_pool(&self) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .thread_name(|i| format!("nmdedupe-worker-{i}"))
            .build()
    }

    /// Add reclaimed bytes.
    pub fn add_bytes_saved(&self, bytes: u64) {
        self.bytes_saved.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Bytes reclaimed (or reclaimable, in dry-run modes) so far.
    #[must_use]
    pub fn bytes_saved(&self) -> u64 {
        self.bytes_saved.load(Ordering::Relaxed)
    }

    /// Count one more scanned package; returns the new total.
    pub fn record_package_scanned(&self) -> usize {
        self.packages_scanned.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Packages with a usable manifest seen so far.
    #[must_use]
    pub fn packages_scanned(&self) -> usize {
        self.packages_scanned.load(Ordering::Relaxed)
    }

    /// Count one failed link operation.
    pub fn record_link_failure(&self) {
        self.link_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Failed link operations so far.
    #[must_use]
    pub fn link_failures(&self) -> usize {
        self.link_failures.load(Ordering::Relaxed)
    }
}
