//! The scan → group → link pipeline.
//!
//! # Overview
//!
//! [`Deduplicator::run`] drives one invocation:
//!
//! 1. **Prune** (optional): stale reference records are dropped.
//! 2. **Scan**: every root is walked, manifests are parsed on the worker pool
//!    and the results stream into a [`PackageGrouper`] on the calling thread.
//! 3. **Link**: each qualifying group is planned and executed on the pool;
//!    new links are recorded in the [`ReferenceStore`].
//!
//! Persisting the store is left to the caller.
//!
//! # Cancellation
//!
//! The shared [`CancelToken`] stops the walk, makes the grouper discard its
//! partial groups and skips link plans that have not started yet.
//!
//! # Example
//!
//! ```no_run
//! use nmdedupe::dedupe::{DedupeConfig, Deduplicator};
//! use nmdedupe::refs::ReferenceStore;
//! use std::path::{Path, PathBuf};
//!
//! let mut store = ReferenceStore::load(Path::new("refs.json"));
//! let dedupe = Deduplicator::new(DedupeConfig::default()).unwrap();
//! let summary = dedupe
//!     .run(&[PathBuf::from("/home/user/projects")], false, &mut store)
//!     .unwrap();
//! println!("Saved {} bytes", summary.bytes_saved);
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use super::groups::{PackageGroup, PackageGrouper, PackageKey};
use crate::actions::{plan_group, LinkExecutor, LinkMode, LinkPlan, LinkPolicy, LinkReport};
use crate::context::RunContext;
use crate::error::ExitCode;
use crate::progress::ProgressCallback;
use crate::refs::{prune_store, PruneStats, ReferenceStore};
use crate::scanner::{extract_entry, PackageEntry, ScanError, Walker, WalkerConfig};
use crate::signal::CancelToken;

/// Configuration for a deduplication run.
#[derive(Clone)]
pub struct DedupeConfig {
    /// Directory levels below each root to read (`0` = unlimited)
    pub tree_depth: usize,
    /// Minimum canonical package size for a group to be linked
    pub min_size: u64,
    /// Kind of link to create
    pub policy: LinkPolicy,
    /// Apply, dry-run or command generation
    pub mode: LinkMode,
    /// Concurrent filesystem operations
    pub concurrency: usize,
    /// Optional progress callback
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
    /// Cancellation token shared with the signal handler
    pub cancel: CancelToken,
}

impl std::fmt::Debug for DedupeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupeConfig")
            .field("tree_depth", &self.tree_depth)
            .field("min_size", &self.min_size)
            .field("policy", &self.policy)
            .field("mode", &self.mode)
            .field("concurrency", &self.concurrency)
            .field("progress_callback", &self.progress_callback.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            tree_depth: 0,
            min_size: 0,
            policy: LinkPolicy::default(),
            mode: LinkMode::default(),
            concurrency: 4,
            progress_callback: None,
            cancel: CancelToken::new(),
        }
    }
}

impl DedupeConfig {
    /// Set the walk depth limit.
    #[must_use]
    pub fn with_tree_depth(mut self, depth: usize) -> Self {
        self.tree_depth = depth;
        self
    }

    /// Set the minimum package size.
    #[must_use]
    pub fn with_min_size(mut self, bytes: u64) -> Self {
        self.min_size = bytes;
        self
    }

    /// Set the link policy.
    #[must_use]
    pub fn with_policy(mut self, policy: LinkPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the execution mode.
    #[must_use]
    pub fn with_mode(mut self, mode: LinkMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the concurrency limit (clamped to at least 1).
    #[must_use]
    pub fn with_concurrency(mut self, ops: usize) -> Self {
        self.concurrency = ops.max(1);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Set the cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Counters from the link stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Groups that qualified for linking
    pub planned_groups: usize,
    /// Groups with at least one duplicate linked
    pub groups_linked: usize,
    /// Duplicates linked
    pub duplicates_linked: usize,
    /// Identities newly added to the store
    pub records_added: usize,
    /// Dry-run descriptions or commands, sorted by key
    pub lines: Vec<String>,
}

/// Result of one [`Deduplicator::run`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Packages with a usable manifest
    pub packages_scanned: usize,
    /// Distinct package keys
    pub distinct_packages: usize,
    /// Keys seen more than once
    pub duplicate_groups: usize,
    /// Groups that qualified for linking
    pub planned_groups: usize,
    /// Groups with at least one duplicate linked
    pub groups_linked: usize,
    /// Duplicates linked (or that would be linked)
    pub duplicates_linked: usize,
    /// Bytes reclaimed (or reclaimable)
    pub bytes_saved: u64,
    /// Duplicates that failed to link
    pub link_failures: usize,
    /// Identities added to the reference store
    pub records_added: usize,
    /// Prune statistics, if pruning ran
    pub prune: Option<PruneStats>,
    /// Whether the reference store file was rewritten
    pub store_updated: bool,
    /// Whether the run was cancelled
    pub interrupted: bool,
    /// Whether the filesystem was left untouched
    pub dry_run: bool,
    /// Dry-run descriptions or commands, sorted by key
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<String>,
    /// Wall-clock duration of the run
    #[serde(serialize_with = "serialize_millis", rename = "duration_ms")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

impl RunSummary {
    /// Exit code for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        if self.interrupted {
            ExitCode::Interrupted
        } else if self.link_failures > 0 {
            ExitCode::PartialSuccess
        } else {
            ExitCode::Success
        }
    }
}

/// Runs the deduplication pipeline on a bounded worker pool.
pub struct Deduplicator {
    config: DedupeConfig,
    ctx: RunContext,
    pool: rayon::ThreadPool,
}

impl Deduplicator {
    /// Create a deduplicator and its worker pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker threads cannot be spawned.
    pub fn new(config: DedupeConfig) -> Result<Self, rayon::ThreadPoolBuildError> {
        let ctx = RunContext::new(config.concurrency, config.cancel.clone());
        let pool = ctx.build_pool()?;
        Ok(Self { config, ctx, pool })
    }

    /// Shared counters and the cancellation token.
    #[must_use]
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &DedupeConfig {
        &self.config
    }

    fn progress(&self) -> Option<&Arc<dyn ProgressCallback>> {
        self.config.progress_callback.as_ref()
    }

    /// Run the whole pipeline.
    ///
    /// With `prune` set, stale store records are dropped first. `roots` may be
    /// empty for a prune-only run.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if a root cannot be scanned.
    pub fn run(
        &self,
        roots: &[PathBuf],
        prune: bool,
        store: &mut ReferenceStore,
    ) -> Result<RunSummary, ScanError> {
        let start = Instant::now();
        let mut summary = RunSummary {
            dry_run: !self.config.mode.mutates(),
            ..RunSummary::default()
        };

        if prune {
            summary.prune = Some(self.prune(store));
        }

        if !roots.is_empty() && !self.ctx.is_cancelled() {
            if let Some(groups) = self.scan(roots)? {
                summary.distinct_packages = groups.len();
                summary.duplicate_groups = groups.iter().filter(|g| g.has_duplicates()).count();

                let stats = self.link(&groups, store);
                summary.planned_groups = stats.planned_groups;
                summary.groups_linked = stats.groups_linked;
                summary.duplicates_linked = stats.duplicates_linked;
                summary.records_added = stats.records_added;
                summary.lines = stats.lines;
            }
        }

        summary.packages_scanned = self.ctx.packages_scanned();
        summary.bytes_saved = self.ctx.bytes_saved();
        summary.link_failures = self.ctx.link_failures();
        summary.interrupted = self.ctx.is_cancelled();
        summary.duration = start.elapsed();

        if summary.interrupted {
            log::info!("Run interrupted after {:?}", summary.duration);
        }
        Ok(summary)
    }

    /// Drop stale records from `store`.
    pub fn prune(&self, store: &mut ReferenceStore) -> PruneStats {
        if let Some(cb) = self.progress() {
            cb.on_phase_start("prune", store.len());
        }
        let stats = prune_store(store, &self.ctx, &self.pool);
        if let Some(cb) = self.progress() {
            cb.on_phase_end("prune");
        }
        stats
    }

    /// Walk `roots` and group every package found.
    ///
    /// Returns `Ok(None)` if the run was cancelled before the scan finished.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if a root is missing, not a directory or
    /// unreadable. Errors below a root are logged and skipped.
    pub fn scan(&self, roots: &[PathBuf]) -> Result<Option<Vec<PackageGroup>>, ScanError> {
        let walker_config = WalkerConfig::new(self.config.tree_depth, self.config.concurrency);
        let mut walkers = Vec::with_capacity(roots.len());
        for root in roots {
            Walker::new(root, walker_config.clone()).validate_root()?;
            let absolute = std::fs::canonicalize(root).map_err(|source| ScanError::Io {
                path: root.clone(),
                source,
            })?;
            walkers.push(
                Walker::new(&absolute, walker_config.clone())
                    .with_cancel_token(self.ctx.cancel_token().clone()),
            );
        }

        if let Some(cb) = self.progress() {
            cb.on_phase_start("scan", 0);
        }

        let (path_tx, path_rx) = mpsc::channel::<PathBuf>();
        let (entry_tx, entry_rx) = mpsc::channel::<(PackageKey, PackageEntry)>();
        let mut grouper = PackageGrouper::new();

        // Roots are walked concurrently, at most `concurrency` at a time.
        let next_root = AtomicUsize::new(0);
        let walker_threads = walkers.len().min(self.config.concurrency);

        std::thread::scope(|s| {
            for _ in 0..walker_threads {
                let path_tx = path_tx.clone();
                let walkers = &walkers;
                let next_root = &next_root;
                s.spawn(move || {
                    while let Some(walker) = walkers.get(next_root.fetch_add(1, Ordering::Relaxed))
                    {
                        log::debug!("Walking {}", walker.root().display());
                        for item in walker.walk() {
                            match item {
                                Ok(path) => {
                                    if path_tx.send(path).is_err() {
                                        return;
                                    }
                                }
                                Err(e) => log::debug!("Skipping during walk: {}", e),
                            }
                        }
                    }
                });
            }
            drop(path_tx);

            let pool = &self.pool;
            let ctx = &self.ctx;
            s.spawn(move || {
                pool.install(|| {
                    path_rx
                        .into_iter()
                        .par_bridge()
                        .for_each_with(entry_tx, |tx, path| {
                            if ctx.is_cancelled() {
                                return;
                            }
                            match extract_entry(&path) {
                                Ok(pair) => {
                                    let _ = tx.send(pair);
                                }
                                Err(e) => log::trace!("Ignoring {}: {}", path.display(), e),
                            }
                        });
                });
            });

            for (key, entry) in entry_rx {
                let count = self.ctx.record_package_scanned();
                if let Some(cb) = self.progress() {
                    cb.on_progress(count, &key.to_string());
                }
                grouper.push(key, entry);
            }
        });

        let stats = grouper.stats();
        if let Some(cb) = self.progress() {
            cb.on_phase_end("scan");
        }
        log::info!(
            "Scanned {} packages: {} distinct, {} with duplicates",
            stats.total_entries,
            stats.distinct_keys,
            stats.duplicate_groups
        );

        Ok(grouper.finish(self.ctx.cancel_token()))
    }

    /// Plan and execute every group, then record the new links in `store`.
    pub fn link(&self, groups: &[PackageGroup], store: &mut ReferenceStore) -> LinkStats {
        let min_size = self.config.min_size;
        let mut plans: Vec<LinkPlan> = self.pool.install(|| {
            groups
                .par_iter()
                .filter_map(|group| plan_group(group, min_size))
                .collect()
        });
        plans.sort_by(|a, b| a.key.cmp(&b.key));

        if let Some(cb) = self.progress() {
            cb.on_phase_start("link", plans.len());
        }

        let executor = LinkExecutor::new(self.config.mode, self.config.policy);
        let done = AtomicUsize::new(0);
        let reports: Vec<LinkReport> = self.pool.install(|| {
            plans
                .par_iter()
                .filter_map(|plan| {
                    if self.ctx.is_cancelled() {
                        return None;
                    }
                    let report = executor.execute(plan, &self.ctx);
                    if let Some(cb) = self.progress() {
                        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                        cb.on_progress(n, &plan.key.to_string());
                        cb.on_item_completed(report.bytes_saved);
                    }
                    Some(report)
                })
                .collect()
        });

        let mut stats = LinkStats {
            planned_groups: plans.len(),
            ..LinkStats::default()
        };
        for report in reports {
            if report.linked > 0 {
                stats.groups_linked += 1;
            }
            stats.duplicates_linked += report.linked;
            for identity in report.records {
                if store.insert(&report.key, identity) {
                    stats.records_added += 1;
                }
            }
            stats.lines.extend(report.lines);
        }

        if let Some(cb) = self.progress() {
            cb.on_phase_end("link");
        }
        log::info!(
            "Linked {} duplicates in {} of {} groups",
            stats.duplicates_linked,
            stats.groups_linked,
            stats.planned_groups
        );
        stats
    }
}
