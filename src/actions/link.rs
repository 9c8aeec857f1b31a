//! Link planning and execution for package groups.
//!
//! # Overview
//!
//! A [`PackageGroup`] holds every scanned copy of one `name@version` on one
//! device. [`plan_group`] decides whether the group is worth linking and
//! which copy survives; [`LinkExecutor`] then turns every other copy into a
//! link to the survivor, or only describes what it would do.
//!
//! # Policies
//!
//! * [`LinkPolicy::Hardlink`]: every regular file of the canonical package
//!   replaces the same relative file of the duplicate with a hard link. The
//!   duplicate keeps its directory structure, so tools that resolve
//!   `node_modules` by real path keep working.
//! * [`LinkPolicy::Symlink`]: the duplicate directory is replaced by a
//!   directory symlink to the canonical copy.
//!
//! # Safety
//!
//! Hard links are staged next to their target first and only renamed into
//! place once every one of them exists, so a staging failure leaves the
//! duplicate untouched. Renames already done when a later rename fails are
//! not undone; the files are identical, so the duplicate stays usable. The
//! manifest is renamed last, and a copy whose manifest is not yet linked is
//! picked up again by the next run. A symlink replacement moves the
//! duplicate aside and moves it back if the symlink cannot be created.
//!
//! # Example
//!
//! ```no_run
//! use nmdedupe::actions::{plan_group, LinkExecutor, LinkMode, LinkPolicy};
//! use nmdedupe::context::RunContext;
//! use nmdedupe::dedupe::PackageGroup;
//! use nmdedupe::signal::CancelToken;
//!
//! # fn groups() -> Vec<PackageGroup> { Vec::new() }
//! let ctx = RunContext::new(4, CancelToken::new());
//! let executor = LinkExecutor::new(LinkMode::DryRun, LinkPolicy::Hardlink);
//!
//! for group in groups() {
//!     if let Some(plan) = plan_group(&group, 0) {
//!         let report = executor.execute(&plan, &ctx);
//!         for line in &report.lines {
//!             println!("{line}");
//!         }
//!     }
//! }
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::context::RunContext;
use crate::dedupe::{PackageGroup, PackageKey};
use crate::output::script::{hardlink_command, symlink_command};
use crate::refs::LinkIdentity;
use crate::scanner::{FileIdentity, HardlinkTracker, PackageEntry, MANIFEST_FILE, NODE_MODULES};

/// Suffix of the temporary names used while a link is being swapped in.
const STAGING_SUFFIX: &str = "nmdedupe-tmp";

/// Kind of filesystem link used to replace duplicate packages.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LinkPolicy {
    /// Hard-link every file of the duplicate to the canonical copy.
    #[default]
    Hardlink,
    /// Replace the duplicate directory with a symlink to the canonical copy.
    Symlink,
}

impl fmt::Display for LinkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardlink => write!(f, "hardlink"),
            Self::Symlink => write!(f, "symlink"),
        }
    }
}

/// What the executor does with a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LinkMode {
    /// Mutate the filesystem and record the new links.
    #[default]
    Apply,
    /// Describe each action without touching anything.
    DryRun,
    /// Emit shell commands equivalent to `Apply`.
    Commands,
}

impl LinkMode {
    /// Whether this mode changes the filesystem.
    #[must_use]
    pub fn mutates(self) -> bool {
        matches!(self, Self::Apply)
    }
}

/// Error linking one duplicate package.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A filesystem operation failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path the operation was applied to
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The duplicate has dependencies of its own that a symlink would hide.
    #[error("{0} contains a nested node_modules and cannot be replaced by a symlink")]
    NestedDependencies(PathBuf),

    /// Canonical and duplicate resolve to the same directory.
    #[error("{0} is the canonical copy itself")]
    SameDirectory(PathBuf),
}

impl LinkError {
    /// The path the error is about.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::NestedDependencies(path) | Self::SameDirectory(path) => {
                path
            }
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A group that qualified for linking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPlan {
    /// Key shared by every member
    pub key: PackageKey,
    /// The surviving copy
    pub canonical: PackageEntry,
    /// Copies to turn into links, sorted by path
    pub duplicates: Vec<PackageEntry>,
    /// On-disk size of the canonical package
    pub package_size: u64,
}

impl LinkPlan {
    /// Package directory of the surviving copy.
    #[must_use]
    pub fn canonical_dir(&self) -> &Path {
        &self.canonical.parent_dir
    }
}

/// Outcome of executing one [`LinkPlan`].
#[derive(Debug)]
pub struct LinkReport {
    /// Key of the linked group
    pub key: PackageKey,
    /// Duplicates linked (or that would be linked)
    pub linked: usize,
    /// Bytes reclaimed (or reclaimable)
    pub bytes_saved: u64,
    /// Identities to record in the reference store
    pub records: Vec<LinkIdentity>,
    /// Dry-run descriptions or shell commands, in duplicate order
    pub lines: Vec<String>,
    /// Duplicates that could not be linked
    pub failures: Vec<LinkError>,
}

impl LinkReport {
    fn new(key: PackageKey) -> Self {
        Self {
            key,
            linked: 0,
            bytes_saved: 0,
            records: Vec::new(),
            lines: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Number of duplicates that failed.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Check if every duplicate was linked.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One file of a duplicate that will be replaced by a hard link.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileLink {
    source: PathBuf,
    target: PathBuf,
    len: u64,
}

/// Decide whether `group` should be linked.
///
/// Members are sorted by manifest path and the first one is canonical.
/// Members whose manifest is already a hard link to an earlier member are
/// dropped. Returns `None` when no duplicate remains or the canonical package
/// is smaller than `min_size`.
#[must_use]
pub fn plan_group(group: &PackageGroup, min_size: u64) -> Option<LinkPlan> {
    if !group.has_duplicates() {
        return None;
    }

    let mut members: Vec<&PackageEntry> = group.entries.iter().collect();
    members.sort_by(|a, b| a.path.cmp(&b.path));

    let mut tracker = HardlinkTracker::new();
    let mut kept: Vec<PackageEntry> = Vec::with_capacity(members.len());
    for member in members {
        if tracker.is_hardlink(&member.identity()) {
            log::trace!("{} is already linked, skipping", member.path.display());
            continue;
        }
        kept.push(member.clone());
    }

    if kept.len() < 2 {
        log::debug!("{}: all copies already linked", group.key);
        return None;
    }

    let canonical = kept.remove(0);
    let package_size = package_size(&canonical.parent_dir);
    if package_size < min_size {
        log::debug!(
            "{}: {} is below the minimum size, skipping",
            group.key,
            ByteSize::b(package_size)
        );
        return None;
    }

    Some(LinkPlan {
        key: group.key.clone(),
        canonical,
        duplicates: kept,
        package_size,
    })
}

/// Regular files below `dir`, relative to it, with their lengths.
///
/// Nested `node_modules` directories belong to other packages and are not
/// entered; symlinks are not followed.
fn package_files(dir: &Path) -> Result<Vec<(PathBuf, u64)>, LinkError> {
    let walk = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !(e.file_type().is_dir() && e.file_name() == NODE_MODULES)
        });

    let mut files = Vec::new();
    for entry in walk {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            LinkError::Io {
                path,
                source: e.into(),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let len = entry
            .metadata()
            .map_err(|e| LinkError::io(entry.path(), e.into()))?
            .len();
        if let Ok(relative) = entry.path().strip_prefix(dir) {
            files.push((relative.to_path_buf(), len));
        }
    }
    Ok(files)
}

/// On-disk size of a package directory, excluding nested `node_modules`.
///
/// Unreadable entries count as zero.
#[must_use]
pub fn package_size(dir: &Path) -> u64 {
    match package_files(dir) {
        Ok(files) => files.iter().map(|(_, len)| len).sum(),
        Err(e) => {
            log::debug!("Cannot size {}: {}", dir.display(), e);
            0
        }
    }
}

/// Files of `duplicate` that differ from `canonical` by inode and can be
/// replaced with a hard link.
///
/// Only files present in both packages as regular files are considered. The
/// package manifest always comes last: once it shares the canonical inode the
/// copy counts as linked, so it must not be swapped before the other files.
fn hardlink_candidates(canonical: &Path, duplicate: &Path) -> Result<Vec<FileLink>, LinkError> {
    let mut files = package_files(canonical)?;
    files.sort_by_key(|(relative, _)| relative.as_os_str() == MANIFEST_FILE);

    let mut links = Vec::new();
    for (relative, _) in files {
        let source = canonical.join(&relative);
        let target = duplicate.join(&relative);

        let target_meta = match fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_file() => meta,
            _ => continue,
        };
        let source_meta = fs::metadata(&source).map_err(|e| LinkError::io(&source, e))?;
        if FileIdentity::from_metadata(&source_meta)
            .same_inode(&FileIdentity::from_metadata(&target_meta))
        {
            continue;
        }

        links.push(FileLink {
            source,
            target,
            len: target_meta.len(),
        });
    }
    Ok(links)
}

/// Sibling path used while `path` is being replaced.
fn staging_path(path: &Path, tag: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{tag}.{STAGING_SUFFIX}"))
}

/// Replace every target with a hard link to its source.
///
/// Returns the bytes reclaimed.
fn apply_hardlinks(links: &[FileLink]) -> Result<u64, LinkError> {
    let mut staged: Vec<(PathBuf, &FileLink)> = Vec::with_capacity(links.len());

    for link in links {
        let tmp = staging_path(&link.target, "link");
        let _ = fs::remove_file(&tmp);
        if let Err(e) = fs::hard_link(&link.source, &tmp) {
            for (tmp, _) in &staged {
                let _ = fs::remove_file(tmp);
            }
            return Err(LinkError::io(&link.target, e));
        }
        staged.push((tmp, link));
    }

    let mut saved = 0;
    let mut staged = staged.into_iter();
    while let Some((tmp, link)) = staged.next() {
        if let Err(e) = fs::rename(&tmp, &link.target) {
            let _ = fs::remove_file(&tmp);
            for (tmp, _) in staged {
                let _ = fs::remove_file(tmp);
            }
            return Err(LinkError::io(&link.target, e));
        }
        saved += link.len;
    }
    Ok(saved)
}

#[cfg(unix)]
fn symlink_dir(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink_dir(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(original, link)
}

/// Swap `duplicate` for a symlink to `canonical`.
fn apply_symlink(canonical: &Path, duplicate: &Path) -> Result<(), LinkError> {
    let aside = staging_path(duplicate, "old");
    fs::rename(duplicate, &aside).map_err(|e| LinkError::io(duplicate, e))?;

    if let Err(e) = symlink_dir(canonical, duplicate) {
        if let Err(restore) = fs::rename(&aside, duplicate) {
            log::error!(
                "Could not restore {} from {}: {}",
                duplicate.display(),
                aside.display(),
                restore
            );
        }
        return Err(LinkError::io(duplicate, e));
    }

    if let Err(e) = fs::remove_dir_all(&aside) {
        log::warn!("Could not remove {}: {}", aside.display(), e);
    }
    Ok(())
}

/// Executes link plans under one mode and policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkExecutor {
    mode: LinkMode,
    policy: LinkPolicy,
}

impl LinkExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new(mode: LinkMode, policy: LinkPolicy) -> Self {
        Self { mode, policy }
    }

    /// The execution mode.
    #[must_use]
    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    /// The link policy.
    #[must_use]
    pub fn policy(&self) -> LinkPolicy {
        self.policy
    }

    /// Link every duplicate of `plan` to its canonical copy.
    ///
    /// Failures are logged, counted in `ctx` and returned in the report; the
    /// failed duplicate is left as it was and the rest of the plan proceeds.
    pub fn execute(&self, plan: &LinkPlan, ctx: &RunContext) -> LinkReport {
        let mut report = LinkReport::new(plan.key.clone());
        let canonical = plan.canonical_dir();

        for duplicate in &plan.duplicates {
            match self.link_one(canonical, &duplicate.parent_dir, &mut report.lines) {
                Ok(bytes) => {
                    report.linked += 1;
                    report.bytes_saved += bytes;
                    ctx.add_bytes_saved(bytes);

                    if self.mode.mutates() {
                        log::debug!(
                            "Linked {} -> {} ({})",
                            duplicate.parent_dir.display(),
                            canonical.display(),
                            ByteSize::b(bytes)
                        );
                        match LinkIdentity::capture(&duplicate.path) {
                            Ok(identity) => report.records.push(identity),
                            Err(e) => log::warn!(
                                "Linked {} but cannot stat it: {}",
                                duplicate.path.display(),
                                e
                            ),
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Failed to link {}: {}", duplicate.parent_dir.display(), e);
                    ctx.record_link_failure();
                    report.failures.push(e);
                }
            }
        }

        report
    }

    fn link_one(
        &self,
        canonical: &Path,
        duplicate: &Path,
        lines: &mut Vec<String>,
    ) -> Result<u64, LinkError> {
        if canonical == duplicate {
            return Err(LinkError::SameDirectory(duplicate.to_path_buf()));
        }
        match self.policy {
            LinkPolicy::Hardlink => self.link_files(canonical, duplicate, lines),
            LinkPolicy::Symlink => self.link_dir(canonical, duplicate, lines),
        }
    }

    fn link_files(
        &self,
        canonical: &Path,
        duplicate: &Path,
        lines: &mut Vec<String>,
    ) -> Result<u64, LinkError> {
        let links = hardlink_candidates(canonical, duplicate)?;
        let reclaimable: u64 = links.iter().map(|l| l.len).sum();

        match self.mode {
            LinkMode::Apply => apply_hardlinks(&links),
            LinkMode::DryRun => {
                lines.push(format!(
                    "would hardlink {} files of {} into {} ({})",
                    links.len(),
                    canonical.display(),
                    duplicate.display(),
                    ByteSize::b(reclaimable)
                ));
                Ok(reclaimable)
            }
            LinkMode::Commands => {
                lines.extend(links.iter().map(|l| hardlink_command(&l.source, &l.target)));
                Ok(reclaimable)
            }
        }
    }

    fn link_dir(
        &self,
        canonical: &Path,
        duplicate: &Path,
        lines: &mut Vec<String>,
    ) -> Result<u64, LinkError> {
        if duplicate.join(NODE_MODULES).exists() {
            return Err(LinkError::NestedDependencies(duplicate.to_path_buf()));
        }
        let reclaimable = package_files(duplicate)?
            .iter()
            .map(|(_, len)| len)
            .sum::<u64>();

        match self.mode {
            LinkMode::Apply => apply_symlink(canonical, duplicate).map(|()| reclaimable),
            LinkMode::DryRun => {
                lines.push(format!(
                    "would symlink {} -> {} ({})",
                    duplicate.display(),
                    canonical.display(),
                    ByteSize::b(reclaimable)
                ));
                Ok(reclaimable)
            }
            LinkMode::Commands => {
                lines.push(symlink_command(canonical, duplicate));
                Ok(reclaimable)
            }
        }
    }
}
