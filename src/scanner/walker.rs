//! Directory walker implementation using jwalk for parallel traversal.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for discovering installed
//! package manifests below one root directory. It uses [`jwalk`] for
//! parallel directory reading and prunes the tree while it is read, so
//! the source trees of installed packages are never explored.
//!
//! # Descent rules
//!
//! For every child directory `name` of a directory `parent`:
//!
//! 1. names starting with `.` are never entered
//! 2. `node_modules` is always entered
//! 3. below a `node_modules` ancestor, only direct children of a
//!    `node_modules` directory (package roots) are entered
//! 4. anything else is entered
//!
//! Only files named `package.json` whose grandparent is a `node_modules`
//! directory are yielded.
//!
//! # Example
//!
//! ```no_run
//! use nmdedupe::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/projects"), WalkerConfig::default());
//! let manifests: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! println!("Found {} installed packages", manifests.len());
//! ```

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use jwalk::{Parallelism, WalkDir};

use super::{ScanError, WalkerConfig, MANIFEST_FILE, NODE_MODULES};
use crate::signal::CancelToken;

/// Directory walker for package manifest discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Cancellation token checked before every directory read
    cancel: CancelToken,
}

impl Walker {
    /// Create a new walker for the given root.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Set the cancellation token.
    ///
    /// Once the token fires the walker opens no further directories and
    /// iteration ends.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The root directory this walker scans.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check that the root exists and is a readable directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NotFound`], [`ScanError::PermissionDenied`] or
    /// [`ScanError::NotADirectory`]. An unusable root fails the whole run.
    pub fn validate_root(&self) -> Result<(), ScanError> {
        match std::fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(ScanError::NotADirectory(self.root.clone())),
            Err(e) => return Err(self.handle_io_error(&self.root, e)),
        }
        // `stat` succeeds on a directory that cannot be listed.
        std::fs::read_dir(&self.root)
            .map(drop)
            .map_err(|e| self.handle_io_error(&self.root, e))
    }

    /// Walk the directory tree, yielding package manifest paths.
    ///
    /// Errors reading individual directories are logged and yielded as
    /// [`ScanError`] values rather than stopping iteration.
    pub fn walk(&self) -> impl Iterator<Item = Result<PathBuf, ScanError>> + '_ {
        let cancel = self.cancel.clone();

        let mut walk_dir = WalkDir::new(&self.root)
            .follow_links(false)
            .skip_hidden(false)
            .sort(false)
            .parallelism(parallelism_for(self.config.concurrency))
            .process_read_dir(move |_depth, path, _read_dir_state, children| {
                if cancel.is_cancelled() {
                    children.clear();
                    return;
                }
                children.retain(|child| match child {
                    Ok(entry) => {
                        let file_type = entry.file_type();
                        if file_type.is_dir() {
                            should_descend(path, entry.file_name())
                        } else if file_type.is_file() {
                            entry.file_name() == MANIFEST_FILE
                        } else {
                            false
                        }
                    }
                    Err(_) => true,
                });
            });

        if self.config.tree_depth > 0 {
            // Files one level below the deepest directory read.
            walk_dir = walk_dir.max_depth(self.config.tree_depth + 1);
        }

        walk_dir
            .into_iter()
            .take_while(move |_| {
                if self.cancel.is_cancelled() {
                    log::debug!("Walker: cancellation requested, stopping iteration");
                    false
                } else {
                    true
                }
            })
            .filter_map(move |entry_result| match entry_result {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        return None;
                    }
                    let path = entry.path();
                    if is_package_manifest(&path) {
                        log::trace!("Found manifest: {}", path.display());
                        Some(Ok(path))
                    } else {
                        None
                    }
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                    Some(self.handle_jwalk_error(path, e))
                }
            })
    }

    /// Handle I/O errors for the root.
    fn handle_io_error(&self, path: &Path, error: std::io::Error) -> ScanError {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::PermissionDenied => ScanError::PermissionDenied(path.to_path_buf()),
            ErrorKind::NotFound => ScanError::NotFound(path.to_path_buf()),
            _ => ScanError::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Handle jwalk errors.
    fn handle_jwalk_error(&self, path: PathBuf, error: jwalk::Error) -> Result<PathBuf, ScanError> {
        log::warn!("Walker error for {}: {}", path.display(), error);
        Err(ScanError::Io {
            path,
            source: std::io::Error::other(error.to_string()),
        })
    }
}

fn parallelism_for(concurrency: usize) -> Parallelism {
    if concurrency <= 1 {
        Parallelism::Serial
    } else {
        Parallelism::RayonNewPool(concurrency)
    }
}

/// Decide whether the walker enters directory `name` found inside `parent`.
#[must_use]
pub fn should_descend(parent: &Path, name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    if name.starts_with('.') {
        return false;
    }
    if name == NODE_MODULES {
        return true;
    }
    if has_node_modules_component(parent) {
        return parent.file_name() == Some(OsStr::new(NODE_MODULES));
    }
    true
}

/// Whether `path` is a manifest sitting directly in a package root, i.e.
/// `.../node_modules/<package>/package.json`.
#[must_use]
pub fn is_package_manifest(path: &Path) -> bool {
    if path.file_name() != Some(OsStr::new(MANIFEST_FILE)) {
        return false;
    }
    path.parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .is_some_and(|name| name == NODE_MODULES)
}

fn has_node_modules_component(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == NODE_MODULES))
}
