//! Scanner module for package discovery.
//!
//! This module provides functionality for:
//! - Parallel, node_modules-aware directory walking using jwalk
//! - Package manifest parsing and key extraction
//! - Inode/device identity helpers used to recognise existing links
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and manifest discovery
//! - [`manifest`]: `package.json` parsing into a typed package identity
//! - [`hardlink`]: File identity (device, inode, mtime) and hardlink tracking
//!
//! # Example
//!
//! ```no_run
//! use nmdedupe::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/projects"), WalkerConfig::default());
//! for manifest in walker.walk() {
//!     match manifest {
//!         Ok(path) => println!("{}", path.display()),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hardlink;
pub mod manifest;
pub mod walker;

use std::path::PathBuf;

pub use hardlink::{FileIdentity, HardlinkTracker};
pub use manifest::{extract_entry, ManifestError, PackageManifest};
pub use walker::{is_package_manifest, should_descend, Walker};

/// File name of a package manifest.
pub const MANIFEST_FILE: &str = "package.json";

/// Directory name that holds installed packages.
pub const NODE_MODULES: &str = "node_modules";

/// A discovered package, identified by its manifest file.
///
/// Produced by the key extractor for every manifest that sits directly
/// inside a `node_modules` package root and carries a name and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    /// Absolute path to the `package.json` file
    pub path: PathBuf,
    /// The package directory (the manifest's parent)
    pub parent_dir: PathBuf,
    /// Device the manifest lives on
    pub device_id: u64,
    /// Inode of the manifest
    pub inode: u64,
    /// Manifest modification time, seconds since the Unix epoch
    pub modified_epoch: i64,
    /// Manifest length in bytes
    pub size_bytes: u64,
}

impl PackageEntry {
    /// Build an entry from a manifest path and its stat identity.
    #[must_use]
    pub fn new(path: PathBuf, identity: FileIdentity, size_bytes: u64) -> Self {
        let parent_dir = path
            .parent()
            .map_or_else(|| path.clone(), std::path::Path::to_path_buf);
        Self {
            path,
            parent_dir,
            device_id: identity.dev,
            inode: identity.ino,
            modified_epoch: identity.mtime,
            size_bytes,
        }
    }

    /// The stat identity recorded for this entry.
    #[must_use]
    pub fn identity(&self) -> FileIdentity {
        FileIdentity {
            dev: self.device_id,
            ino: self.inode,
            mtime: self.modified_epoch,
        }
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Maximum number of directory levels below the root to read.
    /// `0` means unlimited.
    pub tree_depth: usize,

    /// Number of directories read concurrently.
    pub concurrency: usize,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            tree_depth: 0,
            concurrency: 4,
        }
    }
}

impl WalkerConfig {
    /// Create a new configuration.
    ///
    /// # Arguments
    ///
    /// * `tree_depth` - Depth limit, `0` for unlimited
    /// * `concurrency` - Concurrent directory reads (clamped to at least 1)
    #[must_use]
    pub fn new(tree_depth: usize, concurrency: usize) -> Self {
        Self {
            tree_depth,
            concurrency: concurrency.max(1),
        }
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
