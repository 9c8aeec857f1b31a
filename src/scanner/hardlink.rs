//! File identity and hardlink detection.
//!
//! # Overview
//!
//! Hardlinks are multiple directory entries pointing to the same inode on disk.
//! A package copy whose manifest already shares an inode with another copy has
//! been linked before and must not be linked (or counted) again. This module
//! extracts the `(device, inode, mtime)` identity of a file and tracks which
//! inodes have been seen.
//!
//! # Platform Support
//!
//! - **Unix**: Uses `dev`/`ino`/`mtime` from file metadata
//! - **Other**: Device and inode are reported as `0`, so hardlink detection is
//!   disabled and every file is treated as unique
//!
//! # Example
//!
//! ```no_run
//! use nmdedupe::scanner::hardlink::{FileIdentity, HardlinkTracker};
//!
//! let mut tracker = HardlinkTracker::new();
//! let meta = std::fs::metadata("node_modules/lodash/package.json").unwrap();
//! let identity = FileIdentity::from_metadata(&meta);
//!
//! if tracker.is_hardlink(&identity) {
//!     println!("already linked");
//! }
//! ```

use std::collections::HashSet;
use std::fs::Metadata;
use std::time::UNIX_EPOCH;

/// Stat identity of a file: the device it lives on, its inode and its
/// modification time in whole seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentity {
    /// Device id
    pub dev: u64,
    /// Inode number
    pub ino: u64,
    /// Modification time (seconds since the Unix epoch)
    pub mtime: i64,
}

impl FileIdentity {
    /// Extract the identity from file metadata.
    #[cfg(unix)]
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
            mtime: metadata.mtime(),
        }
    }

    /// Extract the identity from file metadata.
    #[cfg(not(unix))]
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            dev: 0,
            ino: 0,
            mtime: modified_epoch(metadata),
        }
    }

    /// Whether two identities refer to the same inode on the same device.
    #[must_use]
    pub fn same_inode(&self, other: &Self) -> bool {
        HardlinkTracker::is_supported() && self.dev == other.dev && self.ino == other.ino
    }
}

/// Modification time of `metadata` in seconds since the epoch, or `0` when
/// the platform cannot report it.
#[must_use]
pub fn modified_epoch(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// Tracks seen `(device, inode)` pairs to detect hardlinks.
///
/// `HardlinkTracker` is NOT thread-safe. The link planner creates one per
/// package group.
#[derive(Debug, Default)]
pub struct HardlinkTracker {
    seen: HashSet<(u64, u64)>,
}

impl HardlinkTracker {
    /// Create a new hardlink tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }

    /// Check if a file is a hardlink to a previously seen file.
    ///
    /// The first occurrence of an inode is recorded and reported as `false`;
    /// every later occurrence reports `true`. Always `false` on platforms
    /// without inode support.
    pub fn is_hardlink(&mut self, identity: &FileIdentity) -> bool {
        if !Self::is_supported() {
            return false;
        }
        !self.seen.insert((identity.dev, identity.ino))
    }

    /// Get the number of unique inodes tracked.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Check if hardlink detection is supported on this platform.
    #[must_use]
    pub const fn is_supported() -> bool {
        cfg!(unix)
    }
}
