//! Package correlation keys and streaming grouping.
//!
//! # Overview
//!
//! Every discovered package is keyed by `(device, name, version)`. Because
//! the same key can turn up anywhere in an unordered scan, a group is only
//! complete once the scan has ended: the [`PackageGrouper`] accumulates
//! entries as they arrive and hands out all groups in one flush.
//!
//! Hard links cannot cross devices, so the device id is part of the key and
//! copies on different filesystems never share a group.
//!
//! # Example
//!
//! ```
//! use nmdedupe::dedupe::{PackageGrouper, PackageKey};
//! use nmdedupe::scanner::{FileIdentity, PackageEntry};
//! use nmdedupe::signal::CancelToken;
//! use std::path::PathBuf;
//!
//! let entry = |path: &str, ino: u64| {
//!     PackageEntry::new(PathBuf::from(path), FileIdentity { dev: 1, ino, mtime: 0 }, 40)
//! };
//!
//! let mut grouper = PackageGrouper::new();
//! grouper.push(PackageKey::new(1, "lodash", "4.17.0"), entry("/a/node_modules/lodash/package.json", 10));
//! grouper.push(PackageKey::new(1, "lodash", "4.17.0"), entry("/b/node_modules/lodash/package.json", 20));
//! grouper.push(PackageKey::new(1, "once", "1.4.0"), entry("/a/node_modules/once/package.json", 30));
//!
//! let groups = grouper.finish(&CancelToken::new()).unwrap();
//! assert_eq!(groups.len(), 2);
//! assert_eq!(groups[0].len(), 2);
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::scanner::PackageEntry;
use crate::signal::CancelToken;

/// Correlation key: packages with equal keys are interchangeable copies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageKey {
    /// Package name from the manifest
    pub name: String,
    /// Package version from the manifest
    pub version: String,
    /// Device the package lives on
    pub device_id: u64,
}

impl PackageKey {
    /// Create a key.
    #[must_use]
    pub fn new(device_id: u64, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            device_id,
        }
    }
}

/// Formats as `name@version#device`, the form used in the reference store.
impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}#{}", self.name, self.version, self.device_id)
    }
}

/// All scanned copies of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageGroup {
    /// Shared key
    pub key: PackageKey,
    /// Entries in arrival order
    pub entries: Vec<PackageEntry>,
}

impl PackageGroup {
    /// Create an empty group.
    #[must_use]
    pub fn new(key: PackageKey) -> Self {
        Self {
            key,
            entries: Vec::new(),
        }
    }

    /// Number of copies in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if this group has more than one copy.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        self.entries.len() > 1
    }
}

/// Statistics from grouping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Entries pushed into the grouper
    pub total_entries: usize,
    /// Distinct keys observed
    pub distinct_keys: usize,
    /// Groups with two or more entries
    pub duplicate_groups: usize,
}

/// Accumulates keyed entries until the input stream ends.
#[derive(Debug, Default)]
pub struct PackageGrouper {
    index: HashMap<PackageKey, usize>,
    groups: Vec<PackageGroup>,
    total_entries: usize,
}

impl PackageGrouper {
    /// Create an empty grouper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry under `key`, preserving arrival order within the key.
    pub fn push(&mut self, key: PackageKey, entry: PackageEntry) {
        self.total_entries += 1;
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = self.groups.len();
                self.index.insert(key.clone(), slot);
                self.groups.push(PackageGroup::new(key));
                slot
            }
        };
        self.groups[slot].entries.push(entry);
    }

    /// Number of distinct keys seen so far.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.groups.len()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> GroupingStats {
        GroupingStats {
            total_entries: self.total_entries,
            distinct_keys: self.groups.len(),
            duplicate_groups: self.groups.iter().filter(|g| g.has_duplicates()).count(),
        }
    }

    /// Flush every group, in first-seen key order.
    ///
    /// Returns `None` if `cancel` has fired: a cancelled scan saw only part
    /// of the tree and its groups must not be acted on.
    #[must_use]
    pub fn finish(self, cancel: &CancelToken) -> Option<Vec<PackageGroup>> {
        if cancel.is_cancelled() {
            log::debug!(
                "Grouper: discarding {} partial groups after cancellation",
                self.groups.len()
            );
            return None;
        }
        Some(self.groups)
    }
}

/// Group an already-collected set of keyed entries.
#[must_use]
pub fn group_by_key<I>(entries: I) -> (Vec<PackageGroup>, GroupingStats)
where
    I: IntoIterator<Item = (PackageKey, PackageEntry)>,
{
    let mut grouper = PackageGrouper::new();
    for (key, entry) in entries {
        grouper.push(key, entry);
    }
    let stats = grouper.stats();
    (grouper.groups, stats)
}
