//! Persistent record of links created by previous runs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dedupe::PackageKey;
use crate::scanner::FileIdentity;

/// Identity of a package manifest that was turned into a link.
///
/// Serialized as a `[path, inode, mtime]` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(PathBuf, u64, i64)", into = "(PathBuf, u64, i64)")]
pub struct LinkIdentity {
    /// Manifest path of the linked package directory
    pub path: PathBuf,
    /// Inode reported right after linking
    pub inode: u64,
    /// Modification time (epoch seconds) reported right after linking
    pub modified_epoch: i64,
}

impl LinkIdentity {
    /// Create an identity.
    #[must_use]
    pub fn new(path: PathBuf, inode: u64, modified_epoch: i64) -> Self {
        Self {
            path,
            inode,
            modified_epoch,
        }
    }

    /// Capture the current identity of `path`, following symlinks.
    ///
    /// # Errors
    ///
    /// Returns the `stat` error.
    pub fn capture(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let id = FileIdentity::from_metadata(&meta);
        Ok(Self::new(path.to_path_buf(), id.ino, id.mtime))
    }

    /// Whether the live file still has exactly this inode and mtime.
    #[must_use]
    pub fn matches(&self, live: &FileIdentity) -> bool {
        self.inode == live.ino && self.modified_epoch == live.mtime
    }
}

impl From<(PathBuf, u64, i64)> for LinkIdentity {
    fn from((path, inode, modified_epoch): (PathBuf, u64, i64)) -> Self {
        Self::new(path, inode, modified_epoch)
    }
}

impl From<LinkIdentity> for (PathBuf, u64, i64) {
    fn from(id: LinkIdentity) -> Self {
        (id.path, id.inode, id.modified_epoch)
    }
}

/// Errors persisting the reference store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Writing the store file failed.
    #[error("Failed to write reference store {path}: {source}")]
    Io {
        /// Store path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Serializing the store failed.
    #[error("Failed to serialize reference store: {0}")]
    Serialize(#[from] serde_json::Error),
}

type Records = BTreeMap<String, BTreeSet<LinkIdentity>>;

/// Key → link identities, loaded at start and saved at the end of a run.
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    path: PathBuf,
    records: Records,
    loaded: Records,
}

impl ReferenceStore {
    /// An empty store that will be saved to `path`.
    #[must_use]
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            records: Records::new(),
            loaded: Records::new(),
        }
    }

    /// Load the store from `path`.
    ///
    /// A missing, unreadable or corrupt file yields an empty store.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No reference store at {}, starting empty", path.display());
                return Self::empty(path);
            }
            Err(e) => {
                log::warn!(
                    "Cannot read reference store {}: {}; starting empty",
                    path.display(),
                    e
                );
                return Self::empty(path);
            }
        };

        match serde_json::from_str::<Records>(&content) {
            Ok(records) => {
                log::debug!(
                    "Loaded {} reference records from {}",
                    records.values().map(BTreeSet::len).sum::<usize>(),
                    path.display()
                );
                Self {
                    path: path.to_path_buf(),
                    loaded: records.clone(),
                    records,
                }
            }
            Err(e) => {
                log::warn!(
                    "Reference store {} is corrupt ({}); starting empty",
                    path.display(),
                    e
                );
                Self::empty(path)
            }
        }
    }

    /// Where the store is saved.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a link under `key`. Returns `false` if it was already present.
    pub fn insert(&mut self, key: &PackageKey, identity: LinkIdentity) -> bool {
        self.records
            .entry(key.to_string())
            .or_default()
            .insert(identity)
    }

    /// Identities recorded under a key string.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&BTreeSet<LinkIdentity>> {
        self.records.get(key)
    }

    /// Iterate over every `(key, identity)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LinkIdentity)> {
        self.records
            .iter()
            .flat_map(|(key, ids)| ids.iter().map(move |id| (key.as_str(), id)))
    }

    /// Keep only the identities for which `keep` returns `true`; keys left
    /// without identities are removed. Returns how many were removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&str, &LinkIdentity) -> bool,
    {
        let before = self.len();
        self.records.retain(|key, ids| {
            ids.retain(|id| keep(key.as_str(), id));
            !ids.is_empty()
        });
        before - self.len()
    }

    /// Total number of identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.values().map(BTreeSet::len).sum()
    }

    /// Whether the store holds no identities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.records.len()
    }

    /// Whether the content differs from what was loaded (or last saved).
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.records != self.loaded
    }

    /// Save only if the content changed. Returns whether a write happened.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if serialization or the write fails.
    pub fn save_if_changed(&mut self) -> Result<bool, StoreError> {
        if !self.is_dirty() {
            log::debug!("Reference store unchanged, not writing");
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Write the store as pretty JSON with sorted keys.
    ///
    /// The file is written next to its destination and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if serialization or the write fails.
    pub fn save(&mut self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.records)?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(e));
        }

        log::debug!(
            "Saved {} reference records to {}",
            self.len(),
            self.path.display()
        );
        self.loaded = self.records.clone();
        Ok(())
    }
}
