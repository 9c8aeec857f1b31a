//! Package manifest parsing.
//!
//! Installed manifests in the wild are frequently malformed or incomplete.
//! Parsing therefore never fails the scan: every problem is a
//! [`ManifestError`] and the caller drops the candidate.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::hardlink::FileIdentity;
use super::PackageEntry;
use crate::dedupe::PackageKey;

/// The subset of `package.json` the deduplicator cares about.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PackageManifest {
    /// Package name
    #[serde(default)]
    pub name: Option<String>,
    /// Package version
    #[serde(default)]
    pub version: Option<String>,
}

/// Reasons a manifest does not yield a package identity.
#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    /// The manifest could not be read or stat'ed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Manifest path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON (or not an object).
    #[error("Malformed manifest {path}: {source}")]
    Parse {
        /// Manifest path
        path: PathBuf,
        /// The underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// The manifest lacks a name or a version.
    #[error("Not a package (missing name or version)")]
    NotAPackage,
}

impl PackageManifest {
    /// Parse manifest bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] if the bytes are not a JSON object
    /// with string-or-absent `name`/`version` fields.
    pub fn parse(path: &Path, bytes: &[u8]) -> Result<Self, ManifestError> {
        serde_json::from_slice(bytes).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The `(name, version)` pair, if both are present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::NotAPackage`] otherwise.
    pub fn identity(&self) -> Result<(&str, &str), ManifestError> {
        match (self.name.as_deref(), self.version.as_deref()) {
            (Some(name), Some(version)) if !name.is_empty() && !version.is_empty() => {
                Ok((name, version))
            }
            _ => Err(ManifestError::NotAPackage),
        }
    }
}

/// Stat and parse one candidate manifest into its key and entry.
///
/// The device id comes from the filesystem, never from the manifest.
///
/// # Errors
///
/// Any [`ManifestError`]; callers treat all of them as "skip this candidate".
pub fn extract_entry(path: &Path) -> Result<(PackageKey, PackageEntry), ManifestError> {
    let io_err = |source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(path).map_err(io_err)?;
    let bytes = std::fs::read(path).map_err(io_err)?;
    let manifest = PackageManifest::parse(path, &bytes)?;
    let (name, version) = manifest.identity()?;

    let identity = FileIdentity::from_metadata(&metadata);
    let key = PackageKey::new(identity.dev, name, version);
    let entry = PackageEntry::new(path.to_path_buf(), identity, metadata.len());
    Ok((key, entry))
}
