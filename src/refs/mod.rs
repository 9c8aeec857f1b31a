//! Reference store for links created by earlier runs.
//!
//! # Architecture
//!
//! * [`store`]: JSON persistence of `key → {(path, inode, mtime)}`.
//! * [`prune`]: Revalidation against the live filesystem.
//!
//! # File format
//!
//! ```json
//! {
//!   "lodash@4.17.0#2049": [
//!     ["/b/node_modules/lodash/package.json", 1835021, 1700000000]
//!   ]
//! }
//! ```
//!
//! Keys are written sorted so the file diffs cleanly. The file is only
//! rewritten when a run actually changed it.

pub mod prune;
pub mod store;

pub use prune::{is_still_linked, prune_store, PruneStats};
pub use store::{LinkIdentity, ReferenceStore, StoreError};
