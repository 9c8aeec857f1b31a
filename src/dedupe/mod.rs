//! Package grouping and the deduplication pipeline.
//!
//! # Architecture
//!
//! * [`groups`]: Correlation keys and the streaming grouper.
//! * [`runner`]: The [`Deduplicator`] that wires scanning, grouping, linking
//!   and pruning together on one worker pool.

pub mod groups;
pub mod runner;

pub use groups::{group_by_key, GroupingStats, PackageGroup, PackageGrouper, PackageKey};
pub use runner::{DedupeConfig, Deduplicator, LinkStats, RunSummary};
