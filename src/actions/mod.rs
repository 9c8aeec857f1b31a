//! Link actions on duplicate package groups.
//!
//! This module provides functionality for:
//! - Choosing the canonical copy of a group and whether it qualifies
//! - Replacing duplicates with hard links or directory symlinks
//! - Dry-run descriptions and shell command generation
//!
//! ```no_run
//! use nmdedupe::actions::{LinkExecutor, LinkMode, LinkPolicy};
//!
//! let executor = LinkExecutor::new(LinkMode::Commands, LinkPolicy::Symlink);
//! assert!(!executor.mode().mutates());
//! ```

pub mod link;

pub use link::{
    package_size, plan_group, LinkError, LinkExecutor, LinkMode, LinkPlan, LinkPolicy, LinkReport,
};
