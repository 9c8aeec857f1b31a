//! Revalidation of stored link identities.
//!
//! Pruning never touches the filesystem beyond `stat`: it only drops
//! records whose path vanished or whose inode or mtime changed since the
//! link was made (the package was reinstalled, replaced or touched).

use std::collections::HashSet;

use rayon::prelude::*;

use super::store::{LinkIdentity, ReferenceStore};
use crate::context::RunContext;
use crate::scanner::FileIdentity;

/// Statistics from a prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PruneStats {
    /// Records checked against the filesystem
    pub checked: usize,
    /// Records removed from the store
    pub removed: usize,
}

/// Whether the live file at `identity.path` still matches the record.
#[must_use]
pub fn is_still_linked(identity: &LinkIdentity) -> bool {
    match std::fs::metadata(&identity.path) {
        Ok(meta) => identity.matches(&FileIdentity::from_metadata(&meta)),
        Err(e) => {
            log::trace!("Reference {} is gone: {}", identity.path.display(), e);
            false
        }
    }
}

/// Drop every stale record from `store`.
///
/// Checks run on `pool`; the store itself is only mutated on the calling
/// thread. Records not yet checked when `ctx` is cancelled are kept.
pub fn prune_store(
    store: &mut ReferenceStore,
    ctx: &RunContext,
    pool: &rayon::ThreadPool,
) -> PruneStats {
    let candidates: Vec<(String, LinkIdentity)> = store
        .iter()
        .map(|(key, id)| (key.to_string(), id.clone()))
        .collect();
    let checked = candidates.len();

    let stale: HashSet<(String, LinkIdentity)> = pool.install(|| {
        candidates
            .into_par_iter()
            .filter(|(_, id)| !ctx.is_cancelled() && !is_still_linked(id))
            .collect()
    });

    let removed = store.retain(|key, id| {
        let drop = stale.contains(&(key.to_string(), id.clone()));
        if drop {
            log::debug!("Pruning stale reference {} for {}", id.path.display(), key);
        }
        !drop
    });

    log::info!("Pruned {} of {} reference records", removed, checked);
    PruneStats { checked, removed }
}
