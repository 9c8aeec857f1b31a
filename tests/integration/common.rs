#![allow(dead_code)]

use nmdedupe::actions::{LinkMode, LinkPolicy};
use nmdedupe::dedupe::{DedupeConfig, Deduplicator};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Serializes tests that read or write `NMDEDUPE_*` variables.
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Take the environment lock and clear every `NMDEDUPE_*` variable.
pub fn clean_env() -> MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    for (key, _) in std::env::vars() {
        if key.starts_with(nmdedupe::config::ENV_PREFIX) {
            std::env::remove_var(key);
        }
    }
    guard
}

/// Install `name@version` under `project/node_modules` with one payload file.
pub fn install(project: &Path, name: &str, version: &str, payload: &[u8]) -> PathBuf {
    let dir = project.join("node_modules").join(name);
    fs::create_dir_all(dir.join("lib")).unwrap();
    fs::write(
        dir.join("package.json"),
        format!(r#"{{"name":"{name}","version":"{version}"}}"#),
    )
    .unwrap();
    fs::write(dir.join("lib/index.js"), payload).unwrap();
    dir
}

pub fn deduplicator(mode: LinkMode, policy: LinkPolicy) -> Deduplicator {
    Deduplicator::new(
        DedupeConfig::default()
            .with_mode(mode)
            .with_policy(policy)
            .with_concurrency(2),
    )
    .unwrap()
}

#[cfg(unix)]
pub fn inode(path: &Path) -> u64 {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).unwrap().ino()
}
