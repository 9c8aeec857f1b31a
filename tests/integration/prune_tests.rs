use super::common::{deduplicator, install};
use filetime::FileTime;
use nmdedupe::actions::{LinkMode, LinkPolicy};
use nmdedupe::refs::ReferenceStore;
use std::fs;
use tempfile::tempdir;

#[cfg(unix)]
#[test]
fn test_prune_drops_deleted_package() {
    let dir = tempdir().unwrap();
    install(&dir.path().join("a"), "lodash", "4.17.21", b"l");
    let b = install(&dir.path().join("b"), "lodash", "4.17.21", b"l");
    let refs = dir.path().join("refs.json");

    let mut store = ReferenceStore::load(&refs);
    deduplicator(LinkMode::Apply, LinkPolicy::Hardlink)
        .run(&[dir.path().to_path_buf()], false, &mut store)
        .unwrap();
    store.save().unwrap();
    assert_eq!(store.len(), 1);

    fs::remove_dir_all(&b).unwrap();

    let mut store = ReferenceStore::load(&refs);
    let summary = deduplicator(LinkMode::Apply, LinkPolicy::Hardlink)
        .run(&[], true, &mut store)
        .unwrap();

    let prune = summary.prune.unwrap();
    assert_eq!(prune.checked, 1);
    assert_eq!(prune.removed, 1);
    assert_eq!(summary.packages_scanned, 0);
    assert!(store.is_empty());
    assert!(store.save_if_changed().unwrap());
    assert!(ReferenceStore::load(&refs).is_empty());
}

#[cfg(unix)]
#[test]
fn test_prune_drops_touched_manifest() {
    let dir = tempdir().unwrap();
    install(&dir.path().join("a"), "semver", "7.5.4", b"s");
    let b = install(&dir.path().join("b"), "semver", "7.5.4", b"s");
    let mut store = ReferenceStore::empty(&dir.path().join("refs.json"));

    deduplicator(LinkMode::Apply, LinkPolicy::Hardlink)
        .run(&[dir.path().to_path_buf()], false, &mut store)
        .unwrap();
    assert_eq!(store.len(), 1);

    let later = FileTime::from_unix_time(FileTime::now().unix_seconds() + 3600, 0);
    filetime::set_file_mtime(b.join("package.json"), later).unwrap();

    let summary = deduplicator(LinkMode::Apply, LinkPolicy::Hardlink)
        .run(&[], true, &mut store)
        .unwrap();

    assert_eq!(summary.prune.unwrap().removed, 1);
    assert!(store.is_empty());
}

#[cfg(unix)]
#[test]
fn test_prune_keeps_intact_links() {
    let dir = tempdir().unwrap();
    install(&dir.path().join("a"), "ms", "2.1.3", b"m");
    install(&dir.path().join("b"), "ms", "2.1.3", b"m");
    let mut store = ReferenceStore::empty(&dir.path().join("refs.json"));

    deduplicator(LinkMode::Apply, LinkPolicy::Hardlink)
        .run(&[dir.path().to_path_buf()], false, &mut store)
        .unwrap();

    let summary = deduplicator(LinkMode::Apply, LinkPolicy::Hardlink)
        .run(&[dir.path().to_path_buf()], true, &mut store)
        .unwrap();

    let prune = summary.prune.unwrap();
    assert_eq!(prune.checked, 1);
    assert_eq!(prune.removed, 0);
    assert_eq!(summary.packages_scanned, 2);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_prune_empty_store() {
    let dir = tempdir().unwrap();
    let mut store = ReferenceStore::empty(&dir.path().join("refs.json"));

    let summary = deduplicator(LinkMode::Apply, LinkPolicy::Hardlink)
        .run(&[], true, &mut store)
        .unwrap();

    assert_eq!(summary.prune.unwrap().checked, 0);
    assert!(!store.is_dirty());
}
