use super::common::{deduplicator, install};
use nmdedupe::actions::{LinkMode, LinkPolicy};
use nmdedupe::dedupe::{DedupeConfig, Deduplicator};
use nmdedupe::error::ExitCode;
use nmdedupe::refs::ReferenceStore;
use nmdedupe::signal::CancelToken;
use std::fs;
use tempfile::tempdir;

const TWO_MB: usize = 2 * 1024 * 1024;

#[cfg(unix)]
#[test]
fn test_two_copies_become_one() {
    use super::common::inode;

    let dir = tempdir().unwrap();
    let a = install(&dir.path().join("a"), "lodash", "4.17.0", &vec![b'l'; TWO_MB]);
    let b = install(&dir.path().join("b"), "lodash", "4.17.0", &vec![b'l'; TWO_MB]);
    let mut store = ReferenceStore::empty(&dir.path().join("refs.json"));

    let dedupe = deduplicator(LinkMode::Apply, LinkPolicy::Hardlink);
    let summary = dedupe
        .run(&[dir.path().to_path_buf()], false, &mut store)
        .unwrap();

    assert_eq!(summary.exit_code(), ExitCode::Success);
    assert_eq!(summary.duplicates_linked, 1);
    assert_eq!(summary.records_added, 1);
    assert!(summary.bytes_saved >= TWO_MB as u64);
    assert!(summary.bytes_saved < TWO_MB as u64 + 1024);

    assert_eq!(inode(&a.join("lib/index.js")), inode(&b.join("lib/index.js")));
    assert_eq!(store.len(), 1);
    let (key, id) = store.iter().next().unwrap();
    assert!(key.starts_with("lodash@4.17.0#"));
    assert_eq!(id.path, fs::canonicalize(b.join("package.json")).unwrap());
}

#[cfg(unix)]
#[test]
fn test_second_run_is_a_no_op() {
    let dir = tempdir().unwrap();
    install(&dir.path().join("a"), "ms", "2.1.3", &[b'm'; 4096]);
    install(&dir.path().join("b"), "ms", "2.1.3", &[b'm'; 4096]);
    install(&dir.path().join("c"), "ms", "2.1.3", &[b'm'; 4096]);
    let refs = dir.path().join("refs.json");

    let mut store = ReferenceStore::load(&refs);
    let first = deduplicator(LinkMode::Apply, LinkPolicy::Hardlink)
        .run(&[dir.path().to_path_buf()], false, &mut store)
        .unwrap();
    assert_eq!(first.duplicates_linked, 2);
    assert!(store.save_if_changed().unwrap());

    let mut store = ReferenceStore::load(&refs);
    let second = deduplicator(LinkMode::Apply, LinkPolicy::Hardlink)
        .run(&[dir.path().to_path_buf()], false, &mut store)
        .unwrap();

    assert_eq!(second.packages_scanned, 3);
    assert_eq!(second.planned_groups, 0);
    assert_eq!(second.bytes_saved, 0);
    assert!(!store.save_if_changed().unwrap());
    assert_eq!(store.len(), 2);
}

#[cfg(unix)]
#[test]
fn test_dry_run_changes_nothing() {
    use super::common::inode;

    let dir = tempdir().unwrap();
    let a = install(&dir.path().join("a"), "debug", "4.3.4", &[b'd'; 8192]);
    let b = install(&dir.path().join("b"), "debug", "4.3.4", &[b'd'; 8192]);
    let before = (inode(&a.join("lib/index.js")), inode(&b.join("lib/index.js")));
    let mut store = ReferenceStore::empty(&dir.path().join("refs.json"));

    for mode in [LinkMode::DryRun, LinkMode::Commands] {
        let summary = deduplicator(mode, LinkPolicy::Hardlink)
            .run(&[dir.path().to_path_buf()], false, &mut store)
            .unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.duplicates_linked, 1);
        assert!(summary.bytes_saved >= 8192);
        assert!(!summary.lines.is_empty());
    }

    let after = (inode(&a.join("lib/index.js")), inode(&b.join("lib/index.js")));
    assert_eq!(before, after);
    assert!(store.is_empty());
    assert!(!store.is_dirty());
}

#[test]
fn test_commands_are_sorted_by_key() {
    let dir = tempdir().unwrap();
    for project in ["a", "b"] {
        install(&dir.path().join(project), "zod", "3.22.4", b"z");
        install(&dir.path().join(project), "ansi-regex", "5.0.1", b"r");
    }
    let mut store = ReferenceStore::empty(&dir.path().join("refs.json"));

    let summary = deduplicator(LinkMode::Commands, LinkPolicy::Symlink)
        .run(&[dir.path().to_path_buf()], false, &mut store)
        .unwrap();

    assert_eq!(summary.lines.len(), 2);
    assert!(summary.lines[0].contains("ansi-regex"));
    assert!(summary.lines[1].contains("zod"));
    assert!(summary.lines.iter().all(|l| l.starts_with("rm -rf ")));
}

#[cfg(unix)]
#[test]
fn test_symlink_policy_replaces_directory() {
    let dir = tempdir().unwrap();
    let a = install(&dir.path().join("a"), "chalk", "5.3.0", &[b'c'; 1000]);
    let b = install(&dir.path().join("b"), "chalk", "5.3.0", &[b'c'; 1000]);
    let mut store = ReferenceStore::empty(&dir.path().join("refs.json"));

    let summary = deduplicator(LinkMode::Apply, LinkPolicy::Symlink)
        .run(&[dir.path().to_path_buf()], false, &mut store)
        .unwrap();

    assert_eq!(summary.duplicates_linked, 1);
    assert!(fs::symlink_metadata(&b).unwrap().file_type().is_symlink());
    assert_eq!(
        fs::canonicalize(&b).unwrap(),
        fs::canonicalize(&a).unwrap()
    );
    assert_eq!(store.len(), 1);
}

#[test]
fn test_refused_duplicate_is_partial_success() {
    let dir = tempdir().unwrap();
    install(&dir.path().join("a"), "glob", "7.2.3", b"g");
    let b = install(&dir.path().join("b"), "glob", "7.2.3", b"g");
    install(&b, "minimatch", "3.1.2", b"m");
    let mut store = ReferenceStore::empty(&dir.path().join("refs.json"));

    let summary = deduplicator(LinkMode::Apply, LinkPolicy::Symlink)
        .run(&[dir.path().to_path_buf()], false, &mut store)
        .unwrap();

    assert_eq!(summary.link_failures, 1);
    assert_eq!(summary.exit_code(), ExitCode::PartialSuccess);
    assert!(b.join("lib/index.js").is_file());
    assert!(store.is_empty());
}

#[test]
fn test_cancelled_run_links_nothing() {
    let dir = tempdir().unwrap();
    install(&dir.path().join("a"), "once", "1.4.0", b"o");
    install(&dir.path().join("b"), "once", "1.4.0", b"o");
    let mut store = ReferenceStore::empty(&dir.path().join("refs.json"));

    let cancel = CancelToken::new();
    cancel.cancel();
    let dedupe = Deduplicator::new(DedupeConfig::default().with_cancel_token(cancel)).unwrap();
    let summary = dedupe
        .run(&[dir.path().to_path_buf()], false, &mut store)
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.exit_code(), ExitCode::Interrupted);
    assert_eq!(summary.duplicates_linked, 0);
    assert!(store.is_empty());
}
