use super::common::{deduplicator, install};
use nmdedupe::actions::{LinkMode, LinkPolicy};
use nmdedupe::scanner::{ScanError, Walker, WalkerConfig};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let dedupe = deduplicator(LinkMode::DryRun, LinkPolicy::Hardlink);

    let groups = dedupe.scan(&[dir.path().to_path_buf()]).unwrap().unwrap();

    assert!(groups.is_empty());
    assert_eq!(dedupe.context().packages_scanned(), 0);
}

#[test]
fn test_scan_finds_nested_dependency_trees() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("app");
    let lodash = install(&project, "lodash", "4.17.21", b"a");
    install(&lodash, "once", "1.4.0", b"b");

    let dedupe = deduplicator(LinkMode::DryRun, LinkPolicy::Hardlink);
    let groups = dedupe.scan(&[dir.path().to_path_buf()]).unwrap().unwrap();

    let mut names: Vec<_> = groups.iter().map(|g| g.key.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["lodash", "once"]);
}

#[test]
fn test_scan_ignores_manifests_inside_package_sources() {
    let dir = tempdir().unwrap();
    let pkg = install(&dir.path().join("app"), "tool", "1.0.0", b"x");
    let fixture = pkg.join("test/fixtures/node_modules/fake");
    fs::create_dir_all(&fixture).unwrap();
    fs::write(
        fixture.join("package.json"),
        r#"{"name":"fake","version":"0.0.1"}"#,
    )
    .unwrap();

    let dedupe = deduplicator(LinkMode::DryRun, LinkPolicy::Hardlink);
    let groups = dedupe.scan(&[dir.path().to_path_buf()]).unwrap().unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].key.name, "tool");
}

#[test]
fn test_scan_skips_invalid_manifests() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("app");
    install(&project, "good", "1.0.0", b"x");

    let broken = project.join("node_modules/broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("package.json"), "{ not json").unwrap();

    let nameless = project.join("node_modules/nameless");
    fs::create_dir_all(&nameless).unwrap();
    fs::write(nameless.join("package.json"), r#"{"version":"1.0.0"}"#).unwrap();

    let dedupe = deduplicator(LinkMode::DryRun, LinkPolicy::Hardlink);
    let groups = dedupe.scan(&[dir.path().to_path_buf()]).unwrap().unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(dedupe.context().packages_scanned(), 1);
}

#[test]
fn test_scan_multiple_roots_share_groups() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("one");
    let second = dir.path().join("two");
    install(&first, "lodash", "4.17.21", b"x");
    install(&second, "lodash", "4.17.21", b"x");

    let dedupe = deduplicator(LinkMode::DryRun, LinkPolicy::Hardlink);
    let groups = dedupe.scan(&[first, second]).unwrap().unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
}

#[test]
fn test_scan_versions_are_distinct_keys() {
    let dir = tempdir().unwrap();
    install(&dir.path().join("a"), "lodash", "4.17.20", b"x");
    install(&dir.path().join("b"), "lodash", "4.17.21", b"x");

    let dedupe = deduplicator(LinkMode::DryRun, LinkPolicy::Hardlink);
    let groups = dedupe.scan(&[dir.path().to_path_buf()]).unwrap().unwrap();

    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|g| !g.has_duplicates()));
}

#[test]
fn test_scan_root_is_file() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("file.txt");
    fs::write(&file, "x").unwrap();

    let dedupe = deduplicator(LinkMode::DryRun, LinkPolicy::Hardlink);
    assert!(matches!(
        dedupe.scan(&[file]),
        Err(ScanError::NotADirectory(_))
    ));
}

#[test]
fn test_walker_depth_limit_bounds_discovery() {
    let dir = tempdir().unwrap();
    // root/node_modules/a/package.json sits two levels down
    install(dir.path(), "a", "1.0.0", b"x");
    // root/deep/er/node_modules/b/package.json sits four levels down
    install(&dir.path().join("deep/er"), "b", "1.0.0", b"x");

    let found = |depth: usize| -> Vec<PathBuf> {
        let walker = Walker::new(dir.path(), WalkerConfig::new(depth, 2));
        let mut paths: Vec<_> = walker.walk().filter_map(Result::ok).collect();
        paths.sort();
        paths
    };

    assert_eq!(found(2).len(), 1);
    assert_eq!(found(4).len(), 2);
    assert_eq!(found(0).len(), 2);
}

#[cfg(unix)]
#[test]
fn test_run_fails_on_unreadable_root() {
    use nmdedupe::refs::ReferenceStore;
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let root = dir.path().join("projects");
    install(&root.join("a"), "lodash", "4.17.21", b"x");
    fs::set_permissions(&root, fs::Permissions::from_mode(0o000)).unwrap();

    let listable = fs::read_dir(&root).is_ok();
    let mut store = ReferenceStore::empty(&dir.path().join("refs.json"));
    let result = deduplicator(LinkMode::Apply, LinkPolicy::Hardlink).run(
        &[root.clone()],
        false,
        &mut store,
    );

    fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();

    // Privileged users can list the directory anyway.
    if !listable {
        assert!(matches!(result, Err(ScanError::PermissionDenied(_))));
    }
}
