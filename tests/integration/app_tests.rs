use super::common::{clean_env, install};
use clap::Parser;
use nmdedupe::cli::Cli;
use nmdedupe::error::ExitCode;
use nmdedupe::refs::ReferenceStore;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn cli(dir: &Path, extra: &[&str]) -> Cli {
    let config = dir.join("config.json");
    fs::write(&config, "{}").unwrap();

    let mut args = vec![
        "nmdedupe".to_string(),
        "-q".to_string(),
        "--no-progress".to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "--refs-file".to_string(),
        dir.join("refs.json").display().to_string(),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));
    Cli::try_parse_from(args).unwrap()
}

#[test]
fn test_app_links_and_saves_store() {
    let _env = clean_env();
    let dir = tempdir().unwrap();
    let root = dir.path().join("projects");
    install(&root.join("a"), "lodash", "4.17.21", &[b'x'; 2048]);
    install(&root.join("b"), "lodash", "4.17.21", &[b'x'; 2048]);

    let code = nmdedupe::run_app(cli(dir.path(), &[root.to_str().unwrap()])).unwrap();

    assert_eq!(code, ExitCode::Success);
    let refs = dir.path().join("refs.json");
    assert!(refs.exists());
    assert_eq!(ReferenceStore::load(&refs).len(), 1);
}

#[test]
fn test_app_dry_run_leaves_no_store() {
    let _env = clean_env();
    let dir = tempdir().unwrap();
    let root = dir.path().join("projects");
    install(&root.join("a"), "ms", "2.1.3", b"m");
    install(&root.join("b"), "ms", "2.1.3", b"m");

    for flag in ["--dry-run", "--commands"] {
        let code =
            nmdedupe::run_app(cli(dir.path(), &[flag, root.to_str().unwrap()])).unwrap();
        assert_eq!(code, ExitCode::Success);
    }

    assert!(!dir.path().join("refs.json").exists());
}

#[test]
fn test_app_prune_only() {
    let _env = clean_env();
    let dir = tempdir().unwrap();

    let code = nmdedupe::run_app(cli(dir.path(), &["--prune"])).unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(!dir.path().join("refs.json").exists());
}

#[test]
fn test_app_missing_root_is_error() {
    let _env = clean_env();
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nowhere");

    let result = nmdedupe::run_app(cli(dir.path(), &[missing.to_str().unwrap()]));

    assert!(result.is_err());
}

#[test]
fn test_app_rejects_zero_concurrency() {
    let _env = clean_env();
    let dir = tempdir().unwrap();
    let root = dir.path().join("projects");
    fs::create_dir_all(&root).unwrap();

    let result = nmdedupe::run_app(cli(
        dir.path(),
        &["--concurrent-ops", "0", root.to_str().unwrap()],
    ));

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("concurrentOps"));
}

#[test]
fn test_cli_requires_path_or_prune() {
    assert!(Cli::try_parse_from(["nmdedupe"]).is_err());
    assert!(Cli::try_parse_from(["nmdedupe", "--prune"]).is_ok());
    assert!(Cli::try_parse_from(["nmdedupe", "--dry-run", "--commands", "."]).is_err());
}
