use super::common::clean_env;
use nmdedupe::actions::LinkPolicy;
use nmdedupe::config::{Config, ConfigError, ConfigOverrides};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_env_overrides() {
    let _env = clean_env();
    std::env::set_var("NMDEDUPE_CONCURRENT_OPS", "8");
    std::env::set_var("NMDEDUPE_LINK_TYPE", "symlink");
    std::env::set_var("NMDEDUPE_REFS_FILE", "/tmp/refs.json");

    let overrides = ConfigOverrides::from_env().unwrap();

    std::env::remove_var("NMDEDUPE_CONCURRENT_OPS");
    std::env::remove_var("NMDEDUPE_LINK_TYPE");
    std::env::remove_var("NMDEDUPE_REFS_FILE");

    assert_eq!(overrides.concurrent_ops, Some(8));
    assert_eq!(overrides.link_type, Some(LinkPolicy::Symlink));
    assert_eq!(overrides.refs_file, Some(PathBuf::from("/tmp/refs.json")));
    assert_eq!(overrides.min_size, None);

    let mut config = Config::default();
    overrides.apply(&mut config);
    assert_eq!(config.concurrent_ops, 8);
    assert_eq!(config.link_type, LinkPolicy::Symlink);
    assert_eq!(config.tree_depth, 0);
}

#[test]
fn test_env_wrong_type_is_error() {
    let _env = clean_env();
    std::env::set_var("NMDEDUPE_MIN_SIZE", "lots");

    let result = ConfigOverrides::from_env();

    std::env::remove_var("NMDEDUPE_MIN_SIZE");
    assert!(matches!(result, Err(ConfigError::Extract(_))));
}

#[test]
fn test_file_layers_over_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"minSize": 1048576, "linkType": "symlink"}"#).unwrap();

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.min_size, 1_048_576);
    assert_eq!(config.link_type, LinkPolicy::Symlink);
    assert_eq!(config.concurrent_ops, 4);
    assert_eq!(config.console_width, 80);
}

#[test]
fn test_env_wins_over_file() {
    let _env = clean_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"treeDepth": 3, "concurrentOps": 2}"#).unwrap();
    std::env::set_var("NMDEDUPE_TREE_DEPTH", "6");

    let config = Config::load(Some(&path));

    std::env::remove_var("NMDEDUPE_TREE_DEPTH");
    let config = config.unwrap();
    assert_eq!(config.tree_depth, 6);
    assert_eq!(config.concurrent_ops, 2);
}

#[test]
fn test_invalid_json_is_error() {
    let _env = clean_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ concurrentOps: ").unwrap();

    assert!(matches!(
        Config::load(Some(&path)),
        Err(ConfigError::Extract(_))
    ));
}

#[test]
fn test_explicit_missing_file_is_error() {
    let _env = clean_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.json");

    assert!(matches!(
        Config::load(Some(&path)),
        Err(ConfigError::NotFound(p)) if p == path
    ));
}

#[test]
fn test_zero_concurrency_rejected() {
    let _env = clean_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"concurrentOps": 0}"#).unwrap();

    assert!(matches!(
        Config::load(Some(&path)),
        Err(ConfigError::Invalid {
            field: "concurrentOps",
            ..
        })
    ));
}
