//! Tests for configuration loading and root folder resolution
//!
//! Tests that touch FDW_ROOT_FOLDER or FDW_CONFIG are marked #[serial]
//! so they do not race on the process environment.

use fdw_common::config::{
    database_path, default_root_folder, load_config, resolve_root_folder, write_toml_config,
    LoaderConfig, TomlConfig, CONFIG_PATH_ENV, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_defaults_match_documented_values() {
    let config = TomlConfig::default();
    assert_eq!(config.loader.chunk_size, 50_000);
    assert_eq!(config.loader.max_attempts, 3);
    assert_eq!(config.loader.timeout_secs, None);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.server.bind_address, "127.0.0.1:5740");
}

#[test]
fn test_partial_toml_fills_in_defaults() {
    let config = TomlConfig::from_toml_str(
        r#"
        root_folder = "/srv/fdw"

        [loader]
        chunk_size = 1000
        "#,
    )
    .unwrap();

    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/fdw")));
    assert_eq!(config.loader.chunk_size, 1000);
    assert_eq!(config.loader.max_attempts, LoaderConfig::default().max_attempts);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_zero_chunk_size_is_rejected() {
    let result = TomlConfig::from_toml_str("[loader]\nchunk_size = 0\n");
    assert!(result.is_err());
}

#[test]
fn test_backoff_bounds_are_validated() {
    let result = TomlConfig::from_toml_str(
        "[loader]\ninitial_backoff_ms = 9000\nmax_backoff_ms = 10\n",
    );
    assert!(result.is_err());
}

#[test]
fn test_malformed_toml_is_an_error() {
    assert!(TomlConfig::from_toml_str("loader = [").is_err());
}

#[test]
#[serial]
fn test_missing_explicit_file_degrades_to_defaults() {
    env::remove_var(CONFIG_PATH_ENV);
    let config = load_config(Some(Path::new("/nonexistent/fdw/fdw.toml"))).unwrap();
    assert_eq!(config.loader.chunk_size, 50_000);
}

#[test]
#[serial]
fn test_config_env_var_is_honoured() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("custom.toml");
    std::fs::write(&path, "[loader]\nchunk_size = 7\n").unwrap();

    env::set_var(CONFIG_PATH_ENV, &path);
    let config = load_config(None).unwrap();
    env::remove_var(CONFIG_PATH_ENV);

    assert_eq!(config.loader.chunk_size, 7);
}

#[test]
fn test_write_then_load_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("fdw.toml");

    let mut config = TomlConfig::default();
    config.loader.chunk_size = 250;
    config.loader.timeout_secs = Some(30);
    write_toml_config(&config, &path).unwrap();

    let loaded = load_config(Some(&path)).unwrap();
    assert_eq!(loaded.loader, config.loader);
}

#[test]
#[serial]
fn test_root_folder_cli_beats_env_and_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/fdw-env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/fdw-toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(Some(Path::new("/tmp/fdw-cli")), &config);
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(resolved, PathBuf::from("/tmp/fdw-cli"));
}

#[test]
#[serial]
fn test_root_folder_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/fdw-env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/fdw-toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(None, &config);
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(resolved, PathBuf::from("/tmp/fdw-env"));
}

#[test]
#[serial]
fn test_root_folder_falls_back_to_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    let resolved = resolve_root_folder(None, &TomlConfig::default());
    assert_eq!(resolved, default_root_folder());
}

#[test]
fn test_database_path_under_root() {
    let path = database_path(Path::new("/data/fdw"));
    assert_eq!(path, PathBuf::from("/data/fdw/warehouse.db"));
}
