// Environment variables are process-wide, so this binary holds a single test.

use dupe_engine::config::ScanConfig;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_env_overrides_file_and_defaults() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "min_file_size = 100\nworker_pool_size = 2\n").unwrap();

    std::env::set_var("DUPE_ENGINE_MIN_FILE_SIZE", "2048");
    std::env::set_var("DUPE_ENGINE_DETECT_FOLDERS", "false");

    let loaded = ScanConfig::load(Some(&config_path));

    std::env::remove_var("DUPE_ENGINE_MIN_FILE_SIZE");
    std::env::remove_var("DUPE_ENGINE_DETECT_FOLDERS");

    let config = loaded.unwrap();
    assert_eq!(config.min_file_size, 2048);
    assert!(!config.detect_folders);
    // File layer still applies where the environment is silent
    assert_eq!(config.worker_pool_size, Some(2));
}
