use rustthumb::config::{Config, ConfigOverrides};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let config = Config::load_from_path(&dir.path().join("absent.toml"), &ConfigOverrides::default())
        .unwrap();
    assert_eq!(config.workers, 4);
    assert_eq!(config.memory_capacity, 200);
    assert_eq!(config.default_size, 128);
    assert_eq!(config.debounce(), Duration::from_millis(500));
    assert_eq!(config.poll_interval(), Duration::from_millis(250));
}

#[test]
fn test_file_values_and_cli_overrides() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
cache_dir = "/srv/thumbs"
workers = 2
debounce_ms = 900
include_hidden = true
"#,
    )
    .unwrap();

    let config = Config::load_from_path(&path, &ConfigOverrides::default()).unwrap();
    assert_eq!(config.cache_root(), PathBuf::from("/srv/thumbs"));
    assert_eq!(config.workers, 2);
    assert_eq!(config.debounce(), Duration::from_millis(900));
    assert!(config.include_hidden);
    // Untouched keys keep their defaults.
    assert_eq!(config.text_lines, 8);

    let overrides = ConfigOverrides {
        cache_dir: Some(PathBuf::from("/tmp/override")),
        workers: Some(6),
    };
    let config = Config::load_from_path(&path, &overrides).unwrap();
    assert_eq!(config.cache_root(), PathBuf::from("/tmp/override"));
    assert_eq!(config.workers, 6);
    assert_eq!(config.debounce(), Duration::from_millis(900));
}

#[test]
fn test_environment_layer_beats_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "shutdown_wait_ms = 100\n").unwrap();

    std::env::set_var("RUSTTHUMB_SHUTDOWN_WAIT_MS", "4321");
    let config = Config::load(Some(path.as_path()), &ConfigOverrides::default());
    std::env::remove_var("RUSTTHUMB_SHUTDOWN_WAIT_MS");

    assert_eq!(config.shutdown_wait(), Duration::from_millis(4321));
}

#[test]
fn test_invalid_file_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "workers = \"many\"\n").unwrap();

    assert!(Config::load_from_path(&path, &ConfigOverrides::default()).is_err());

    let overrides = ConfigOverrides {
        cache_dir: Some(PathBuf::from("/tmp/still-applied")),
        workers: None,
    };
    let config = Config::load(Some(path.as_path()), &overrides);
    assert_eq!(config.workers, 4);
    assert_eq!(config.cache_root(), PathBuf::from("/tmp/still-applied"));
}

#[test]
fn test_zero_values_are_clamped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "workers = 0\nmemory_capacity = 0\n").unwrap();

    let config = Config::load_from_path(&path, &ConfigOverrides::default()).unwrap();
    assert_eq!(config.workers, 1);
    assert_eq!(config.memory_capacity, 1);
}

#[test]
fn test_effective_config_renders_as_toml() {
    let config = Config::load_from_path(
        &tempdir().unwrap().path().join("none.toml"),
        &ConfigOverrides {
            cache_dir: Some(PathBuf::from("/var/cache/rt")),
            workers: Some(3),
        },
    )
    .unwrap();
    let text = config.to_toml().unwrap();
    assert!(text.contains("workers = 3"));
    assert!(text.contains("cache_dir = \"/var/cache/rt\""));
    assert!(!text.contains("font_path"));
}
