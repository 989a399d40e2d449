//! Configuration loading and precedence tests

use jsbridge_config::{
    BridgeConfig, ConfigError, ConfigLoader, ContextConfig, EngineConfig, CONFIG_FILE_NAME,
    DEFAULT_MAX_CONVERSION_DEPTH,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> std::path::PathBuf {
    let config_path = dir.join(CONFIG_FILE_NAME);
    fs::write(&config_path, content).unwrap();
    config_path
}

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
fn test_load_from_subdirectory_finds_parent() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[engine]
memory_quota = 4194304
"#,
    );

    let sub2 = temp_dir.path().join("sub1").join("sub2");
    fs::create_dir_all(&sub2).unwrap();

    let config = ConfigLoader::without_env()
        .load_from_directory(&sub2)
        .unwrap();

    assert_eq!(config.bridge.engine.memory_quota, Some(4_194_304));
    assert_eq!(config.project_root(), Some(temp_dir.path()));
}

#[test]
fn test_load_with_empty_config() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "");

    let config = ConfigLoader::without_env()
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(config.is_project());
    assert_eq!(config.bridge, BridgeConfig::default());
}

#[test]
fn test_load_from_explicit_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(
        temp_dir.path(),
        r#"
[context]
strict = true
max_conversion_depth = 8
"#,
    );

    let config = ConfigLoader::without_env().load_from_file(&path).unwrap();

    assert!(config.bridge.context.strict());
    assert_eq!(config.bridge.context.max_conversion_depth(), 8);
}

#[test]
fn test_load_missing_file_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing.toml");

    let result = ConfigLoader::without_env().load_from_file(&path);

    assert!(matches!(result, Err(ConfigError::NotFound(p)) if p == path));
}

// ============================================================================
// Validation Tests
// ============================================================================

#[rstest]
#[case::zero_quota("[engine]\nmemory_quota = 0\n")]
#[case::tiny_stack("[engine]\nmax_stack_size = 512\n")]
#[case::zero_depth("[context]\nmax_conversion_depth = 0\n")]
#[case::zero_array_length("[context]\nmax_array_length = 0\n")]
fn test_invalid_values_rejected(#[case] content: &str) {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), content);

    let result = ConfigLoader::without_env().load_from_directory(temp_dir.path());

    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[rstest]
#[case::unknown_table("[runtime]\nfoo = 1\n")]
#[case::unknown_key("[engine]\nheap = 1\n")]
#[case::wrong_type("[engine]\nmemory_quota = \"big\"\n")]
#[case::broken_syntax("[engine\n")]
fn test_malformed_toml_rejected(#[case] content: &str) {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), content);

    let result = ConfigLoader::without_env().load_from_directory(temp_dir.path());

    assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
}

#[test]
fn test_error_message_names_field() {
    let err = EngineConfig::with_quota(0).validate().unwrap_err();
    assert!(err.to_string().contains("engine.memory_quota"));
}

// ============================================================================
// Precedence Tests
// ============================================================================

#[test]
#[serial]
fn test_env_overrides_project_file() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[engine]
memory_quota = 1048576
gc_threshold = 1024

[context]
strict = false
"#,
    );

    env::set_var("JSBRIDGE_GC_THRESHOLD", "65536");
    env::set_var("JSBRIDGE_STRICT", "yes");
    let result = ConfigLoader::new().load_from_directory(temp_dir.path());
    env::remove_var("JSBRIDGE_GC_THRESHOLD");
    env::remove_var("JSBRIDGE_STRICT");

    let config = result.unwrap();
    assert_eq!(config.bridge.engine.memory_quota, Some(1_048_576));
    assert_eq!(config.bridge.engine.gc_threshold, Some(65_536));
    assert!(config.bridge.context.strict());
}

#[test]
#[serial]
fn test_env_override_still_validated() {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("JSBRIDGE_MEMORY_QUOTA", "0");
    let result = ConfigLoader::new().load_from_directory(temp_dir.path());
    env::remove_var("JSBRIDGE_MEMORY_QUOTA");

    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
#[serial]
fn test_without_env_ignores_variables() {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("JSBRIDGE_MEMORY_QUOTA", "not-a-number");
    let result = ConfigLoader::without_env().load_from_directory(temp_dir.path());
    env::remove_var("JSBRIDGE_MEMORY_QUOTA");

    assert_eq!(result.unwrap().bridge.engine.memory_quota, None);
}

#[test]
fn test_merge_keeps_unset_fields() {
    let mut base = BridgeConfig {
        engine: EngineConfig {
            memory_quota: Some(2048 * 1024),
            max_stack_size: Some(256 * 1024),
            gc_threshold: None,
        },
        context: ContextConfig::default(),
    };
    let overlay = BridgeConfig {
        engine: EngineConfig::with_quota(4096 * 1024),
        context: ContextConfig {
            strict: None,
            max_conversion_depth: Some(32),
            max_array_length: None,
        },
    };

    base.merge(&overlay);

    assert_eq!(base.engine.memory_quota, Some(4096 * 1024));
    assert_eq!(base.engine.max_stack_size, Some(256 * 1024));
    assert_eq!(base.context.max_conversion_depth(), 32);
    assert_ne!(base.context.max_conversion_depth(), DEFAULT_MAX_CONVERSION_DEPTH);
}

#[test]
fn test_config_serializes_back_to_toml() {
    let config = BridgeConfig {
        engine: EngineConfig::with_quota(1024),
        context: ContextConfig::default(),
    };

    let text = toml::to_string(&config).unwrap();
    let parsed: BridgeConfig = toml::from_str(&text).unwrap();

    assert_eq!(parsed, config);
}
