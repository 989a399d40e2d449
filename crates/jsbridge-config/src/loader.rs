//! Configuration Loader
//!
//! Handles loading configuration from disk and the environment with proper precedence.

use crate::engine::BridgeConfig;
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "jsbridge.toml";

/// Configuration loader
///
/// Loads configuration and merges it with proper precedence:
/// 1. Built-in defaults - lowest priority
/// 2. Project config (./jsbridge.toml) - overrides defaults
/// 3. Environment variables (JSBRIDGE_*) - overrides project
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip JSBRIDGE_* variables
    ignore_env: bool,
}

/// Loaded configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Effective bridge configuration
    pub bridge: BridgeConfig,

    /// Directory where jsbridge.toml was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Create a loader that ignores environment overrides
    pub fn without_env() -> Self {
        Self { ignore_env: true }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find jsbridge.toml. A missing file is not
    /// an error; defaults are used instead.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, bridge) = self.find_project_config(start_dir)?;
        let bridge = self.apply_env_overrides(bridge)?;

        Ok(Config {
            bridge,
            project_root,
        })
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let bridge = BridgeConfig::load_from_file(config_path)?;
        let bridge = self.apply_env_overrides(bridge)?;

        Ok(Config {
            bridge,
            project_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, BridgeConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let config = BridgeConfig::load_from_file(&config_path)?;
                return Ok((Some(current), config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, BridgeConfig::default())),
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Recognized variables:
    /// - JSBRIDGE_MEMORY_QUOTA
    /// - JSBRIDGE_MAX_STACK_SIZE
    /// - JSBRIDGE_GC_THRESHOLD
    /// - JSBRIDGE_STRICT
    fn apply_env_overrides(&self, mut config: BridgeConfig) -> ConfigResult<BridgeConfig> {
        if self.ignore_env {
            return Ok(config);
        }

        if let Some(quota) = env_size("JSBRIDGE_MEMORY_QUOTA")? {
            config.engine.memory_quota = Some(quota);
        }
        if let Some(stack) = env_size("JSBRIDGE_MAX_STACK_SIZE")? {
            config.engine.max_stack_size = Some(stack);
        }
        if let Some(threshold) = env_size("JSBRIDGE_GC_THRESHOLD")? {
            config.engine.gc_threshold = Some(threshold);
        }
        if let Ok(strict) = env::var("JSBRIDGE_STRICT") {
            config.context.strict = Some(matches!(
                strict.to_lowercase().as_str(),
                "true" | "1" | "yes"
            ));
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if a jsbridge.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}

/// Read a byte-size environment variable
fn env_size(name: &str) -> ConfigResult<Option<usize>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                field: name.to_string(),
                reason: format!("expected a byte count, got '{}' ({})", raw, e),
            }),
        Err(_) => Ok(None),
    }
}
