//! jsbridge Configuration System
//!
//! Provides configuration for embedded script engines:
//! - Engine settings (memory quota, native stack size, GC threshold)
//! - Context settings (strict mode, value conversion depth)
//! - Project configuration discovery (jsbridge.toml)
//! - Environment variable overrides
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Project config (./jsbridge.toml, searched upwards)
//! 3. Environment variables (JSBRIDGE_*)
//!
//! # Example
//!
//! ```no_run
//! use jsbridge_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("quota: {:?}", config.bridge.engine.memory_quota);
//! ```

pub mod engine;
pub mod loader;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use engine::{
    BridgeConfig, ContextConfig, EngineConfig, DEFAULT_MAX_ARRAY_LENGTH,
    DEFAULT_MAX_CONVERSION_DEPTH,
};
pub use loader::{Config, ConfigLoader, CONFIG_FILE_NAME};
