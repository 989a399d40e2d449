//! Engine and Context Configuration (jsbridge.toml)
//!
//! Handles the `[engine]` and `[context]` tables of `jsbridge.toml`.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default limit on nesting when converting aggregates across the bridge
pub const DEFAULT_MAX_CONVERSION_DEPTH: usize = 64;

/// Default limit on the length of an engine array converted to the host
pub const DEFAULT_MAX_ARRAY_LENGTH: usize = 1 << 20;

/// Smallest native stack size accepted for the engine (bytes)
const MIN_STACK_SIZE: usize = 16 * 1024;

/// Complete bridge configuration from jsbridge.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Engine instance settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Defaults for contexts created from the engine
    #[serde(default)]
    pub context: ContextConfig,
}

/// Engine instance settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Heap quota for the engine instance (bytes), shared by all of its contexts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_quota: Option<usize>,

    /// Maximum native stack the engine may use while running scripts (bytes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stack_size: Option<usize>,

    /// Allocation volume that triggers a collection (bytes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gc_threshold: Option<usize>,
}

/// Defaults applied to every new context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Compile all scripts in strict mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,

    /// Maximum nesting of arrays/objects converted across the bridge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_conversion_depth: Option<usize>,

    /// Maximum length of an engine array converted to the host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_array_length: Option<usize>,
}

impl BridgeConfig {
    /// Load bridge configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all sections
    pub fn validate(&self) -> ConfigResult<()> {
        self.engine.validate()?;
        self.context.validate()
    }

    /// Merge another config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &BridgeConfig) {
        self.engine.merge(&other.engine);
        self.context.merge(&other.context);
    }
}

impl EngineConfig {
    /// Engine settings with only a memory quota
    pub fn with_quota(memory_quota: usize) -> Self {
        Self {
            memory_quota: Some(memory_quota),
            ..Default::default()
        }
    }

    /// Validate engine settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.memory_quota == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "engine.memory_quota".to_string(),
                reason: "must be a positive number of bytes".to_string(),
            });
        }

        if let Some(stack) = self.max_stack_size {
            if stack < MIN_STACK_SIZE {
                return Err(ConfigError::InvalidValue {
                    field: "engine.max_stack_size".to_string(),
                    reason: format!("must be at least {} bytes, got {}", MIN_STACK_SIZE, stack),
                });
            }
        }

        Ok(())
    }

    /// Merge another engine config into this one
    pub fn merge(&mut self, other: &EngineConfig) {
        if other.memory_quota.is_some() {
            self.memory_quota = other.memory_quota;
        }
        if other.max_stack_size.is_some() {
            self.max_stack_size = other.max_stack_size;
        }
        if other.gc_threshold.is_some() {
            self.gc_threshold = other.gc_threshold;
        }
    }
}

impl ContextConfig {
    /// Validate context settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_conversion_depth == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "context.max_conversion_depth".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_array_length == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "context.max_array_length".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Whether scripts compile in strict mode (default: false)
    pub fn strict(&self) -> bool {
        self.strict.unwrap_or(false)
    }

    /// Effective conversion depth limit
    pub fn max_conversion_depth(&self) -> usize {
        self.max_conversion_depth.unwrap_or(DEFAULT_MAX_CONVERSION_DEPTH)
    }

    /// Effective array length limit
    pub fn max_array_length(&self) -> usize {
        self.max_array_length.unwrap_or(DEFAULT_MAX_ARRAY_LENGTH)
    }

    /// Merge another context config into this one
    pub fn merge(&mut self, other: &ContextConfig) {
        if other.strict.is_some() {
            self.strict = other.strict;
        }
        if other.max_conversion_depth.is_some() {
            self.max_conversion_depth = other.max_conversion_depth;
        }
        if other.max_array_length.is_some() {
            self.max_array_length = other.max_array_length;
        }
    }
}
