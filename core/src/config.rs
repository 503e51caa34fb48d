//! Configuration loading and validation for the hq supervisor
//!
//! This module parses an optional TOML file into [`SupervisorConfig`],
//! applies defaults for every missing key (via serde defaults), and validates
//! the result with field-named error messages.

use crate::process::unix::SpawnOptions;
use crate::{CoreError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Default prompt printed before each control line
pub const DEFAULT_PROMPT: &str = "> ";

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Supervisor settings
///
/// ```toml
/// prompt = "> "
/// showPrompt = true
/// isolateProcessGroup = false
/// logLevel = "warn"
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Text printed before reading each control line
    pub prompt: String,
    /// Whether the prompt is printed at all
    pub show_prompt: bool,
    /// Start every child in a process group of its own
    pub isolate_process_group: bool,
    /// Tracing filter directive used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            show_prompt: true,
            isolate_process_group: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl SupervisorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "logLevel: cannot be empty".to_string(),
            ));
        }
        if self.prompt.contains('\n') {
            return Err(CoreError::ValidationError(
                "prompt: cannot contain a newline".to_string(),
            ));
        }
        Ok(())
    }

    /// Options passed to the launcher for every spawned job
    pub fn spawn_options(&self) -> SpawnOptions {
        SpawnOptions {
            isolate_process_group: self.isolate_process_group,
        }
    }
}

/// Load supervisor config from a TOML file path
pub fn load_config_from_toml_path(path: impl AsRef<Path>) -> Result<SupervisorConfig> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_config_from_toml_str(&data)
}

/// Load supervisor config from a TOML string
pub fn load_config_from_toml_str(input: &str) -> Result<SupervisorConfig> {
    let cfg: SupervisorConfig = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}
