//! CLI error types

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Startup failed: {0}")]
    StartupFailed(String),

    #[error("Core error: {0}")]
    Core(#[from] hq_core::CoreError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CliError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CliError::ConfigError(_) => "CLI001",
            CliError::StartupFailed(_) => "CLI002",
            CliError::Core(e) => e.code(),
            CliError::IoError(_) => "CLI003",
        }
    }
}

/// CLI-specific result type
pub type Result<T> = std::result::Result<T, CliError>;
