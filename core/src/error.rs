//! Core error types and utilities

use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Pipe creation failed: {0}")]
    PipeCreation(String),

    #[error("Process spawn failed: {0}")]
    ProcessSpawn(String),

    #[error("Process wait failed: {0}")]
    ProcessWait(String),

    #[error("Process signal failed: {0}")]
    ProcessSignal(String),

    #[error("Signal setup failed: {0}")]
    SignalSetup(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "HQ001",
            CoreError::ValidationError(_) => "HQ002",
            CoreError::InitializationError(_) => "HQ003",
            CoreError::PipeCreation(_) => "HQ004",
            CoreError::ProcessSpawn(_) => "HQ005",
            CoreError::ProcessWait(_) => "HQ006",
            CoreError::ProcessSignal(_) => "HQ007",
            CoreError::SignalSetup(_) => "HQ008",
            CoreError::IoError(_) => "HQ009",
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<nix::Error> for CoreError {
    fn from(errno: nix::Error) -> Self {
        CoreError::IoError(std::io::Error::from(errno))
    }
}
