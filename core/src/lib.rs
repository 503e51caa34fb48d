//! Core functionality for the hq job supervisor
//!
//! This crate contains the job table, the process launcher, the line relay
//! and the command dispatcher. The `hq` binary in the CLI crate feeds it
//! tokenized control lines.

pub mod command;
pub mod config;
pub mod error;
pub mod job;
#[cfg(unix)]
pub mod process;
pub mod relay;
pub mod supervisor;


pub use command::{Command, CommandError};
pub use config::SupervisorConfig;
pub use error::{CoreError, Result};
pub use job::{JobId, JobStatus, JobTable};
pub use relay::Received;
pub use supervisor::Supervisor;

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    ///
    /// Diagnostics go to standard error so they never mix with the
    /// operator-visible output on standard output. `RUST_LOG` takes
    /// precedence over `level`.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
