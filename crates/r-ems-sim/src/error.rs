//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Error types for the exchange engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;

/// Shared result type for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Errors raised while wiring up an exchange run.
///
/// Injected drops and empty replay sources are data states and
/// never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Identifier outside the fixed device set.
    #[error("unknown device identifier '{0}'")]
    UnknownDevice(String),
    /// Replay file could not be read.
    #[error("unable to read replay file {}: {source}", .path.display())]
    ReplayIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Timing parameters are inconsistent.
    #[error("invalid exchange timing: {0}")]
    InvalidTiming(String),
    /// The controller was built outside of a Tokio runtime.
    #[error("exchange controller requires a Tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
