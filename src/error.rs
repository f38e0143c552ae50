//! Custom error types for the chamber acquisition core.
//!
//! `ChamberError` consolidates the error sources the crate surface can
//! report. It deliberately distinguishes the terminal connection-lost
//! condition from transient transport trouble: transient failures are
//! absorbed by the acquisition loop's failure counter and never surface
//! here, while `ConnectionLost` means polling has stopped for good and
//! requires re-initialization.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, ChamberError>;

/// Primary error type for the chamber acquisition core.
#[derive(Error, Debug)]
pub enum ChamberError {
    /// Configuration file parsing or merging failed.
    ///
    /// Wraps `figment::Error` from loading the TOML file and environment
    /// overrides. Permanent; requires fixing the configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration parsed but failed semantic validation
    /// (e.g. a zero poll interval or a history window shorter than it).
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    /// File or filesystem I/O failed, typically while opening or writing
    /// a session log file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Device communication failed outside the polling loop, e.g. during
    /// the startup handshake or an explicit command write.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The consecutive-failure threshold was exceeded and polling has
    /// stopped. Terminal for this connection: already-collected history
    /// and log files stay readable, but acquisition will not resume
    /// without re-initialization.
    #[error("Connection to the chamber device was lost")]
    ConnectionLost,

    /// An internal worker task is no longer running, so the requested
    /// operation cannot be delivered.
    #[error("Worker task unavailable: {0}")]
    WorkerGone(&'static str),
}
