//! Error types for the relay binary.
//!
//! [`RelayError`] is the top-level error type that wraps every failure
//! mode during startup and shutdown.

/// Top-level error for the relay binary.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: signalcast_core::config::ConfigError,
    },

    /// The dashboard server could not start.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: signalcast_observer::ServerError,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {message}")]
    Signal {
        /// Description of the failure.
        message: String,
    },

    /// A background task panicked.
    #[error("task error: {message}")]
    Task {
        /// Which task failed and how.
        message: String,
    },
}
