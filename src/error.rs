use std::io;

/// Health server lifecycle error
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// `start()` was called while the server is already serving
    #[error("Health server is already running")]
    AlreadyRunning,

    #[error("Invalid bind address {addr}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind health server: {0}")]
    Bind(#[source] io::Error),

    #[error("Health server error: {0}")]
    Serve(#[source] io::Error),
}

impl HealthServerError {
    /// True when the error is a caller logic error rather than an I/O fault.
    pub fn is_already_running(&self) -> bool {
        matches!(self, HealthServerError::AlreadyRunning)
    }
}
