//! Error types for single requests and for whole scans.

use thiserror::Error;

/// Why a single request did not produce a usable entry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RequestError {
    /// A heuristic decided the entry is not a finding. Never retried.
    #[error("rejected: {0}")]
    Rejected(String),
    /// Transient failure (timeout, reset, read error). Retried by the engine.
    #[error("stopped: {0}")]
    Stopped(String),
    /// The retry budget ran out on transient failures.
    #[error("{url} timed out after {attempts} attempts ({reason})")]
    Exhausted {
        url: String,
        attempts: usize,
        reason: String,
    },
    /// Too many consecutive failures against the host.
    #[error("host {0} is unreachable")]
    HostUnreachable(String),
    /// The scan was interrupted.
    #[error("scan cancelled")]
    Cancelled,
}

impl RequestError {
    pub fn reject(reason: impl Into<String>) -> Self {
        RequestError::Rejected(reason.into())
    }

    pub fn stop(reason: impl Into<String>) -> Self {
        RequestError::Stopped(reason.into())
    }

    /// Maps a transport error from reqwest onto the transient/permanent split.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_builder() {
            RequestError::Rejected(format!("invalid request: {err}"))
        } else if err.is_timeout() {
            RequestError::Stopped("timeout".to_string())
        } else {
            RequestError::Stopped(err.to_string())
        }
    }
}

/// Errors that end a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid target {0}: {1}")]
    InvalidTarget(String, String),
    #[error("could not resolve {0}")]
    Resolve(String),
    #[error("could not build the HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("could not load dictionary {path}: {reason}")]
    Dictionary { path: String, reason: String },
    #[error("host {0} is unreachable, aborting scan")]
    HostUnreachable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScanError::HostUnreachable(_) => 2,
            _ => 1,
        }
    }
}
