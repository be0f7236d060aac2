//! The shared adapter error taxonomy.
//!
//! Every vendor-specific failure is mapped into one of these variants, so
//! the gateway can treat all providers uniformly when deciding to fall
//! back. None of these ever reach the caller.

use thiserror::Error;

/// Uniform failure shape reported by every adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("rate limited by provider")]
    RateLimited,

    #[error("provider authentication failed")]
    AuthFailed,

    #[error("provider call timed out")]
    Timeout,

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("provider server error (status {status})")]
    ServerError { status: u16 },

    #[error("network error: {0}")]
    Network(String),
}

impl AdapterError {
    /// Short stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::RateLimited => "rate-limited",
            AdapterError::AuthFailed => "auth-failed",
            AdapterError::Timeout => "timeout",
            AdapterError::MalformedResponse(_) => "malformed-response",
            AdapterError::ServerError { .. } => "server-error",
            AdapterError::Network(_) => "network",
        }
    }
}
