//! Shared error types.
//!
//! Only two kinds of failure ever cross the gateway boundary: malformed
//! caller input ([`RequestError`]) and invalid administrative writes
//! ([`ConfigError`]). Provider, budget, and circuit failures are absorbed
//! internally and degrade to the fallback response instead.

use thiserror::Error;

/// Caller-input validation failure — the only hard error a generate call
/// can return.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("unknown task kind '{0}' (expected chat, generation, or analysis)")]
    UnknownTaskKind(String),
}

/// Rejected administrative configuration write, reported synchronously to
/// the admin caller.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("provider '{0}' is not configured")]
    UnknownProvider(String),

    #[error("priority must be at least 1, got {0}")]
    InvalidPriority(u32),

    #[error("{field} must not be negative, got {value}")]
    NegativeValue { field: &'static str, value: f64 },

    #[error("ceiling must be positive, got {0}")]
    InvalidCeiling(f64),

    #[error("alert threshold must be within (0, 100], got {0}")]
    InvalidAlertThreshold(f64),

    #[error("provider name must not be empty")]
    EmptyProviderName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_message() {
        let err = RequestError::UnknownTaskKind("summarize".to_string());
        assert!(err.to_string().contains("summarize"));
        assert!(err.to_string().contains("chat"));
    }

    #[test]
    fn test_config_error_messages() {
        assert!(ConfigError::InvalidPriority(0).to_string().contains("1"));
        let err = ConfigError::NegativeValue {
            field: "inputCostPer1k",
            value: -0.5,
        };
        assert!(err.to_string().contains("inputCostPer1k"));
    }
}
