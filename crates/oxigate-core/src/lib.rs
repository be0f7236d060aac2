//! Core types and configuration for Oxigate.
//!
//! # Architecture
//!
//! - [`types`] — request/response model, the tagged task payload, and
//!   usage records
//! - [`config`] — configuration schema and the JSON + env loader
//! - [`error`] — the two error types that cross the gateway boundary

pub mod config;
pub mod error;
pub mod types;

pub use config::{OxigateConfig, ProviderSettings, WindowKind};
pub use error::{ConfigError, RequestError};
pub use types::{
    AttemptOutcome, ChatTurn, GenerateRequest, GenerateResponse, Role, TaskKind, TaskPayload,
    UsageRecord, FALLBACK_PROVIDER,
};
