//! The provider adapter trait.
//!
//! One implementation per vendor plus the static fallback. An adapter is
//! responsible only for protocol translation: generic payload in, uniform
//! result (or a taxonomy error) out.

use async_trait::async_trait;
use std::time::Duration;

use oxigate_core::types::TaskPayload;

use crate::error::AdapterError;

/// Result of a successful provider call, in a vendor-neutral shape.
#[derive(Clone, Debug, PartialEq)]
pub struct AdapterOutput {
    pub content: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub latency: Duration,
}

/// Trait that all provider adapters implement.
///
/// `invoke` must respect `timeout` — a provider that does not answer in
/// time reports [`AdapterError::Timeout`] rather than hanging the caller.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Translate the payload into a vendor call and the vendor response
    /// back into an [`AdapterOutput`].
    async fn invoke(
        &self,
        payload: &TaskPayload,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<AdapterOutput, AdapterError>;

    /// Provider name, matching its `ProviderSettings` entry.
    fn name(&self) -> &str;

    /// Model identifier this adapter sends on the wire.
    fn model(&self) -> &str;
}
