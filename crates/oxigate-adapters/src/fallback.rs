//! The static fallback adapter — the provider of last resort.
//!
//! Always available, never fails, costs nothing. It looks only at the task
//! kind and answers with a canned, context-appropriate message, which
//! guarantees the gateway always has a terminal option.

use async_trait::async_trait;
use std::time::Duration;

use oxigate_core::types::{TaskKind, TaskPayload, FALLBACK_PROVIDER};

use crate::error::AdapterError;
use crate::traits::{AdapterOutput, ProviderAdapter};

/// Canned-response adapter used when every real candidate is exhausted.
#[derive(Clone, Debug, Default)]
pub struct FallbackAdapter;

impl FallbackAdapter {
    pub fn new() -> Self {
        FallbackAdapter
    }

    /// The canned message for a task kind.
    pub fn canned(kind: TaskKind) -> &'static str {
        match kind {
            TaskKind::Chat => {
                "I'm temporarily unable to reach the assistant services. \
                 Please try again in a few minutes."
            }
            TaskKind::Generation => {
                "Text generation is temporarily unavailable. \
                 Your request was received; please retry shortly."
            }
            TaskKind::Analysis => {
                "Analysis is temporarily unavailable. \
                 No content was processed; please retry shortly."
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for FallbackAdapter {
    async fn invoke(
        &self,
        payload: &TaskPayload,
        _max_tokens: u32,
        _timeout: Duration,
    ) -> Result<AdapterOutput, AdapterError> {
        Ok(AdapterOutput {
            content: Self::canned(payload.kind()).to_string(),
            tokens_in: 0,
            tokens_out: 0,
            latency: Duration::ZERO,
        })
    }

    fn name(&self) -> &str {
        FALLBACK_PROVIDER
    }

    fn model(&self) -> &str {
        ""
    }
}
