//! Request orchestration for Oxigate.
//!
//! # Architecture
//!
//! - [`gateway::Gateway`] — per-request pipeline: cache, routing, breaker,
//!   budget, adapter invocation, fallback
//! - [`routing`] — pure candidate ordering (priority, hints, A/B)
//! - [`breaker`] — per-provider circuit breaker
//! - [`budget`] — reservation/commit spend accounting over rolling windows
//! - [`cache`] — fingerprint-keyed response cache
//! - [`ledger`] — append-only usage trail
//! - admin surface (config writes, status, usage queries) in [`admin`]

pub mod admin;
pub mod breaker;
pub mod budget;
pub mod cache;
pub mod gateway;
pub mod ledger;
pub mod routing;

use std::sync::{Arc, RwLock};

use oxigate_core::config::OxigateConfig;

/// Shared, admin-mutable configuration read by the request path.
pub type SharedConfig = Arc<RwLock<OxigateConfig>>;

pub use admin::ProviderStatus;
pub use breaker::{Admission, CircuitBreaker};
pub use budget::{BudgetAlert, BudgetManager, BudgetRejection, BudgetScope, ReservationToken};
pub use cache::{fingerprint, CachedResponse, ResponseCache};
pub use gateway::Gateway;
pub use ledger::{UsageLedger, UsageSummary};
