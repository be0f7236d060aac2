//! Configuration schema.
//!
//! Hierarchy: `OxigateConfig` → `providers`, `budget`, `breaker`, `cache`,
//! `limits`, `experiment`. JSON on disk uses **camelCase** keys; Rust uses
//! snake_case, converted via `#[serde(rename_all = "camelCase")]`.
//!
//! Provider entries and budget ceilings are owned by administrative
//! configuration — request-handling code only ever reads them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConfigError;

// ─────────────────────────────────────────────
// Root config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.oxigate/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OxigateConfig {
    pub providers: Vec<ProviderSettings>,
    pub budget: BudgetConfig,
    pub breaker: BreakerConfig,
    pub cache: CacheConfig,
    pub limits: LimitsConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment: Option<ExperimentConfig>,
}

impl OxigateConfig {
    /// Look up a provider entry by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Validate every section; the first problem wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for provider in &self.providers {
            provider.validate()?;
        }
        self.budget.validate()
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// One configured LLM provider: identity, routing inputs, pricing,
/// spend ceilings, and the HTTP endpoint details its adapter needs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    pub name: String,
    /// Model identifier sent on the wire (e.g. `"gpt-4o-mini"`).
    pub model: String,
    /// Routing priority; 1 is highest. Ties break by name.
    pub priority: u32,
    pub enabled: bool,
    /// Dollars per 1 000 input tokens.
    pub input_cost_per_1k: f64,
    /// Dollars per 1 000 output tokens.
    pub output_cost_per_1k: f64,
    /// Per-provider spend ceilings; `None` means unlimited for that window.
    pub ceilings: CeilingSet,
    /// Capabilities matched against request context hints during routing
    /// (e.g. `"realtime-data"`).
    pub specialties: Vec<String>,
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
    /// Per-call timeout override; falls back to `limits.adapterTimeoutSecs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        ProviderSettings {
            name: String::new(),
            model: String::new(),
            priority: 1,
            enabled: true,
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
            ceilings: CeilingSet::default(),
            specialties: Vec::new(),
            api_key: String::new(),
            api_base: None,
            extra_headers: None,
            timeout_secs: None,
        }
    }
}

impl ProviderSettings {
    /// Dollar cost of a measured call.
    pub fn cost_of(&self, tokens_in: u32, tokens_out: u32) -> f64 {
        (tokens_in as f64 / 1000.0) * self.input_cost_per_1k
            + (tokens_out as f64 / 1000.0) * self.output_cost_per_1k
    }

    /// Worst-case cost estimate used to size a budget reservation:
    /// the input estimate at input rates plus `max_tokens` at output rates.
    pub fn estimated_cost(&self, estimated_tokens_in: u32, max_tokens: u32) -> f64 {
        self.cost_of(estimated_tokens_in, max_tokens)
    }

    /// Combined per-1k rate, used by cost-preferring routing.
    pub fn combined_rate(&self) -> f64 {
        self.input_cost_per_1k + self.output_cost_per_1k
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyProviderName);
        }
        if self.priority < 1 {
            return Err(ConfigError::InvalidPriority(self.priority));
        }
        if self.input_cost_per_1k < 0.0 {
            return Err(ConfigError::NegativeValue {
                field: "inputCostPer1k",
                value: self.input_cost_per_1k,
            });
        }
        if self.output_cost_per_1k < 0.0 {
            return Err(ConfigError::NegativeValue {
                field: "outputCostPer1k",
                value: self.output_cost_per_1k,
            });
        }
        self.ceilings.validate()
    }
}

// ─────────────────────────────────────────────
// Budget
// ─────────────────────────────────────────────

/// A rolling accounting period over which spend accumulates.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Day,
    Week,
    Month,
}

impl WindowKind {
    pub const ALL: [WindowKind; 3] = [WindowKind::Day, WindowKind::Week, WindowKind::Month];

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Day => "day",
            WindowKind::Week => "week",
            WindowKind::Month => "month",
        }
    }
}

/// Spend ceilings per window; `None` disables the ceiling for that window.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CeilingSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<f64>,
}

impl CeilingSet {
    pub fn get(&self, window: WindowKind) -> Option<f64> {
        match window {
            WindowKind::Day => self.daily,
            WindowKind::Week => self.weekly,
            WindowKind::Month => self.monthly,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for ceiling in [self.daily, self.weekly, self.monthly].into_iter().flatten() {
            if ceiling <= 0.0 {
                return Err(ConfigError::InvalidCeiling(ceiling));
            }
        }
        Ok(())
    }
}

/// Global budget policy.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BudgetConfig {
    /// Ceilings applied across all providers combined.
    pub global: CeilingSet,
    /// Percentage of a ceiling at which an informational alert fires.
    pub alert_threshold_pct: f64,
    /// When true, reservations that would cross a ceiling are rejected.
    pub auto_disable: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        BudgetConfig {
            global: CeilingSet::default(),
            alert_threshold_pct: 80.0,
            auto_disable: true,
        }
    }
}

impl BudgetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alert_threshold_pct <= 0.0 || self.alert_threshold_pct > 100.0 {
            return Err(ConfigError::InvalidAlertThreshold(self.alert_threshold_pct));
        }
        self.global.validate()
    }
}

// ─────────────────────────────────────────────
// Breaker / cache / limits / experiment
// ─────────────────────────────────────────────

/// Circuit breaker tuning, shared by all providers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Seconds an open circuit waits before allowing a half-open trial.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            failure_threshold: 5,
            cooldown_secs: 60,
        }
    }
}

/// Response cache tuning.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_secs: 3600,
            max_entries: 1024,
        }
    }
}

/// Request-path deadlines.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LimitsConfig {
    /// Outer deadline for one generate call, fallback included.
    pub request_deadline_secs: u64,
    /// Default per-adapter call timeout.
    pub adapter_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            request_deadline_secs: 30,
            adapter_timeout_secs: 20,
        }
    }
}

/// An active A/B routing experiment. Users hash deterministically into one
/// of two ordering variants while this is enabled.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
