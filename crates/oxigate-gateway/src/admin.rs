//! Administrative surface: validated configuration writes and read-only
//! usage/status queries.
//!
//! Everything here runs off the request path. Writes validate
//! synchronously and report [`ConfigError`] to the admin caller;
//! request-handling code never calls any of these.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use oxigate_adapters::HttpAdapter;
use oxigate_core::config::{CeilingSet, OxigateConfig, ProviderSettings, WindowKind};
use oxigate_core::ConfigError;

use crate::budget::BudgetAlert;
use crate::gateway::Gateway;
use crate::ledger::UsageSummary;

/// One row of provider status for dashboards and the CLI.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub name: String,
    pub model: String,
    pub priority: u32,
    pub enabled: bool,
    pub circuit: &'static str,
    pub spent_today: f64,
    pub daily_ceiling: Option<f64>,
}

impl Gateway {
    /// Insert a provider, or replace the entry with the same name. A new
    /// HTTP adapter is built from the settings.
    pub fn upsert_provider(&self, settings: ProviderSettings) -> Result<(), ConfigError> {
        settings.validate()?;
        self.register_adapter(Arc::new(HttpAdapter::new(&settings)));

        let mut config = self.write_config();
        match config.providers.iter_mut().find(|p| p.name == settings.name) {
            Some(existing) => *existing = settings,
            None => config.providers.push(settings),
        }
        Ok(())
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), ConfigError> {
        let mut config = self.write_config();
        let provider = find_provider(&mut config, name)?;
        provider.enabled = enabled;
        info!(provider = name, enabled, "Provider toggled");
        Ok(())
    }

    pub fn set_priority(&self, name: &str, priority: u32) -> Result<(), ConfigError> {
        if priority < 1 {
            return Err(ConfigError::InvalidPriority(priority));
        }
        let mut config = self.write_config();
        let provider = find_provider(&mut config, name)?;
        provider.priority = priority;
        Ok(())
    }

    pub fn set_provider_ceilings(
        &self,
        name: &str,
        ceilings: CeilingSet,
    ) -> Result<(), ConfigError> {
        ceilings.validate()?;
        let mut config = self.write_config();
        let provider = find_provider(&mut config, name)?;
        provider.ceilings = ceilings;
        Ok(())
    }

    pub fn set_global_ceilings(&self, ceilings: CeilingSet) -> Result<(), ConfigError> {
        ceilings.validate()?;
        self.write_config().budget.global = ceilings;
        Ok(())
    }

    pub fn set_alert_threshold_pct(&self, pct: f64) -> Result<(), ConfigError> {
        if pct <= 0.0 || pct > 100.0 {
            return Err(ConfigError::InvalidAlertThreshold(pct));
        }
        self.write_config().budget.alert_threshold_pct = pct;
        Ok(())
    }

    pub fn set_auto_disable(&self, auto_disable: bool) {
        self.write_config().budget.auto_disable = auto_disable;
        info!(auto_disable, "Budget enforcement toggled");
    }

    /// Copy of the live configuration (API keys are not serialized).
    pub fn config_snapshot(&self) -> OxigateConfig {
        self.shared_config()
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Per-provider status rows, sorted by (priority, name).
    pub fn provider_statuses(&self) -> Vec<ProviderStatus> {
        let config = self.config_snapshot();
        let mut rows: Vec<ProviderStatus> = config
            .providers
            .iter()
            .map(|p| ProviderStatus {
                name: p.name.clone(),
                model: p.model.clone(),
                priority: p.priority,
                enabled: p.enabled,
                circuit: self.breaker().state_label(&p.name),
                spent_today: self.budget().spent(Some(&p.name), WindowKind::Day),
                daily_ceiling: p.ceilings.daily,
            })
            .collect();
        rows.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.name.cmp(&b.name)));
        rows
    }

    /// Aggregated usage per provider, optionally since a cutoff.
    pub fn usage_summaries(&self, since: Option<DateTime<Utc>>) -> BTreeMap<String, UsageSummary> {
        self.ledger().summarize(since)
    }

    /// Subscribe to budget threshold alerts.
    pub fn subscribe_alerts(&self) -> tokio::sync::broadcast::Receiver<BudgetAlert> {
        self.budget().subscribe()
    }

    fn write_config(&self) -> std::sync::RwLockWriteGuard<'_, OxigateConfig> {
        self.shared_config()
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn find_provider<'a>(
    config: &'a mut OxigateConfig,
    name: &str,
) -> Result<&'a mut ProviderSettings, ConfigError> {
    config
        .providers
        .iter_mut()
        .find(|p| p.name == name)
        .ok_or_else(|| ConfigError::UnknownProvider(name.to_string()))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
