//! `oxigate status` — show configuration and provider status.
//!
//! Shows the config path, budget policy, breaker/cache/limit tuning, and
//! one row per configured provider (priority, model, ceilings, key).

use anyhow::Result;
use colored::Colorize;

use oxigate_core::config::{get_config_path, load_config, CeilingSet};

use crate::helpers::format_dollars;

/// Run the status command.
pub fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();

    println!();
    println!("{}", "Oxigate Status".cyan().bold());
    println!();

    let config_exists = config_path.exists();
    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_exists {
            "✓".green().to_string()
        } else {
            "(not found)".red().to_string()
        }
    );

    println!(
        "  {:<18} global {} | alerts at {}% | enforcement {}",
        "Budget:".bold(),
        format_ceilings(&config.budget.global),
        config.budget.alert_threshold_pct,
        if config.budget.auto_disable {
            "on".green().to_string()
        } else {
            "off".yellow().to_string()
        }
    );

    println!(
        "  {:<18} {} failures open the circuit, {}s cool-down",
        "Breaker:".bold(),
        config.breaker.failure_threshold,
        config.breaker.cooldown_secs
    );

    println!(
        "  {:<18} ttl {}s, {} entries max",
        "Cache:".bold(),
        config.cache.ttl_secs,
        config.cache.max_entries
    );

    println!(
        "  {:<18} request {}s, adapter call {}s",
        "Deadlines:".bold(),
        config.limits.request_deadline_secs,
        config.limits.adapter_timeout_secs
    );

    if let Some(experiment) = &config.experiment {
        println!(
            "  {:<18} {} ({})",
            "Experiment:".bold(),
            experiment.name,
            if experiment.enabled {
                "active".green().to_string()
            } else {
                "inactive".dimmed().to_string()
            }
        );
    }

    println!();
    println!("  {}", "Providers:".bold());
    if config.providers.is_empty() {
        println!("    {}", "none configured".dimmed());
    }

    let mut providers = config.providers.clone();
    providers.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.name.cmp(&b.name)));

    for provider in &providers {
        let enabled = if provider.enabled {
            format!("p{}", provider.priority).green().to_string()
        } else {
            "disabled".red().to_string()
        };
        let key = if provider.api_key.is_empty() {
            "· no key".dimmed().to_string()
        } else {
            format!("{} key set", "✓".green())
        };
        println!(
            "    {:<14} {:<10} {:<22} {:<24} {}",
            provider.name,
            enabled,
            provider.model,
            format_ceilings(&provider.ceilings),
            key
        );
    }

    println!();
    Ok(())
}

fn format_ceilings(ceilings: &CeilingSet) -> String {
    let mut parts = Vec::new();
    if let Some(daily) = ceilings.daily {
        parts.push(format!("{}/day", format_dollars(daily)));
    }
    if let Some(weekly) = ceilings.weekly {
        parts.push(format!("{}/week", format_dollars(weekly)));
    }
    if let Some(monthly) = ceilings.monthly {
        parts.push(format!("{}/month", format_dollars(monthly)));
    }
    if parts.is_empty() {
        "no ceilings".to_string()
    } else {
        parts.join(", ")
    }
}
