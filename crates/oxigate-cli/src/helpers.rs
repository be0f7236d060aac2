//! Output formatting helpers for the CLI.

use colored::Colorize;

use oxigate_core::types::{AttemptOutcome, GenerateResponse, UsageRecord};

/// Print a gateway response with a one-line provenance footer.
pub fn print_response(response: &GenerateResponse) {
    println!("{}", response.content);
    println!();

    let provenance = if response.served_from_cache {
        format!("{} (cached)", response.provider_used).cyan()
    } else if response.provider_used == oxigate_core::FALLBACK_PROVIDER {
        response.provider_used.clone().yellow()
    } else {
        response.provider_used.clone().green()
    };

    println!(
        "{} {} · {} in / {} out · {} · {}ms",
        "via".dimmed(),
        provenance,
        response.tokens_in,
        response.tokens_out,
        format_dollars(response.cost).dimmed(),
        response.latency_ms
    );
}

/// Print the per-attempt usage trail of one request.
pub fn print_trace(records: &[UsageRecord]) {
    println!();
    println!("{}", "Attempts:".bold());
    for record in records {
        let outcome = match record.outcome {
            AttemptOutcome::Success => record.outcome.as_str().green(),
            AttemptOutcome::Failure => record.outcome.as_str().red(),
            _ => record.outcome.as_str().yellow(),
        };
        println!(
            "  {:<12} {:<24} {:>8} {:>6}ms",
            record.provider,
            outcome,
            format_dollars(record.cost),
            record.latency_ms
        );
    }
}

/// Format a dollar amount with sub-cent precision.
pub fn format_dollars(amount: f64) -> String {
    format!("${amount:.4}")
}
