//! Oxigate CLI — entry point.
//!
//! # Commands
//!
//! - `oxigate generate -u USER -t TASK PROMPT` — send one request through
//!   the gateway and print the response (`--trace` adds the per-attempt
//!   usage trail)
//! - `oxigate status` — show configuration and provider status

mod helpers;
mod status;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;

use oxigate_core::config::load_config;
use oxigate_core::types::{ChatTurn, GenerateRequest, TaskPayload};
use oxigate_core::TaskKind;
use oxigate_gateway::Gateway;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Oxigate — multi-provider LLM gateway with budgets and fallback
#[derive(Parser)]
#[command(name = "oxigate", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one request through the gateway
    Generate {
        /// The prompt (or chat message / analysis content)
        prompt: String,

        /// User identifier (drives A/B assignment)
        #[arg(short, long, default_value = "cli")]
        user: String,

        /// Task kind: chat, generation, or analysis
        #[arg(short, long, default_value = "chat")]
        task: String,

        /// Context hints (repeatable), matched against provider specialties
        #[arg(long = "hint")]
        hints: Vec<String>,

        /// Maximum tokens to generate
        #[arg(long, default_value_t = 1024)]
        max_tokens: u32,

        /// Print the per-attempt usage trail after the response
        #[arg(long, default_value_t = false)]
        trace: bool,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Show configuration and provider status
    Status,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            prompt,
            user,
            task,
            hints,
            max_tokens,
            trace,
            logs,
        } => {
            init_logging(logs);
            run_generate(prompt, user, task, hints, max_tokens, trace).await
        }
        Commands::Status => {
            init_logging(false);
            status::run()
        }
    }
}

// ─────────────────────────────────────────────
// Generate command
// ─────────────────────────────────────────────

async fn run_generate(
    prompt: String,
    user: String,
    task: String,
    hints: Vec<String>,
    max_tokens: u32,
    trace: bool,
) -> Result<()> {
    let task_kind: TaskKind = task.parse()?;
    let config = load_config(None);
    if let Err(e) = config.validate() {
        warn!("Configuration problem: {}", e);
    }

    let gateway = Gateway::new(config);

    let payload = match task_kind {
        TaskKind::Chat => TaskPayload::Chat {
            messages: vec![ChatTurn::user(prompt)],
        },
        TaskKind::Generation => TaskPayload::Generation { prompt },
        TaskKind::Analysis => TaskPayload::Analysis {
            content: prompt,
            focus: None,
        },
    };

    let request = GenerateRequest::new(user, payload, max_tokens).with_hints(hints);
    let request_id = request.id.clone();

    let response = gateway.handle(request).await?;
    helpers::print_response(&response);

    if trace {
        gateway.ledger().flush().await;
        let records: Vec<_> = gateway
            .ledger()
            .snapshot()
            .into_iter()
            .filter(|r| r.request_id == request_id)
            .collect();
        helpers::print_trace(&records);
    }

    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("oxigate=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
