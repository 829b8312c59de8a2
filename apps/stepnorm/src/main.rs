//! # stepnorm - Deterministic STEP/IFC Normalizer
//!
//! The main binary for the stepnorm normalization engine.
//!
//! This application loads a parsed STEP document (a `MemoryModel` JSON
//! dump), runs the deterministic normalization pipeline and writes the
//! canonical STEP text.
//!
//! ## Usage
//!
//! ```bash
//! # Normalize a model dump with the built-in IFC rules
//! stepnorm normalize -i building.json
//!
//! # Custom rules, keep owner history, JSON summary on stdout
//! stepnorm normalize -i building.json --rules my-rules.toml --keep-history --json
//!
//! # Write the built-in rule set as a TOML starting point
//! stepnorm rules -o my-rules.toml
//! ```

use clap::Parser;
use stepnorm::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Initialize tracing — STEPNORM_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("STEPNORM_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stepnorm=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
