//! # stepnorm CLI Module
//!
//! This module implements the CLI interface for stepnorm.
//!
//! ## Available Commands
//!
//! - `normalize` - Normalize a model dump to canonical STEP text
//! - `rules` - Write the built-in IFC rule set as a TOML file

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// stepnorm - Deterministic STEP/IFC Normalizer
///
/// Produces a canonical rendition of a STEP exchange document whose bytes
/// depend only on the document's content: input identifiers, record order
/// and duplicated subgraphs all wash out.
#[derive(Parser, Debug)]
#[command(name = "stepnorm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Normalize a model dump to canonical STEP text
    Normalize {
        /// Path to the input model dump (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Output path (defaults to `<input>.norm.ifc`)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Chunk level, 3..=9 (higher = more, smaller chunks)
        #[arg(short, long, default_value = "5")]
        level: u8,

        /// Chunk over-provisioning factor, >= 1.0
        #[arg(short, long, default_value = "2.0")]
        spare: f64,

        /// Fan work out over all available cores
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        parallel: bool,

        /// Round per-type chunk counts up to the next power of two
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        exp_chunk_count: bool,

        /// Keep owner-history references in the output
        #[arg(long)]
        keep_history: bool,

        /// Emit segment markers between chunk blocks
        #[arg(long)]
        segment: bool,

        /// Path to a TOML rule file (defaults to the built-in IFC rules)
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Print a machine-readable JSON summary to stdout
        #[arg(long)]
        json: bool,
    },

    /// Write the built-in IFC rule set as a TOML file
    Rules {
        /// Output path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// =============================================================================
// COMMAND DISPATCH
// =============================================================================

/// Execute a parsed CLI invocation.
pub fn execute(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Commands::Normalize {
            input,
            output,
            level,
            spare,
            parallel,
            exp_chunk_count,
            keep_history,
            segment,
            rules,
            json,
        } => cmd_normalize(&NormalizeArgs {
            input,
            output,
            level,
            spare,
            parallel,
            exp_chunk_count,
            keep_history,
            segment,
            rules,
            json,
        }),
        Commands::Rules { output } => cmd_rules(output.as_deref()),
    }
}
