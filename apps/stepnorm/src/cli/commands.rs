//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use std::path::{Path, PathBuf};
use std::time::Instant;
use stepnorm_core::{MemoryModel, NormError, NormOptions, Normalizer, RuleSet};
use thiserror::Error;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for model dumps (1 GB).
///
/// This prevents memory exhaustion from malicious or accidental large files.
const MAX_MODEL_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Maximum file size for rule files (1 MB).
const MAX_RULES_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// APP ERRORS
// =============================================================================

/// Errors surfaced by the CLI: engine failures plus file and parse issues.
#[derive(Debug, Error)]
pub enum AppError {
    /// Engine failure.
    #[error(transparent)]
    Norm(#[from] NormError),

    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The model dump is not valid JSON for a `MemoryModel`.
    #[error("model parse error: {0}")]
    ModelParse(#[from] serde_json::Error),

    /// The rule file is not valid TOML for a `RuleSet`.
    #[error("rules parse error: {0}")]
    RulesParse(#[from] toml::de::Error),

    /// The rule set could not be rendered as TOML.
    #[error("rules encode error: {0}")]
    RulesEncode(#[from] toml::ser::Error),

    /// A path failed validation before any read or write.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The offending path.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
}

/// Validate an input file path and its size before reading.
fn validate_input_file(path: &Path, max_size: u64) -> Result<PathBuf, AppError> {
    // Canonicalize resolves "..", symlinks, and validates existence.
    let canonical = path.canonicalize().map_err(|e| AppError::InvalidPath {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !canonical.is_file() {
        return Err(AppError::InvalidPath {
            path: path.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }
    let metadata = std::fs::metadata(&canonical)?;
    if metadata.len() > max_size {
        return Err(AppError::InvalidPath {
            path: path.to_path_buf(),
            reason: format!(
                "file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                max_size
            ),
        });
    }
    Ok(canonical)
}

/// Validate an output path: the parent directory must exist.
fn validate_output_file(path: &Path) -> Result<PathBuf, AppError> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let canonical_parent = match parent {
        Some(parent) => parent.canonicalize().map_err(|e| AppError::InvalidPath {
            path: path.to_path_buf(),
            reason: format!("invalid output directory: {e}"),
        })?,
        None => PathBuf::from("."),
    };
    let filename = path.file_name().ok_or_else(|| AppError::InvalidPath {
        path: path.to_path_buf(),
        reason: "output path has no filename".to_string(),
    })?;
    Ok(canonical_parent.join(filename))
}

// =============================================================================
// NORMALIZE COMMAND
// =============================================================================

/// Arguments of the `normalize` command.
#[derive(Debug, Clone)]
pub struct NormalizeArgs {
    /// Input model dump (JSON).
    pub input: PathBuf,
    /// Output path; `<input>.norm.ifc` when absent.
    pub output: Option<PathBuf>,
    /// Chunk level.
    pub level: u8,
    /// Spare rate.
    pub spare: f64,
    /// Parallel fan-out.
    pub parallel: bool,
    /// Power-of-two chunk counts.
    pub exp_chunk_count: bool,
    /// Keep owner-history references.
    pub keep_history: bool,
    /// Emit segment markers.
    pub segment: bool,
    /// Optional TOML rule file.
    pub rules: Option<PathBuf>,
    /// Print a JSON summary to stdout.
    pub json: bool,
}

/// Normalize a model dump and write the canonical STEP text.
pub fn cmd_normalize(args: &NormalizeArgs) -> Result<(), AppError> {
    let input = validate_input_file(&args.input, MAX_MODEL_FILE_SIZE)?;
    let output = match &args.output {
        Some(path) => validate_output_file(path)?,
        None => input.with_extension("norm.ifc"),
    };

    let rules = match &args.rules {
        Some(path) => {
            let path = validate_input_file(path, MAX_RULES_FILE_SIZE)?;
            let text = std::fs::read_to_string(&path)?;
            toml::from_str::<RuleSet>(&text)?
        }
        None => RuleSet::ifc_default(),
    };

    let options = NormOptions {
        chunk_level: args.level,
        spare_rate: args.spare,
        parallel: args.parallel,
        exp_chunk_count: args.exp_chunk_count,
        remove_history: !args.keep_history,
        segment_markers: args.segment,
    };
    let normalizer = Normalizer::new(options, rules)?;

    let started = Instant::now();
    let text = std::fs::read_to_string(&input)?;
    let mut model: MemoryModel = serde_json::from_str(&text)?;
    tracing::info!(
        records = model.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "model loaded"
    );

    let run_started = Instant::now();
    let outcome = normalizer.run(&mut model)?;
    tracing::info!(
        records_in = outcome.records_in,
        unique_out = outcome.unique_out,
        chunks_used = outcome.chunks_used,
        elapsed_ms = run_started.elapsed().as_millis() as u64,
        "normalization complete"
    );

    std::fs::write(&output, &outcome.output)?;
    tracing::info!(output = %output.display(), bytes = outcome.output.len(), "output written");

    if args.json {
        let summary = serde_json::json!({
            "input": input,
            "output": output,
            "records_in": outcome.records_in,
            "unique_out": outcome.unique_out,
            "chunks_used": outcome.chunks_used,
            "bytes": outcome.output.len(),
            "elapsed_ms": started.elapsed().as_millis() as u64,
        });
        println!("{summary}");
    } else {
        println!(
            "Normalized {} records into {} unique entities across {} chunks.",
            outcome.records_in, outcome.unique_out, outcome.chunks_used
        );
        println!("Output: {}", output.display());
    }

    Ok(())
}

// =============================================================================
// RULES COMMAND
// =============================================================================

/// Write the built-in IFC rule set as TOML, to a file or stdout.
pub fn cmd_rules(output: Option<&Path>) -> Result<(), AppError> {
    let text = toml::to_string_pretty(&RuleSet::ifc_default())?;
    match output {
        Some(path) => {
            let path = validate_output_file(path)?;
            std::fs::write(&path, &text)?;
            println!("Rules written to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
