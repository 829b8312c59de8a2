//! # stepnorm-core
//!
//! The deterministic STEP normalization engine - THE LOGIC.
//!
//! This crate turns a parsed STEP/IFC exchange document into a canonical
//! rendition whose bytes depend only on the document's content: identifiers,
//! record order and duplicated subgraphs from the source all wash out.
//!
//! ## Pipeline
//!
//! - `classify` — expand configured type rules through the schema
//! - `level` — dependency-level the reference graph
//! - `hash` — canonical encoding + content digests, Merkle-style
//! - `inverse` — fold important inbound references into digests
//! - `dedup` — collapse digest-identical records per type
//! - `chunk` / `dispatch` — plan the address space and place entities
//! - `output` — re-serialize with rewritten references
//!
//! ## Architectural Constraints
//!
//! - Deterministic: `BTreeMap`/`BTreeSet` everywhere state is iterated;
//!   parallel stages merge worker results in a fixed order
//! - Single pass, fail-fast: any stage error aborts the run
//! - The document model is read-only to the engine; substitutions are
//!   transient overlays, never mutations
//! - NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod chunk;
pub mod classify;
pub mod dedup;
pub mod digest;
pub mod dispatch;
pub mod engine;
pub mod hash;
pub mod inverse;
pub mod level;
pub mod model;
pub mod output;
pub mod par;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Argument, NormError, Record, RecordId, format_step_float};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use classify::{RuleSet, TypeRules};
pub use digest::{Digest, stable_code};
pub use engine::{NormOptions, NormOutcome, Normalizer};
pub use model::{ArgInfo, EntityDef, InverseDef, MemoryModel, StepModel};

// =============================================================================
// RE-EXPORTS: Address Space
// =============================================================================

pub use chunk::{ChunkLevel, ChunkPlan, level_table};
pub use dedup::{DedupTables, LibRef};
pub use dispatch::{Dispatch, PlacedRef};
