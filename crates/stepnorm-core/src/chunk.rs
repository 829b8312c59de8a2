//! # Chunk Allocator
//!
//! Plans the output address space: decides how many fixed-capacity address
//! chunks each type needs and assigns every type a deterministic,
//! collision-free set of physical chunk indices.
//!
//! Chunk indices come from hashing synthetic names `"{TYPE}_{i}"` into the
//! global chunk space and linearly probing past occupied slots. Names are
//! processed in lexical order, so the assignment is a pure function of the
//! type census and the configuration.

use crate::digest::stable_code;
use crate::types::NormError;
use std::collections::BTreeMap;

// =============================================================================
// CAPACITY LEVELS
// =============================================================================

/// One entry of the chunk-capacity lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLevel {
    /// Addresses per chunk.
    pub capacity: usize,
    /// Maximum chunks in the global address space.
    pub max_chunks: usize,
}

/// Static capacity table, keyed by chunk level 3..=9.
///
/// Lower levels mean fewer, larger chunks; `capacity * max_chunks` stays
/// within the 31-bit address budget at every level.
#[must_use]
pub const fn level_table(level: u8) -> Option<ChunkLevel> {
    match level {
        3 => Some(ChunkLevel { capacity: 10_000_000, max_chunks: 214 }),
        4 => Some(ChunkLevel { capacity: 1_000_000, max_chunks: 2_147 }),
        5 => Some(ChunkLevel { capacity: 100_000, max_chunks: 21_474 }),
        6 => Some(ChunkLevel { capacity: 10_000, max_chunks: 214_748 }),
        7 => Some(ChunkLevel { capacity: 1_000, max_chunks: 2_147_483 }),
        8 => Some(ChunkLevel { capacity: 100, max_chunks: 21_474_836 }),
        9 => Some(ChunkLevel { capacity: 10, max_chunks: 214_748_364 }),
        _ => None,
    }
}

// =============================================================================
// CHUNK PLAN
// =============================================================================

/// The fixed chunk-to-type assignment for one run.
#[derive(Debug, Clone, Default)]
pub struct ChunkPlan {
    /// Addresses per chunk at the configured level.
    pub capacity: usize,
    /// Physical chunk index -> owning type.
    pub chunk_type: BTreeMap<u32, String>,
    /// Owning type -> physical chunk indices, ascending.
    pub type_chunks: BTreeMap<String, Vec<u32>>,
}

/// Plan chunks for the given per-type unique-entity census.
///
/// Each type needs `ceil(unique * spare_rate / capacity)` chunks, optionally
/// rounded up to the next power of two. Fails with
/// [`NormError::CapacityExceeded`] when the total exceeds the level's
/// maximum chunk count.
pub fn allocate(
    unique_counts: &BTreeMap<String, usize>,
    level: u8,
    spare_rate: f64,
    exponential: bool,
) -> Result<ChunkPlan, NormError> {
    let table = level_table(level).ok_or(NormError::InvalidChunkLevel(level))?;

    let mut chunk_counts: BTreeMap<&String, usize> = BTreeMap::new();
    let mut total = 0usize;
    for (type_name, &unique) in unique_counts {
        let min_chunks = ((unique as f64) * spare_rate / (table.capacity as f64)).ceil() as usize;
        let min_chunks = min_chunks.max(1);
        let count = if exponential {
            min_chunks.next_power_of_two()
        } else {
            min_chunks
        };
        total += count;
        chunk_counts.insert(type_name, count);
    }

    if total > table.max_chunks {
        return Err(NormError::CapacityExceeded {
            required: total,
            max: table.max_chunks,
        });
    }

    // Synthetic names in lexical order make the probe sequence, and thus the
    // whole chunk map, input-order independent.
    let mut names: Vec<(String, &String)> = Vec::with_capacity(total);
    for (&type_name, &count) in &chunk_counts {
        for i in 0..count {
            names.push((format!("{type_name}_{i}"), type_name));
        }
    }
    names.sort();

    let mut plan = ChunkPlan {
        capacity: table.capacity,
        ..ChunkPlan::default()
    };
    let max = table.max_chunks as u32;
    for (name, type_name) in names {
        let mut index = stable_code(name.as_bytes()) % max;
        while plan.chunk_type.contains_key(&index) {
            index = (index + 1) % max;
        }
        plan.chunk_type.insert(index, (*type_name).clone());
        plan.type_chunks
            .entry((*type_name).clone())
            .or_default()
            .push(index);
    }
    for chunks in plan.type_chunks.values_mut() {
        chunks.sort_unstable();
    }

    Ok(plan)
}

// =============================================================================
// TESTS
// =============================================================================
