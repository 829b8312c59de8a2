//! # Deduplicator
//!
//! Per type, collapses records with identical digests into one canonical
//! reference. The first-encountered record id (in document order) wins;
//! later duplicates are dropped, not merged. Types own disjoint state, so
//! the per-type collection fans out without locking.

use crate::digest::Digest;
use crate::hash::DigestTable;
use crate::par;
use crate::types::{NormError, RecordId};
use std::collections::BTreeMap;

// =============================================================================
// CANONICAL REFERENCE
// =============================================================================

/// One deduplicated, digest-identified representative of a type's unique
/// content. Created here; assigned its final address during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibRef {
    /// The record id the representative was derived from.
    pub source_id: RecordId,
    /// Stable digest string (base64).
    pub digest_str: String,
    /// 31-bit digest summary for bucketing.
    pub summary: u32,
}

/// Per-type dedup tables: uppercased type name -> digest string -> LibRef.
pub type DedupTables = BTreeMap<String, BTreeMap<String, LibRef>>;

/// Build dedup tables for every type.
///
/// `type_ids` must list each type's record ids in document order; that order
/// is the documented first-seen tie-break.
pub fn collect_unique(
    type_ids: &BTreeMap<String, Vec<RecordId>>,
    table: &DigestTable,
    workers: usize,
) -> Result<DedupTables, NormError> {
    let types: Vec<&String> = type_ids.keys().collect();

    let per_type = par::run_indexed(types.len(), workers, |t| {
        let mut unique: BTreeMap<String, LibRef> = BTreeMap::new();
        for &id in &type_ids[types[t]] {
            let digest: &Digest = table.get(id).ok_or(NormError::MissingRecord(id))?;
            let digest_str = digest.to_base64();
            unique.entry(digest_str.clone()).or_insert_with(|| LibRef {
                source_id: id,
                digest_str,
                summary: digest.summary(),
            });
        }
        Ok::<_, NormError>(unique)
    });

    let mut out = DedupTables::new();
    for (t, result) in per_type.into_iter().enumerate() {
        out.insert(types[t].clone(), result?);
    }
    Ok(out)
}

// =============================================================================
// TESTS
// =============================================================================
