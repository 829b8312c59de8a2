//! # Inverse-Hash Augmenter
//!
//! For a configured set of (type, inverse attribute) pairs, folds the
//! digests of the records pointing back at a record into the record's own
//! digest, so that semantically-linked back-references participate in
//! identity. Runs after all forward hashing (it needs final forward
//! digests) and before deduplication.
//!
//! Overrides are computed per type against the un-augmented table and
//! applied in one deterministic merge afterwards; each type owns a disjoint
//! id set, so the fan-out needs no locking.

use crate::classify::TypeRules;
use crate::digest::Digest;
use crate::hash::{DigestTable, cmp_refs};
use crate::model::StepModel;
use crate::par;
use crate::types::{NormError, RecordId};
use std::collections::BTreeMap;

/// Augment the digest table in place.
///
/// Records with no inbound important references keep their forward digest
/// unchanged.
pub fn augment<M: StepModel + ?Sized>(
    model: &M,
    rules: &TypeRules,
    type_ids: &BTreeMap<String, Vec<RecordId>>,
    table: &mut DigestTable,
    workers: usize,
) -> Result<(), NormError> {
    let types: Vec<&String> = rules.important_inverse.keys().collect();

    // Shared reborrow for the fan-out; the merge below takes the table back
    // mutably once all workers are done.
    let snapshot: &DigestTable = table;
    let overrides = par::run_indexed(types.len(), workers, |t| {
        augment_one_type(model, rules, types[t], type_ids, snapshot)
    });

    for batch in overrides {
        for (id, digest) in batch? {
            table.set(id, digest);
        }
    }
    Ok(())
}

/// Compute digest overrides for every record of one augmented type.
fn augment_one_type<M: StepModel + ?Sized>(
    model: &M,
    rules: &TypeRules,
    type_name: &str,
    type_ids: &BTreeMap<String, Vec<RecordId>>,
    table: &DigestTable,
) -> Result<Vec<(RecordId, Digest)>, NormError> {
    let mut out = Vec::new();
    let Some(ids) = type_ids.get(type_name) else {
        // Configured type with no records in this document.
        return Ok(out);
    };
    let Some(attrs) = rules.important_inverse.get(type_name) else {
        return Ok(out);
    };

    for &id in ids {
        let base = table.get(id).ok_or(NormError::MissingRecord(id))?;
        let mut buf: Vec<u8> = base.bytes().to_vec();
        let mut changed = false;

        // BTreeSet iteration gives sorted attribute order.
        for attr in attrs {
            let inbound = model.inverse_ids(id, attr);
            if inbound.is_empty() {
                continue;
            }
            changed = true;

            let mut inbound: Vec<RecordId> = inbound.to_vec();
            inbound.sort_by(|&a, &b| cmp_refs(a, b, table));

            buf.push(b'|');
            buf.extend_from_slice(attr.as_bytes());
            buf.extend_from_slice(b":[");
            for inv_id in inbound {
                let digest = table.get(inv_id).ok_or(NormError::MissingRecord(inv_id))?;
                buf.extend_from_slice(digest.bytes());
                buf.push(b',');
            }
            buf.push(b']');
        }

        if changed {
            out.push((id, Digest::of(&buf)));
        }
    }
    Ok(out)
}

// =============================================================================
// TESTS
// =============================================================================
