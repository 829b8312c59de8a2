//! # Dispatcher
//!
//! Routes each unique entity to a physical chunk and then to a final address
//! inside it. Routing keys off the digest summary in both phases, so the same
//! content always lands at the same address for a given chunk plan.

use crate::chunk::ChunkPlan;
use crate::dedup::{DedupTables, LibRef};
use crate::par;
use crate::types::NormError;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// PLACEMENT
// =============================================================================

/// A unique entity pinned to its final output address.
#[derive(Debug, Clone)]
pub struct PlacedRef {
    /// Global address: `chunk_index * capacity + slot`.
    pub address: u64,
    pub lib: LibRef,
}

/// The complete placement for one run.
#[derive(Debug, Clone, Default)]
pub struct Dispatch {
    /// Chunk index -> placed entities, ascending by address.
    pub chunks: BTreeMap<u32, Vec<PlacedRef>>,
    /// Type -> digest string -> address, for reference rewriting.
    pub address_of: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Route every unique entity into the chunk plan.
///
/// Phase one spreads a type's entities across its chunks by
/// `summary % chunk_count`, overflowing round-robin to the next chunk when
/// one fills up. Phase two places each entity inside its chunk at
/// `summary % capacity`, linearly probing past occupied slots. Both phases
/// walk entities in `(summary, digest)` order.
pub fn dispatch(
    tables: &DedupTables,
    plan: &ChunkPlan,
    workers: usize,
) -> Result<Dispatch, NormError> {
    let types: Vec<&String> = tables.keys().collect();
    let routed: Vec<Result<Vec<(u32, Vec<LibRef>)>, NormError>> =
        par::run_indexed(types.len(), workers, |t| {
            route_one_type(types[t], &tables[types[t]], plan)
        });

    let mut per_chunk: BTreeMap<u32, Vec<LibRef>> = BTreeMap::new();
    for result in routed {
        for (chunk, refs) in result? {
            per_chunk.insert(chunk, refs);
        }
    }

    let chunk_indices: Vec<u32> = per_chunk.keys().copied().collect();
    let placed: Vec<Result<Vec<PlacedRef>, NormError>> =
        par::run_indexed(chunk_indices.len(), workers, |c| {
            let chunk = chunk_indices[c];
            place_one_chunk(chunk, &per_chunk[&chunk], plan.capacity)
        });

    let mut out = Dispatch::default();
    for (chunk, result) in chunk_indices.into_iter().zip(placed) {
        let refs = result?;
        let type_name = &plan.chunk_type[&chunk];
        let addresses = out.address_of.entry(type_name.clone()).or_default();
        for placed_ref in &refs {
            addresses.insert(placed_ref.lib.digest_str.clone(), placed_ref.address);
        }
        out.chunks.insert(chunk, refs);
    }
    Ok(out)
}

/// Phase one for one type: assign each entity a physical chunk.
fn route_one_type(
    type_name: &str,
    entities: &BTreeMap<String, LibRef>,
    plan: &ChunkPlan,
) -> Result<Vec<(u32, Vec<LibRef>)>, NormError> {
    let Some(chunks) = plan.type_chunks.get(type_name) else {
        return Err(NormError::UnknownType(type_name.to_string()));
    };

    let mut refs: Vec<&LibRef> = entities.values().collect();
    refs.sort_by(|x, y| {
        (x.summary, &x.digest_str).cmp(&(y.summary, &y.digest_str))
    });

    let count = chunks.len();
    let mut routed: Vec<Vec<LibRef>> = vec![Vec::new(); count];
    if count == 1 {
        routed[0] = refs.into_iter().cloned().collect();
    } else {
        for lib in refs {
            let start = lib.summary as usize % count;
            let mut offset = 0;
            loop {
                if offset == count {
                    return Err(NormError::ChunkOverflow(type_name.to_string()));
                }
                let slot = (start + offset) % count;
                if routed[slot].len() < plan.capacity {
                    routed[slot].push(lib.clone());
                    break;
                }
                offset += 1;
            }
        }
    }

    Ok(chunks.iter().copied().zip(routed).collect())
}

/// Phase two for one chunk: assign each routed entity a slot.
fn place_one_chunk(
    chunk: u32,
    refs: &[LibRef],
    capacity: usize,
) -> Result<Vec<PlacedRef>, NormError> {
    if refs.len() > capacity {
        return Err(NormError::ChunkOverflow(format!("chunk {chunk}")));
    }

    let base = u64::from(chunk) * capacity as u64;
    let mut used: BTreeSet<usize> = BTreeSet::new();
    let mut placed = Vec::with_capacity(refs.len());
    for lib in refs {
        let mut slot = lib.summary as usize % capacity;
        while !used.insert(slot) {
            slot = (slot + 1) % capacity;
        }
        placed.push(PlacedRef {
            address: base + slot as u64,
            lib: lib.clone(),
        });
    }
    placed.sort_by_key(|p| p.address);
    Ok(placed)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::allocate;
    use crate::digest::Digest;
    use crate::types::RecordId;

    fn lib(id: i64, payload: &[u8]) -> LibRef {
        let digest = Digest::of(payload);
        LibRef {
            source_id: RecordId(id),
            digest_str: digest.to_base64(),
            summary: digest.summary(),
        }
    }

    fn tables(type_name: &str, refs: Vec<LibRef>) -> DedupTables {
        let mut inner = BTreeMap::new();
        for r in refs {
            inner.insert(r.digest_str.clone(), r);
        }
        BTreeMap::from([(type_name.to_string(), inner)])
    }

    #[test]
    fn addresses_are_within_owned_chunks() {
        let refs: Vec<LibRef> = (0..200)
            .map(|i| lib(i, format!("payload-{i}").as_bytes()))
            .collect();
        let plan = allocate(
            &BTreeMap::from([("IFCWALL".to_string(), 200)]),
            9,
            2.0,
            true,
        )
        .expect("plan");
        let owned: BTreeSet<u32> = plan.type_chunks["IFCWALL"].iter().copied().collect();

        let out = dispatch(&tables("IFCWALL", refs), &plan, 1).expect("dispatch");
        for (&chunk, placed) in &out.chunks {
            assert!(owned.contains(&chunk));
            for p in placed {
                let base = u64::from(chunk) * plan.capacity as u64;
                assert!(p.address >= base && p.address < base + plan.capacity as u64);
            }
        }
    }

    #[test]
    fn addresses_are_unique_and_sorted() {
        let refs: Vec<LibRef> = (0..500)
            .map(|i| lib(i, format!("entity-{i}").as_bytes()))
            .collect();
        let plan = allocate(
            &BTreeMap::from([("IFCDOOR".to_string(), 500)]),
            9,
            2.0,
            true,
        )
        .expect("plan");

        let out = dispatch(&tables("IFCDOOR", refs), &plan, 1).expect("dispatch");
        let mut all: Vec<u64> = Vec::new();
        for placed in out.chunks.values() {
            assert!(placed.windows(2).all(|w| w[0].address < w[1].address));
            all.extend(placed.iter().map(|p| p.address));
        }
        assert_eq!(all.len(), 500);
        let distinct: BTreeSet<u64> = all.iter().copied().collect();
        assert_eq!(distinct.len(), 500);
        assert_eq!(out.address_of["IFCDOOR"].len(), 500);
    }

    #[test]
    fn parallel_matches_serial() {
        let mut all = DedupTables::new();
        for t in 0..6 {
            let type_name = format!("IFCTYPE{t}");
            let refs: Vec<LibRef> = (0..50)
                .map(|i| lib(i, format!("{type_name}:{i}").as_bytes()))
                .collect();
            all.extend(tables(&type_name, refs));
        }
        let counts: BTreeMap<String, usize> =
            all.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        let plan = allocate(&counts, 9, 2.0, true).expect("plan");

        let serial = dispatch(&all, &plan, 1).expect("serial");
        let parallel = dispatch(&all, &plan, 4).expect("parallel");
        assert_eq!(serial.address_of, parallel.address_of);
    }

    #[test]
    fn overflow_when_type_outgrows_its_chunks() {
        // Level 9 chunks hold 10 addresses; plan one chunk, then feed it 11.
        let plan = allocate(
            &BTreeMap::from([("IFCSLAB".to_string(), 10)]),
            9,
            1.0,
            false,
        )
        .expect("plan");
        assert_eq!(plan.type_chunks["IFCSLAB"].len(), 1);

        let refs: Vec<LibRef> = (0..11)
            .map(|i| lib(i, format!("slab-{i}").as_bytes()))
            .collect();
        assert!(matches!(
            dispatch(&tables("IFCSLAB", refs), &plan, 1),
            Err(NormError::ChunkOverflow(_))
        ));
    }

    #[test]
    fn unplanned_type_is_rejected() {
        let plan = allocate(
            &BTreeMap::from([("IFCWALL".to_string(), 1)]),
            5,
            2.0,
            true,
        )
        .expect("plan");
        let refs = vec![lib(1, b"door")];
        assert!(matches!(
            dispatch(&tables("IFCDOOR", refs), &plan, 1),
            Err(NormError::UnknownType(_))
        ));
    }
}
