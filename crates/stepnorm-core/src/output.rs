//! # Serializer
//!
//! Renders the placed entities back to STEP text: header verbatim, one block
//! per chunk in ascending chunk index, footer. Every reference argument is
//! rewritten from its source record id to the final address of the target's
//! unique representative, so the output never mentions input identifiers.
//!
//! Identity-carrying types get a fresh identity derived from their own
//! content digest, which makes the identity itself deterministic. Chunk
//! blocks render in parallel and are concatenated in index order.

use crate::classify::TypeRules;
use crate::dispatch::{Dispatch, PlacedRef};
use crate::hash::{cmp_args, DigestTable};
use crate::model::StepModel;
use crate::par;
use crate::types::{Argument, NormError, RecordId};

/// STEP data-section footer.
const FOOTER: &str = "ENDSEC;\nEND-ISO-10303-21;\n";

/// Divider between chunk blocks when segment markers are enabled.
const SEGMENT_MARKER: &str = "/*========*/\n";

/// Base-64 digit set of the 22-character IFC GUID encoding.
const GUID_ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_$";

// =============================================================================
// ASSEMBLY
// =============================================================================

/// Serialize the full normalized document.
pub fn assemble<M: StepModel + ?Sized>(
    model: &M,
    rules: &TypeRules,
    table: &DigestTable,
    dispatch: &Dispatch,
    remove_history: bool,
    segment_markers: bool,
    workers: usize,
) -> Result<String, NormError> {
    let chunk_indices: Vec<u32> = dispatch.chunks.keys().copied().collect();
    let blocks: Vec<Result<String, NormError>> =
        par::run_indexed(chunk_indices.len(), workers, |c| {
            render_chunk(
                model,
                rules,
                table,
                dispatch,
                &dispatch.chunks[&chunk_indices[c]],
                remove_history,
            )
        });

    let mut out = String::with_capacity(model.header_text().len() + 64);
    out.push_str(model.header_text());
    out.push('\n');
    for block in blocks {
        if segment_markers {
            out.push_str(SEGMENT_MARKER);
        }
        out.push_str(&block?);
    }
    out.push_str(FOOTER);
    Ok(out)
}

/// Render one chunk's lines, already in ascending address order.
fn render_chunk<M: StepModel + ?Sized>(
    model: &M,
    rules: &TypeRules,
    table: &DigestTable,
    dispatch: &Dispatch,
    placed: &[PlacedRef],
    remove_history: bool,
) -> Result<String, NormError> {
    let mut out = String::with_capacity(placed.len() * 64);
    for p in placed {
        let record = model.record(p.lib.source_id)?;
        let substitute_identity = rules.identity_ignore.contains(&record.type_name);
        let substitute_history = remove_history
            && rules.history_ignore.contains(&record.type_name)
            && matches!(record.args.get(1), Some(Argument::Ref(_)));
        let unordered = rules.unordered_sets.get(&record.type_name);

        out.push('#');
        out.push_str(&p.address.to_string());
        out.push('=');
        out.push_str(&record.type_name);
        out.push('(');
        for (index, arg) in record.args.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            if index == 0 && substitute_identity {
                out.push('\'');
                out.push_str(&derived_identity(&p.lib.digest_str));
                out.push('\'');
                continue;
            }
            if index == 1 && substitute_history {
                out.push('$');
                continue;
            }
            match arg {
                Argument::List { name, items }
                    if unordered.is_some_and(|positions| positions.contains(&index)) =>
                {
                    let mut ordered: Vec<&Argument> = items.iter().collect();
                    ordered.sort_by(|a, b| cmp_args(a, b, table));
                    write_list(&mut out, model, table, dispatch, name.as_deref(), &ordered)?;
                }
                _ => write_arg(&mut out, model, table, dispatch, arg)?,
            }
        }
        out.push_str(");\n");
    }
    Ok(out)
}

// =============================================================================
// ARGUMENT REWRITING
// =============================================================================

/// Write one argument, rewriting references to final addresses.
fn write_arg<M: StepModel + ?Sized>(
    out: &mut String,
    model: &M,
    table: &DigestTable,
    dispatch: &Dispatch,
    arg: &Argument,
) -> Result<(), NormError> {
    match arg {
        Argument::Ref(id) => {
            out.push('#');
            out.push_str(&address_of(model, table, dispatch, *id)?.to_string());
            Ok(())
        }
        Argument::List { name, items } => {
            let ordered: Vec<&Argument> = items.iter().collect();
            write_list(out, model, table, dispatch, name.as_deref(), &ordered)
        }
        _ => {
            out.push_str(&arg.to_step_text());
            Ok(())
        }
    }
}

fn write_list<M: StepModel + ?Sized>(
    out: &mut String,
    model: &M,
    table: &DigestTable,
    dispatch: &Dispatch,
    name: Option<&str>,
    items: &[&Argument],
) -> Result<(), NormError> {
    if let Some(name) = name {
        out.push_str(&name.to_uppercase());
    }
    out.push('(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_arg(out, model, table, dispatch, item)?;
    }
    out.push(')');
    Ok(())
}

/// Final address of the unique representative a source record collapsed into.
fn address_of<M: StepModel + ?Sized>(
    model: &M,
    table: &DigestTable,
    dispatch: &Dispatch,
    id: RecordId,
) -> Result<u64, NormError> {
    let record = model.record(id)?;
    let digest = table.get(id).ok_or(NormError::MissingRecord(id))?;
    dispatch
        .address_of
        .get(&record.type_name)
        .and_then(|addresses| addresses.get(&digest.to_base64()))
        .copied()
        .ok_or(NormError::MissingRecord(id))
}

// =============================================================================
// DERIVED IDENTITY
// =============================================================================

/// Derive a fresh 22-character IFC GUID from a content digest string.
///
/// The first 128 bits of `blake3(digest_str)` are rendered big-endian in the
/// IFC base-64 alphabet, most significant digit first.
#[must_use]
pub fn derived_identity(digest_str: &str) -> String {
    let hash = blake3::hash(digest_str.as_bytes());
    let mut first_half = [0u8; 16];
    first_half.copy_from_slice(&hash.as_bytes()[..16]);
    let mut value = u128::from_be_bytes(first_half);

    let mut chars = [0u8; 22];
    for slot in chars.iter_mut().rev() {
        *slot = GUID_ALPHABET[(value & 0x3F) as usize];
        value >>= 6;
    }
    chars.iter().map(|&b| b as char).collect()
}

// =============================================================================
// TESTS
// =============================================================================
