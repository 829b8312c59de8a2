//! # Content Hasher
//!
//! Produces, for every record, a digest of its canonical byte encoding.
//! References encode as the referenced record's digest bytes, so a digest
//! transitively covers everything the record depends on (Merkle-style) and
//! is invariant to input ordering and input identifier numbering.
//!
//! Records are hashed in ascending level order; within a level the work fans
//! out over fixed-size id groups. Same-level records never reference each
//! other, so each group only reads digests of strictly lower levels and the
//! per-level merge is race-free and deterministic.
//!
//! Identity/history fields of configured types are not mutated out of the
//! record: the encoder substitutes a placeholder byte through an overlay,
//! leaving the document model untouched.

use crate::classify::TypeRules;
use crate::digest::Digest;
use crate::level::Levels;
use crate::model::StepModel;
use crate::par;
use crate::types::{Argument, NormError, Record, RecordId};
use std::cmp::Ordering;

/// Ids hashed per parallel work item.
const GROUP_SIZE: usize = 1000;

/// Placeholder byte encoded for substituted identity/history positions.
const PLACEHOLDER: u8 = b'$';

// =============================================================================
// DIGEST TABLE
// =============================================================================

/// Per-record digest storage, indexed by record id.
///
/// Each slot is written exactly once during hashing (and at most once more
/// by the inverse augmenter); all later stages read it immutably.
#[derive(Debug, Clone)]
pub struct DigestTable {
    slots: Vec<Option<Digest>>,
}

impl DigestTable {
    pub(crate) fn new(max_id: i64) -> Self {
        let len = usize::try_from(max_id.max(0)).unwrap_or(0) + 1;
        Self {
            slots: vec![None; len],
        }
    }

    /// The digest of a record, if it has been hashed.
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&Digest> {
        let index = usize::try_from(id.0).ok()?;
        self.slots.get(index)?.as_ref()
    }

    pub(crate) fn set(&mut self, id: RecordId, digest: Digest) {
        if let Ok(index) = usize::try_from(id.0) {
            if let Some(slot) = self.slots.get_mut(index) {
                *slot = Some(digest);
            }
        }
    }
}

// =============================================================================
// CANONICAL TOTAL ORDER
// =============================================================================

/// Compare two references by content: digest summary first, then digest
/// bytes. Unhashed references sort first (they cannot occur for valid
/// lower-level targets).
pub(crate) fn cmp_refs(x: RecordId, y: RecordId, table: &DigestTable) -> Ordering {
    table.get(x).cmp(&table.get(y))
}

/// The canonical total order over set elements: references by content
/// digest, numbers numerically, strings lexically, anything else by its
/// STEP text form.
pub(crate) fn cmp_args(a: &Argument, b: &Argument, table: &DigestTable) -> Ordering {
    match (a, b) {
        (Argument::Ref(x), Argument::Ref(y)) => cmp_refs(*x, *y, table),
        (Argument::Int(x), Argument::Int(y)) => x.cmp(y),
        (Argument::Float(x), Argument::Float(y)) => x.total_cmp(y),
        (Argument::Str(x), Argument::Str(y)) => x.cmp(y),
        _ => a.to_step_text().cmp(&b.to_step_text()),
    }
}

// =============================================================================
// CANONICAL ENCODING
// =============================================================================

/// Encode one record to its canonical byte form.
///
/// Layout: type name, `(`, arguments joined by `,`, `)`, `;`. Substituted
/// identity/history positions encode as a single placeholder byte; list
/// arguments at unordered-set positions are encoded in canonical element
/// order.
fn encode_record(
    record: &Record,
    rules: &TypeRules,
    table: &DigestTable,
) -> Result<Vec<u8>, NormError> {
    let ignore_identity = rules.identity_ignore.contains(&record.type_name);
    let ignore_history = rules.history_ignore.contains(&record.type_name)
        && matches!(record.args.get(1), Some(Argument::Ref(_)));
    let unordered = rules.unordered_sets.get(&record.type_name);

    let mut content = Vec::with_capacity(1024);
    content.extend_from_slice(record.type_name.as_bytes());
    content.push(b'(');
    for (index, arg) in record.args.iter().enumerate() {
        if index > 0 {
            content.push(b',');
        }
        if (index == 0 && ignore_identity) || (index == 1 && ignore_history) {
            content.push(PLACEHOLDER);
            continue;
        }
        match arg {
            Argument::List { name, items }
                if unordered.is_some_and(|positions| positions.contains(&index)) =>
            {
                let mut ordered: Vec<&Argument> = items.iter().collect();
                ordered.sort_by(|a, b| cmp_args(a, b, table));
                encode_list(&mut content, name.as_deref(), &ordered, table)?;
            }
            _ => encode_arg(&mut content, arg, table)?,
        }
    }
    content.push(b')');
    content.push(b';');
    Ok(content)
}

fn encode_list(
    content: &mut Vec<u8>,
    name: Option<&str>,
    items: &[&Argument],
    table: &DigestTable,
) -> Result<(), NormError> {
    if let Some(name) = name {
        content.extend_from_slice(name.as_bytes());
    }
    content.push(b'(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            content.push(b',');
        }
        encode_arg(content, item, table)?;
    }
    content.push(b')');
    Ok(())
}

fn encode_arg(
    content: &mut Vec<u8>,
    arg: &Argument,
    table: &DigestTable,
) -> Result<(), NormError> {
    match arg {
        Argument::Ref(id) => {
            let digest = table.get(*id).ok_or(NormError::MissingRecord(*id))?;
            content.extend_from_slice(digest.bytes());
        }
        Argument::List { name, items } => {
            let ordered: Vec<&Argument> = items.iter().collect();
            encode_list(content, name.as_deref(), &ordered, table)?;
        }
        Argument::Int(v) => content.extend_from_slice(&v.to_le_bytes()),
        Argument::Float(v) => content.extend_from_slice(&v.to_le_bytes()),
        Argument::Str(s) | Argument::Enum(s) => content.extend_from_slice(s.as_bytes()),
        Argument::Logical(v) => content.push(match v {
            Some(true) => b'T',
            Some(false) => b'F',
            None => b'U',
        }),
        Argument::Binary(bytes) => content.extend_from_slice(bytes),
        Argument::NotProvided => content.push(b'$'),
        Argument::Override => content.push(b'*'),
    }
    Ok(())
}

/// Digest one record's canonical encoding.
pub(crate) fn digest_record(
    record: &Record,
    rules: &TypeRules,
    table: &DigestTable,
) -> Result<Digest, NormError> {
    Ok(Digest::of(&encode_record(record, rules, table)?))
}

// =============================================================================
// LEVEL-ORDER HASHING
// =============================================================================

/// Hash every record in ascending level order.
///
/// Each level fans out over groups of [`GROUP_SIZE`] ids; group results are
/// merged into the table in group order before the next level starts.
pub fn hash_all<M: StepModel + ?Sized>(
    model: &M,
    rules: &TypeRules,
    levels: &Levels,
    workers: usize,
) -> Result<DigestTable, NormError> {
    let max_id = model.ids().iter().map(|id| id.0).max().unwrap_or(0);
    let mut table = DigestTable::new(max_id);

    for ids in levels.by_level.values() {
        let groups: Vec<&[RecordId]> = ids.chunks(GROUP_SIZE).collect();
        let results = par::run_indexed(groups.len(), workers, |g| {
            let mut out = Vec::with_capacity(groups[g].len());
            for &id in groups[g] {
                let record = model.record(id)?;
                out.push((id, digest_record(record, rules, &table)?));
            }
            Ok::<_, NormError>(out)
        });
        for result in results {
            for (id, digest) in result? {
                table.set(id, digest);
            }
        }
    }

    Ok(table)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::compute_levels;
    use crate::model::{EntityDef, MemoryModel};
    use crate::types::Record;
    use std::collections::BTreeSet;

    fn plain_model(records: Vec<Record>) -> MemoryModel {
        let mut model = MemoryModel::new("");
        model.define_type("IfcNode", EntityDef::default());
        model.define_type("IfcOther", EntityDef::default());
        for record in records {
            model.push(record).expect("push");
        }
        model
    }

    fn hash_model(model: &MemoryModel, rules: &TypeRules) -> DigestTable {
        let levels = compute_levels(model).expect("levels");
        hash_all(model, rules, &levels, 1).expect("hash")
    }

    #[test]
    fn identical_content_identical_digest() {
        let model = plain_model(vec![
            Record::new(RecordId(1), "IfcNode", vec![Argument::Int(7)]),
            Record::new(RecordId(9), "IfcNode", vec![Argument::Int(7)]),
            Record::new(RecordId(5), "IfcNode", vec![Argument::Int(8)]),
        ]);
        let table = hash_model(&model, &TypeRules::default());
        assert_eq!(table.get(RecordId(1)), table.get(RecordId(9)));
        assert_ne!(table.get(RecordId(1)), table.get(RecordId(5)));
    }

    #[test]
    fn type_name_participates_in_digest() {
        let model = plain_model(vec![
            Record::new(RecordId(1), "IfcNode", vec![Argument::Int(7)]),
            Record::new(RecordId(2), "IfcOther", vec![Argument::Int(7)]),
        ]);
        let table = hash_model(&model, &TypeRules::default());
        assert_ne!(table.get(RecordId(1)), table.get(RecordId(2)));
    }

    #[test]
    fn reference_embeds_target_digest_not_id() {
        // Two parents referencing structurally identical leaves with
        // different ids must hash identically.
        let model = plain_model(vec![
            Record::new(RecordId(1), "IfcNode", vec![Argument::Str("leaf".into())]),
            Record::new(RecordId(2), "IfcNode", vec![Argument::Str("leaf".into())]),
            Record::new(RecordId(3), "IfcOther", vec![Argument::Ref(RecordId(1))]),
            Record::new(RecordId(4), "IfcOther", vec![Argument::Ref(RecordId(2))]),
        ]);
        let table = hash_model(&model, &TypeRules::default());
        assert_eq!(table.get(RecordId(3)), table.get(RecordId(4)));
    }

    #[test]
    fn identity_ignore_erases_argument_zero() {
        let records = vec![
            Record::new(
                RecordId(1),
                "IfcNode",
                vec![Argument::Str("guid-a".into()), Argument::Int(1)],
            ),
            Record::new(
                RecordId(2),
                "IfcNode",
                vec![Argument::Str("guid-b".into()), Argument::Int(1)],
            ),
        ];
        let model = plain_model(records);

        let mut rules = TypeRules::default();
        rules.identity_ignore.insert("IFCNODE".into());
        let table = hash_model(&model, &rules);
        assert_eq!(table.get(RecordId(1)), table.get(RecordId(2)));

        let table_plain = hash_model(&model, &TypeRules::default());
        assert_ne!(table_plain.get(RecordId(1)), table_plain.get(RecordId(2)));
    }

    #[test]
    fn history_ignore_erases_argument_one_reference() {
        let model = plain_model(vec![
            Record::new(RecordId(1), "IfcOther", vec![Argument::Int(10)]),
            Record::new(RecordId(2), "IfcOther", vec![Argument::Int(20)]),
            Record::new(
                RecordId(3),
                "IfcNode",
                vec![Argument::Str("x".into()), Argument::Ref(RecordId(1))],
            ),
            Record::new(
                RecordId(4),
                "IfcNode",
                vec![Argument::Str("x".into()), Argument::Ref(RecordId(2))],
            ),
        ]);
        let mut rules = TypeRules::default();
        rules.history_ignore.insert("IFCNODE".into());
        let table = hash_model(&model, &rules);
        assert_eq!(table.get(RecordId(3)), table.get(RecordId(4)));
    }

    #[test]
    fn unordered_set_position_is_order_invariant() {
        let model = plain_model(vec![
            Record::new(
                RecordId(1),
                "IfcNode",
                vec![Argument::list(vec![
                    Argument::Int(3),
                    Argument::Int(1),
                    Argument::Int(2),
                ])],
            ),
            Record::new(
                RecordId(2),
                "IfcNode",
                vec![Argument::list(vec![
                    Argument::Int(1),
                    Argument::Int(2),
                    Argument::Int(3),
                ])],
            ),
        ]);

        let mut rules = TypeRules::default();
        rules
            .unordered_sets
            .insert("IFCNODE".into(), BTreeSet::from([0]));
        let table = hash_model(&model, &rules);
        assert_eq!(table.get(RecordId(1)), table.get(RecordId(2)));

        // Without the set rule, order matters.
        let table_plain = hash_model(&model, &TypeRules::default());
        assert_ne!(table_plain.get(RecordId(1)), table_plain.get(RecordId(2)));
    }

    #[test]
    fn parallel_hashing_matches_serial() {
        let records: Vec<Record> = (1..=40)
            .map(|i| {
                if i <= 20 {
                    Record::new(RecordId(i), "IfcNode", vec![Argument::Int(i % 5)])
                } else {
                    Record::new(RecordId(i), "IfcOther", vec![Argument::Ref(RecordId(i - 20))])
                }
            })
            .collect();
        let model = plain_model(records);
        let levels = compute_levels(&model).expect("levels");
        let rules = TypeRules::default();

        let serial = hash_all(&model, &rules, &levels, 1).expect("serial");
        let parallel = hash_all(&model, &rules, &levels, 4).expect("parallel");
        for i in 1..=40 {
            assert_eq!(serial.get(RecordId(i)), parallel.get(RecordId(i)));
        }
    }
}
