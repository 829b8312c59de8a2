//! # Document Model Contract
//!
//! The engine consumes the source document exclusively through the
//! [`StepModel`] trait: record enumeration and lookup, the pre-formatted
//! header block, an inverse-reference index, and schema queries (subtype
//! hierarchy, attribute metadata). Parsing a concrete exchange format into
//! this shape is the job of an external loader.
//!
//! [`MemoryModel`] is the reference in-memory implementation. It is
//! serde-derived so a loader can hand a model across a process boundary as
//! a plain record-table dump, and it is what the tests and the CLI use.

use crate::types::{Argument, NormError, Record, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// SCHEMA METADATA
// =============================================================================

/// Metadata for one attribute of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgInfo {
    /// Zero-based argument position.
    pub index: usize,
    /// Attribute name.
    pub name: String,
    /// Whether the attribute is a collection.
    pub is_collection: bool,
    /// Collection kind (`SET`, `LIST`, ...) when `is_collection` is true.
    pub collection_kind: Option<String>,
}

/// Declaration of an inverse attribute: the owning type sees inbound
/// references that some other type holds through a forward argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InverseDef {
    /// Inverse attribute name on the owning type (e.g. `StyledByItem`).
    pub name: String,
    /// Type whose forward attribute realizes the relation.
    pub source_type: String,
    /// Forward argument position on `source_type`.
    pub source_arg: usize,
}

/// Schema entry for one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Direct subtype names.
    #[serde(default)]
    pub subtypes: Vec<String>,
    /// Ordered attribute metadata.
    #[serde(default)]
    pub args: Vec<ArgInfo>,
    /// Inverse attributes declared on this type.
    #[serde(default)]
    pub inverses: Vec<InverseDef>,
}

// =============================================================================
// STEPMODEL TRAIT
// =============================================================================

/// The document-model contract.
///
/// Everything the engine needs from a source document. Implementations must
/// be `Sync`: the hashing and serialization stages read the model from a
/// worker pool. The engine never writes through this trait — substitutions
/// are applied as transient overlays on the engine side.
pub trait StepModel: Sync {
    /// All record identifiers in document order.
    fn ids(&self) -> &[RecordId];

    /// Fetch a record by identifier.
    fn record(&self, id: RecordId) -> Result<&Record, NormError>;

    /// The source document's header block, pre-formatted.
    fn header_text(&self) -> &str;

    /// Build the inverse-reference index for the given
    /// `owning type -> inverse attribute names` pairs. Called once, before
    /// any `inverse_ids` query.
    fn build_inverse_index(&mut self, pairs: &BTreeMap<String, BTreeSet<String>>);

    /// Ids of records pointing at `id` through the named inverse attribute.
    fn inverse_ids(&self, id: RecordId, attr: &str) -> &[RecordId];

    /// All entity type names known to the schema.
    fn entity_types(&self) -> Vec<String>;

    /// Direct subtypes of a type, or `None` if the type is unknown.
    fn subtypes(&self, type_name: &str) -> Option<Vec<String>>;

    /// Ordered attribute metadata of a type, or `None` if unknown.
    fn arg_info(&self, type_name: &str) -> Option<Vec<ArgInfo>>;
}

// =============================================================================
// MEMORY MODEL
// =============================================================================

const NO_IDS: &[RecordId] = &[];

/// In-memory document model.
///
/// Records and schema tables are `BTreeMap`-backed for deterministic
/// iteration; the inverse index is rebuilt from the schema's `InverseDef`
/// declarations on demand and never serialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryModel {
    header: String,
    order: Vec<RecordId>,
    records: BTreeMap<RecordId, Record>,
    /// Schema keyed by uppercased type name.
    schema: BTreeMap<String, EntityDef>,
    #[serde(skip)]
    inverse: BTreeMap<(RecordId, String), Vec<RecordId>>,
}

impl MemoryModel {
    /// Create an empty model with the given header block.
    #[must_use]
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Self::default()
        }
    }

    /// Register a schema entry. The name is uppercased on the way in.
    pub fn define_type(&mut self, name: &str, def: EntityDef) {
        self.schema.insert(name.to_uppercase(), def);
    }

    /// Append a record, preserving document order.
    ///
    /// Returns [`NormError::UnknownType`] if the record's type has no schema
    /// entry, so that malformed dumps fail at load time rather than deep in
    /// the pipeline.
    pub fn push(&mut self, record: Record) -> Result<(), NormError> {
        if !self.schema.contains_key(&record.type_name) {
            return Err(NormError::UnknownType(record.type_name));
        }
        let id = record.id;
        if self.records.insert(id, record).is_none() {
            self.order.push(id);
        }
        Ok(())
    }

    /// Number of records in the model.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the model holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Collect `name` plus its transitive subtypes, uppercased.
    fn with_subtypes(&self, name: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut pending = vec![name.to_uppercase()];
        while let Some(current) = pending.pop() {
            if !out.insert(current.clone()) {
                continue;
            }
            if let Some(def) = self.schema.get(&current) {
                for sub in &def.subtypes {
                    pending.push(sub.to_uppercase());
                }
            }
        }
        out
    }
}

/// Collect every reference reachable in one argument, scanning nested lists.
fn ref_targets(arg: &Argument, out: &mut Vec<RecordId>) {
    match arg {
        Argument::Ref(id) => out.push(*id),
        Argument::List { items, .. } => {
            for item in items {
                ref_targets(item, out);
            }
        }
        _ => {}
    }
}

impl StepModel for MemoryModel {
    fn ids(&self) -> &[RecordId] {
        &self.order
    }

    fn record(&self, id: RecordId) -> Result<&Record, NormError> {
        self.records.get(&id).ok_or(NormError::MissingRecord(id))
    }

    fn header_text(&self) -> &str {
        &self.header
    }

    fn build_inverse_index(&mut self, pairs: &BTreeMap<String, BTreeSet<String>>) {
        let mut index: BTreeMap<(RecordId, String), Vec<RecordId>> = BTreeMap::new();
        let mut visited: BTreeSet<(String, usize)> = BTreeSet::new();

        let wanted: BTreeSet<String> = pairs
            .values()
            .flatten()
            .map(|attr| attr.to_uppercase())
            .collect();

        for attr_upper in &wanted {
            // Any schema entry may declare the relation; the visited set keeps
            // each (source type, argument) pair from being walked twice.
            let defs: Vec<InverseDef> = self
                .schema
                .values()
                .flat_map(|def| def.inverses.iter())
                .filter(|inv| inv.name.to_uppercase() == *attr_upper)
                .cloned()
                .collect();

            for inv in defs {
                let key = (inv.source_type.to_uppercase(), inv.source_arg);
                if !visited.insert(key.clone()) {
                    continue;
                }
                let source_types = self.with_subtypes(&key.0);
                for record in self.records.values() {
                    if !source_types.contains(&record.type_name) {
                        continue;
                    }
                    let Some(arg) = record.args.get(inv.source_arg) else {
                        continue;
                    };
                    let mut targets = Vec::new();
                    ref_targets(arg, &mut targets);
                    for target in targets {
                        index
                            .entry((target, attr_upper.clone()))
                            .or_default()
                            .push(record.id);
                    }
                }
            }
        }

        self.inverse = index;
    }

    fn inverse_ids(&self, id: RecordId, attr: &str) -> &[RecordId] {
        self.inverse
            .get(&(id, attr.to_uppercase()))
            .map_or(NO_IDS, Vec::as_slice)
    }

    fn entity_types(&self) -> Vec<String> {
        self.schema.keys().cloned().collect()
    }

    fn subtypes(&self, type_name: &str) -> Option<Vec<String>> {
        self.schema
            .get(&type_name.to_uppercase())
            .map(|def| def.subtypes.iter().map(|s| s.to_uppercase()).collect())
    }

    fn arg_info(&self, type_name: &str) -> Option<Vec<ArgInfo>> {
        self.schema
            .get(&type_name.to_uppercase())
            .map(|def| def.args.clone())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_def() -> EntityDef {
        EntityDef::default()
    }

    #[test]
    fn push_rejects_unknown_type() {
        let mut model = MemoryModel::new("HEADER;");
        let err = model.push(Record::new(RecordId(1), "IfcWall", vec![]));
        assert!(matches!(err, Err(NormError::UnknownType(_))));
    }

    #[test]
    fn ids_preserve_document_order() {
        let mut model = MemoryModel::new("HEADER;");
        model.define_type("IfcWall", leaf_def());
        model
            .push(Record::new(RecordId(7), "IfcWall", vec![]))
            .expect("push");
        model
            .push(Record::new(RecordId(3), "IfcWall", vec![]))
            .expect("push");
        assert_eq!(model.ids(), &[RecordId(7), RecordId(3)]);
    }

    #[test]
    fn inverse_index_tracks_back_references() {
        let mut model = MemoryModel::new("HEADER;");
        model.define_type(
            "IfcItem",
            EntityDef {
                inverses: vec![InverseDef {
                    name: "StyledByItem".into(),
                    source_type: "IfcStyledItem".into(),
                    source_arg: 0,
                }],
                ..EntityDef::default()
            },
        );
        model.define_type("IfcStyledItem", leaf_def());
        model
            .push(Record::new(RecordId(1), "IfcItem", vec![]))
            .expect("push");
        model
            .push(Record::new(
                RecordId(2),
                "IfcStyledItem",
                vec![Argument::Ref(RecordId(1))],
            ))
            .expect("push");

        let mut pairs = BTreeMap::new();
        pairs.insert(
            "IFCITEM".to_string(),
            BTreeSet::from(["StyledByItem".to_string()]),
        );
        model.build_inverse_index(&pairs);

        assert_eq!(model.inverse_ids(RecordId(1), "StyledByItem"), &[RecordId(2)]);
        assert!(model.inverse_ids(RecordId(2), "StyledByItem").is_empty());
    }

    #[test]
    fn subtypes_are_uppercased() {
        let mut model = MemoryModel::new("");
        model.define_type(
            "IfcRoot",
            EntityDef {
                subtypes: vec!["IfcWall".into()],
                ..EntityDef::default()
            },
        );
        assert_eq!(model.subtypes("ifcroot"), Some(vec!["IFCWALL".to_string()]));
        assert_eq!(model.subtypes("IfcDoor"), None);
    }
}
