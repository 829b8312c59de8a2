//! # Type Classifier
//!
//! Expands the configured type-rule set through the schema's subtype
//! hierarchy into flat, uppercased lookup tables, and pre-computes which
//! argument positions of each type are unordered sets. Runs once at
//! initialization; idempotent.

use crate::model::StepModel;
use crate::types::NormError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// RULE SET (engine configuration)
// =============================================================================

/// The configured type rules, as written by a user: root type names, not yet
/// expanded through subtypes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    /// Types whose identity field (argument 0) is excluded from hashing and
    /// re-derived from the content digest on output.
    pub identity_ignore: Vec<String>,
    /// Types whose provenance reference (argument 1) is excluded from
    /// hashing and optionally nulled on output.
    pub history_ignore: Vec<String>,
    /// (type, inverse attribute) pairs whose inbound references are folded
    /// into the owning record's digest.
    pub important_inverse: Vec<(String, String)>,
}

impl RuleSet {
    /// The built-in IFC rule set.
    #[must_use]
    pub fn ifc_default() -> Self {
        Self {
            identity_ignore: vec![
                "IfcRelationship".into(),
                "IfcPropertyDefinition".into(),
                "IfcBeamType".into(),
                "IfcColumnType".into(),
                "IfcSpatialStructureElement".into(),
                "IfcProject".into(),
            ],
            history_ignore: vec!["IfcRoot".into()],
            important_inverse: vec![("IfcRepresentationItem".into(), "StyledByItem".into())],
        }
    }
}

// =============================================================================
// EXPANDED TYPE RULES
// =============================================================================

/// Rule tables expanded through the subtype hierarchy, keyed by uppercased
/// type name. Built once by [`TypeRules::expand`]; read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TypeRules {
    /// Types (with subtypes) whose identity field is ignored.
    pub identity_ignore: BTreeSet<String>,
    /// Types (with subtypes) whose history reference is ignored.
    pub history_ignore: BTreeSet<String>,
    /// Owning type -> important inverse attribute names.
    pub important_inverse: BTreeMap<String, BTreeSet<String>>,
    /// Type -> argument positions whose list value is an unordered set.
    pub unordered_sets: BTreeMap<String, BTreeSet<usize>>,
}

impl TypeRules {
    /// Expand a [`RuleSet`] against the model's schema.
    ///
    /// Fails with [`NormError::UnknownType`] if any configured name has no
    /// schema entry.
    pub fn expand<M: StepModel + ?Sized>(model: &M, rules: &RuleSet) -> Result<Self, NormError> {
        let mut out = Self::default();

        for name in &rules.identity_ignore {
            expand_type(model, name, &mut out.identity_ignore)?;
        }
        for name in &rules.history_ignore {
            expand_type(model, name, &mut out.history_ignore)?;
        }
        for (name, attr) in &rules.important_inverse {
            let mut members = BTreeSet::new();
            expand_type(model, name, &mut members)?;
            for member in members {
                out.important_inverse
                    .entry(member)
                    .or_default()
                    .insert(attr.clone());
            }
        }

        for type_name in model.entity_types() {
            let Some(infos) = model.arg_info(&type_name) else {
                continue;
            };
            for info in infos {
                let is_set = info
                    .collection_kind
                    .as_deref()
                    .is_some_and(|kind| kind.eq_ignore_ascii_case("SET"));
                if info.is_collection && is_set {
                    out.unordered_sets
                        .entry(type_name.to_uppercase())
                        .or_default()
                        .insert(info.index);
                }
            }
        }

        Ok(out)
    }
}

/// Insert `name` plus all transitive subtypes into `target`, uppercased.
fn expand_type<M: StepModel + ?Sized>(
    model: &M,
    name: &str,
    target: &mut BTreeSet<String>,
) -> Result<(), NormError> {
    let upper = name.to_uppercase();
    if !target.insert(upper) {
        return Ok(());
    }
    let subtypes = model
        .subtypes(name)
        .ok_or_else(|| NormError::UnknownType(name.to_string()))?;
    for sub in subtypes {
        expand_type(model, &sub, target)?;
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
