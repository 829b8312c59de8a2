//! # Core Type Definitions
//!
//! This module contains all core types for the stepnorm deterministic
//! normalization engine:
//! - Record identifiers (`RecordId`)
//! - The STEP argument sum type (`Argument`)
//! - Records (`Record`)
//! - Error types (`NormError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Implement `Ord` where they participate in `BTreeMap`/`BTreeSet` keys
//! - Render to STEP text through pure functions with no locale or
//!   environment dependence

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// RECORD IDENTIFIER
// =============================================================================

/// Identifier of a record in the source document.
///
/// Ids are positive (`>= 1`) and unique within a document. Substitution
/// placeholders used during hashing are engine-internal and are never
/// representable as a `RecordId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Get the raw id value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// ARGUMENT (closed tagged union over STEP value kinds)
// =============================================================================

/// One argument of a record.
///
/// A closed sum type over the STEP argument kinds. Argument position within
/// a record is fixed by schema order and semantically significant; list
/// arguments preserve element order unless the schema marks the attribute as
/// an unordered set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    /// Reference to another record.
    Ref(RecordId),
    /// Nested ordered list, optionally carrying a defined-type name.
    List {
        /// Defined-type name prefix, if any (e.g. `IFCBOOLEAN`).
        name: Option<String>,
        /// Element arguments, in schema order.
        items: Vec<Argument>,
    },
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// String value (unescaped).
    Str(String),
    /// Enumeration symbol, without the surrounding dots.
    Enum(String),
    /// Three-valued logical: true / false / unknown.
    Logical(Option<bool>),
    /// Binary blob.
    Binary(Vec<u8>),
    /// `$` — value not provided.
    NotProvided,
    /// `*` — value overridden by a subtype-derived attribute.
    Override,
}

impl Argument {
    /// Build an unnamed list argument.
    #[must_use]
    pub fn list(items: Vec<Argument>) -> Self {
        Self::List { name: None, items }
    }

    /// Render this argument in STEP text syntax.
    ///
    /// References render as `#<id>`; the serializer never uses this path for
    /// references (they are rewritten through the address map), but the
    /// canonical total order over mixed set elements falls back to it.
    #[must_use]
    pub fn to_step_text(&self) -> String {
        let mut out = String::new();
        self.write_step_text(&mut out);
        out
    }

    fn write_step_text(&self, out: &mut String) {
        match self {
            Self::Ref(id) => out.push_str(&id.to_string()),
            Self::List { name, items } => {
                if let Some(name) = name {
                    out.push_str(&name.to_uppercase());
                }
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_step_text(out);
                }
                out.push(')');
            }
            Self::Int(v) => out.push_str(&v.to_string()),
            Self::Float(v) => out.push_str(&format_step_float(*v)),
            Self::Str(s) => {
                out.push('\'');
                for c in s.chars() {
                    if c == '\'' {
                        out.push('\'');
                    }
                    out.push(c);
                }
                out.push('\'');
            }
            Self::Enum(sym) => {
                out.push('.');
                out.push_str(&sym.to_uppercase());
                out.push('.');
            }
            Self::Logical(v) => out.push_str(match v {
                Some(true) => ".T.",
                Some(false) => ".F.",
                None => ".U.",
            }),
            Self::Binary(bytes) => {
                out.push('"');
                out.push('0');
                for b in bytes {
                    out.push_str(&format!("{b:02X}"));
                }
                out.push('"');
            }
            Self::NotProvided => out.push('$'),
            Self::Override => out.push('*'),
        }
    }
}

/// Format a float in STEP real syntax: the mantissa always carries a decimal
/// point, exponents are upper-case `E`.
#[must_use]
pub fn format_step_float(v: f64) -> String {
    let repr = format!("{v:?}");
    match repr.find(['e', 'E']) {
        Some(pos) => {
            let (mantissa, exponent) = repr.split_at(pos);
            let mut out = String::from(mantissa);
            if !out.contains('.') {
                out.push('.');
            }
            out.push('E');
            out.push_str(&exponent[1..]);
            out
        }
        None => {
            let mut out = repr;
            if !out.contains('.') {
                out.push('.');
            }
            out
        }
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// One entry of the source document: an id, a type name and the ordered
/// argument list. Owned by the document model, read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Document identifier of this record.
    pub id: RecordId,
    /// Type name, stored uppercased.
    pub type_name: String,
    /// Arguments in schema order.
    pub args: Vec<Argument>,
}

impl Record {
    /// Create a new record; the type name is uppercased on the way in.
    #[must_use]
    pub fn new(id: RecordId, type_name: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            id,
            type_name: type_name.into().to_uppercase(),
            args,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by the normalization engine.
///
/// Every fatal condition aborts the whole run: partial canonicalization is
/// meaningless because final addresses are relative to the complete
/// address-space plan.
#[derive(Debug, Error)]
pub enum NormError {
    /// Total required chunks exceed the configured level's maximum.
    #[error("capacity exceeded: {required} chunks required, level allows {max}")]
    CapacityExceeded {
        /// Chunks the plan needs.
        required: usize,
        /// Maximum chunks at the configured level.
        max: usize,
    },

    /// A type's chunks filled up during dispatch despite pre-sizing.
    #[error("chunk overflow while dispatching type {0}")]
    ChunkOverflow(String),

    /// A configured type name is unknown to the schema.
    #[error("unknown entity type: {0}")]
    UnknownType(String),

    /// The reference graph contains a cycle involving this record.
    #[error("cyclic reference detected at {0}")]
    CyclicReference(RecordId),

    /// A reference points at a record the document does not contain.
    #[error("missing record: {0}")]
    MissingRecord(RecordId),

    /// The spare rate must be >= 1.0.
    #[error("invalid spare rate {0} (must be >= 1.0)")]
    InvalidSpareRate(f64),

    /// The chunk level must select a configured capacity table entry.
    #[error("invalid chunk level {0} (supported levels: 3..=9)")]
    InvalidChunkLevel(u8),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_text_scalars() {
        assert_eq!(Argument::Int(42).to_step_text(), "42");
        assert_eq!(Argument::NotProvided.to_step_text(), "$");
        assert_eq!(Argument::Override.to_step_text(), "*");
        assert_eq!(Argument::Logical(None).to_step_text(), ".U.");
        assert_eq!(Argument::Enum("area".into()).to_step_text(), ".AREA.");
    }

    #[test]
    fn step_text_string_escapes_quotes() {
        assert_eq!(Argument::Str("it's".into()).to_step_text(), "'it''s'");
    }

    #[test]
    fn step_text_named_list() {
        let arg = Argument::List {
            name: Some("IfcBoolean".into()),
            items: vec![Argument::Logical(Some(true))],
        };
        assert_eq!(arg.to_step_text(), "IFCBOOLEAN(.T.)");
    }

    #[test]
    fn step_float_always_has_point() {
        assert_eq!(format_step_float(1.0), "1.0");
        assert_eq!(format_step_float(0.5), "0.5");
        assert_eq!(format_step_float(1e300), "1.E300");
    }

    #[test]
    fn record_uppercases_type_name() {
        let rec = Record::new(RecordId(1), "IfcWall", vec![]);
        assert_eq!(rec.type_name, "IFCWALL");
    }
}
