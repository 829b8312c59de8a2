//! # Normalization Engine
//!
//! Wires the pipeline stages together: rule expansion, inverse indexing,
//! leveling, hashing, inverse augmentation, deduplication, chunk planning,
//! dispatch and serialization. Single pass, fail-fast: any stage error
//! aborts the run, because final addresses only mean anything relative to a
//! complete address-space plan.

use crate::chunk;
use crate::classify::{RuleSet, TypeRules};
use crate::dedup;
use crate::dispatch;
use crate::hash;
use crate::inverse;
use crate::level::compute_levels;
use crate::model::StepModel;
use crate::output;
use crate::par;
use crate::types::{NormError, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// OPTIONS
// =============================================================================

/// Tuning knobs of one normalization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormOptions {
    /// Chunk level, 3..=9. Higher levels mean more, smaller chunks.
    pub chunk_level: u8,
    /// Over-provisioning factor for chunk counts, >= 1.0.
    pub spare_rate: f64,
    /// Fan stages out over all available cores.
    pub parallel: bool,
    /// Round per-type chunk counts up to the next power of two, so the
    /// chunk map stays stable across small census changes.
    pub exp_chunk_count: bool,
    /// Null out provenance references of history-ignoring types on output.
    pub remove_history: bool,
    /// Emit `/*========*/` dividers between chunk blocks.
    pub segment_markers: bool,
}

impl Default for NormOptions {
    fn default() -> Self {
        Self {
            chunk_level: 5,
            spare_rate: 2.0,
            parallel: true,
            exp_chunk_count: true,
            remove_history: true,
            segment_markers: false,
        }
    }
}

impl NormOptions {
    /// Check the options for internal consistency.
    pub fn validate(&self) -> Result<(), NormError> {
        if chunk::level_table(self.chunk_level).is_none() {
            return Err(NormError::InvalidChunkLevel(self.chunk_level));
        }
        if self.spare_rate < 1.0 || self.spare_rate.is_nan() {
            return Err(NormError::InvalidSpareRate(self.spare_rate));
        }
        Ok(())
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Result of a successful run: the normalized text plus summary counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormOutcome {
    /// The full normalized STEP document.
    pub output: String,
    /// Records read from the source document.
    pub records_in: usize,
    /// Unique entities after deduplication.
    pub unique_out: usize,
    /// Chunks that received at least one entity.
    pub chunks_used: usize,
}

// =============================================================================
// NORMALIZER
// =============================================================================

/// The configured engine. Construction validates the options once; `run`
/// may be called for any number of documents.
#[derive(Debug, Clone)]
pub struct Normalizer {
    options: NormOptions,
    rules: RuleSet,
}

impl Normalizer {
    /// Build a normalizer, validating the options.
    pub fn new(options: NormOptions, rules: RuleSet) -> Result<Self, NormError> {
        options.validate()?;
        Ok(Self { options, rules })
    }

    /// The validated options.
    #[must_use]
    pub fn options(&self) -> &NormOptions {
        &self.options
    }

    /// Normalize one document.
    ///
    /// The model is only mutated through `build_inverse_index`; records and
    /// header are read-only throughout.
    pub fn run<M: StepModel + ?Sized>(&self, model: &mut M) -> Result<NormOutcome, NormError> {
        let rules = TypeRules::expand(&*model, &self.rules)?;
        model.build_inverse_index(&rules.important_inverse);
        let model = &*model;

        let workers = par::worker_count(self.options.parallel);

        let mut type_ids: BTreeMap<String, Vec<RecordId>> = BTreeMap::new();
        for &id in model.ids() {
            let record = model.record(id)?;
            type_ids.entry(record.type_name.clone()).or_default().push(id);
        }

        let levels = compute_levels(model)?;
        let mut table = hash::hash_all(model, &rules, &levels, workers)?;
        inverse::augment(model, &rules, &type_ids, &mut table, workers)?;

        let unique = dedup::collect_unique(&type_ids, &table, workers)?;
        let counts: BTreeMap<String, usize> = unique
            .iter()
            .map(|(type_name, refs)| (type_name.clone(), refs.len()))
            .collect();

        let plan = chunk::allocate(
            &counts,
            self.options.chunk_level,
            self.options.spare_rate,
            self.options.exp_chunk_count,
        )?;
        let placed = dispatch::dispatch(&unique, &plan, workers)?;

        let text = output::assemble(
            model,
            &rules,
            &table,
            &placed,
            self.options.remove_history,
            self.options.segment_markers,
            workers,
        )?;

        Ok(NormOutcome {
            output: text,
            records_in: model.ids().len(),
            unique_out: unique.values().map(BTreeMap::len).sum(),
            chunks_used: placed.chunks.values().filter(|refs| !refs.is_empty()).count(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityDef, MemoryModel};
    use crate::types::{Argument, Record};

    fn model_with(records: Vec<Record>) -> MemoryModel {
        let mut model = MemoryModel::new("ISO-10303-21;\nDATA;");
        model.define_type("IfcPoint", EntityDef::default());
        model.define_type("IfcLine", EntityDef::default());
        for record in records {
            model.push(record).expect("push");
        }
        model
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(NormOptions::default(), RuleSet::default()).expect("normalizer")
    }

    #[test]
    fn rejects_bad_options() {
        assert!(matches!(
            Normalizer::new(
                NormOptions {
                    chunk_level: 2,
                    ..NormOptions::default()
                },
                RuleSet::default(),
            ),
            Err(NormError::InvalidChunkLevel(2))
        ));
        assert!(matches!(
            Normalizer::new(
                NormOptions {
                    spare_rate: 0.5,
                    ..NormOptions::default()
                },
                RuleSet::default(),
            ),
            Err(NormError::InvalidSpareRate(_))
        ));
    }

    #[test]
    fn counts_reflect_dedup() {
        let mut model = model_with(vec![
            Record::new(RecordId(1), "IfcPoint", vec![Argument::Float(1.0)]),
            Record::new(RecordId(2), "IfcPoint", vec![Argument::Float(1.0)]),
            Record::new(RecordId(3), "IfcPoint", vec![Argument::Float(2.0)]),
            Record::new(RecordId(4), "IfcLine", vec![Argument::Ref(RecordId(1))]),
            Record::new(RecordId(5), "IfcLine", vec![Argument::Ref(RecordId(2))]),
        ]);
        let outcome = normalizer().run(&mut model).expect("run");
        assert_eq!(outcome.records_in, 5);
        // 1.0/1.0 points collapse, and so do the two lines referencing them.
        assert_eq!(outcome.unique_out, 3);
        assert_eq!(outcome.chunks_used, 2);
    }

    #[test]
    fn output_is_deterministic_across_runs() {
        let records = vec![
            Record::new(RecordId(1), "IfcPoint", vec![Argument::Float(0.5)]),
            Record::new(RecordId(2), "IfcLine", vec![Argument::Ref(RecordId(1))]),
        ];
        let mut a = model_with(records.clone());
        let mut b = model_with(records);
        let out_a = normalizer().run(&mut a).expect("run a");
        let out_b = normalizer().run(&mut b).expect("run b");
        assert_eq!(out_a.output, out_b.output);
    }

    #[test]
    fn output_is_invariant_to_input_ids_and_order() {
        let mut forward = model_with(vec![
            Record::new(RecordId(1), "IfcPoint", vec![Argument::Float(3.5)]),
            Record::new(RecordId(2), "IfcLine", vec![Argument::Ref(RecordId(1))]),
        ]);
        let mut renumbered = model_with(vec![
            Record::new(RecordId(90), "IfcLine", vec![Argument::Ref(RecordId(40))]),
            Record::new(RecordId(40), "IfcPoint", vec![Argument::Float(3.5)]),
        ]);
        let out_a = normalizer().run(&mut forward).expect("run");
        let out_b = normalizer().run(&mut renumbered).expect("run");
        assert_eq!(out_a.output, out_b.output);
    }

    #[test]
    fn serial_and_parallel_agree() {
        let records: Vec<Record> = (1..=60)
            .map(|i| {
                if i <= 30 {
                    Record::new(RecordId(i), "IfcPoint", vec![Argument::Int(i % 7)])
                } else {
                    Record::new(RecordId(i), "IfcLine", vec![Argument::Ref(RecordId(i - 30))])
                }
            })
            .collect();
        let mut serial_model = model_with(records.clone());
        let mut parallel_model = model_with(records);

        let serial = Normalizer::new(
            NormOptions {
                parallel: false,
                ..NormOptions::default()
            },
            RuleSet::default(),
        )
        .expect("serial")
        .run(&mut serial_model)
        .expect("serial run");
        let parallel = normalizer().run(&mut parallel_model).expect("parallel run");
        assert_eq!(serial.output, parallel.output);
    }

    #[test]
    fn cyclic_documents_fail_fast() {
        let mut model = model_with(vec![
            Record::new(RecordId(1), "IfcLine", vec![Argument::Ref(RecordId(2))]),
            Record::new(RecordId(2), "IfcLine", vec![Argument::Ref(RecordId(1))]),
        ]);
        assert!(matches!(
            normalizer().run(&mut model),
            Err(NormError::CyclicReference(_))
        ));
    }
}
