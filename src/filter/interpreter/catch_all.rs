//! In-memory evaluation of the conditions that the store cannot evaluate.

use std::{collections::BTreeSet, sync::Arc};

use crate::{
    common::alt_allele_indices,
    err::{ExecutionError, FilterError},
    filter::{
        compile::CatchAllCondition,
        result::FilterEvalResult,
        schema::{FieldValue, Multiplicity, SampleEvidence, SampleId, Scope, StorageClass, VariantRecord},
        settings::CancellationToken,
    },
};

use super::scope;

/// Check cancellation every this many variants.
const CHECK_INTERVAL: usize = 1024;

/// Apply `conditions` one after another to the variants of `result`.
///
/// `records` must contain all variants of `result`.  Variants are only ever
/// removed and passing samples only ever intersected.
pub fn apply(
    records: &[Arc<VariantRecord>],
    mut result: FilterEvalResult,
    conditions: &[CatchAllCondition],
    scope: Option<&Scope>,
    token: &CancellationToken,
) -> Result<FilterEvalResult, FilterError> {
    if conditions.is_empty() {
        return Ok(result);
    }

    for (i, record) in records.iter().enumerate() {
        if i % CHECK_INTERVAL == 0 {
            token.check()?;
        }
        if !result.variant_ids.contains(&record.id) {
            continue;
        }
        for condition in conditions {
            if !passes(record, condition, scope, &mut result)? {
                tracing::trace!(
                    "variant {} fails {} {} {}",
                    record.id,
                    &condition.key,
                    condition.op,
                    &condition.value
                );
                result.remove(record.id);
                break;
            }
        }
    }

    Ok(result)
}

/// Determine whether `record` passes `condition`, updating its passing
/// samples in `result` for per-sample conditions.
fn passes(
    record: &VariantRecord,
    condition: &CatchAllCondition,
    scope: Option<&Scope>,
    result: &mut FilterEvalResult,
) -> Result<bool, ExecutionError> {
    match condition.info.storage {
        StorageClass::Column => Ok(record
            .column(&condition.key)
            .map(|value| value.satisfies(condition.op, &condition.value))
            .unwrap_or(false)),
        StorageClass::CommonData => Ok(record.common_data.iter().any(|common| {
            common
                .data
                .get(&condition.key)
                .map(|value| value.satisfies(condition.op, &condition.value))
                .unwrap_or(false)
        })),
        StorageClass::Evidence | StorageClass::Alternate => {
            let passing = passing_samples(record, condition)?;
            if !scope::passes(scope, &passing) {
                return Ok(false);
            }
            if let Some(metadata) = result.metadata.get_mut(&record.id) {
                metadata
                    .passing_sample_ids
                    .retain(|sample_id| passing.contains(sample_id));
            }
            Ok(true)
        }
    }
}

/// Return the called samples of `record` that satisfy the per-sample `condition`.
fn passing_samples(
    record: &VariantRecord,
    condition: &CatchAllCondition,
) -> Result<BTreeSet<SampleId>, ExecutionError> {
    let mut result = BTreeSet::new();
    for evidence in record.evidence.iter().filter(|evidence| evidence.called) {
        let pass = match (condition.info.storage, condition.info.multiplicity) {
            (StorageClass::Alternate, _) => allele_indices(record, evidence)?
                .into_iter()
                .filter_map(|idx| record.alternates.get(idx))
                .filter_map(|alternate| alternate.data.get(&condition.key))
                .any(|value| value.satisfies(condition.op, &condition.value)),
            (_, Multiplicity::PerAltAllele) => match evidence.value(&condition.key).as_deref() {
                Some(FieldValue::List(values)) => allele_indices(record, evidence)?
                    .into_iter()
                    .filter_map(|idx| values.get(idx))
                    .any(|value| value.satisfies(condition.op, &condition.value)),
                Some(value) => value.satisfies(condition.op, &condition.value),
                None => false,
            },
            (_, Multiplicity::Single) => evidence
                .value(&condition.key)
                .map(|value| value.satisfies(condition.op, &condition.value))
                .unwrap_or(false),
        };
        if pass {
            result.insert(evidence.sample_id.clone());
        }
    }
    Ok(result)
}

/// Zero-based alternate allele indices of the sample's genotype.
fn allele_indices(
    record: &VariantRecord,
    evidence: &SampleEvidence,
) -> Result<Vec<usize>, ExecutionError> {
    match evidence.genotype.as_deref() {
        Some(genotype) => {
            alt_allele_indices(genotype).map_err(|e| ExecutionError::MalformedRecord {
                variant: record.id,
                message: format!("sample {}: {}", &evidence.sample_id, e),
            })
        }
        None => Ok(Vec::new()),
    }
}
