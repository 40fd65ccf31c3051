use std::collections::BTreeSet;

use crate::filter::schema::{SampleId, Scope, ScopeKind};

/// Determine whether the samples `passing` a per-sample condition satisfy `scope`.
///
/// Without a scope, at least one sample must pass.
pub fn passes(scope: Option<&Scope>, passing: &BTreeSet<SampleId>) -> bool {
    match scope {
        None => !passing.is_empty(),
        Some(Scope {
            kind: ScopeKind::All,
            sample_ids,
        }) => sample_ids.is_subset(passing),
        Some(Scope {
            kind: ScopeKind::Any,
            sample_ids,
        }) => !sample_ids.is_disjoint(passing),
        Some(Scope {
            kind: ScopeKind::Only,
            sample_ids,
        }) => sample_ids == passing,
    }
}
