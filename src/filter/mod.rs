//! Filter expressions over genomic variant records.
//!
//! A filter expression such as
//!
//! ```text
//! (position > 100) AND (GT_TYPE == HET) in ANY(A, B)
//! ```
//!
//! is symbolized (`symbols`), brought into disjunctive normal form (`dnf`)
//! and compiled (`compile`) into one plan per conjunction.  The predicates
//! that the store can evaluate are sent to the `VariantStore` and the rest
//! is checked in memory by the `interpreter`, which also keeps track of the
//! samples each variant passes for.

pub mod cli;
pub mod compile;
pub mod dnf;
pub mod interpreter;
pub mod lookup;
pub mod result;
pub mod schema;
pub mod settings;
pub mod store;
pub mod symbols;

#[cfg(test)]
pub(crate) mod fixtures;

pub use compile::FilterProgram;
pub use interpreter::Evaluator;
pub use lookup::{LookupQuery, LookupQueryBuilder, LookupVariantsResult, SortDirection, VariantRow, ViewMode};
pub use result::{FilterEvalResult, VariantMetadata};
pub use settings::{CancellationToken, EvalSettings, EvalSettingsBuilder};
pub use store::{InMemoryStore, StorePredicate, VariantStore};

use crate::err::FilterError;

use schema::{FieldTypeLookup, Scope};

/// Evaluate `expression` on the variants of `reference_genome` with default settings.
///
/// See `Evaluator::evaluate()`.
pub fn evaluate(
    store: &dyn VariantStore,
    fields: &dyn FieldTypeLookup,
    expression: &str,
    reference_genome: &str,
    scope: Option<&Scope>,
) -> Result<FilterEvalResult, FilterError> {
    Evaluator::new(store, fields).evaluate(expression, reference_genome, scope)
}

/// Look up one page of the variants passing `query` with default settings.
///
/// See `Evaluator::lookup_variants()`.
pub fn lookup_variants(
    store: &dyn VariantStore,
    fields: &dyn FieldTypeLookup,
    query: &LookupQuery,
) -> Result<LookupVariantsResult, FilterError> {
    Evaluator::new(store, fields).lookup_variants(query)
}
