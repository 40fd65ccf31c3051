//! Evaluate compiled filter programs against a `VariantStore`.

use std::{collections::BTreeMap, time::Instant};

use rayon::prelude::*;
use thousands::Separable;

use crate::err::{FilterError, ParseError, ParseErrorKind};

use super::{
    compile::{CompileContext, CompiledConjunction, FilterProgram, ScopedFilter},
    result::FilterEvalResult,
    schema::{FieldTypeLookup, Scope},
    settings::{CancellationToken, EvalSettings},
    store::VariantStore,
    symbols::Symbol,
};

pub mod catch_all;
pub mod scope;

/// Hold the store and field registry for evaluating filter expressions
/// against them.
pub struct Evaluator<'a> {
    /// The backing store.
    pub store: &'a dyn VariantStore,
    /// The field registry of the reference genome(s) queried.
    pub fields: &'a dyn FieldTypeLookup,
    /// Evaluation limits.
    pub settings: EvalSettings,
    token: CancellationToken,
}

impl<'a> Evaluator<'a> {
    /// Construct new `Evaluator` with default settings.
    pub fn new(store: &'a dyn VariantStore, fields: &'a dyn FieldTypeLookup) -> Self {
        Self {
            store,
            fields,
            settings: EvalSettings::default(),
            token: CancellationToken::new(),
        }
    }

    /// Replace the evaluation settings.
    pub fn with_settings(mut self, settings: EvalSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use `token` for cancelling evaluations.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Compile `expression` for `reference_genome` without evaluating it.
    pub fn compile(
        &self,
        expression: &str,
        reference_genome: &str,
    ) -> Result<FilterProgram, FilterError> {
        let token = self.token.limited_by(self.settings.timeout);
        self.compile_with(expression, reference_genome, &token)
    }

    fn compile_with(
        &self,
        expression: &str,
        reference_genome: &str,
        token: &CancellationToken,
    ) -> Result<FilterProgram, FilterError> {
        let ctx = CompileContext {
            reference_genome,
            fields: self.fields,
            store: self.store,
            settings: &self.settings,
            token,
        };
        FilterProgram::compile(expression, &ctx, 0)
    }

    /// Evaluate `expression` on the variants of `reference_genome`.
    ///
    /// If `scope` is given, per-sample conditions must be satisfied by the
    /// scope's samples as described by its kind.
    ///
    /// # Errors
    ///
    /// Returns a `FilterError` if the expression is invalid, the store fails
    /// or evaluation is cancelled.  No partial results are returned.
    pub fn evaluate(
        &self,
        expression: &str,
        reference_genome: &str,
        scope: Option<&Scope>,
    ) -> Result<FilterEvalResult, FilterError> {
        let before_evaluation = Instant::now();
        let token = self.token.limited_by(self.settings.timeout);
        let program = self.compile_with(expression, reference_genome, &token)?;
        let result = self.run(&program, reference_genome, scope, &token)?;
        tracing::debug!(
            "{} variant(s) pass {:?} on {} in {:?}",
            result.len().separate_with_commas(),
            expression,
            reference_genome,
            before_evaluation.elapsed()
        );
        Ok(result)
    }

    /// Run compiled `program`: the union of the results of its conjunctions.
    ///
    /// Each scoped sub-filter is run once and its result is shared by all
    /// conjunctions referring to it.
    pub fn run(
        &self,
        program: &FilterProgram,
        reference_genome: &str,
        scope: Option<&Scope>,
        token: &CancellationToken,
    ) -> Result<FilterEvalResult, FilterError> {
        token.check()?;
        let sub_results = self.run_scoped(program, reference_genome, token)?;

        let mut result = FilterEvalResult::default();
        for (i, conjunction) in program.conjunctions.iter().enumerate() {
            token.check()?;
            let partial =
                self.run_conjunction(conjunction, &sub_results, reference_genome, scope, token)?;
            tracing::debug!(
                "conjunction {} of {:?} selects {} variant(s)",
                i,
                &program.expression,
                partial.len().separate_with_commas()
            );
            result = result.union(&partial);
        }
        Ok(result)
    }

    /// Run the scoped sub-filters of `program`, in parallel if configured.
    fn run_scoped(
        &self,
        program: &FilterProgram,
        reference_genome: &str,
        token: &CancellationToken,
    ) -> Result<BTreeMap<Symbol, FilterEvalResult>, FilterError> {
        let run_one = |(symbol, scoped): (&Symbol, &ScopedFilter)| {
            self.run(&scoped.program, reference_genome, Some(&scoped.scope), token)
                .map(|result| (*symbol, result))
        };
        if self.settings.parallel_scopes && program.scoped.len() > 1 {
            program.scoped.par_iter().map(run_one).collect()
        } else {
            program.scoped.iter().map(run_one).collect()
        }
    }

    fn run_conjunction(
        &self,
        conjunction: &CompiledConjunction,
        sub_results: &BTreeMap<Symbol, FilterEvalResult>,
        reference_genome: &str,
        scope: Option<&Scope>,
        token: &CancellationToken,
    ) -> Result<FilterEvalResult, FilterError> {
        token.check()?;
        tracing::debug!(
            "querying store with {} predicate(s)",
            conjunction.store_predicates.len()
        );
        let records = self
            .store
            .query(reference_genome, &conjunction.store_predicates)?;
        let mut partial = FilterEvalResult::seeded(records.iter().map(|record| record.as_ref()));

        for signed in &conjunction.scoped {
            let sub_result = sub_results.get(&signed.symbol).ok_or_else(|| {
                ParseError::new(signed.symbol.to_string(), ParseErrorKind::UnexpectedToken)
            })?;
            partial = if signed.negated {
                partial.difference(sub_result)
            } else {
                partial.intersect(sub_result)
            };
        }

        catch_all::apply(&records, partial, &conjunction.catch_all, scope, token)
    }
}
