//! Compile filter expressions into executable programs.
//!
//! Each conjunction of the normalized expression is split into references
//! to scoped sub-filters, the predicates that the store evaluates and the
//! remaining conditions that are checked in memory.  Scoped sub-filters are
//! compiled recursively, once per symbol, so that all errors in the
//! expression are reported before any evaluation starts.

use std::collections::BTreeMap;

use crate::err::{FilterError, ParseError, ParseErrorKind};

use super::{
    dnf::{normalize, Dnf, SignedSymbol},
    schema::{FieldTypeInfo, FieldTypeLookup, Literal, Multiplicity, Scope},
    settings::{CancellationToken, EvalSettings},
    store::{StorePredicate, VariantStore},
    symbols::{symbolize, SubExpression, Symbol, SymbolEntry, SymbolTable},
};

/// Everything needed for compiling an expression against one reference genome.
#[derive(Clone, Copy)]
pub struct CompileContext<'a> {
    pub reference_genome: &'a str,
    pub fields: &'a dyn FieldTypeLookup,
    pub store: &'a dyn VariantStore,
    pub settings: &'a EvalSettings,
    pub token: &'a CancellationToken,
}

/// Condition evaluated in memory on the candidates of the store query.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CatchAllCondition {
    /// The field key.
    pub key: String,
    /// The operator, already negated if the expression was.
    pub op: crate::filter::schema::CompareOp,
    /// The literal, cast to the field's type.
    pub value: Literal,
    /// Type and storage of the field.
    pub info: FieldTypeInfo,
}

/// Compiled `(EXPR) in SCOPE(...)` sub-expression.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ScopedFilter {
    /// Program for `EXPR`.
    pub program: Box<FilterProgram>,
    /// The scope `EXPR` is evaluated under.
    pub scope: Scope,
}

/// One compiled AND-clause.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct CompiledConjunction {
    /// Scoped sub-filters by symbol; negated ones are subtracted.
    pub scoped: Vec<SignedSymbol>,
    pub store_predicates: Vec<StorePredicate>,
    pub catch_all: Vec<CatchAllCondition>,
}

/// A compiled filter expression.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FilterProgram {
    /// The expression as given.
    pub expression: String,
    /// The symbols allocated for the sub-expressions.
    pub symbols: SymbolTable,
    /// The expression in disjunctive normal form.
    #[serde(serialize_with = "serialize_display")]
    pub dnf: Dnf,
    /// The scoped sub-filters, shared by all conjunctions.
    pub scoped: BTreeMap<Symbol, ScopedFilter>,
    /// One entry for each conjunction of `dnf`, in the same order.
    pub conjunctions: Vec<CompiledConjunction>,
}

fn serialize_display<T: std::fmt::Display, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

impl FilterProgram {
    /// Compile `expression` nested `depth` levels deep in scoped sub-filters.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Parse` for any problem with the expression and
    /// `FilterError::Execution` if gene lookup in the store fails.
    pub fn compile(
        expression: &str,
        ctx: &CompileContext<'_>,
        depth: usize,
    ) -> Result<Self, FilterError> {
        if depth > ctx.settings.max_scope_depth {
            return Err(ParseError::new(
                expression,
                ParseErrorKind::NestingTooDeep(ctx.settings.max_scope_depth),
            )
            .into());
        }

        let symbolized = symbolize(expression)?;
        let dnf = normalize(
            &symbolized.symbolized,
            &symbolized.table,
            ctx.settings.max_nesting_depth,
            ctx.settings.max_conjunctions,
        )?;
        tracing::debug!(
            "compiling {:?} at depth {} with {} conjunction(s): {}",
            expression,
            depth,
            dnf.conjunctions.len(),
            &dnf
        );

        let conjunctions = dnf
            .conjunctions
            .iter()
            .map(|conjunction| {
                let mut compiled = CompiledConjunction::default();
                for signed in conjunction {
                    compile_atom(&mut compiled, signed, &symbolized.table, ctx)?;
                }
                Ok(compiled)
            })
            .collect::<Result<Vec<_>, FilterError>>()?;

        let scoped = symbolized
            .table
            .iter()
            .filter_map(|entry| match &entry.expression {
                SubExpression::Scoped {
                    condition,
                    kind,
                    samples,
                } => Some((entry.symbol, condition, Scope::new(*kind, samples.iter().cloned()))),
                _ => None,
            })
            .map(|(symbol, condition, scope)| {
                let program = FilterProgram::compile(condition, ctx, depth + 1)?;
                Ok((
                    symbol,
                    ScopedFilter {
                        program: Box::new(program),
                        scope,
                    },
                ))
            })
            .collect::<Result<BTreeMap<_, _>, FilterError>>()?;

        Ok(Self {
            expression: expression.to_string(),
            symbols: symbolized.table,
            dnf,
            scoped,
            conjunctions,
        })
    }
}

/// Add the signed symbol to `compiled`.
fn compile_atom(
    compiled: &mut CompiledConjunction,
    signed: &SignedSymbol,
    table: &SymbolTable,
    ctx: &CompileContext<'_>,
) -> Result<(), FilterError> {
    let entry = table.get(signed.symbol).ok_or_else(|| {
        ParseError::new(signed.symbol.to_string(), ParseErrorKind::UnexpectedToken)
    })?;
    let negated = signed.negated;

    match &entry.expression {
        SubExpression::Scoped { .. } => compiled.scoped.push(*signed),
        SubExpression::Comparison(triple) => {
            let info = ctx
                .fields
                .lookup(&triple.key)
                .ok_or_else(|| ParseError::new(&entry.text, ParseErrorKind::UnknownKey))?;
            if !info.value_type.supports(triple.op) {
                return Err(ParseError::new(
                    &entry.text,
                    ParseErrorKind::UnsupportedOperator(info.value_type),
                )
                .into());
            }
            let value = Literal::cast(&triple.value, info.value_type)
                .map_err(|e| ParseError::new(&entry.text, e.kind))?;
            let op = if negated { triple.op.negate() } else { triple.op };

            if info.storage.is_pushable() && info.multiplicity == Multiplicity::Single {
                compiled.store_predicates.push(StorePredicate::Compare {
                    column: triple.key.clone(),
                    op,
                    value,
                });
            } else {
                compiled.catch_all.push(CatchAllCondition {
                    key: triple.key.clone(),
                    op,
                    value,
                    info,
                });
            }
        }
        SubExpression::SetMembership {
            set_uid,
            negated: not_in_set,
        } => {
            compiled.store_predicates.push(StorePredicate::InVariantSet {
                set_uid: set_uid.clone(),
                negated: *not_in_set != negated,
            });
        }
        SubExpression::GeneRegion { label } => {
            compiled
                .store_predicates
                .push(resolve_gene(entry, label, negated, ctx)?);
        }
    }

    Ok(())
}

fn resolve_gene(
    entry: &SymbolEntry,
    label: &str,
    negated: bool,
    ctx: &CompileContext<'_>,
) -> Result<StorePredicate, FilterError> {
    ctx.token.check()?;
    let region = ctx
        .store
        .gene_region(ctx.reference_genome, label)?
        .ok_or_else(|| ParseError::new(&entry.text, ParseErrorKind::UnknownGene))?;
    tracing::trace!("resolved gene {:?} to {:?}", label, &region);
    Ok(StorePredicate::Region {
        chromosome: region.chromosome,
        start: region.start,
        end: region.end,
        negated,
    })
}
