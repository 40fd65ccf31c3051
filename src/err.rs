//! Error types for filter compilation and evaluation.

use crate::filter::schema::fields::ValueType;

/// Reason for a `ParseError`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("unrecognized filter key")]
    UnknownKey,
    #[error("operator not supported for field of type {0}")]
    UnsupportedOperator(ValueType),
    #[error("invalid boolean value, use True or False")]
    InvalidBoolean,
    #[error("value cannot be interpreted as {0}")]
    InvalidLiteral(ValueType),
    #[error("unknown scope type, expected one of ALL, ANY, ONLY")]
    UnknownScope,
    #[error("scope does not name any sample")]
    EmptyScope,
    #[error("no variant set given in set expression")]
    EmptySet,
    #[error("no gene given in gene expression")]
    EmptyGene,
    #[error("gene not known for reference genome")]
    UnknownGene,
    #[error("unbalanced parentheses")]
    UnbalancedParentheses,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("more than {0} sub-expressions")]
    SymbolsExhausted(usize),
    #[error("scoped expressions nested deeper than {0} levels")]
    NestingTooDeep(usize),
    #[error("parentheses and negations nested deeper than {0} levels")]
    FormulaTooDeep(usize),
    #[error("expression expands to more than {0} conjunctions")]
    TooManyConjunctions(usize),
    #[error("cannot sort by this key")]
    UnsupportedSortKey,
}

/// Error in the filter expression given by the user.
///
/// Always carries the offending fragment of the expression so it can be shown
/// to the user verbatim.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid filter expression {fragment:?}: {kind}")]
pub struct ParseError {
    /// The offending part of the expression.
    pub fragment: String,
    /// What is wrong with it.
    pub kind: ParseErrorKind,
}

impl ParseError {
    /// Construct new `ParseError` for `fragment`.
    pub fn new<S: Into<String>>(fragment: S, kind: ParseErrorKind) -> Self {
        Self {
            fragment: fragment.into(),
            kind,
        }
    }
}

/// Failure while talking to the variant store.
#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    #[error("unknown reference genome: {0:?}")]
    UnknownReferenceGenome(String),
    #[error("malformed record for variant {variant}: {message}")]
    MalformedRecord { variant: u64, message: String },
    #[error("variant {0} missing from store result")]
    MissingRecord(u64),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Top-level error of `evaluate()` and `lookup_variants()`.
#[derive(thiserror::Error, Debug)]
pub enum FilterError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("filter evaluation was cancelled")]
    Cancelled,
    #[error("filter evaluation exceeded its deadline")]
    TimedOut,
}
