//! Code for representing the parts of a filter expression.

use std::collections::BTreeSet;

use crate::err::{ParseError, ParseErrorKind};

use super::{data::SampleId, fields::ValueType};

/// Comparison operator of a basic expression.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum CompareOp {
    #[strum(serialize = "==")]
    #[serde(rename = "==")]
    Eq,
    #[strum(serialize = "!=")]
    #[serde(rename = "!=")]
    Ne,
    #[strum(serialize = ">")]
    #[serde(rename = ">")]
    Gt,
    #[strum(serialize = ">=")]
    #[serde(rename = ">=")]
    Ge,
    #[strum(serialize = "<")]
    #[serde(rename = "<")]
    Lt,
    #[strum(serialize = "<=")]
    #[serde(rename = "<=")]
    Le,
}

impl CompareOp {
    /// The operator that holds exactly when `self` does not.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Le => CompareOp::Gt,
        }
    }

    /// Whether `lhs <op> rhs` holds given `ordering = lhs.cmp(rhs)`.
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ordering == Equal,
            CompareOp::Ne => ordering != Equal,
            CompareOp::Gt => ordering == Greater,
            CompareOp::Ge => ordering != Less,
            CompareOp::Lt => ordering == Less,
            CompareOp::Le => ordering != Greater,
        }
    }
}

/// Literals accepted as `true` for boolean fields.
pub const BOOLEAN_TRUE_VALUES: &[&str] = &["True", "true", "T", "t"];
/// Literals accepted as `false` for boolean fields.
pub const BOOLEAN_FALSE_VALUES: &[&str] = &["False", "false", "F", "f"];

/// A literal value cast to the declared type of its field.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Literal {
    /// Cast the raw literal text to `value_type`.
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if `raw` is not a valid literal of the type.
    pub fn cast(raw: &str, value_type: ValueType) -> Result<Self, ParseError> {
        match value_type {
            ValueType::Boolean => {
                if BOOLEAN_TRUE_VALUES.contains(&raw) {
                    Ok(Literal::Boolean(true))
                } else if BOOLEAN_FALSE_VALUES.contains(&raw) {
                    Ok(Literal::Boolean(false))
                } else {
                    Err(ParseError::new(raw, ParseErrorKind::InvalidBoolean))
                }
            }
            ValueType::Integer => raw
                .parse::<i64>()
                .map(Literal::Integer)
                .map_err(|_| ParseError::new(raw, ParseErrorKind::InvalidLiteral(value_type))),
            ValueType::Float => raw
                .parse::<f64>()
                .map(Literal::Float)
                .map_err(|_| ParseError::new(raw, ParseErrorKind::InvalidLiteral(value_type))),
            ValueType::String => Ok(Literal::String(raw.to_string())),
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Boolean(value) => write!(f, "{}", value),
            Literal::Integer(value) => write!(f, "{}", value),
            Literal::Float(value) => write!(f, "{}", value),
            Literal::String(value) => write!(f, "{:?}", value),
        }
    }
}

/// Basic expression `KEY OP VALUE` as found in the filter text.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConditionTriple {
    /// The comparison operator.
    pub op: CompareOp,
    /// The field key.
    pub key: String,
    /// The literal value, quotes removed.
    pub value: String,
}

/// Quantifier of a scope.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum ScopeKind {
    /// Every sample of the scope must pass.
    #[strum(serialize = "ALL")]
    All,
    /// At least one sample of the scope must pass.
    #[strum(serialize = "ANY")]
    Any,
    /// Exactly the samples of the scope must pass.
    #[strum(serialize = "ONLY")]
    Only,
}

/// A named group of samples together with a quantifier.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Scope {
    /// The quantifier.
    pub kind: ScopeKind,
    /// The samples of the group.
    pub sample_ids: BTreeSet<SampleId>,
}

impl Scope {
    /// Construct new `Scope`.
    pub fn new<I, S>(kind: ScopeKind, sample_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SampleId>,
    {
        Self {
            kind,
            sample_ids: sample_ids.into_iter().map(Into::into).collect(),
        }
    }
}
