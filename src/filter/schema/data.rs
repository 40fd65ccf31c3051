//! Code for representing variants as returned by the variant store.

use std::{borrow::Cow, cmp::Ordering, collections::BTreeSet};

use indexmap::IndexMap;

use super::{
    fields::{columns, GENOTYPE_KEY},
    query::{CompareOp, Literal, BOOLEAN_FALSE_VALUES, BOOLEAN_TRUE_VALUES},
};

/// Identifier of a variant.
pub type VariantId = u64;

/// Identifier of a sample.
pub type SampleId = String;

/// A value stored in the catch-all data of a variant, allele or sample.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Values of a per-alternate-allele field, ordered by allele index.
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Whether `self <op> literal` holds.
    ///
    /// A list passes if any of its entries passes.  Values that cannot be
    /// compared to the literal never pass, not even for `!=`.
    pub fn satisfies(&self, op: CompareOp, literal: &Literal) -> bool {
        match self {
            FieldValue::List(values) => values.iter().any(|value| value.satisfies(op, literal)),
            _ => self
                .compare(literal)
                .map(|ordering| op.holds(ordering))
                .unwrap_or(false),
        }
    }

    /// Compare a scalar value to `literal`.
    fn compare(&self, literal: &Literal) -> Option<Ordering> {
        match (self, literal) {
            (FieldValue::Boolean(lhs), Literal::Boolean(rhs)) => Some(lhs.cmp(rhs)),
            (FieldValue::Integer(lhs), Literal::Integer(rhs)) => Some(lhs.cmp(rhs)),
            (FieldValue::Integer(lhs), Literal::Float(rhs)) => (*lhs as f64).partial_cmp(rhs),
            (FieldValue::Float(lhs), Literal::Integer(rhs)) => lhs.partial_cmp(&(*rhs as f64)),
            (FieldValue::Float(lhs), Literal::Float(rhs)) => lhs.partial_cmp(rhs),
            (FieldValue::String(lhs), Literal::String(rhs)) => Some(lhs.as_str().cmp(rhs.as_str())),
            // Caller output often keeps numbers and flags as text.
            (FieldValue::String(lhs), Literal::Integer(rhs)) => {
                lhs.parse::<i64>().ok().map(|lhs| lhs.cmp(rhs))
            }
            (FieldValue::String(lhs), Literal::Float(rhs)) => {
                lhs.parse::<f64>().ok().and_then(|lhs| lhs.partial_cmp(rhs))
            }
            (FieldValue::String(lhs), Literal::Boolean(rhs)) => {
                let lhs = if BOOLEAN_TRUE_VALUES.contains(&lhs.as_str()) {
                    true
                } else if BOOLEAN_FALSE_VALUES.contains(&lhs.as_str()) {
                    false
                } else {
                    return None;
                };
                Some(lhs.cmp(rhs))
            }
            (FieldValue::Integer(lhs), Literal::String(rhs)) => {
                Some(lhs.to_string().as_str().cmp(rhs.as_str()))
            }
            (FieldValue::Float(lhs), Literal::String(rhs)) => {
                Some(lhs.to_string().as_str().cmp(rhs.as_str()))
            }
            (FieldValue::Integer(lhs), Literal::Boolean(rhs)) => match lhs {
                0 => Some(false.cmp(rhs)),
                1 => Some(true.cmp(rhs)),
                _ => None,
            },
            (FieldValue::Boolean(_), _) | (FieldValue::Float(_), Literal::Boolean(_)) => None,
            (FieldValue::List(_), _) => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Boolean(value) => write!(f, "{}", value),
            FieldValue::Integer(value) => write!(f, "{}", value),
            FieldValue::Float(value) => write!(f, "{}", value),
            FieldValue::String(value) => write!(f, "{}", value),
            FieldValue::List(values) => {
                write!(f, "{}", itertools::join(values.iter(), ","))
            }
        }
    }
}

/// Key/value data of a variant, allele or sample.
pub type FieldData = IndexMap<String, FieldValue>;

/// One alternate allele of a variant.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AlternateAllele {
    /// The alternate allele sequence.
    pub alt: String,
    /// Per-allele data, e.g., effect predictions.
    #[serde(default)]
    pub data: FieldData,
}

/// Variant-level data not specific to any sample, e.g., `INFO/*` of one
/// caller run.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CommonData {
    /// Label of the source, e.g., the VCF file, if any.
    #[serde(default)]
    pub source: Option<String>,
    /// The data.
    #[serde(default)]
    pub data: FieldData,
}

/// Observation of a variant in one sample.
///
/// Corresponds to `FORMAT/*` in VCF.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SampleEvidence {
    /// The sample.
    pub sample_id: SampleId,
    /// Whether the sample has a call at the variant.
    #[serde(default)]
    pub called: bool,
    /// The genotype, if applicable, e.g., "0/1" or "1/2".
    #[serde(default)]
    pub genotype: Option<String>,
    /// The per-sample data.
    #[serde(default)]
    pub data: FieldData,
}

impl SampleEvidence {
    /// Return the value of `key`; the genotype is available as `GT`.
    pub fn value(&self, key: &str) -> Option<Cow<'_, FieldValue>> {
        if key == GENOTYPE_KEY {
            if let Some(genotype) = self.genotype.as_ref() {
                return Some(Cow::Owned(FieldValue::String(genotype.clone())));
            }
        }
        self.data.get(key).map(Cow::Borrowed)
    }
}

/// A variant record as returned by the variant store.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariantRecord {
    /// Numeric identifier.
    pub id: VariantId,
    /// Stable string identifier.
    #[serde(default)]
    pub uid: String,
    /// The reference genome the variant belongs to.
    #[serde(default)]
    pub reference_genome: String,
    /// Chromosome name.
    pub chromosome: String,
    /// 1-based position.
    pub position: i64,
    /// Reference allele.
    #[serde(rename = "ref", default)]
    pub ref_allele: String,
    /// Alternate alleles, ordered by allele index.
    #[serde(default)]
    pub alternates: Vec<AlternateAllele>,
    /// Common data, one entry per caller run.
    #[serde(default)]
    pub common_data: Vec<CommonData>,
    /// Per-sample evidence.
    #[serde(default)]
    pub evidence: Vec<SampleEvidence>,
    /// UIDs of the variant sets the variant is a member of.
    #[serde(default)]
    pub variant_sets: BTreeSet<String>,
}

impl VariantRecord {
    /// Return the value of the column `key` of the variant table.
    pub fn column(&self, key: &str) -> Option<FieldValue> {
        match key {
            columns::UID => Some(FieldValue::String(self.uid.clone())),
            columns::CHROMOSOME => Some(FieldValue::String(self.chromosome.clone())),
            columns::POSITION => Some(FieldValue::Integer(self.position)),
            columns::REF => Some(FieldValue::String(self.ref_allele.clone())),
            _ => None,
        }
    }

    /// Return the ids of all samples with evidence for this variant, called or not.
    pub fn sample_ids(&self) -> BTreeSet<SampleId> {
        self.evidence
            .iter()
            .map(|evidence| evidence.sample_id.clone())
            .collect()
    }
}

/// Position range of a gene on a reference genome.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GeneRegion {
    /// Gene label, e.g., the symbol.
    pub label: String,
    /// Chromosome of the gene, if known.
    #[serde(default)]
    pub chromosome: Option<String>,
    /// Start position (inclusive).
    pub start: i64,
    /// End position (exclusive).
    pub end: i64,
}
