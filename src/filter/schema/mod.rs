//! Data structures for filter expressions and the variant records they are
//! evaluated against.

pub mod data;
pub mod fields;
pub mod query;

pub use data::{
    AlternateAllele, CommonData, FieldData, FieldValue, GeneRegion, SampleEvidence, SampleId,
    VariantId, VariantRecord,
};
pub use fields::{
    columns, FieldTypeInfo, FieldTypeLookup, KeyMap, Multiplicity, StorageClass, ValueType,
};
pub use query::{CompareOp, ConditionTriple, Literal, Scope, ScopeKind};
