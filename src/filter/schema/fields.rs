//! Field type registry: which keys exist, how they are typed and where they
//! are stored.

use indexmap::IndexMap;

use super::query::CompareOp;

/// Declared type of a field.
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
pub enum ValueType {
    Integer,
    Float,
    String,
    Boolean,
}

impl ValueType {
    /// Whether the comparison operator `op` can be applied to values of this type.
    pub fn supports(&self, op: CompareOp) -> bool {
        match self {
            ValueType::Integer | ValueType::Float => true,
            ValueType::String | ValueType::Boolean => matches!(op, CompareOp::Eq | CompareOp::Ne),
        }
    }
}

/// Number of values of a field.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Multiplicity {
    /// One value (VCF `Number=1` and friends).
    #[default]
    Single,
    /// One value per alternate allele (VCF `Number=A`).
    PerAltAllele,
}

/// Where the values of a field live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StorageClass {
    /// Column of the variant table, answered by the store.
    Column,
    /// Per-variant common data, e.g., `INFO/*`.
    CommonData,
    /// Per-sample evidence, e.g., `FORMAT/*`.
    Evidence,
    /// Per-alternate-allele data.
    Alternate,
}

impl StorageClass {
    /// Whether conditions on the field can be pushed into the store.
    pub fn is_pushable(&self) -> bool {
        matches!(self, StorageClass::Column)
    }
}

/// Type information of one field key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldTypeInfo {
    /// The declared value type.
    pub value_type: ValueType,
    /// Single value or one per alternate allele.
    #[serde(default)]
    pub multiplicity: Multiplicity,
    /// Where the field is stored.
    pub storage: StorageClass,
}

impl FieldTypeInfo {
    /// Shortcut for a single-valued field.
    pub fn single(value_type: ValueType, storage: StorageClass) -> Self {
        Self {
            value_type,
            multiplicity: Multiplicity::Single,
            storage,
        }
    }

    /// Shortcut for a per-alternate-allele field.
    pub fn per_alt(value_type: ValueType, storage: StorageClass) -> Self {
        Self {
            value_type,
            multiplicity: Multiplicity::PerAltAllele,
            storage,
        }
    }
}

/// Lookup of `FieldTypeInfo` by field key.
pub trait FieldTypeLookup: Sync {
    /// Return the type information for `key`, if the key is known.
    fn lookup(&self, key: &str) -> Option<FieldTypeInfo>;
}

/// Names of the columns of the variant table.
pub mod columns {
    pub const UID: &str = "uid";
    pub const CHROMOSOME: &str = "chromosome";
    pub const POSITION: &str = "position";
    pub const REF: &str = "ref";
}

/// Name of the pseudo-field holding the genotype of an evidence entry.
pub const GENOTYPE_KEY: &str = "GT";

/// Mapping from field key to type information of one reference genome.
///
/// The variant table columns and the genotype pseudo-field are always
/// present; the remaining keys come from the variant caller output.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "IndexMap<String, FieldTypeInfo>", into = "IndexMap<String, FieldTypeInfo>")]
pub struct KeyMap {
    fields: IndexMap<String, FieldTypeInfo>,
}

impl Default for KeyMap {
    fn default() -> Self {
        let mut fields = IndexMap::new();
        fields.insert(
            columns::UID.to_string(),
            FieldTypeInfo::single(ValueType::String, StorageClass::Column),
        );
        fields.insert(
            columns::CHROMOSOME.to_string(),
            FieldTypeInfo::single(ValueType::String, StorageClass::Column),
        );
        fields.insert(
            columns::POSITION.to_string(),
            FieldTypeInfo::single(ValueType::Integer, StorageClass::Column),
        );
        fields.insert(
            columns::REF.to_string(),
            FieldTypeInfo::single(ValueType::String, StorageClass::Column),
        );
        fields.insert(
            GENOTYPE_KEY.to_string(),
            FieldTypeInfo::single(ValueType::String, StorageClass::Evidence),
        );
        Self { fields }
    }
}

impl From<IndexMap<String, FieldTypeInfo>> for KeyMap {
    fn from(value: IndexMap<String, FieldTypeInfo>) -> Self {
        let mut result = Self::default();
        result.fields.extend(value);
        result
    }
}

impl From<KeyMap> for IndexMap<String, FieldTypeInfo> {
    fn from(value: KeyMap) -> Self {
        value.fields
    }
}

impl KeyMap {
    /// Register `key` with the given type information, replacing any previous entry.
    pub fn insert<S: Into<String>>(&mut self, key: S, info: FieldTypeInfo) -> &mut Self {
        self.fields.insert(key.into(), info);
        self
    }

    /// Iterate over all registered keys in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldTypeInfo)> {
        self.fields.iter()
    }
}

impl FieldTypeLookup for KeyMap {
    fn lookup(&self, key: &str) -> Option<FieldTypeInfo> {
        self.fields.get(key).copied()
    }
}
