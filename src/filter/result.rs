//! Filter results and the set algebra used to combine them.

use std::collections::{BTreeMap, BTreeSet};

use super::schema::{SampleId, VariantId, VariantRecord};

/// Per-variant metadata of a `FilterEvalResult`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VariantMetadata {
    /// The samples for which the variant passes the filter.
    pub passing_sample_ids: BTreeSet<SampleId>,
}

impl VariantMetadata {
    /// Construct new `VariantMetadata` from passing sample ids.
    pub fn new<I: IntoIterator<Item = SampleId>>(passing_sample_ids: I) -> Self {
        Self {
            passing_sample_ids: passing_sample_ids.into_iter().collect(),
        }
    }
}

/// Result of evaluating a filter expression.
///
/// Every id in `variant_ids` has exactly one entry in `metadata` and vice
/// versa.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FilterEvalResult {
    /// Identifiers of the passing variants.
    pub variant_ids: BTreeSet<VariantId>,
    /// Metadata of the passing variants.
    pub metadata: BTreeMap<VariantId, VariantMetadata>,
}

impl FilterEvalResult {
    /// Construct result containing `records`, each with all samples that
    /// have evidence for it as passing samples.
    pub fn seeded<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a VariantRecord>,
    {
        let mut result = Self::default();
        for record in records {
            result.insert(record.id, VariantMetadata::new(record.sample_ids()));
        }
        result
    }

    /// Add variant `id` with `metadata`, replacing previous metadata.
    pub fn insert(&mut self, id: VariantId, metadata: VariantMetadata) {
        self.variant_ids.insert(id);
        self.metadata.insert(id, metadata);
    }

    /// Remove variant `id`.
    pub fn remove(&mut self, id: VariantId) {
        self.variant_ids.remove(&id);
        self.metadata.remove(&id);
    }

    /// Passing samples of variant `id`, if part of the result.
    pub fn passing_sample_ids(&self, id: VariantId) -> Option<&BTreeSet<SampleId>> {
        self.metadata.get(&id).map(|m| &m.passing_sample_ids)
    }

    pub fn len(&self) -> usize {
        self.variant_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variant_ids.is_empty()
    }

    /// AND: ids in both, passing samples in both.
    pub fn intersect(&self, other: &Self) -> Self {
        let mut result = Self::default();
        for id in self.variant_ids.intersection(&other.variant_ids) {
            let lhs = &self.metadata[id].passing_sample_ids;
            let rhs = &other.metadata[id].passing_sample_ids;
            result.insert(*id, VariantMetadata::new(lhs.intersection(rhs).cloned()));
        }
        result
    }

    /// OR: ids in either, passing samples of both sides where both have the id.
    pub fn union(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (id, metadata) in &other.metadata {
            match result.metadata.get_mut(id) {
                Some(existing) => existing
                    .passing_sample_ids
                    .extend(metadata.passing_sample_ids.iter().cloned()),
                None => result.insert(*id, metadata.clone()),
            }
        }
        result
    }

    /// AND NOT: ids of `self` not in `other`, metadata of `self`.
    pub fn difference(&self, other: &Self) -> Self {
        let mut result = Self::default();
        for id in self.variant_ids.difference(&other.variant_ids) {
            result.insert(*id, self.metadata[id].clone());
        }
        result
    }

    /// Whether ids and metadata keys agree.
    pub fn is_consistent(&self) -> bool {
        self.variant_ids.len() == self.metadata.len()
            && self
                .variant_ids
                .iter()
                .all(|id| self.metadata.contains_key(id))
    }
}

impl std::ops::BitAnd for &FilterEvalResult {
    type Output = FilterEvalResult;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.intersect(rhs)
    }
}

impl std::ops::BitOr for &FilterEvalResult {
    type Output = FilterEvalResult;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::Sub for &FilterEvalResult {
    type Output = FilterEvalResult;

    fn sub(self, rhs: Self) -> Self::Output {
        self.difference(rhs)
    }
}
