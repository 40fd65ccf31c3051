//! Shared test data.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use serde_json::json;

use crate::err::ExecutionError;

use super::{
    schema::{FieldTypeInfo, GeneRegion, KeyMap, StorageClass, ValueType, VariantId, VariantRecord},
    store::{Database, InMemoryStore, StorePredicate, VariantStore},
};

pub const GENOME: &str = "GRCh38";

/// `InMemoryStore` that counts its queries.
pub struct CountingStore {
    inner: InMemoryStore,
    queries: AtomicUsize,
}

impl CountingStore {
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }
}

impl VariantStore for CountingStore {
    fn query(
        &self,
        reference_genome: &str,
        predicates: &[StorePredicate],
    ) -> Result<Vec<Arc<VariantRecord>>, ExecutionError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.inner.query(reference_genome, predicates)
    }

    fn gene_region(
        &self,
        reference_genome: &str,
        label: &str,
    ) -> Result<Option<GeneRegion>, ExecutionError> {
        self.inner.gene_region(reference_genome, label)
    }

    fn fetch(
        &self,
        reference_genome: &str,
        ids: &BTreeSet<VariantId>,
    ) -> Result<Vec<Arc<VariantRecord>>, ExecutionError> {
        self.inner.fetch(reference_genome, ids)
    }
}

pub fn key_map() -> KeyMap {
    let mut result = KeyMap::default();
    result
        .insert(
            "GT_TYPE",
            FieldTypeInfo::single(ValueType::String, StorageClass::Evidence),
        )
        .insert(
            "DP",
            FieldTypeInfo::single(ValueType::Integer, StorageClass::Evidence),
        )
        .insert(
            "AD",
            FieldTypeInfo::per_alt(ValueType::Integer, StorageClass::Evidence),
        )
        .insert(
            "PASS",
            FieldTypeInfo::single(ValueType::Boolean, StorageClass::CommonData),
        )
        .insert(
            "QUAL",
            FieldTypeInfo::single(ValueType::Float, StorageClass::CommonData),
        )
        .insert(
            "EFF_IMPACT",
            FieldTypeInfo::per_alt(ValueType::String, StorageClass::Alternate),
        );
    result
}

/// Three variants on chr1 with two samples.
///
/// Sample A is called heterozygous only at 150, B is heterozygous at 50 and
/// not called at 200.
pub fn store() -> CountingStore {
    let db: Database = serde_json::from_value(json!({
        "reference_genomes": [{
            "id": GENOME,
            "genes": [{"label": "GENE1", "chromosome": "chr1", "start": 100, "end": 160}],
            "variants": [
                {
                    "id": 50, "uid": "v50", "chromosome": "chr1", "position": 50, "ref": "A",
                    "alternates": [{"alt": "G"}],
                    "common_data": [{"data": {"PASS": false, "QUAL": 10.5}}],
                    "variant_sets": ["set-1"],
                    "evidence": [
                        {"sample_id": "A", "called": true, "genotype": "0/0",
                         "data": {"GT_TYPE": "HOM_REF", "DP": 10}},
                        {"sample_id": "B", "called": true, "genotype": "0/1",
                         "data": {"GT_TYPE": "HET", "DP": 25}}
                    ]
                },
                {
                    "id": 150, "uid": "v150", "chromosome": "chr1", "position": 150, "ref": "C",
                    "alternates": [{"alt": "T"}],
                    "common_data": [{"data": {"PASS": true, "QUAL": 80.0}}],
                    "variant_sets": ["set-1"],
                    "evidence": [
                        {"sample_id": "A", "called": true, "genotype": "0/1",
                         "data": {"GT_TYPE": "HET", "DP": 30}},
                        {"sample_id": "B", "called": true, "genotype": "1/1",
                         "data": {"GT_TYPE": "HOM_ALT", "DP": 8}}
                    ]
                },
                {
                    "id": 200, "uid": "v200", "chromosome": "chr1", "position": 200, "ref": "G",
                    "alternates": [{"alt": "A"}],
                    "common_data": [{"data": {"PASS": true}}],
                    "evidence": [
                        {"sample_id": "A", "called": true, "genotype": "0/0",
                         "data": {"GT_TYPE": "HOM_REF", "DP": 22}},
                        {"sample_id": "B", "called": false, "genotype": "./.",
                         "data": {"GT_TYPE": "HET", "DP": 40}}
                    ]
                }
            ]
        }]
    }))
    .expect("invalid fixture");
    CountingStore {
        inner: InMemoryStore::try_from(db).expect("invalid fixture"),
        queries: AtomicUsize::new(0),
    }
}

/// Variant 10 with alternate alleles x (LOW impact) and y (HIGH impact).
///
/// Sample M is 1/2 with allele depths [3, 30], N is 0/1 with [12, 0] and U
/// is not called.
pub fn multi_allelic() -> VariantRecord {
    serde_json::from_value(json!({
        "id": 10, "uid": "v10", "reference_genome": GENOME,
        "chromosome": "chr2", "position": 1000, "ref": "A",
        "alternates": [
            {"alt": "x", "data": {"EFF_IMPACT": "LOW"}},
            {"alt": "y", "data": {"EFF_IMPACT": "HIGH"}}
        ],
        "common_data": [{"source": "caller.vcf", "data": {"PASS": true}}],
        "evidence": [
            {"sample_id": "M", "called": true, "genotype": "1/2",
             "data": {"DP": 25, "AD": [3, 30]}},
            {"sample_id": "N", "called": true, "genotype": "0/1",
             "data": {"DP": 15, "AD": [12, 0]}},
            {"sample_id": "U", "called": false, "genotype": "./.",
             "data": {"DP": 99, "AD": [99, 99]}}
        ]
    }))
    .expect("invalid fixture")
}
