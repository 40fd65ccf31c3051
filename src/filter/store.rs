//! Contract of the backing variant store and an in-memory implementation.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use crate::{common::canonicalize_chrom, err::ExecutionError};

use super::schema::{CompareOp, GeneRegion, KeyMap, Literal, VariantId, VariantRecord};

/// Predicate that the store evaluates itself.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorePredicate {
    /// Comparison on a column of the variant table.
    Compare {
        column: String,
        op: CompareOp,
        value: Literal,
    },
    /// Membership (or non-membership) in a variant set.
    InVariantSet { set_uid: String, negated: bool },
    /// Position in the half-open range `[start, end)`, on `chromosome` if given.
    Region {
        chromosome: Option<String>,
        start: i64,
        end: i64,
        negated: bool,
    },
}

impl StorePredicate {
    /// Whether `record` satisfies the predicate.
    pub fn matches(&self, record: &VariantRecord) -> bool {
        match self {
            StorePredicate::Compare { column, op, value } => record
                .column(column)
                .map(|lhs| lhs.satisfies(*op, value))
                .unwrap_or(false),
            StorePredicate::InVariantSet { set_uid, negated } => {
                record.variant_sets.contains(set_uid) != *negated
            }
            StorePredicate::Region {
                chromosome,
                start,
                end,
                negated,
            } => {
                let same_chrom = chromosome.as_ref().map_or(true, |chromosome| {
                    canonicalize_chrom(chromosome) == canonicalize_chrom(&record.chromosome)
                });
                let inside = same_chrom && *start <= record.position && record.position < *end;
                inside != *negated
            }
        }
    }
}

/// Gateway to the backing store of variant records.
///
/// All calls are restricted to one reference genome.  Implementations must
/// be usable from multiple threads as scoped sub-filters are evaluated in
/// parallel.
pub trait VariantStore: Sync {
    /// Return all records of `reference_genome` matching all `predicates`.
    ///
    /// An empty predicate list selects all records of the reference genome.
    fn query(
        &self,
        reference_genome: &str,
        predicates: &[StorePredicate],
    ) -> Result<Vec<Arc<VariantRecord>>, ExecutionError>;

    /// Resolve the gene `label` to its region, `None` if unknown.
    fn gene_region(
        &self,
        reference_genome: &str,
        label: &str,
    ) -> Result<Option<GeneRegion>, ExecutionError>;

    /// Load the records with the given `ids`, in id order.
    fn fetch(
        &self,
        reference_genome: &str,
        ids: &BTreeSet<VariantId>,
    ) -> Result<Vec<Arc<VariantRecord>>, ExecutionError>;
}

/// Serialized form of one reference genome in the JSON database.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ReferenceGenomeData {
    /// Identifier, e.g., "GRCh38".
    pub id: String,
    /// The field registry.
    #[serde(default)]
    pub fields: KeyMap,
    /// Known genes.
    #[serde(default)]
    pub genes: Vec<GeneRegion>,
    /// The variant records.
    #[serde(default)]
    pub variants: Vec<VariantRecord>,
}

/// Serialized form of the JSON database.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Database {
    pub reference_genomes: Vec<ReferenceGenomeData>,
}

#[derive(Debug, Default)]
struct ReferenceGenome {
    fields: KeyMap,
    genes: HashMap<String, GeneRegion>,
    variants: BTreeMap<VariantId, Arc<VariantRecord>>,
}

/// `VariantStore` holding all records in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    genomes: HashMap<String, ReferenceGenome>,
}

impl TryFrom<Database> for InMemoryStore {
    type Error = anyhow::Error;

    fn try_from(db: Database) -> Result<Self, Self::Error> {
        let mut genomes = HashMap::new();
        for data in db.reference_genomes {
            let mut variants = BTreeMap::new();
            for mut record in data.variants {
                if record.reference_genome.is_empty() {
                    record.reference_genome = data.id.clone();
                } else if record.reference_genome != data.id {
                    anyhow::bail!(
                        "variant {} has reference genome {:?} but is listed under {:?}",
                        record.id,
                        record.reference_genome,
                        data.id
                    );
                }
                if variants.insert(record.id, Arc::new(record)).is_some() {
                    anyhow::bail!("duplicate variant id in reference genome {:?}", data.id);
                }
            }
            let genes = data
                .genes
                .into_iter()
                .map(|gene| (gene.label.clone(), gene))
                .collect();
            let genome = ReferenceGenome {
                fields: data.fields,
                genes,
                variants,
            };
            if genomes.insert(data.id.clone(), genome).is_some() {
                anyhow::bail!("duplicate reference genome {:?}", data.id);
            }
        }
        Ok(Self { genomes })
    }
}

impl InMemoryStore {
    /// Load store from JSON read from `reader`.
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, anyhow::Error> {
        let db: Database = serde_json::from_reader(reader)
            .map_err(|e| anyhow::anyhow!("could not parse variant database: {}", e))?;
        Self::try_from(db)
    }

    /// Load store from the JSON file at `path`.
    pub fn from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self, anyhow::Error> {
        let file = std::fs::File::open(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("could not open {}: {}", path.as_ref().display(), e)
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Return the field registry of `reference_genome`.
    pub fn key_map(&self, reference_genome: &str) -> Result<&KeyMap, ExecutionError> {
        self.genome(reference_genome).map(|genome| &genome.fields)
    }

    /// Number of records of `reference_genome`.
    pub fn variant_count(&self, reference_genome: &str) -> Result<usize, ExecutionError> {
        self.genome(reference_genome).map(|genome| genome.variants.len())
    }

    fn genome(&self, reference_genome: &str) -> Result<&ReferenceGenome, ExecutionError> {
        self.genomes
            .get(reference_genome)
            .ok_or_else(|| ExecutionError::UnknownReferenceGenome(reference_genome.to_string()))
    }
}

impl VariantStore for InMemoryStore {
    fn query(
        &self,
        reference_genome: &str,
        predicates: &[StorePredicate],
    ) -> Result<Vec<Arc<VariantRecord>>, ExecutionError> {
        let genome = self.genome(reference_genome)?;
        Ok(genome
            .variants
            .values()
            .filter(|record| predicates.iter().all(|predicate| predicate.matches(record)))
            .cloned()
            .collect())
    }

    fn gene_region(
        &self,
        reference_genome: &str,
        label: &str,
    ) -> Result<Option<GeneRegion>, ExecutionError> {
        Ok(self.genome(reference_genome)?.genes.get(label).cloned())
    }

    fn fetch(
        &self,
        reference_genome: &str,
        ids: &BTreeSet<VariantId>,
    ) -> Result<Vec<Arc<VariantRecord>>, ExecutionError> {
        let genome = self.genome(reference_genome)?;
        ids.iter()
            .map(|id| {
                genome
                    .variants
                    .get(id)
                    .cloned()
                    .ok_or(ExecutionError::MissingRecord(*id))
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn record(id: VariantId, chromosome: &str, position: i64) -> VariantRecord {
        VariantRecord {
            id,
            uid: format!("v{}", id),
            chromosome: chromosome.into(),
            position,
            ref_allele: "A".into(),
            ..Default::default()
        }
    }

    #[rstest::rstest]
    #[case::inside(Some("chr1"), 100, 200, false, 150, true)]
    #[case::start_inclusive(Some("chr1"), 100, 200, false, 100, true)]
    #[case::end_exclusive(Some("chr1"), 100, 200, false, 200, false)]
    #[case::other_chrom(Some("chr2"), 100, 200, false, 150, false)]
    #[case::chrom_prefix(Some("1"), 100, 200, false, 150, true)]
    #[case::any_chrom(None, 100, 200, false, 150, true)]
    #[case::negated_inside(Some("chr1"), 100, 200, true, 150, false)]
    #[case::negated_outside(Some("chr1"), 100, 200, true, 250, true)]
    fn region_matches(
        #[case] chromosome: Option<&str>,
        #[case] start: i64,
        #[case] end: i64,
        #[case] negated: bool,
        #[case] position: i64,
        #[case] expected: bool,
    ) {
        let predicate = StorePredicate::Region {
            chromosome: chromosome.map(String::from),
            start,
            end,
            negated,
        };
        assert_eq!(predicate.matches(&record(1, "chr1", position)), expected);
    }

    #[test]
    fn variant_set_matches() {
        let mut rec = record(1, "chr1", 100);
        rec.variant_sets.insert("set-1".into());
        let in_set = StorePredicate::InVariantSet {
            set_uid: "set-1".into(),
            negated: false,
        };
        let not_in_other = StorePredicate::InVariantSet {
            set_uid: "set-2".into(),
            negated: true,
        };
        assert!(in_set.matches(&rec));
        assert!(not_in_other.matches(&rec));
        assert!(!in_set.matches(&record(2, "chr1", 100)));
    }

    #[test]
    fn in_memory_store_query() -> Result<(), anyhow::Error> {
        let store = InMemoryStore::try_from(Database {
            reference_genomes: vec![
                ReferenceGenomeData {
                    id: "GRCh38".into(),
                    variants: vec![record(1, "chr1", 50), record(2, "chr1", 150)],
                    ..Default::default()
                },
                ReferenceGenomeData {
                    id: "GRCh37".into(),
                    variants: vec![record(3, "1", 150)],
                    ..Default::default()
                },
            ],
        })?;

        let all = store.query("GRCh38", &[])?;
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(all.iter().all(|r| r.reference_genome == "GRCh38"));

        let filtered = store.query(
            "GRCh38",
            &[StorePredicate::Compare {
                column: "position".into(),
                op: CompareOp::Gt,
                value: Literal::Integer(100),
            }],
        )?;
        assert_eq!(filtered.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);

        assert!(matches!(
            store.query("hg19", &[]),
            Err(ExecutionError::UnknownReferenceGenome(_))
        ));
        assert!(matches!(
            store.fetch("GRCh38", &BTreeSet::from([3])),
            Err(ExecutionError::MissingRecord(3))
        ));

        Ok(())
    }

    #[test]
    fn in_memory_store_rejects_duplicates() {
        let result = InMemoryStore::try_from(Database {
            reference_genomes: vec![ReferenceGenomeData {
                id: "GRCh38".into(),
                variants: vec![record(1, "chr1", 50), record(1, "chr1", 150)],
                ..Default::default()
            }],
        });
        assert!(result.is_err());
    }

    #[test]
    fn store_predicate_serialize() -> Result<(), anyhow::Error> {
        let predicate = StorePredicate::Compare {
            column: "position".into(),
            op: CompareOp::Ge,
            value: Literal::Integer(100),
        };
        insta::assert_snapshot!(
            serde_json::to_string(&predicate)?,
            @r#"{"type":"compare","column":"position","op":">=","value":100}"#
        );

        Ok(())
    }
}
