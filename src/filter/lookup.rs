//! Sorted and paginated lookup of the variants passing a filter.

use std::{cmp::Ordering, collections::BTreeSet, sync::Arc};

use crate::err::{FilterError, ParseError, ParseErrorKind};

use super::{
    interpreter::Evaluator,
    schema::{columns, FieldValue, SampleId, Scope, StorageClass, VariantRecord},
};

/// Direction for sorting the lookup rows.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Shape of the lookup rows.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ViewMode {
    /// One row per variant with all passing samples.
    #[default]
    Cast,
    /// One row per variant and passing sample.
    Melted,
}

/// Parameters of `lookup_variants()`.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize, derive_builder::Builder)]
#[builder(default, setter(into))]
pub struct LookupQuery {
    /// The filter expression.
    pub filter: String,
    /// The reference genome to query.
    pub reference_genome: String,
    /// Optional scope for per-sample conditions.
    #[builder(setter(into, strip_option))]
    pub scope: Option<Scope>,
    /// Column or common-data key to sort by, `position` if not given.
    #[builder(setter(into, strip_option))]
    pub sort_key: Option<String>,
    /// Sort direction.
    pub sort_direction: SortDirection,
    /// Number of rows to skip.
    pub offset: usize,
    /// Maximal number of rows to return, all if not given.
    #[builder(setter(into, strip_option))]
    pub limit: Option<usize>,
    /// Row shape.
    pub view: ViewMode,
}

/// One row of the lookup result.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VariantRow {
    /// The variant record.
    pub variant: VariantRecord,
    /// The sample of the row, melted view only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_id: Option<SampleId>,
    /// The samples for which the variant passes.
    pub passing_sample_ids: BTreeSet<SampleId>,
}

/// Result of `lookup_variants()`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct LookupVariantsResult {
    /// The requested page of rows.
    pub page: Vec<VariantRow>,
    /// Number of rows without pagination.
    pub total_count: usize,
}

/// Helper wrapper that gives `FieldValue` a total order for sorting.
///
/// Values of different types are ordered by type; missing values sort last.
#[derive(Debug, Clone, PartialEq)]
struct SortValue(Option<FieldValue>);

impl SortValue {
    fn is_missing(&self) -> bool {
        self.0.is_none()
    }

    fn rank(&self) -> u8 {
        match &self.0 {
            Some(FieldValue::Boolean(_)) => 0,
            Some(FieldValue::Integer(_)) | Some(FieldValue::Float(_)) => 1,
            Some(FieldValue::String(_)) => 2,
            Some(FieldValue::List(_)) => 3,
            None => 4,
        }
    }
}

impl Eq for SortValue {}

impl PartialOrd for SortValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortValue {
    fn cmp(&self, other: &Self) -> Ordering {
        let as_f64 = |value: &FieldValue| match value {
            FieldValue::Integer(value) => *value as f64,
            FieldValue::Float(value) => *value,
            _ => f64::NAN,
        };
        match (&self.0, &other.0) {
            (Some(FieldValue::Boolean(lhs)), Some(FieldValue::Boolean(rhs))) => lhs.cmp(rhs),
            (Some(FieldValue::Integer(lhs)), Some(FieldValue::Integer(rhs))) => lhs.cmp(rhs),
            (Some(lhs @ (FieldValue::Integer(_) | FieldValue::Float(_))), Some(rhs))
                if self.rank() == other.rank() =>
            {
                as_f64(lhs).total_cmp(&as_f64(rhs))
            }
            (Some(FieldValue::String(lhs)), Some(FieldValue::String(rhs))) => lhs.cmp(rhs),
            (Some(FieldValue::List(lhs)), Some(FieldValue::List(rhs))) => lhs
                .iter()
                .map(|value| SortValue(Some(value.clone())))
                .cmp(rhs.iter().map(|value| SortValue(Some(value.clone())))),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Where to take the sort value of a record from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SortKey {
    Column(String),
    CommonData(String),
}

impl SortKey {
    fn value(&self, record: &VariantRecord) -> SortValue {
        SortValue(match self {
            SortKey::Column(key) => record.column(key),
            SortKey::CommonData(key) => record
                .common_data
                .iter()
                .find_map(|common| common.data.get(key).cloned()),
        })
    }
}

impl<'a> Evaluator<'a> {
    /// Evaluate the query's filter and return the requested page of rows.
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` for an invalid filter or a sort key that is
    /// neither a column nor a common-data key, besides the errors of
    /// `evaluate()`.
    pub fn lookup_variants(&self, query: &LookupQuery) -> Result<LookupVariantsResult, FilterError> {
        let sort_key = self.sort_key(query.sort_key.as_deref())?;
        let result = self.evaluate(
            &query.filter,
            &query.reference_genome,
            query.scope.as_ref(),
        )?;
        let records = self
            .store
            .fetch(&query.reference_genome, &result.variant_ids)?;

        let mut keyed = Vec::new();
        for record in records {
            let passing = result
                .passing_sample_ids(record.id)
                .cloned()
                .unwrap_or_default();
            keyed.push((sort_key.value(&record), record, passing));
        }
        keyed.sort_by(|(lhs_value, lhs, _), (rhs_value, rhs, _)| {
            let by_value = match query.sort_direction {
                SortDirection::Asc => lhs_value.cmp(rhs_value),
                SortDirection::Desc => lhs_value
                    .is_missing()
                    .cmp(&rhs_value.is_missing())
                    .then(rhs_value.cmp(lhs_value)),
            };
            by_value.then(lhs.id.cmp(&rhs.id))
        });

        let rows = rows(
            keyed
                .into_iter()
                .map(|(_, record, passing)| (record, passing)),
            query.view,
        );
        let total_count = rows.len();
        let page = rows
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect::<Vec<_>>();
        tracing::debug!(
            "returning {} of {} row(s) from offset {}",
            page.len(),
            total_count,
            query.offset
        );

        Ok(LookupVariantsResult { page, total_count })
    }

    fn sort_key(&self, key: Option<&str>) -> Result<SortKey, ParseError> {
        let key = key.unwrap_or(columns::POSITION);
        match self.fields.lookup(key).map(|info| info.storage) {
            Some(StorageClass::Column) => Ok(SortKey::Column(key.to_string())),
            Some(StorageClass::CommonData) => Ok(SortKey::CommonData(key.to_string())),
            _ => Err(ParseError::new(key, ParseErrorKind::UnsupportedSortKey)),
        }
    }
}

/// Turn sorted records with passing samples into rows of the given view.
fn rows<I>(records: I, view: ViewMode) -> Vec<VariantRow>
where
    I: IntoIterator<Item = (Arc<VariantRecord>, BTreeSet<SampleId>)>,
{
    let mut result = Vec::new();
    for (record, passing) in records {
        match view {
            ViewMode::Melted if !passing.is_empty() => {
                for sample_id in &passing {
                    result.push(VariantRow {
                        variant: record.as_ref().clone(),
                        sample_id: Some(sample_id.clone()),
                        passing_sample_ids: passing.clone(),
                    });
                }
            }
            _ => result.push(VariantRow {
                variant: record.as_ref().clone(),
                sample_id: None,
                passing_sample_ids: passing,
            }),
        }
    }
    result
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::filter::fixtures;

    fn lookup(query: &LookupQuery) -> Result<LookupVariantsResult, FilterError> {
        let store = fixtures::store();
        let fields = fixtures::key_map();
        Evaluator::new(&store, &fields).lookup_variants(query)
    }

    fn page_ids(result: &LookupVariantsResult) -> Vec<(u64, Option<&str>)> {
        result
            .page
            .iter()
            .map(|row| (row.variant.id, row.sample_id.as_deref()))
            .collect()
    }

    #[rstest::rstest]
    #[case(0, Some(2), vec![50, 150])]
    #[case(1, Some(2), vec![150, 200])]
    #[case(2, Some(5), vec![200])]
    #[case(3, Some(1), vec![])]
    #[case(0, None, vec![50, 150, 200])]
    fn pagination(
        #[case] offset: usize,
        #[case] limit: Option<usize>,
        #[case] expected: Vec<u64>,
    ) -> Result<(), anyhow::Error> {
        let mut builder = LookupQueryBuilder::default();
        builder.reference_genome(fixtures::GENOME).offset(offset);
        if let Some(limit) = limit {
            builder.limit(limit);
        }
        let result = lookup(&builder.build()?)?;
        assert_eq!(result.total_count, 3);
        assert_eq!(
            result.page.iter().map(|row| row.variant.id).collect::<Vec<_>>(),
            expected
        );

        Ok(())
    }

    #[test]
    fn sort_descending_by_common_data() -> Result<(), anyhow::Error> {
        // QUAL is 10.5 at 50, 80 at 150 and missing at 200
        let query = LookupQueryBuilder::default()
            .reference_genome(fixtures::GENOME)
            .sort_key("QUAL")
            .sort_direction(SortDirection::Desc)
            .build()?;
        let result = lookup(&query)?;
        assert_eq!(
            result.page.iter().map(|row| row.variant.id).collect::<Vec<_>>(),
            vec![150, 50, 200]
        );

        Ok(())
    }

    #[test]
    fn melted_view() -> Result<(), anyhow::Error> {
        let query = LookupQueryBuilder::default()
            .filter("GT_TYPE == HET OR DP > 20 OR PASS == True")
            .reference_genome(fixtures::GENOME)
            .view(ViewMode::Melted)
            .build()?;
        let result = lookup(&query)?;
        assert_eq!(
            page_ids(&result),
            vec![
                (50, Some("B")),
                (150, Some("A")),
                (150, Some("B")),
                (200, Some("A")),
                (200, Some("B")),
            ]
        );
        assert_eq!(result.total_count, 5);

        let query = LookupQueryBuilder::default()
            .filter("GT_TYPE == HET OR DP > 20 OR PASS == True")
            .reference_genome(fixtures::GENOME)
            .view(ViewMode::Melted)
            .offset(1usize)
            .limit(2usize)
            .build()?;
        let result = lookup(&query)?;
        assert_eq!(page_ids(&result), vec![(150, Some("A")), (150, Some("B"))]);
        assert_eq!(result.total_count, 5);

        Ok(())
    }

    #[test]
    fn melted_view_without_passing_samples() {
        let record = Arc::new(VariantRecord {
            id: 1,
            ..Default::default()
        });
        let rows = rows([(record, BTreeSet::new())], ViewMode::Melted);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sample_id, None);
    }

    #[test]
    fn default_sort_key_is_position() -> Result<(), anyhow::Error> {
        let by_default = lookup(&LookupQuery {
            reference_genome: fixtures::GENOME.into(),
            ..Default::default()
        })?;
        let by_position = lookup(&LookupQuery {
            reference_genome: fixtures::GENOME.into(),
            sort_key: Some(columns::POSITION.into()),
            ..Default::default()
        })?;
        assert_eq!(page_ids(&by_default), page_ids(&by_position));
        assert_eq!(page_ids(&by_default), vec![(50, None), (150, None), (200, None)]);

        Ok(())
    }

    #[test]
    fn unsupported_sort_key() {
        let query = LookupQuery {
            reference_genome: fixtures::GENOME.into(),
            sort_key: Some("DP".into()),
            ..Default::default()
        };
        match lookup(&query) {
            Err(FilterError::Parse(e)) => {
                assert_eq!(e.kind, ParseErrorKind::UnsupportedSortKey);
                assert_eq!(e.fragment, "DP");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[rstest::rstest]
    #[case(SortValue(Some(FieldValue::Integer(2))), SortValue(Some(FieldValue::Float(2.5))), Ordering::Less)]
    #[case(SortValue(Some(FieldValue::Float(3.0))), SortValue(Some(FieldValue::Integer(2))), Ordering::Greater)]
    #[case(SortValue(Some(FieldValue::String("b".into()))), SortValue(Some(FieldValue::String("a".into()))), Ordering::Greater)]
    #[case(SortValue(Some(FieldValue::Integer(2))), SortValue(None), Ordering::Less)]
    #[case(SortValue(Some(FieldValue::Boolean(true))), SortValue(Some(FieldValue::Integer(0))), Ordering::Less)]
    fn sort_value_order(#[case] lhs: SortValue, #[case] rhs: SortValue, #[case] expected: Ordering) {
        assert_eq!(lhs.cmp(&rhs), expected);
    }
}
