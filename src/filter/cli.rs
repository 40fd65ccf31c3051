//! Command line interface for the "query" and "explain" sub commands.

use std::{io::Write, str::FromStr, time::Instant};

use clap::Parser;
use csv::QuoteStyle;
use thousands::Separable;

use super::{
    interpreter::Evaluator,
    lookup::{LookupQuery, LookupVariantsResult, SortDirection, ViewMode},
    schema::{Scope, ScopeKind},
    settings::EvalSettings,
    store::InMemoryStore,
};

/// Format of the query output.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, strum::Display, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// One tab-separated line per row.
    #[default]
    Tsv,
    /// The whole result as JSON.
    Json,
}

/// Command line arguments for `query` sub command.
#[derive(Parser, Debug)]
#[command(about = "Evaluate filter expression and write matching variants", long_about = None)]
pub struct Args {
    /// Path to the JSON variant database.
    #[arg(long, required = true)]
    pub path_db: String,
    /// Reference genome to query.
    #[arg(long, required = true)]
    pub reference_genome: String,
    /// The filter expression, all variants if empty.
    #[arg(long, default_value = "")]
    pub filter: String,
    /// Optional scope for per-sample conditions, e.g., "ANY:s1,s2".
    #[arg(long)]
    pub scope: Option<String>,
    /// Column or common-data key to sort by.
    #[arg(long)]
    pub sort_key: Option<String>,
    /// Sort direction.
    #[arg(long, value_enum, default_value_t = SortDirection::Asc)]
    pub sort_direction: SortDirection,
    /// Number of rows to skip.
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
    /// Optional maximal number of rows to write.
    #[arg(long)]
    pub limit: Option<usize>,
    /// Write one row per variant or one per variant and passing sample.
    #[arg(long, value_enum, default_value_t = ViewMode::Cast)]
    pub view: ViewMode,
    /// Path to the output file.
    #[arg(long, required = true)]
    pub path_output: String,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Tsv)]
    pub output_format: OutputFormat,

    /// Maximal nesting depth of scoped sub-filters.
    #[arg(long, default_value_t = 4)]
    pub max_scope_depth: usize,
    /// Maximal number of conjunctions after normalization.
    #[arg(long, default_value_t = 1024)]
    pub max_conjunctions: usize,
    /// Maximal nesting of parentheses and negations.
    #[arg(long, default_value_t = 64)]
    pub max_nesting_depth: usize,
    /// Optional timeout for the evaluation in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// Evaluate scoped sub-filters sequentially.
    #[arg(long, default_value_t = false)]
    pub sequential: bool,
}

impl Args {
    fn settings(&self) -> EvalSettings {
        EvalSettings {
            max_scope_depth: self.max_scope_depth,
            max_conjunctions: self.max_conjunctions,
            max_nesting_depth: self.max_nesting_depth,
            parallel_scopes: !self.sequential,
            timeout: self.timeout_secs.map(std::time::Duration::from_secs),
        }
    }
}

/// Command line arguments for `explain` sub command.
#[derive(Parser, Debug)]
#[command(about = "Print compiled filter expression as JSON", long_about = None)]
pub struct ExplainArgs {
    /// Path to the JSON variant database.
    #[arg(long, required = true)]
    pub path_db: String,
    /// Reference genome to compile for.
    #[arg(long, required = true)]
    pub reference_genome: String,
    /// The filter expression.
    #[arg(long, required = true)]
    pub filter: String,
    /// Optional path to the output file, stdout if not given.
    #[arg(long)]
    pub path_output: Option<String>,
}

/// Parse scope given as "KIND:sample1,sample2".
fn parse_scope(value: &str) -> Result<Scope, anyhow::Error> {
    let (kind, samples) = value
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("scope {:?} is not of the form KIND:s1,s2", value))?;
    let kind = ScopeKind::from_str(kind.trim())
        .map_err(|_| anyhow::anyhow!("invalid scope kind {:?}, use ALL, ANY or ONLY", kind))?;
    let samples = samples
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    if samples.is_empty() {
        anyhow::bail!("scope {:?} does not name any sample", value);
    }
    Ok(Scope::new(kind, samples))
}

/// A row of the TSV output.
#[derive(Debug, Clone, serde::Serialize, derive_new::new)]
struct TsvRecord {
    uid: String,
    chromosome: String,
    position: i64,
    reference: String,
    alternative: String,
    sample_id: String,
    passing_sample_ids: String,
}

fn write_tsv(result: &LookupVariantsResult, path_output: &str) -> Result<(), anyhow::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .delimiter(b'\t')
        .quote_style(QuoteStyle::Never)
        .from_path(path_output)
        .map_err(|e| anyhow::anyhow!("cannot open {:?} for writing: {}", path_output, e))?;
    for row in &result.page {
        writer.serialize(TsvRecord::new(
            row.variant.uid.clone(),
            row.variant.chromosome.clone(),
            row.variant.position,
            row.variant.ref_allele.clone(),
            itertools::join(row.variant.alternates.iter().map(|alt| &alt.alt), ","),
            row.sample_id.clone().unwrap_or_default(),
            itertools::join(&row.passing_sample_ids, ","),
        ))?;
    }
    writer.flush()?;
    Ok(())
}

/// Main entry point for `query` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    tracing::info!("Loading variant database...");
    let before_loading = Instant::now();
    let store = InMemoryStore::from_path(&args.path_db)?;
    let key_map = store.key_map(&args.reference_genome)?;
    tracing::info!(
        "... done loading {} variants in {:?}",
        store
            .variant_count(&args.reference_genome)?
            .separate_with_commas(),
        before_loading.elapsed()
    );

    let query = LookupQuery {
        filter: args.filter.clone(),
        reference_genome: args.reference_genome.clone(),
        scope: args.scope.as_deref().map(parse_scope).transpose()?,
        sort_key: args.sort_key.clone(),
        sort_direction: args.sort_direction,
        offset: args.offset,
        limit: args.limit,
        view: args.view,
    };

    tracing::info!("Running query...");
    let before_query = Instant::now();
    let evaluator = Evaluator::new(&store, key_map).with_settings(args.settings());
    let result = evaluator.lookup_variants(&query)?;
    tracing::info!(
        "... done running query in {:?}: writing {} of {} rows",
        before_query.elapsed(),
        result.page.len().separate_with_commas(),
        result.total_count.separate_with_commas()
    );

    match args.output_format {
        OutputFormat::Tsv => write_tsv(&result, &args.path_output)?,
        OutputFormat::Json => {
            let file = std::fs::File::create(&args.path_output).map_err(|e| {
                anyhow::anyhow!("cannot open {:?} for writing: {}", &args.path_output, e)
            })?;
            serde_json::to_writer_pretty(std::io::BufWriter::new(file), &result)?;
        }
    }

    tracing::info!(
        "All of `query` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

/// Main entry point for `explain` sub command.
pub fn run_explain(args_common: &crate::common::Args, args: &ExplainArgs) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let store = InMemoryStore::from_path(&args.path_db)?;
    let key_map = store.key_map(&args.reference_genome)?;
    let program = Evaluator::new(&store, key_map).compile(&args.filter, &args.reference_genome)?;

    let json = serde_json::to_string_pretty(&program)?;
    match &args.path_output {
        Some(path_output) => std::fs::write(path_output, json + "\n")?,
        None => writeln!(std::io::stdout(), "{}", json)?,
    }

    Ok(())
}
