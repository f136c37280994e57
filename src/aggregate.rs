//! Merge per-gene results into cross-gene tables.
//!
//! Every gene directory is read independently (in parallel); the outcomes are
//! then sorted by gene id and reduced into two wide tables:
//!
//! * a summary table, one row per gene: alignment size, branch-rate summary,
//!   optional trait summary and one column per label pair and statistic;
//! * a per-species table of leaf branch rates, one column per species seen in
//!   any included gene.
//!
//! A gene is included in both tables or in neither: if any required file is
//! missing or malformed the gene is skipped and the reason is recorded.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::data::loader::{load_relax_result, load_trait_table, read_alignment_size, AlignmentSize};
use crate::data::matrix::read_covar_file;
use crate::data::model::{GeneCovarRecord, MetadataValue, TraitTable};
use crate::data::table::AggregateTable;
use crate::error::{RecordError, RecordResult};
use crate::tree::extract::{read_branch_values, BranchValues, DEFAULT_RATE_FEATURE};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// File names expected inside every gene directory.
#[derive(Debug, Clone)]
pub struct GeneLayout {
    /// Tree annotated with per-branch rates.
    pub rate_tree: String,
    /// Matrix file with the six statistic sections.
    pub covar: String,
    /// Alignment whose first line is `<species> <sites>`.
    pub alignment: String,
    /// Per-gene trait table.
    pub traits: String,
    /// Prepared input tree; present once a run has been set up.
    pub input_tree: String,
    /// HyPhy RELAX output.
    pub relax_json: String,
}

impl Default for GeneLayout {
    fn default() -> Self {
        GeneLayout {
            rate_tree: "nodeomega_1.Omega.nhx".to_string(),
            covar: "nodeomega_1.cov".to_string(),
            alignment: "placnr.ali".to_string(),
            traits: "placnr.traits".to_string(),
            input_tree: "placnr.rootree".to_string(),
            relax_json: "placnr.fasta.RELAX.json".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateConfig {
    pub layout: GeneLayout,
    /// Annotation holding the branch rate.
    pub rate_feature: String,
    /// Rates at or above this value are counted in `nb_omega_geq1`.
    pub rate_threshold: f64,
    /// Trait column summarised per gene; `None` disables trait tables.
    pub trait_column: Option<String>,
    /// Output column counting the finite values of `trait_column`.
    pub trait_count_column: String,
    /// Single trait table used for every gene instead of the per-gene one.
    pub traits_override: Option<PathBuf>,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        AggregateConfig {
            layout: GeneLayout::default(),
            rate_feature: DEFAULT_RATE_FEATURE.to_string(),
            rate_threshold: 1.0,
            trait_column: Some("historical_Ne".to_string()),
            trait_count_column: "nb_ne".to_string(),
            traits_override: None,
        }
    }
}

/// Gene identifier column, first in both output tables.
pub const ID_COLUMN: &str = "id";

/// Leading columns of the summary table.
pub const SUMMARY_COLUMNS: [&str; 6] = [
    ID_COLUMN,
    "nb_species",
    "nb_sites",
    "nb_branches",
    "nb_omega_geq1",
    "mean_omega",
];

// ---------------------------------------------------------------------------
// Per-gene records and run report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraitSummary {
    /// Mean of the finite values; `None` if there are none.
    pub mean: Option<f64>,
    /// Number of finite values.
    pub available: usize,
}

/// Everything read for one gene.
#[derive(Debug, Clone)]
pub struct GeneRecord {
    pub id: String,
    pub alignment: AlignmentSize,
    pub rates: BranchValues,
    pub covar: GeneCovarRecord,
    /// `None` when traits are disabled or the trait column is absent.
    pub traits: Option<TraitSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedGene {
    pub id: String,
    pub kind: &'static str,
    pub reason: String,
}

/// Which genes made it into the output and why the others did not.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub processed: Vec<String>,
    pub skipped: Vec<SkippedGene>,
}

impl RunReport {
    fn record<T>(&mut self, id: &str, outcome: RecordResult<T>) -> Option<T> {
        match outcome {
            Ok(value) => {
                self.processed.push(id.to_string());
                Some(value)
            }
            Err(err) => {
                log::warn!("skipping {id}: {err}");
                self.skipped.push(SkippedGene {
                    id: id.to_string(),
                    kind: err.kind(),
                    reason: err.to_string(),
                });
                None
            }
        }
    }

    pub fn log_summary(&self) {
        log::info!(
            "{} genes processed, {} skipped",
            self.processed.len(),
            self.skipped.len()
        );
        let missing = self.skipped.iter().filter(|s| s.kind == "not_found").count();
        if missing > 0 {
            log::info!("{missing} of the skipped genes were missing a required file");
        }
    }
}

#[derive(Debug)]
pub struct Aggregation {
    pub summary: AggregateTable,
    pub species: AggregateTable,
    pub report: RunReport,
}

// ---------------------------------------------------------------------------
// Gene discovery
// ---------------------------------------------------------------------------

/// Sorted names of the non-hidden subdirectories of `root`.
pub fn discover_genes(root: &Path) -> RecordResult<Vec<String>> {
    let entries = std::fs::read_dir(root)
        .map_err(|e| RecordError::Fatal(format!("cannot list {}: {e}", root.display())))?;
    let mut genes = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| RecordError::Fatal(format!("cannot list {}: {e}", root.display())))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        genes.push(name);
    }
    genes.sort();
    Ok(genes)
}

fn sorted_unique(genes: &[String]) -> RecordResult<Vec<String>> {
    if genes.is_empty() {
        return Err(RecordError::Fatal("no genes to process".to_string()));
    }
    let mut genes = genes.to_vec();
    genes.sort();
    genes.dedup();
    Ok(genes)
}

// ---------------------------------------------------------------------------
// Reading one gene
// ---------------------------------------------------------------------------

/// Read every input of gene `id` under `root`.
///
/// `shared_traits` replaces the per-gene trait table when given.
pub fn read_gene(
    root: &Path,
    id: &str,
    config: &AggregateConfig,
    shared_traits: Option<&TraitTable>,
) -> RecordResult<GeneRecord> {
    let dir = root.join(id);
    let layout = &config.layout;

    let rate_path = dir.join(&layout.rate_tree);
    let rates = read_branch_values(&rate_path, &config.rate_feature)?;
    if rates.by_leaf.contains_key(ID_COLUMN) {
        return Err(RecordError::format(
            &rate_path,
            format!("leaf '{ID_COLUMN}' clashes with the gene id column"),
        ));
    }
    let covar = read_covar_file(&dir.join(&layout.covar))?;
    let alignment = read_alignment_size(&dir.join(&layout.alignment))?;

    let traits = match &config.trait_column {
        None => None,
        Some(column) => {
            let summary = |table: &TraitTable| {
                table.column_mean(column).map(|(mean, available)| TraitSummary { mean, available })
            };
            match shared_traits {
                Some(table) => summary(table),
                None => summary(&load_trait_table(&dir.join(&layout.traits))?),
            }
        }
    };

    log::debug!(
        "{id}: {} labels, {} annotated branches",
        covar.labels.len(),
        rates.count()
    );
    Ok(GeneRecord {
        id: id.to_string(),
        alignment,
        rates,
        covar,
        traits,
    })
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Read every gene of `genes` under `root` and build both output tables.
///
/// Per-gene failures are recorded in the report. Only an empty gene list or
/// an unreadable shared trait table abort the run.
pub fn aggregate(root: &Path, genes: &[String], config: &AggregateConfig) -> RecordResult<Aggregation> {
    let genes = sorted_unique(genes)?;

    let shared_traits = match &config.traits_override {
        Some(path) if config.trait_column.is_some() => Some(
            load_trait_table(path)
                .map_err(|e| RecordError::Fatal(format!("shared trait table: {e}")))?,
        ),
        _ => None,
    };

    log::info!("reading {} genes from {}", genes.len(), root.display());
    let outcomes: Vec<RecordResult<GeneRecord>> = genes
        .par_iter()
        .map(|id| read_gene(root, id, config, shared_traits.as_ref()))
        .collect();

    let mut report = RunReport::default();
    let records: Vec<GeneRecord> = genes
        .iter()
        .zip(outcomes)
        .filter_map(|(id, outcome)| report.record(id, outcome))
        .collect();
    report.log_summary();

    let (summary, species) = build_tables(&records, config);
    Ok(Aggregation {
        summary,
        species,
        report,
    })
}

/// Reduce records (already sorted by id) into the summary and species tables.
pub fn build_tables(records: &[GeneRecord], config: &AggregateConfig) -> (AggregateTable, AggregateTable) {
    let mut summary = AggregateTable::with_columns(SUMMARY_COLUMNS);
    let trait_columns = config
        .trait_column
        .as_ref()
        .filter(|_| records.iter().any(|r| r.traits.is_some()))
        .map(|column| (column.clone(), config.trait_count_column.clone()));
    if let Some((mean_col, count_col)) = &trait_columns {
        summary.declare(mean_col);
        summary.declare(count_col);
    }

    for rec in records {
        let mut row = vec![
            (ID_COLUMN.to_string(), MetadataValue::String(rec.id.clone())),
            ("nb_species".to_string(), MetadataValue::Integer(rec.alignment.species as i64)),
            ("nb_sites".to_string(), MetadataValue::Integer(rec.alignment.sites as i64)),
            ("nb_branches".to_string(), MetadataValue::Integer(rec.rates.count() as i64)),
            (
                "nb_omega_geq1".to_string(),
                MetadataValue::Integer(rec.rates.count_at_least(config.rate_threshold) as i64),
            ),
            ("mean_omega".to_string(), rec.rates.mean().into()),
        ];
        if let (Some((mean_col, count_col)), Some(t)) = (&trait_columns, &rec.traits) {
            row.push((mean_col.clone(), t.mean.into()));
            row.push((count_col.clone(), MetadataValue::Integer(t.available as i64)));
        }
        row.extend(
            rec.covar
                .pair_columns()
                .into_iter()
                .map(|(name, value)| (name, value.into())),
        );
        summary.push_row(row);
    }

    let all_species: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.rates.by_leaf.keys().map(String::as_str))
        .collect();
    let mut species = AggregateTable::with_columns(std::iter::once(ID_COLUMN).chain(all_species));
    for rec in records {
        let id = (ID_COLUMN.to_string(), MetadataValue::String(rec.id.clone()));
        let row = std::iter::once(id).chain(
            rec.rates
                .by_leaf
                .iter()
                .map(|(name, &value)| (name.clone(), MetadataValue::Float(value))),
        );
        species.push_row(row);
    }

    (summary, species)
}

// ---------------------------------------------------------------------------
// RELAX results
// ---------------------------------------------------------------------------

/// Table `id, LRT, p-value, k` from every gene's RELAX JSON.
pub fn aggregate_relax(
    root: &Path,
    genes: &[String],
    layout: &GeneLayout,
) -> RecordResult<(AggregateTable, RunReport)> {
    let genes = sorted_unique(genes)?;
    let outcomes: Vec<_> = genes
        .par_iter()
        .map(|id| load_relax_result(&root.join(id).join(&layout.relax_json)))
        .collect();

    let mut report = RunReport::default();
    let mut table = AggregateTable::with_columns([ID_COLUMN, "LRT", "p-value", "k"]);
    for (id, outcome) in genes.iter().zip(outcomes) {
        if let Some(test) = report.record(id, outcome) {
            table.push_row([
                (ID_COLUMN.to_string(), MetadataValue::String(id.clone())),
                ("LRT".to_string(), MetadataValue::Float(test.lrt)),
                ("p-value".to_string(), MetadataValue::Float(test.p_value)),
                ("k".to_string(), MetadataValue::Float(test.k)),
            ]);
        }
    }
    report.log_summary();
    Ok((table, report))
}

// ---------------------------------------------------------------------------
// Unfinished runs
// ---------------------------------------------------------------------------

/// Genes that have a prepared input tree but no matrix file yet.
pub fn incomplete_runs(root: &Path, genes: &[String], layout: &GeneLayout) -> Vec<String> {
    genes
        .iter()
        .filter(|id| {
            let dir = root.join(id);
            dir.join(&layout.input_tree).is_file() && !dir.join(&layout.covar).exists()
        })
        .cloned()
        .collect()
}
