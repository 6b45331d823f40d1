//! End-to-end run: load, clean, recategorize, select, aggregate.

use crate::analysis::{aggregate_dense, views, AggregateRequest};
use crate::config::{Config, DataConfig};
use crate::data::{preprocess, Dataset};
use crate::error::Result;
use crate::models::{LabelCount, Report, ReportMetadata};
use crate::recategorize::{recategorize_dataset, RecategorizeOptions};
use crate::scanner::find_most_recent;
use crate::timeline::TimePlan;
use anyhow::Context;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub report: Report,
    /// Recategorized rows that passed every filter, exploded.
    pub selected: Dataset,
    pub plan: TimePlan,
}

/// Resolve and read the configured data file, joining the supplementary
/// table when one is configured.
pub fn load_data(data: &DataConfig) -> anyhow::Result<(Dataset, PathBuf)> {
    let input_dir = Path::new(&data.input_dir);
    let path = match data.data_file {
        Some(ref file) => PathBuf::from(file),
        None => find_most_recent(input_dir, &data.file_pattern)?,
    };

    info!("Loading data from {}", path.display());
    let mut dataset = Dataset::from_csv_path(&path)
        .with_context(|| format!("Failed to read data file: {}", path.display()))?;

    if let Some(ref pattern) = data.supplementary_file_pattern {
        let extra_path = find_most_recent(input_dir, pattern)?;
        info!("Joining supplementary data from {}", extra_path.display());
        let extra = Dataset::from_csv_path(&extra_path)
            .with_context(|| format!("Failed to read data file: {}", extra_path.display()))?;
        dataset = dataset
            .left_join(&extra, &data.id_column)
            .with_context(|| format!("Failed to join {}", extra_path.display()))?;
    }

    Ok((dataset, path))
}

/// Entities per value of `column`, most common first.
fn entities_per_label(rows: &Dataset, id_column: &str, column: &str) -> Result<Vec<LabelCount>> {
    let id_idx = rows.column_index(id_column)?;
    let idx = rows.column_index(column)?;

    let mut ids: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for row in rows.rows() {
        ids.entry(row[idx].key()).or_default().insert(row[id_idx].key());
    }

    let mut counts: Vec<LabelCount> = ids
        .into_iter()
        .map(|(label, ids)| LabelCount {
            label,
            entities: ids.len(),
        })
        .collect();
    counts.sort_by(|a, b| b.entities.cmp(&a.entities).then_with(|| a.label.cmp(&b.label)));
    Ok(counts)
}

/// Every distinct value of `column`, sorted.
fn declared_groups(rows: &Dataset, column: &str) -> Result<Vec<String>> {
    let groups: BTreeSet<String> = rows
        .column_values(column)?
        .into_iter()
        .map(|v| v.key())
        .collect();
    Ok(groups.into_iter().collect())
}

/// Run the pipeline over already-loaded raw data.
pub fn run(config: &Config, raw: &Dataset, data_source: &str) -> Result<PipelineOutput> {
    let start_time = Instant::now();
    let data = &config.data;
    let agg = &config.aggregation;

    let preprocessed = preprocess(raw, data, &config.time)?;

    let recategorized = if agg.recategorize && !config.new_categories.is_empty() {
        let options = RecategorizeOptions {
            combine_single_categories: agg.combine_single_categories,
            unknown_tags: agg.unknown_tags,
        };
        let (relabeled, results) = recategorize_dataset(
            &preprocessed,
            &data.id_column,
            &config.new_categories,
            &data.groupings,
            options,
        )?;
        for (column, labels) in results.iter() {
            info!("Recategorized '{}': {} entities", column, labels.len());
        }
        relabeled
    } else {
        debug!("Recategorization skipped");
        preprocessed.clone()
    };

    let plan = TimePlan::new(agg.time_view, &config.time, &recategorized)?;
    let selected = plan.select(&config.filters.apply(&recategorized)?)?;
    info!(
        "Selected {} of {} rows for {}",
        selected.len(),
        recategorized.len(),
        agg.time_view
    );

    let request = AggregateRequest {
        id_column: data.id_column.clone(),
        time_bin_column: plan.bin_column.clone(),
        value_column: config.value_column().to_string(),
        groupby_column: agg.groupby_column.clone(),
        mode: agg.mode,
    };
    // Groups come from the unfiltered data so the columns stay put
    // whatever the filters select.
    let group_domain: Option<Vec<String>> = match agg.groupby_column.as_deref() {
        Some(g) => Some(match config.filters.allowed(g) {
            Some(allowed) => allowed.to_vec(),
            None => declared_groups(&recategorized, g)?,
        }),
        None => None,
    };

    let (mut aggregated, mut total) = aggregate_dense(
        &selected,
        &request,
        &plan.domain.values(),
        group_domain.as_deref(),
    )?;
    if agg.cumulative {
        aggregated = views::cumulative(&aggregated);
        total = views::cumulative_total(&total);
    }

    let labels = match agg.groupby_column {
        Some(ref groupby) => entities_per_label(&selected, &data.id_column, groupby)?,
        None => Vec::new(),
    };

    let metadata = ReportMetadata {
        title: config.output.page_title.clone(),
        data_source: data_source.to_string(),
        generated_at: Utc::now(),
        rows_preprocessed: preprocessed.len(),
        rows_selected: selected.len(),
        entities_selected: selected.distinct_ids(&data.id_column)?.len(),
        time_bin_column: plan.bin_column.clone(),
        value_column: request.value_column.clone(),
        groupby_column: request.groupby_column.clone(),
        mode: agg.mode,
        cumulative: agg.cumulative,
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    Ok(PipelineOutput {
        report: Report {
            metadata,
            labels,
            aggregated,
            total,
        },
        selected,
        plan,
    })
}
