//! End-to-end runs over the fixture export.

use pressdash::cli::OutputFormat;
use pressdash::config::Config;
use pressdash::filter::SearchFilter;
use pressdash::models::AggregationMode;
use pressdash::pipeline;
use pressdash::report::write_outputs;
use pressdash::timeline::TimeView;
use pressdash::DashError;
use std::path::{Path, PathBuf};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

fn fixture_config() -> Config {
    let mut config = Config::load(&fixture("pressdash.yml")).unwrap();
    config.data.input_dir = fixture("").display().to_string();
    config
}

fn run(config: &Config) -> pipeline::PipelineOutput {
    let (raw, path) = pipeline::load_data(&config.data).unwrap();
    pipeline::run(config, &raw, &path.display().to_string()).unwrap()
}

#[test]
fn test_fiscal_year_counts_by_press_type() {
    let output = run(&fixture_config());
    let report = &output.report;

    // The 1970 draft and the untitled row are dropped.
    assert_eq!(report.metadata.entities_selected, 5);
    assert_eq!(report.total.bins, vec![2015, 2016]);
    assert_eq!(report.total.values, vec![3.0, 2.0]);
    assert_eq!(
        report.aggregated.groups,
        vec![
            "CIERA Press",
            "External Press",
            "Northwestern Press (Inclusive)",
            "Other"
        ]
    );
    assert_eq!(
        report.aggregated.column("Northwestern Press (Inclusive)"),
        Some(vec![1.0, 1.0])
    );
    assert_eq!(report.aggregated.column("Other"), Some(vec![1.0, 0.0]));
}

#[test]
fn test_every_entity_has_one_label_per_recategorized_column() {
    let output = run(&fixture_config());
    let selected = &output.selected;

    for column in ["Research Topics", "Press Types"] {
        let ids = selected.column_values("id").unwrap();
        let labels = selected.column_values(column).unwrap();
        let mut seen = std::collections::HashMap::new();
        for (id, label) in ids.iter().zip(labels) {
            let first = seen.entry(id.key()).or_insert_with(|| label.key());
            assert_eq!(*first, label.key(), "id {} has two labels in {}", id, column);
        }
    }

    let topics = output
        .selected
        .column_values("Research Topics")
        .unwrap()
        .into_iter()
        .map(|v| v.key())
        .collect::<std::collections::BTreeSet<_>>();
    assert!(topics.contains("Compact Objects"));
    assert!(topics.contains("Stellar Dynamics"));
    assert!(!topics.contains("Black Holes"));
}

#[test]
fn test_sum_counts_each_entity_once() {
    let mut config = fixture_config();
    config.aggregation.mode = AggregationMode::Sum;
    config.aggregation.value_column = Some("Press Mentions".to_string());
    config.aggregation.groupby_column = Some("Research Topics".to_string());

    let output = run(&config);
    assert_eq!(output.report.total.values, vec![5.0, 6.0]);
    assert_eq!(output.report.aggregated.get(2015, "Compact Objects"), Some(3.0));
    assert_eq!(output.report.aggregated.get(2016, "Compact Objects"), Some(5.0));
}

#[test]
fn test_monthly_view_fills_the_fiscal_axis() {
    let mut config = fixture_config();
    config.aggregation.time_view = TimeView::FiscalMonths(2015);
    config.aggregation.cumulative = true;

    let output = run(&config);
    let total = &output.report.total;
    assert_eq!(total.bins, vec![9, 10, 11, 12, 1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(total.values[0], 0.0);
    assert_eq!(total.get(10), Some(1.0));
    assert_eq!(total.get(3), Some(3.0));
    assert_eq!(total.get(8), Some(3.0));
}

#[test]
fn test_unknown_tag_in_rule_is_rejected() {
    let yaml = r#"
data:
  groupings: [Research Topics, Press Types, Categories]
new_categories:
  Press Types:
    Typo: "'Northwestern Pres'"
"#;
    let mut config = Config::from_yaml_str(yaml).unwrap();
    config.data.input_dir = fixture("").display().to_string();

    let (raw, _) = pipeline::load_data(&config.data).unwrap();
    let err = pipeline::run(&config, &raw, "fixture").unwrap_err();
    assert!(matches!(err, DashError::UnknownTag { .. }));
}

#[test]
fn test_exports_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(&fixture_config());

    let written =
        write_outputs(&output.report, &output.selected, dir.path(), OutputFormat::Markdown)
            .unwrap();
    assert_eq!(written.len(), 4);

    let aggregated =
        std::fs::read_to_string(dir.path().join("aggregated.fiscal_year.id.press_types.csv"))
            .unwrap();
    let lines: Vec<&str> = aggregated.lines().collect();
    assert_eq!(
        lines[0],
        "Fiscal Year,CIERA Press,External Press,Northwestern Press (Inclusive),Other,Total"
    );
    assert_eq!(lines[1], "2015,1,0,1,1,3");
    assert_eq!(lines[2], "2016,0,1,1,0,2");

    let shares =
        std::fs::read_to_string(dir.path().join("shares.fiscal_year.id.press_types.csv")).unwrap();
    assert_eq!(shares.lines().nth(2), Some("2016,0,0.5,0.5,0,1"));

    let data = std::fs::read_to_string(dir.path().join("data.fiscal_year.id.press_types.csv"))
        .unwrap();
    assert!(data.contains("Black holes & waves"));

    let report =
        std::fs::read_to_string(dir.path().join("report.fiscal_year.id.press_types.md")).unwrap();
    assert!(report.contains("# Press Dashboard"));
}

#[test]
fn test_search_keeps_the_group_axis() {
    let unfiltered = run(&fixture_config());

    let mut config = fixture_config();
    config.filters.search = Some(SearchFilter {
        column: "Title".to_string(),
        pattern: "telescope".to_string(),
    });
    let searched = run(&config);

    assert_eq!(searched.report.aggregated.groups, unfiltered.report.aggregated.groups);
    assert_eq!(searched.report.total.bins, unfiltered.report.total.bins);
    assert_eq!(searched.report.total.values, vec![0.0, 1.0]);
    assert_eq!(searched.report.aggregated.column("Other"), Some(vec![0.0, 0.0]));
}
