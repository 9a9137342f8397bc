//! Whole-run tests against a local data server and a local object store.

mod common;

use std::fs;
use std::path::Path;

use clouds_pipeline::config::{LoadedConfig, PipelineConfig};
use clouds_pipeline::pipeline::{EXIT_STAGE_FAILURE, Stage, run_at};
use clouds_pipeline::scoring::read_scores;
use clouds_pipeline::store::{FsStore, fetch_model};
use clouds_pipeline::table::TARGET;
use clouds_pipeline::{PipelineError, Table};
use common::{raw_records, serve};

fn config_text(data_source: &str, output: &Path, store: &Path, attempts: u32, exit_nonzero: bool) -> String {
    format!(
        r#"
run_config:
  name: pipeline-test
  data_source: {data_source}
  output: {output}
  exit_nonzero_on_failure: {exit_nonzero}
  retry:
    attempts: {attempts}
    wait_seconds: 0
    wait_multiple: 2
    timeout_seconds: 5
create_dataset:
  class_indices: [[0, 10], [10, 20]]
  columns: [visible_mean, IR_mean, IR_max, IR_min]
generate_features:
  calculate_range: [IR]
  calculate_norm_range: [IR]
  log_transform: [visible_mean]
  multiply: [visible_mean, IR_mean]
train_model:
  selected_features: [log_visible_mean, IR_norm_range, visible_mean_x_IR_mean]
  n_estimators: 5
  max_depth: 3
  test_size: 0.4
  seed: 7
evaluate_performance: [auc, accuracy, confusion_matrix, classification_report]
aws:
  upload: true
  bucket_name: clouds
  prefix: experiments
  endpoint: file://{store}
"#,
        output = output.display(),
        store = store.display(),
    )
}

fn load(text: String) -> LoadedConfig {
    let config = PipelineConfig::from_yaml_str(&text).unwrap();
    LoadedConfig { raw: text, config }
}

#[test]
fn test_full_run_writes_every_artifact() {
    let server = serve(vec![(200, raw_records(20, 4).into_bytes())]);
    let work = tempfile::tempdir().unwrap();
    let output = work.path().join("runs");
    let store_root = work.path().join("store");
    let loaded = load(config_text(&server.url, &output, &store_root, 2, true));

    let summary = run_at(&loaded, "1700000000").unwrap();
    let run_dir = output.join("1700000000");
    assert_eq!(summary.run_dir, run_dir);

    for name in [
        "config.yaml",
        "clouds.data",
        "clouds.csv",
        "enriched_clouds.csv",
        "trained_model_object.json",
        "X_train.csv",
        "X_test.csv",
        "y_train.csv",
        "y_test.csv",
        "scores.csv",
        "metrics.yaml",
        "pipeline.log",
    ] {
        assert!(run_dir.join(name).is_file(), "{name} missing");
    }
    assert!(run_dir.join("metrics_bar_chart.png").is_file());

    // one histogram per enriched column, class included
    let figures: Vec<String> = fs::read_dir(run_dir.join("figures"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(figures.len(), 9, "{figures:?}");
    assert!(figures.iter().all(|name| name.ends_with(".png")));
    assert!(figures.iter().any(|name| name.ends_with("-IR_norm_range.png")));
    assert!(figures.iter().any(|name| name.ends_with("-class.png")));

    // configuration is kept verbatim
    assert_eq!(fs::read_to_string(run_dir.join("config.yaml")).unwrap(), loaded.raw);

    // structured rows: ten of class 0 then ten of class 1
    let structured = Table::read_csv(run_dir.join("clouds.csv")).unwrap();
    let labels = structured.labels(TARGET).unwrap();
    assert_eq!(labels, [vec![0u8; 10], vec![1u8; 10]].concat());

    let enriched = Table::read_csv(run_dir.join("enriched_clouds.csv")).unwrap();
    for column in ["IR_range", "IR_norm_range", "log_visible_mean", "visible_mean_x_IR_mean"] {
        assert!(enriched.has_column(column), "{column} missing");
    }

    let scores = read_scores(run_dir.join("scores.csv")).unwrap();
    assert_eq!(scores.len(), 8);

    let metrics = fs::read_to_string(run_dir.join("metrics.yaml")).unwrap();
    for key in ["auc", "accuracy", "confusion_matrix", "classification_report", "macro avg"] {
        assert!(metrics.contains(key), "{key} missing from metrics");
    }
    assert!(summary.metrics.auc.is_some());

    let log = fs::read_to_string(run_dir.join("pipeline.log")).unwrap();
    assert!(log.contains("New logging session started"));

    // every artifact was published and the model can be fetched back
    assert!(!summary.uploaded.is_empty());
    let store = FsStore::new(&store_root);
    let model = fetch_model(
        &store,
        "clouds",
        "experiments",
        "1700000000/trained_model_object.json",
    )
    .unwrap();
    assert_eq!(model.features, loaded.config.train_model.selected_features);
}

#[test]
fn test_failed_fetch_aborts_run() {
    let server = serve(vec![(500, Vec::new())]);
    let work = tempfile::tempdir().unwrap();
    let output = work.path().join("runs");
    let loaded = load(config_text(&server.url, &output, work.path(), 2, true));

    let failure = run_at(&loaded, "1").unwrap_err();
    assert_eq!(failure.stage, Stage::DataAcquired);
    assert!(matches!(failure.source, PipelineError::FetchExhausted { attempts: 2, .. }));
    assert_eq!(failure.exit_code(true), EXIT_STAGE_FAILURE);
    assert_eq!(failure.exit_code(false), 0);
    assert_eq!(server.hits(), 2);

    // earlier stages left their artifacts, later ones never ran
    let run_dir = output.join("1");
    assert!(run_dir.join("config.yaml").is_file());
    assert!(!run_dir.join("clouds.csv").exists());
    let log = fs::read_to_string(run_dir.join("pipeline.log")).unwrap();
    assert!(log.contains("Pipeline aborted while trying to acquire data"));
}

#[test]
fn test_existing_run_directory_is_a_write_failure() {
    let server = serve(vec![(200, raw_records(20, 4).into_bytes())]);
    let work = tempfile::tempdir().unwrap();
    let output = work.path().join("runs");
    fs::create_dir_all(output.join("42")).unwrap();
    let loaded = load(config_text(&server.url, &output, work.path(), 1, false));

    let failure = run_at(&loaded, "42").unwrap_err();
    assert_eq!(failure.stage, Stage::DirectoryCreated);
    assert_eq!(failure.exit_code(false), 1);
    assert_eq!(server.hits(), 0);
}
