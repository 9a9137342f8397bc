//! End-to-end run: fetch, structure, enrich, train, score, evaluate, upload.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::{error, info};

use crate::acquire::{RetryPolicy, acquire_data};
use crate::config::LoadedConfig;
use crate::dataset::{create_dataset, save_dataset};
use crate::error::{PipelineError, Result};
use crate::evaluation::{MetricsReport, evaluate_performance, save_metrics};
use crate::features::{generate_features, save_enriched_dataset};
use crate::logging::run_dispatch;
use crate::model_io::save_model;
use crate::models::ForestParams;
use crate::scoring::{save_scores, score_model};
use crate::store::upload_artifacts;
use crate::table::TARGET;
use crate::training::{save_data, split_data, train_model};
use crate::visualization::save_figures;

/// Exit status for a run aborted by a failed artifact write.
pub const EXIT_WRITE_FAILURE: i32 = 1;
/// Exit status for any other aborted run when non-zero exits are enabled.
pub const EXIT_STAGE_FAILURE: i32 = 2;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DirectoryCreated,
    ConfigSaved,
    DataAcquired,
    DatasetStructured,
    FeaturesGenerated,
    FiguresSaved,
    DataSplit,
    ModelTrained,
    ModelScored,
    PerformanceEvaluated,
    Uploaded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DirectoryCreated => "create run directory",
            Stage::ConfigSaved => "save configuration",
            Stage::DataAcquired => "acquire data",
            Stage::DatasetStructured => "create dataset",
            Stage::FeaturesGenerated => "generate features",
            Stage::FiguresSaved => "save figures",
            Stage::DataSplit => "split data",
            Stage::ModelTrained => "train model",
            Stage::ModelScored => "score model",
            Stage::PerformanceEvaluated => "evaluate performance",
            Stage::Uploaded => "upload artifacts",
        };
        f.write_str(name)
    }
}

/// A run aborted in `stage`.
#[derive(Debug, Error)]
#[error("pipeline stage '{stage}' failed")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

impl StageFailure {
    /// Process exit status for this failure under the configured policy.
    pub fn exit_code(&self, exit_nonzero_on_failure: bool) -> i32 {
        if self.source.is_write_failure() {
            EXIT_WRITE_FAILURE
        } else if exit_nonzero_on_failure {
            EXIT_STAGE_FAILURE
        } else {
            0
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub timestamp: String,
    pub run_dir: PathBuf,
    pub metrics: MetricsReport,
    /// URIs of uploaded artifacts; empty when uploading is disabled
    pub uploaded: Vec<String>,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure> {
        self.map_err(|source| StageFailure { stage, source })
    }
}

/// `error` followed by each of its sources, separated by `: `.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

/// Run the pipeline in a fresh directory named after the current unix time.
pub fn run(loaded: &LoadedConfig) -> std::result::Result<RunSummary, StageFailure> {
    let timestamp = Local::now().timestamp().to_string();
    run_at(loaded, &timestamp)
}

/// Run the pipeline in `<run_config.output>/<timestamp>`.
///
/// The directory must not exist yet. Once it is created, logging goes to
/// stdout and to its `pipeline.log`.
pub fn run_at(loaded: &LoadedConfig, timestamp: &str) -> std::result::Result<RunSummary, StageFailure> {
    let run_dir = loaded.config.run_config.output.join(timestamp);
    create_run_dir(&run_dir).at(Stage::DirectoryCreated)?;
    let (dispatch, log_path) = run_dispatch(&run_dir).at(Stage::DirectoryCreated)?;

    tracing::dispatcher::with_default(&dispatch, || {
        info!("========================================");
        info!("New logging session started");
        info!("========================================");
        info!("Artifacts directory: {}", run_dir.display());
        info!("Log file: {}", log_path.display());

        let outcome = run_stages(loaded, &run_dir, timestamp);
        match &outcome {
            Ok(_) => info!("Pipeline completed - logging end."),
            Err(failure) => error!(
                "Pipeline aborted while trying to {}: {}",
                failure.stage,
                error_chain(&failure.source)
            ),
        }
        outcome
    })
}

fn create_run_dir(run_dir: &Path) -> Result<()> {
    if let Some(parent) = run_dir.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::write(parent, e))?;
    }
    std::fs::create_dir(run_dir).map_err(|e| PipelineError::write(run_dir, e))
}

fn run_stages(
    loaded: &LoadedConfig,
    run_dir: &Path,
    timestamp: &str,
) -> std::result::Result<RunSummary, StageFailure> {
    let config = &loaded.config;

    let config_path = run_dir.join("config.yaml");
    std::fs::write(&config_path, &loaded.raw)
        .map_err(|e| PipelineError::write(&config_path, e))
        .at(Stage::ConfigSaved)?;
    info!("Configuration file saved to artifacts directory.");

    let raw_path = run_dir.join("clouds.data");
    let policy = RetryPolicy::from(&config.run_config.retry);
    acquire_data(&config.run_config.data_source, &raw_path, &policy).at(Stage::DataAcquired)?;
    info!("Data acquisition completed successfully.");

    let data = create_dataset(
        &raw_path,
        &config.class_ranges(),
        &config.create_dataset.columns,
    )
    .at(Stage::DatasetStructured)?;
    save_dataset(&data, run_dir.join("clouds.csv")).at(Stage::DatasetStructured)?;
    info!("Dataset creation completed successfully.");

    let features = generate_features(&data, &config.generate_features).at(Stage::FeaturesGenerated)?;
    save_enriched_dataset(&features, run_dir.join("enriched_clouds.csv"))
        .at(Stage::FeaturesGenerated)?;
    info!("Feature generation completed successfully.");

    save_figures(&features, run_dir.join("figures")).at(Stage::FiguresSaved)?;
    info!("Exploratory data analysis completed successfully.");

    let train = &config.train_model;
    let split = split_data(&features, TARGET, train.test_size, train.seed).at(Stage::DataSplit)?;

    let params = ForestParams {
        n_estimators: train.n_estimators,
        max_depth: train.max_depth,
        seed: train.seed,
    };
    let model = train_model(&split.x_train, &split.y_train, &train.selected_features, &params)
        .at(Stage::ModelTrained)?;
    save_model(&model, run_dir.join("trained_model_object.json")).at(Stage::ModelTrained)?;
    save_data(&split, TARGET, run_dir).at(Stage::ModelTrained)?;
    info!("Model training completed successfully.");

    let scores = score_model(&split.x_test, &split.y_test, &model, &train.selected_features)
        .at(Stage::ModelScored)?;
    save_scores(&scores, run_dir.join("scores.csv")).at(Stage::ModelScored)?;
    info!("Model scoring completed successfully.");

    let metrics =
        evaluate_performance(&scores, &config.evaluate_performance).at(Stage::PerformanceEvaluated)?;
    save_metrics(&metrics, run_dir.join("metrics.yaml")).at(Stage::PerformanceEvaluated)?;
    info!("Model evaluation completed successfully.");

    let uploaded = if config.aws.upload {
        let uris = upload_artifacts(run_dir, &config.aws, timestamp).at(Stage::Uploaded)?;
        info!("Artifacts successfully uploaded.");
        uris
    } else {
        info!("Artifact upload disabled.");
        Vec::new()
    };

    Ok(RunSummary {
        timestamp: timestamp.to_string(),
        run_dir: run_dir.to_path_buf(),
        metrics,
        uploaded,
    })
}
