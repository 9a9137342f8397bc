//! Cloud classification pipeline.
//!
//! Fetches the raw cloud records, labels two row ranges as classes 0 and 1,
//! derives features, trains a random forest and evaluates it on a held-out
//! split. Every run writes its artifacts to a fresh timestamped directory and
//! can publish them to an object store.
//!
//! # Modules
//!
//! - `config` - YAML configuration and CLI arguments
//! - `acquire` - Retrying HTTP fetch of the raw data
//! - `dataset` - Class ranges and the structured two-class table
//! - `features` - Configurable feature transforms
//! - `training` / `scoring` / `evaluation` - Model fit, held-out scores, metrics
//! - `visualization` - Histograms and the metrics bar chart
//! - `store` - Artifact upload and model download
//! - `pipeline` - Stage-by-stage orchestration of a run

pub mod acquire;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod logging;
pub mod model_io;
pub mod models;
pub mod pipeline;
pub mod scoring;
pub mod store;
pub mod table;
pub mod training;
pub mod visualization;

// Re-export commonly used types and functions
pub use acquire::{RetryPolicy, acquire_data, fetch};
pub use config::{Args, AwsConfig, FeatureConfig, LoadedConfig, PipelineConfig};
pub use dataset::{ClassRange, create_dataset};
pub use error::{PipelineError, Result};
pub use evaluation::{Metric, MetricsReport, evaluate_performance};
pub use features::{Transform, generate_features};
pub use model_io::{load_model, save_model};
pub use models::{ForestParams, RandomForest};
pub use pipeline::{RunSummary, Stage, StageFailure, run};
pub use scoring::{Scores, score_model};
pub use store::{FsStore, HttpStore, ObjectStore, fetch_model, store_from_endpoint, upload_artifacts};
pub use table::{RawTable, Table};
pub use training::{DataSplit, split_data, train_model};
