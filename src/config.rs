//! Pipeline configuration loaded from YAML, plus the command-line arguments.

use clap::Parser;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::dataset::ClassRange;
use crate::error::{PipelineError, Result};
use crate::evaluation::Metric;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "clouds_pipeline")]
#[command(about = "Acquire, clean, and create features from clouds data, then train and evaluate a classifier")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, default_value = "config/config.yaml")]
    pub config: PathBuf,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub run_config: RunConfig,
    pub create_dataset: CreateDatasetConfig,
    #[serde(default)]
    pub generate_features: FeatureConfig,
    pub train_model: TrainModelConfig,
    #[serde(default = "default_metrics")]
    pub evaluate_performance: Vec<Metric>,
    #[serde(default)]
    pub aws: AwsConfig,
}

/// Output location, data source and process-level policies.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Parent directory of the per-run artifact directories
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// URL of the raw dataset
    pub data_source: String,

    /// Exit with a failure status when a run aborts
    #[serde(default = "default_true")]
    pub exit_nonzero_on_failure: bool,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry settings for data acquisition.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_wait_seconds")]
    pub wait_seconds: f64,
    #[serde(default = "default_wait_multiple")]
    pub wait_multiple: f64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            wait_seconds: default_wait_seconds(),
            wait_multiple: default_wait_multiple(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// How raw records are sliced into the two classes.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDatasetConfig {
    pub class_indices: Vec<ClassRange>,
    pub columns: Vec<String>,
}

/// Model training parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainModelConfig {
    pub selected_features: Vec<String>,
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    /// Fixes both the split and the forest when set
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Object store settings shared by the pipeline and the prediction app.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default)]
    pub upload: bool,
    #[serde(default, alias = "s3_bucket")]
    pub bucket_name: Option<String>,
    #[serde(default, alias = "bucket_prefix")]
    pub prefix: String,
    /// Where objects live; required for uploads and model fetches.
    ///
    /// `file:///...` selects a local directory store. `http(s)://...` must be
    /// an S3-compatible gateway that accepts unauthenticated or bearer-token
    /// (`OBJECT_STORE_TOKEN`) path-style requests; requests are not SigV4
    /// signed, so a private AWS S3 bucket cannot be used directly.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model_versions: Vec<String>,
}

impl AwsConfig {
    /// The configured endpoint, or a `Config` error naming the missing key.
    pub fn endpoint(&self) -> Result<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| PipelineError::Config("aws.endpoint is not set".into()))
    }
}

/// Ordered feature-generation steps.
///
/// The YAML mapping `kind: [columns]` is kept in file order; the kinds are
/// only interpreted when the feature engine reaches each step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureConfig {
    steps: Vec<FeatureStep>,
}

/// One `kind: [columns]` entry of the feature configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStep {
    pub kind: String,
    pub columns: Vec<String>,
}

impl FeatureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, builder style.
    pub fn step(mut self, kind: &str, columns: &[&str]) -> Self {
        self.steps.push(FeatureStep {
            kind: kind.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn steps(&self) -> &[FeatureStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<'de> Deserialize<'de> for FeatureConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StepsVisitor;

        impl<'de> Visitor<'de> for StepsVisitor {
            type Value = FeatureConfig;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping from feature type to a list of columns")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(FeatureConfig::default())
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut steps = Vec::new();
                while let Some((kind, columns)) = map.next_entry::<String, Vec<String>>()? {
                    steps.push(FeatureStep { kind, columns });
                }
                Ok(FeatureConfig { steps })
            }
        }

        deserializer.deserialize_any(StepsVisitor)
    }
}

/// Parsed configuration together with the exact text it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub raw: String,
    pub config: PipelineConfig,
}

impl LoadedConfig {
    /// Read, parse and validate a YAML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| PipelineError::read(path, e))?;
        let config = PipelineConfig::from_yaml_str(&raw)?;
        Ok(Self { raw, config })
    }
}

impl PipelineConfig {
    /// Parse and validate configuration text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_yaml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.run_config.data_source.trim().is_empty() {
            return Err(PipelineError::Config("run_config.data_source is empty".into()));
        }
        let retry = &self.run_config.retry;
        if retry.attempts == 0 {
            return Err(PipelineError::Config("retry.attempts must be at least 1".into()));
        }
        for (name, value) in [
            ("wait_seconds", retry.wait_seconds),
            ("wait_multiple", retry.wait_multiple),
            ("timeout_seconds", retry.timeout_seconds),
        ] {
            if !value.is_finite() {
                return Err(PipelineError::Config(format!(
                    "retry.{name} must be a finite number, got {value}"
                )));
            }
        }
        if retry.wait_seconds < 0.0 || retry.wait_multiple < 0.0 {
            return Err(PipelineError::Config("retry waits must not be negative".into()));
        }
        if retry.timeout_seconds <= 0.0 {
            return Err(PipelineError::Config("retry.timeout_seconds must be positive".into()));
        }
        if self.aws.upload {
            self.aws.endpoint()?;
        }
        if self.create_dataset.class_indices.len() != 2 {
            return Err(PipelineError::Config(format!(
                "create_dataset.class_indices must hold exactly two ranges, got {}",
                self.create_dataset.class_indices.len()
            )));
        }
        if self.create_dataset.columns.is_empty() {
            return Err(PipelineError::Config("create_dataset.columns is empty".into()));
        }
        let train = &self.train_model;
        if train.selected_features.is_empty() {
            return Err(PipelineError::Config("train_model.selected_features is empty".into()));
        }
        if !(train.test_size > 0.0 && train.test_size < 1.0) {
            return Err(PipelineError::Config(format!(
                "train_model.test_size must be in (0, 1), got {}",
                train.test_size
            )));
        }
        if train.n_estimators == 0 || train.max_depth == 0 {
            return Err(PipelineError::Config(
                "train_model.n_estimators and max_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The two class ranges, in label order.
    pub fn class_ranges(&self) -> [ClassRange; 2] {
        [
            self.create_dataset.class_indices[0],
            self.create_dataset.class_indices[1],
        ]
    }
}

fn default_output() -> PathBuf {
    PathBuf::from("runs")
}

fn default_true() -> bool {
    true
}

fn default_attempts() -> u32 {
    4
}

fn default_wait_seconds() -> f64 {
    3.0
}

fn default_wait_multiple() -> f64 {
    2.0
}

fn default_timeout_seconds() -> f64 {
    10.0
}

fn default_n_estimators() -> usize {
    10
}

fn default_max_depth() -> usize {
    10
}

fn default_test_size() -> f64 {
    0.4
}

fn default_metrics() -> Vec<Metric> {
    vec![
        Metric::Auc,
        Metric::Accuracy,
        Metric::ConfusionMatrix,
        Metric::ClassificationReport,
    ]
}
