//! Error type shared by every pipeline stage.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Everything that can abort a pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller supplied something unusable (bad URL scheme, bad class range...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Every fetch attempt failed; `source` is the error of the last one.
    #[error("failed to acquire data from {url} after {attempts} attempts")]
    FetchExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client could not be built; no request was sent.
    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),

    /// Persisting an artifact failed. The binary treats this as fatal.
    #[error("failed to write '{}'", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading an artifact back from disk failed.
    #[error("failed to read '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV or raw record.
    #[error("error parsing '{context}': {message}")]
    ParseFailure { context: String, message: String },

    /// Configuration file could not be parsed or failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A cell could not be coerced to a float.
    #[error("cannot convert value '{value}' in column '{column}' to float")]
    TypeConversion { column: String, value: String },

    #[error("column '{column}' required for feature calculation is missing")]
    MissingColumn { column: String },

    #[error("invalid feature type: {kind}")]
    UnknownTransform { kind: String },

    #[error("column '{column}' has zero mean value")]
    ZeroMean { column: String },

    #[error("one or more columns have missing values: {}", columns.join(", "))]
    MissingValues { columns: Vec<String> },

    /// Training or prediction could not proceed.
    #[error("model error: {0}")]
    Model(String),

    /// A metric is undefined for the given scores.
    #[error("metric error: {0}")]
    Metric(String),

    /// Chart rendering failed.
    #[error("chart error: {0}")]
    Chart(String),

    /// Remote store unreachable or misconfigured.
    #[error("upload failed: {0}")]
    Upload(String),
}

impl PipelineError {
    /// Wrap an I/O error raised while writing `path`.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailure {
            path: path.into(),
            source,
        }
    }

    /// Wrap an I/O error raised while reading `path`.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(context: impl Into<String>, message: impl ToString) -> Self {
        Self::ParseFailure {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    /// Whether this error must terminate the process with a failure status
    /// regardless of the configured exit policy.
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Self::WriteFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = PipelineError::missing_column("C_mean");
        assert!(err.to_string().contains("C_mean"));

        let err = PipelineError::UnknownTransform {
            kind: "square".to_string(),
        };
        assert!(err.to_string().contains("square"));

        let err = PipelineError::MissingValues {
            columns: vec!["C_min".to_string(), "C_max".to_string()],
        };
        assert!(err.to_string().contains("C_min, C_max"));
    }

    #[test]
    fn test_write_failure_detection() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(PipelineError::write("out.csv", io).is_write_failure());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(!PipelineError::read("in.csv", io).is_write_failure());
    }
}
