//! Declarative feature generation.
//!
//! Each configured step names one of four transforms and the base columns it
//! applies to. Steps run in configuration order and every required column is
//! checked before the derived column is computed.

use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::config::FeatureConfig;
use crate::error::{PipelineError, Result};
use crate::table::{RawTable, Table};

/// The supported feature transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// `c_range = c_max - c_min`
    Range,
    /// `c_norm_range = (c_max - c_min) / c_mean`
    NormRange,
    /// `log_c = ln(c)`
    Log,
    /// `a_x_b = a * b` for every pair in the list
    Multiply,
}

impl FromStr for Transform {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "calculate_range" => Ok(Transform::Range),
            "calculate_norm_range" => Ok(Transform::NormRange),
            "log_transform" => Ok(Transform::Log),
            "multiply" => Ok(Transform::Multiply),
            other => Err(PipelineError::UnknownTransform {
                kind: other.to_string(),
            }),
        }
    }
}

impl Transform {
    /// Apply this transform for every column in `columns`.
    pub fn apply(self, features: &mut Table, columns: &[String]) -> Result<()> {
        match self {
            Transform::Range => {
                debug!("Calculating range features.");
                calculate_range_features(features, columns)
            }
            Transform::NormRange => {
                debug!("Calculating normalized range features.");
                calculate_normalized_range_features(features, columns)
            }
            Transform::Log => {
                debug!("Performing log transformation.");
                perform_log_transformation(features, columns)
            }
            Transform::Multiply => {
                debug!("Performing multiplication of features.");
                perform_feature_multiplication(features, columns)
            }
        }
    }
}

/// Coerce the structured dataset to floats and apply every configured step.
pub fn generate_features(data: &RawTable, config: &FeatureConfig) -> Result<Table> {
    debug!("Generating additional features from input data.");
    let mut features = data.to_numeric()?;
    apply_features(&mut features, config)?;
    info!("Feature generation completed.");
    Ok(features)
}

/// Apply every configured step to `features` in place.
///
/// Stops at the first failing step; columns added by earlier steps stay in
/// the table.
pub fn apply_features(features: &mut Table, config: &FeatureConfig) -> Result<()> {
    for step in config.steps() {
        let transform: Transform = step.kind.parse()?;
        transform.apply(features, &step.columns)?;
    }
    Ok(())
}

/// Fail with `MissingColumn` naming the first absent column.
pub fn check_columns_existence(features: &Table, columns: &[&str]) -> Result<()> {
    for column in columns {
        if !features.has_column(column) {
            let err = PipelineError::missing_column(*column);
            tracing::error!("{}", err);
            return Err(err);
        }
    }
    Ok(())
}

pub fn calculate_range_features(features: &mut Table, columns: &[String]) -> Result<()> {
    for column in columns {
        let max_col = format!("{column}_max");
        let min_col = format!("{column}_min");
        check_columns_existence(features, &[max_col.as_str(), min_col.as_str()])?;

        let range: Vec<f64> = features
            .require(&max_col)?
            .iter()
            .zip(features.require(&min_col)?)
            .map(|(max, min)| max - min)
            .collect();
        features.set_column(&format!("{column}_range"), range)?;
    }
    Ok(())
}

pub fn calculate_normalized_range_features(
    features: &mut Table,
    columns: &[String],
) -> Result<()> {
    for column in columns {
        let max_col = format!("{column}_max");
        let min_col = format!("{column}_min");
        let mean_col = format!("{column}_mean");
        check_columns_existence(
            features,
            &[max_col.as_str(), min_col.as_str(), mean_col.as_str()],
        )?;

        let norm_range = calculate_norm_range(features, &min_col, &max_col, &mean_col)?;
        features.set_column(&format!("{column}_norm_range"), norm_range)?;
    }
    Ok(())
}

/// `(max - min) / mean`, rejecting zero means and missing values.
pub fn calculate_norm_range(
    features: &Table,
    min_col: &str,
    max_col: &str,
    mean_col: &str,
) -> Result<Vec<f64>> {
    debug!("Calculating normalized range feature.");
    let min = features.require(min_col)?;
    let max = features.require(max_col)?;
    let mean = features.require(mean_col)?;

    if mean.iter().any(|&m| m == 0.0) {
        return Err(PipelineError::ZeroMean {
            column: mean_col.to_string(),
        });
    }

    let missing: Vec<String> = [(min_col, min), (max_col, max), (mean_col, mean)]
        .into_iter()
        .filter(|(_, values)| values.iter().any(|v| v.is_nan()))
        .map(|(name, _)| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::MissingValues { columns: missing });
    }

    Ok(max
        .iter()
        .zip(min)
        .zip(mean)
        .map(|((max, min), mean)| (max - min) / mean)
        .collect())
}

pub fn perform_log_transformation(features: &mut Table, columns: &[String]) -> Result<()> {
    for column in columns {
        check_columns_existence(features, &[column.as_str()])?;
        let logged: Vec<f64> = features.require(column)?.iter().map(|v| v.ln()).collect();
        features.set_column(&format!("log_{column}"), logged)?;
    }
    Ok(())
}

pub fn perform_feature_multiplication(features: &mut Table, columns: &[String]) -> Result<()> {
    for i in 0..columns.len() {
        for j in (i + 1)..columns.len() {
            let col_a = &columns[i];
            let col_b = &columns[j];
            check_columns_existence(features, &[col_a.as_str(), col_b.as_str()])?;

            let new_feature_name = format!("{col_a}_x_{col_b}");
            if features.has_column(&new_feature_name) {
                warn!(
                    "New feature '{}' already exists in the table. Will be overwritten",
                    new_feature_name
                );
            }
            let product: Vec<f64> = features
                .require(col_a)?
                .iter()
                .zip(features.require(col_b)?)
                .map(|(a, b)| a * b)
                .collect();
            features.set_column(&new_feature_name, product)?;
        }
    }
    Ok(())
}

/// Save the enriched dataset as CSV.
pub fn save_enriched_dataset<P: AsRef<Path>>(dataset: &Table, save_path: P) -> Result<()> {
    let save_path = save_path.as_ref();
    debug!("Saving enriched dataset to disk.");
    dataset.write_csv(save_path)?;
    info!("Dataset saved to {}", save_path.display());
    Ok(())
}

/// Read an enriched dataset back from CSV.
pub fn read_enriched_dataset<P: AsRef<Path>>(file_path: P) -> Result<Table> {
    Table::read_csv(file_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_enriched_dataset_reads_back() {
        let mut table = Table::from_columns(vec![
            ("IR_min", vec![1.0, 2.5, 4.0]),
            ("IR_max", vec![3.0, 7.25, 9.0]),
        ])
        .unwrap();
        let config = FeatureConfig::new()
            .step("calculate_range", &["IR"])
            .step("log_transform", &["IR_range"]);
        apply_features(&mut table, &config).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enriched_clouds.csv");
        save_enriched_dataset(&table, &path).unwrap();
        let read = read_enriched_dataset(&path).unwrap();
        assert_eq!(read.names(), table.names());
        assert_eq!(read.columns(), table.columns());
    }

    #[test]
    fn test_transform_names() {
        assert_eq!("calculate_range".parse::<Transform>().unwrap(), Transform::Range);
        assert_eq!(
            "calculate_norm_range".parse::<Transform>().unwrap(),
            Transform::NormRange
        );
        assert_eq!("log_transform".parse::<Transform>().unwrap(), Transform::Log);
        assert_eq!("multiply".parse::<Transform>().unwrap(), Transform::Multiply);
        assert!("Multiply".parse::<Transform>().is_err());
    }

    #[test]
    fn test_range() {
        let mut table =
            Table::from_columns(vec![("B_min", vec![4.0, 5.0]), ("B_max", vec![7.0, 9.0])]).unwrap();
        calculate_range_features(&mut table, &cols(&["B"])).unwrap();
        assert_eq!(table.column("B_range").unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn test_range_names_missing_column() {
        let mut table = Table::from_columns(vec![("B_min", vec![4.0])]).unwrap();
        match calculate_range_features(&mut table, &cols(&["B"])) {
            Err(PipelineError::MissingColumn { column }) => assert_eq!(column, "B_max"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!table.has_column("B_range"));
    }

    #[test]
    fn test_log_propagates_domain_errors() {
        let mut table = Table::from_columns(vec![("x", vec![1.0, 0.0, -1.0])]).unwrap();
        perform_log_transformation(&mut table, &cols(&["x"])).unwrap();
        let logged = table.column("log_x").unwrap();
        assert_eq!(logged[0], 0.0);
        assert_eq!(logged[1], f64::NEG_INFINITY);
        assert!(logged[2].is_nan());
    }

    #[test]
    fn test_multiply_every_pair() {
        let mut table = Table::from_columns(vec![
            ("a", vec![1.0, 2.0]),
            ("b", vec![3.0, 4.0]),
            ("c", vec![5.0, 6.0]),
        ])
        .unwrap();
        perform_feature_multiplication(&mut table, &cols(&["a", "b", "c"])).unwrap();
        assert_eq!(table.column("a_x_b").unwrap(), &[3.0, 8.0]);
        assert_eq!(table.column("a_x_c").unwrap(), &[5.0, 12.0]);
        assert_eq!(table.column("b_x_c").unwrap(), &[15.0, 24.0]);
        assert_eq!(table.n_cols(), 6);
    }

    #[test]
    fn test_norm_range_missing_value() {
        let table = Table::from_columns(vec![
            ("C_min", vec![10.0, f64::NAN]),
            ("C_max", vec![13.0, 14.0]),
            ("C_mean", vec![16.0, 17.0]),
        ])
        .unwrap();
        match calculate_norm_range(&table, "C_min", "C_max", "C_mean") {
            Err(PipelineError::MissingValues { columns }) => assert_eq!(columns, vec!["C_min"]),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_generate_features_coerces_text() {
        let mut raw = RawTable::new(cols(&["x_min", "x_max", "class"]));
        raw.push_row(cols(&["1", "4", "0"])).unwrap();
        raw.push_row(cols(&["2", "7", "1"])).unwrap();

        let config = FeatureConfig::new().step("calculate_range", &["x"]);
        let features = generate_features(&raw, &config).unwrap();
        assert_eq!(features.column("x_range").unwrap(), &[3.0, 5.0]);
        assert_eq!(features.column("class").unwrap(), &[0.0, 1.0]);
    }
}
