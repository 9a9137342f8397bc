//! Train/test split and random-forest training.

use std::path::Path;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::model_io::load_model;
use crate::models::{ForestParams, RandomForest};
use crate::table::{Table, write_labels};

/// Training time above which a warning is logged.
pub const TRAINING_TIME_THRESHOLD: Duration = Duration::from_secs(60);

/// Training and test data split
#[derive(Debug, Clone)]
pub struct DataSplit {
    pub x_train: Table,
    pub x_test: Table,
    pub y_train: Vec<u8>,
    pub y_test: Vec<u8>,
}

/// Shuffle the rows once and hold out `ceil(n * test_size)` of them.
///
/// The feature tables exclude the `target` column. Pass a seed to make the
/// split repeatable.
pub fn split_data(
    features: &Table,
    target: &str,
    test_size: f64,
    seed: Option<u64>,
) -> Result<DataSplit> {
    debug!("Splitting data into training and testing sets.");
    debug!("Test size: {}.", test_size);
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::InvalidInput(format!(
            "test size must be in (0, 1), got {test_size}"
        )));
    }

    let labels = features.labels(target)?;
    let n = features.n_rows();
    let n_test = (n as f64 * test_size).ceil() as usize;
    if n < 2 || n_test >= n {
        return Err(PipelineError::InvalidInput(format!(
            "cannot split {n} rows with test size {test_size}"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    indices.shuffle(&mut rng);
    let (test_idx, train_idx) = indices.split_at(n_test);

    let x = features.without(target);
    let split = DataSplit {
        x_train: x.take_rows(train_idx),
        x_test: x.take_rows(test_idx),
        y_train: train_idx.iter().map(|&i| labels[i]).collect(),
        y_test: test_idx.iter().map(|&i| labels[i]).collect(),
    };
    info!("Data split completed.");
    Ok(split)
}

/// Fit a random forest on `initial_features` only.
pub fn train_model(
    x_train: &Table,
    y_train: &[u8],
    initial_features: &[String],
    params: &ForestParams,
) -> Result<RandomForest> {
    debug!("Training random forest classifier.");
    let start = Instant::now();
    let x = x_train.select(initial_features)?;
    let model = RandomForest::fit(&x, y_train, params)?;
    let elapsed = start.elapsed();

    info!("Training completed.");
    debug!("Training completed in {:.2} seconds.", elapsed.as_secs_f64());
    debug!(
        "Model specifications - n_estimators: {}, max_depth: {}.",
        params.n_estimators, params.max_depth
    );

    if elapsed > TRAINING_TIME_THRESHOLD {
        warn!("Training time exceeded threshold.");
    }
    if x_train.n_rows() < params.max_depth * 10 {
        warn!("Training size is very small compared to the depth of the model.");
    }
    Ok(model)
}

/// Save the train and test datasets as `X_train.csv`, `X_test.csv`,
/// `y_train.csv` and `y_test.csv` under `artifacts_dir`.
pub fn save_data<P: AsRef<Path>>(split: &DataSplit, target: &str, artifacts_dir: P) -> Result<()> {
    let dir = artifacts_dir.as_ref();
    debug!("Saving train and test datasets to disk.");
    split.x_train.write_csv(dir.join("X_train.csv"))?;
    split.x_test.write_csv(dir.join("X_test.csv"))?;
    write_labels(dir.join("y_train.csv"), target, &split.y_train)?;
    write_labels(dir.join("y_test.csv"), target, &split.y_test)?;
    info!("Train and test datasets saved.");
    Ok(())
}

/// Read a trained model and the saved train/test feature tables.
pub fn read_model_and_data<P: AsRef<Path>>(
    model_path: P,
    train_data_path: P,
    test_data_path: P,
) -> Result<(RandomForest, Table, Table)> {
    info!("Reading trained model and data from disk.");
    let model = load_model(model_path)?;
    info!("Trained model loaded.");
    let train = Table::read_csv(train_data_path)?;
    let test = Table::read_csv(test_data_path)?;
    info!("Training and testing data loaded.");
    Ok((model, train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TARGET;

    fn dataset(n: usize) -> Table {
        Table::from_columns(vec![
            ("f", (0..n).map(|i| i as f64).collect::<Vec<_>>()),
            ("g", (0..n).map(|i| (i % 3) as f64).collect::<Vec<_>>()),
            (TARGET, (0..n).map(|i| (i >= n / 2) as u8 as f64).collect::<Vec<_>>()),
        ])
        .unwrap()
    }

    #[test]
    fn test_split_sizes() {
        let split = split_data(&dataset(10), TARGET, 0.4, None).unwrap();
        assert_eq!(split.x_test.n_rows(), 4);
        assert_eq!(split.x_train.n_rows(), 6);
        assert_eq!(split.y_test.len(), 4);
        assert_eq!(split.y_train.len(), 6);
        assert!(!split.x_train.has_column(TARGET));

        // labels stay aligned with their rows
        for (i, &label) in split.y_train.iter().enumerate() {
            let f = split.x_train.column("f").unwrap()[i];
            assert_eq!(label, u8::from(f >= 5.0));
        }
    }

    #[test]
    fn test_split_rounds_test_size_up() {
        let split = split_data(&dataset(11), TARGET, 0.4, Some(1)).unwrap();
        assert_eq!(split.x_test.n_rows(), 5);
    }

    #[test]
    fn test_seeded_split_is_repeatable() {
        let a = split_data(&dataset(30), TARGET, 0.4, Some(3)).unwrap();
        let b = split_data(&dataset(30), TARGET, 0.4, Some(3)).unwrap();
        assert_eq!(a.y_test, b.y_test);
        assert_eq!(a.x_test.column("f"), b.x_test.column("f"));
    }

    #[test]
    fn test_split_rejects_bad_sizes() {
        assert!(split_data(&dataset(10), TARGET, 0.0, None).is_err());
        assert!(split_data(&dataset(1), TARGET, 0.4, None).is_err());
        assert!(split_data(&dataset(10), "label", 0.4, None).is_err());
    }

    #[test]
    fn test_train_uses_selected_features() {
        let split = split_data(&dataset(40), TARGET, 0.25, Some(2)).unwrap();
        let params = ForestParams {
            seed: Some(2),
            ..ForestParams::default()
        };
        let model = train_model(&split.x_train, &split.y_train, &["f".to_string()], &params).unwrap();
        assert_eq!(model.features, vec!["f".to_string()]);

        let missing = train_model(&split.x_train, &split.y_train, &["h".to_string()], &params);
        assert!(matches!(missing, Err(PipelineError::MissingColumn { .. })));
    }

    #[test]
    fn test_save_data_writes_four_files() {
        let dir = tempfile::tempdir().unwrap();
        let split = split_data(&dataset(10), TARGET, 0.4, Some(0)).unwrap();
        save_data(&split, TARGET, dir.path()).unwrap();
        for name in ["X_train.csv", "X_test.csv", "y_train.csv", "y_test.csv"] {
            assert!(dir.path().join(name).is_file(), "{name} missing");
        }
        let y_test = std::fs::read_to_string(dir.path().join("y_test.csv")).unwrap();
        assert_eq!(y_test.lines().count(), 5);
        assert_eq!(y_test.lines().next(), Some("class"));
    }

    #[test]
    fn test_model_and_data_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let split = split_data(&dataset(20), TARGET, 0.4, Some(5)).unwrap();
        let params = ForestParams {
            n_estimators: 3,
            max_depth: 3,
            seed: Some(5),
        };
        let features = vec!["f".to_string(), "g".to_string()];
        let model = train_model(&split.x_train, &split.y_train, &features, &params).unwrap();
        save_data(&split, TARGET, dir.path()).unwrap();
        let model_path = dir.path().join("trained_model_object.json");
        crate::model_io::save_model(&model, &model_path).unwrap();

        let (loaded, train, test) = read_model_and_data(
            model_path,
            dir.path().join("X_train.csv"),
            dir.path().join("X_test.csv"),
        )
        .unwrap();
        assert_eq!(loaded.features, features);
        assert_eq!(train.columns(), split.x_train.columns());
        assert_eq!(test.columns(), split.x_test.columns());
        assert_eq!(loaded.predict(&test).unwrap(), model.predict(&split.x_test).unwrap());
    }
}
