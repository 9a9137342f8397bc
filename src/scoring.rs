//! Held-out scoring of a trained model.

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::{RandomForest, label_from_proba};
use crate::table::Table;

/// One scored test row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub true_labels: u8,
    pub predicted_probabilities: f64,
    pub predicted_labels: u8,
}

/// Scored predictions for the whole test set, in test-set order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scores {
    pub rows: Vec<Score>,
}

impl Scores {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn true_labels(&self) -> Vec<u8> {
        self.rows.iter().map(|s| s.true_labels).collect()
    }

    pub fn probabilities(&self) -> Vec<f64> {
        self.rows.iter().map(|s| s.predicted_probabilities).collect()
    }

    pub fn predicted_labels(&self) -> Vec<u8> {
        self.rows.iter().map(|s| s.predicted_labels).collect()
    }
}

/// Score `test` with `model` using the same feature subset it was trained on.
pub fn score_model(
    test: &Table,
    y_test: &[u8],
    model: &RandomForest,
    initial_features: &[String],
) -> Result<Scores> {
    debug!("Scoring the model on the test set.");
    if y_test.len() != test.n_rows() {
        return Err(PipelineError::Model(format!(
            "{} labels for {} test rows",
            y_test.len(),
            test.n_rows()
        )));
    }
    let start = Instant::now();
    let x = test.select(initial_features)?;
    let probabilities = model.predict_proba(&x)?;
    let rows = y_test
        .iter()
        .zip(probabilities)
        .map(|(&true_label, proba)| Score {
            true_labels: true_label,
            predicted_probabilities: proba,
            predicted_labels: label_from_proba(proba),
        })
        .collect();

    info!("Scoring completed.");
    debug!(
        "Scoring completed in {:.2} seconds.",
        start.elapsed().as_secs_f64()
    );
    Ok(Scores { rows })
}

/// Save the scores as CSV.
pub fn save_scores<P: AsRef<Path>>(scores: &Scores, save_path: P) -> Result<()> {
    let save_path = save_path.as_ref();
    debug!("Saving model scores to {}.", save_path.display());
    let mut writer = csv::Writer::from_path(save_path)
        .map_err(|e| PipelineError::write(save_path, e.into()))?;
    for row in &scores.rows {
        writer
            .serialize(row)
            .map_err(|e| PipelineError::write(save_path, e.into()))?;
    }
    writer
        .flush()
        .map_err(|e| PipelineError::write(save_path, e))?;
    info!("Scores saved.");
    Ok(())
}

/// Read scores written by [`save_scores`].
pub fn read_scores<P: AsRef<Path>>(scores_path: P) -> Result<Scores> {
    let scores_path = scores_path.as_ref();
    debug!("Reading model scores from {}.", scores_path.display());
    let mut reader = csv::Reader::from_path(scores_path)
        .map_err(|e| PipelineError::read(scores_path, e.into()))?;
    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<Score>, csv::Error>>()
        .map_err(|e| PipelineError::parse(scores_path.display().to_string(), e))?;
    info!("Scores read.");
    Ok(Scores { rows })
}
