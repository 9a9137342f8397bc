use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, TreeParams};
use crate::error::{PipelineError, Result};
use crate::table::Table;

/// Hyper-parameters of a [`RandomForest`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    /// Seed for bootstrapping and feature sampling; entropy when `None`
    pub seed: Option<u64>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 10,
            max_depth: 10,
            seed: None,
        }
    }
}

/// Bagged ensemble of Gini trees for a binary target.
///
/// Each tree sees a bootstrap sample and `floor(sqrt(n_features))` candidate
/// features per split; the ensemble probability is the mean of the tree
/// probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    /// Feature names, in the column order the trees index into
    pub features: Vec<String>,
    pub n_estimators: usize,
    pub max_depth: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit on every column of `x` against binary labels `y`.
    pub fn fit(x: &Table, y: &[u8], params: &ForestParams) -> Result<Self> {
        let n = x.n_rows();
        if n == 0 {
            return Err(PipelineError::Model("cannot train on an empty dataset".into()));
        }
        if y.len() != n {
            return Err(PipelineError::Model(format!(
                "{} labels for {} training rows",
                y.len(),
                n
            )));
        }
        if x.n_cols() == 0 {
            return Err(PipelineError::Model("no features to train on".into()));
        }
        if params.n_estimators == 0 {
            return Err(PipelineError::Model("n_estimators must be at least 1".into()));
        }

        let rows: Vec<Vec<f64>> = (0..n).map(|i| x.row(i)).collect();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            max_features: ((x.n_cols() as f64).sqrt() as usize).max(1),
            min_samples_split: 2,
        };
        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let trees = (0..params.n_estimators)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(&rows, y, bootstrap, &tree_params, &mut rng)
            })
            .collect();

        Ok(RandomForest {
            features: x.names().to_vec(),
            n_estimators: params.n_estimators,
            max_depth: params.max_depth,
            trees,
        })
    }

    /// Probability of class 1 for one row given in `features` order.
    pub fn predict_proba_row(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.features.len() {
            return Err(PipelineError::Model(format!(
                "expected {} feature values, got {}",
                self.features.len(),
                row.len()
            )));
        }
        let total: f64 = self.trees.iter().map(|t| t.predict_proba(row)).sum();
        Ok(total / self.trees.len() as f64)
    }

    /// Probability of class 1 for every row; columns are looked up by name.
    pub fn predict_proba(&self, x: &Table) -> Result<Vec<f64>> {
        let x = x.select(&self.features)?;
        (0..x.n_rows())
            .map(|i| self.predict_proba_row(&x.row(i)))
            .collect()
    }

    /// Binary predictions; ties go to class 0.
    pub fn predict(&self, x: &Table) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(label_from_proba)
            .collect())
    }

    /// Binary prediction for one row given in `features` order.
    pub fn predict_one(&self, row: &[f64]) -> Result<u8> {
        self.predict_proba_row(row).map(label_from_proba)
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}

/// Class 1 when its probability is strictly above one half.
pub fn label_from_proba(proba: f64) -> u8 {
    u8::from(proba > 0.5)
}
