//! Classifier used by the pipeline: a random forest of CART trees.

pub mod forest;
pub mod tree;

pub use forest::{ForestParams, RandomForest, label_from_proba};
pub use tree::{DecisionTree, Node, TreeParams};
