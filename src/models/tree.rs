use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Node of a binary classification tree, stored in a flat arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        /// Share of class-1 samples that reached this leaf
        positive_fraction: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    /// Features drawn as split candidates at each node
    pub max_features: usize,
    pub min_samples_split: usize,
}

/// CART tree grown on Gini impurity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl DecisionTree {
    /// Grow a tree on the rows of `x` listed in `sample` (duplicates allowed).
    ///
    /// `x` is row-major and every row has the same length.
    pub fn fit<R: Rng>(
        x: &[Vec<f64>],
        y: &[u8],
        sample: Vec<usize>,
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let mut tree = DecisionTree { nodes: Vec::new() };
        let n_features = x.first().map_or(0, |row| row.len());
        tree.grow(x, y, sample, 0, n_features, params, rng);
        tree
    }

    /// Probability of class 1 for a single row.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf {
                    positive_fraction, ..
                } => return *positive_fraction,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Longest root-to-leaf path, counted in splits.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }

    #[allow(clippy::too_many_arguments)]
    fn grow<R: Rng>(
        &mut self,
        x: &[Vec<f64>],
        y: &[u8],
        sample: Vec<usize>,
        depth: usize,
        n_features: usize,
        params: &TreeParams,
        rng: &mut R,
    ) -> usize {
        let idx = self.nodes.len();
        let positives = sample.iter().filter(|&&i| y[i] == 1).count();
        let leaf = Node::Leaf {
            positive_fraction: if sample.is_empty() {
                0.0
            } else {
                positives as f64 / sample.len() as f64
            },
            n_samples: sample.len(),
        };
        self.nodes.push(leaf);

        let pure = positives == 0 || positives == sample.len();
        if pure || depth >= params.max_depth || sample.len() < params.min_samples_split {
            return idx;
        }

        let Some(best) = best_split(x, y, &sample, n_features, params.max_features, rng) else {
            return idx;
        };

        let (left_sample, right_sample): (Vec<usize>, Vec<usize>) = sample
            .into_iter()
            .partition(|&i| x[i][best.feature] <= best.threshold);

        let left = self.grow(x, y, left_sample, depth + 1, n_features, params, rng);
        let right = self.grow(x, y, right_sample, depth + 1, n_features, params, rng);
        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        idx
    }
}

/// Binary Gini impurity for `positives` out of `total`.
fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

/// Lowest weighted-impurity split over a random subset of features.
///
/// At least `max_features` features are examined; the search keeps going
/// through the remaining features until one admits a valid split.
fn best_split<R: Rng>(
    x: &[Vec<f64>],
    y: &[u8],
    sample: &[usize],
    n_features: usize,
    max_features: usize,
    rng: &mut R,
) -> Option<BestSplit> {
    let mut candidates: Vec<usize> = (0..n_features).collect();
    candidates.shuffle(rng);

    let total = sample.len();
    if total < 2 {
        return None;
    }
    let total_positives = sample.iter().filter(|&&i| y[i] == 1).count();
    let mut best: Option<BestSplit> = None;

    for (evaluated, &feature) in candidates.iter().enumerate() {
        if evaluated >= max_features && best.is_some() {
            break;
        }

        let mut order = sample.to_vec();
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_positives = 0;
        for k in 0..total - 1 {
            if y[order[k]] == 1 {
                left_positives += 1;
            }
            let here = x[order[k]][feature];
            let next = x[order[k + 1]][feature];
            if here.is_nan() || next.is_nan() || here >= next {
                continue;
            }

            let n_left = k + 1;
            let n_right = total - n_left;
            let impurity = (n_left as f64 * gini(left_positives, n_left)
                + n_right as f64 * gini(total_positives - left_positives, n_right))
                / total as f64;

            if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                let mut threshold = here + (next - here) / 2.0;
                if threshold >= next {
                    threshold = here;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
    }
    best
}
