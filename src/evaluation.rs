//! Classification metrics computed from scored predictions.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::scoring::Scores;
use crate::visualization::plot_metrics_bar_chart;

/// Accuracy below this logs a warning.
pub const ACCURACY_WARNING_THRESHOLD: f64 = 0.9;

/// Metrics that can be requested in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Auc,
    Accuracy,
    ConfusionMatrix,
    ClassificationReport,
}

/// The requested metrics; unrequested ones stay `None` and are not written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confusion_matrix: Option<ConfusionMatrix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_report: Option<ClassificationReport>,
}

/// 2x2 confusion matrix of a binary classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t, p) {
                (0, 0) => cm.true_negative += 1,
                (0, _) => cm.false_positive += 1,
                (_, 0) => cm.false_negative += 1,
                _ => cm.true_positive += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }
}

/// Serialized column by column:
/// `{"Predicted negative": {"Actual negative": tn, "Actual positive": fn}, ...}`.
impl Serialize for ConfusionMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut columns = BTreeMap::new();
        columns.insert(
            "Predicted negative",
            BTreeMap::from([
                ("Actual negative", self.true_negative),
                ("Actual positive", self.false_negative),
            ]),
        );
        columns.insert(
            "Predicted positive",
            BTreeMap::from([
                ("Actual negative", self.false_positive),
                ("Actual positive", self.true_positive),
            ]),
        );
        columns.serialize(serializer)
    }
}

/// Precision, recall and F1 for one class or one average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class scores plus accuracy and macro / weighted averages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationReport {
    #[serde(rename = "0")]
    pub negative: ClassScores,
    #[serde(rename = "1")]
    pub positive: ClassScores,
    pub accuracy: f64,
    #[serde(rename = "macro avg")]
    pub macro_avg: ClassScores,
    #[serde(rename = "weighted avg")]
    pub weighted_avg: ClassScores,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let negative = class_scores(
            cm.true_negative,
            cm.false_negative,
            cm.false_positive,
        );
        let positive = class_scores(
            cm.true_positive,
            cm.false_positive,
            cm.false_negative,
        );
        let total = cm.total();
        let accuracy = ratio(cm.true_negative + cm.true_positive, total);

        let macro_avg = ClassScores {
            precision: (negative.precision + positive.precision) / 2.0,
            recall: (negative.recall + positive.recall) / 2.0,
            f1_score: (negative.f1_score + positive.f1_score) / 2.0,
            support: total,
        };
        let weight = |a: f64, b: f64| {
            if total == 0 {
                0.0
            } else {
                (a * negative.support as f64 + b * positive.support as f64) / total as f64
            }
        };
        let weighted_avg = ClassScores {
            precision: weight(negative.precision, positive.precision),
            recall: weight(negative.recall, positive.recall),
            f1_score: weight(negative.f1_score, positive.f1_score),
            support: total,
        };

        Self {
            negative,
            positive,
            accuracy,
            macro_avg,
            weighted_avg,
        }
    }
}

/// Scores for one class given its hits, false alarms and misses.
fn class_scores(hits: usize, false_alarms: usize, misses: usize) -> ClassScores {
    let precision = ratio(hits, hits + false_alarms);
    let recall = ratio(hits, hits + misses);
    let f1_score = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    ClassScores {
        precision,
        recall,
        f1_score,
        support: hits + misses,
    }
}

/// `num / den`, 0 when the denominator is 0.
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Fraction of predictions equal to the true label.
pub fn accuracy_score(y_true: &[u8], y_pred: &[u8]) -> Result<f64> {
    if y_true.is_empty() {
        return Err(PipelineError::Metric("accuracy of an empty score set".into()));
    }
    let hits = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(hits as f64 / y_true.len() as f64)
}

/// Area under the ROC curve, computed as the normalized Mann-Whitney U
/// statistic with tied probabilities sharing their average rank.
pub fn roc_auc_score(y_true: &[u8], y_score: &[f64]) -> Result<f64> {
    let n_pos = y_true.iter().filter(|&&y| y == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(PipelineError::Metric(
            "only one class present in y_true; ROC AUC is not defined".into(),
        ));
    }

    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| y_score[a].total_cmp(&y_score[b]));

    let mut rank_sum_pos = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && y_score[order[end]] == y_score[order[start]] {
            end += 1;
        }
        // ranks are 1-based; the tie group [start, end) shares the mean rank
        let mean_rank = (start + 1 + end) as f64 / 2.0;
        let positives = order[start..end].iter().filter(|&&i| y_true[i] == 1).count();
        rank_sum_pos += mean_rank * positives as f64;
        start = end;
    }

    let u = rank_sum_pos - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Ok(u / (n_pos * n_neg) as f64)
}

/// Compute exactly the requested metrics.
pub fn evaluate_performance(scores: &Scores, evaluation_metrics: &[Metric]) -> Result<MetricsReport> {
    debug!("Evaluating model performance.");
    let start = Instant::now();

    let y_true = scores.true_labels();
    let y_pred_proba = scores.probabilities();
    let y_pred_bin = scores.predicted_labels();
    let mut report = MetricsReport::default();

    if evaluation_metrics.contains(&Metric::Auc) {
        report.auc = Some(roc_auc_score(&y_true, &y_pred_proba)?);
    }
    if evaluation_metrics.contains(&Metric::Accuracy) {
        let accuracy = accuracy_score(&y_true, &y_pred_bin)?;
        info!("Model accuracy: {:.2}%", accuracy * 100.0);
        if accuracy < ACCURACY_WARNING_THRESHOLD {
            warn!("Model accuracy is below 90%.");
        }
        report.accuracy = Some(accuracy);
    }
    let wants_matrix = evaluation_metrics.contains(&Metric::ConfusionMatrix);
    let wants_report = evaluation_metrics.contains(&Metric::ClassificationReport);
    if wants_matrix || wants_report {
        let cm = ConfusionMatrix::from_labels(&y_true, &y_pred_bin);
        if wants_matrix {
            report.confusion_matrix = Some(cm);
        }
        if wants_report {
            report.classification_report = Some(ClassificationReport::from_confusion(&cm));
        }
    }

    debug!(
        "Model performance evaluation completed in {:.2} seconds.",
        start.elapsed().as_secs_f64()
    );
    info!("Model performance evaluation completed.");
    Ok(report)
}

/// Write the metrics as YAML, then render `metrics_bar_chart.png` next to
/// them. A chart failure is logged and does not fail the call.
pub fn save_metrics<P: AsRef<Path>>(metrics: &MetricsReport, save_path: P) -> Result<()> {
    let save_path = save_path.as_ref();
    debug!("Saving evaluation metrics to {}.", save_path.display());
    let file = File::create(save_path).map_err(|e| PipelineError::write(save_path, e))?;
    let mut writer = BufWriter::new(file);
    serde_yaml::to_writer(&mut writer, metrics).map_err(|e| {
        PipelineError::write(save_path, std::io::Error::other(e))
    })?;
    writer
        .flush()
        .map_err(|e| PipelineError::write(save_path, e))?;
    info!("Evaluation metrics saved.");

    let save_dir = save_path.parent().unwrap_or_else(|| Path::new("."));
    if let Err(e) = plot_metrics_bar_chart(metrics, save_dir) {
        warn!("Evaluation metrics bar chart not saved: {}", e);
    }
    Ok(())
}
