//! PNG charts: the evaluation metrics bar chart and per-column class histograms.

use std::path::{Path, PathBuf};

use chrono::Local;
use plotters::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::evaluation::MetricsReport;
use crate::table::{TARGET, Table};

const SKYBLUE: RGBColor = RGBColor(135, 206, 235);
const CLASS_COLORS: [RGBColor; 2] = [RGBColor(0, 133, 202), RGBColor(136, 139, 141)];
const HISTOGRAM_BINS: usize = 10;
const METRICS_Y_FLOOR: f64 = 0.8;

/// Render `metrics_bar_chart.png` under `save_dir`.
///
/// Needs accuracy (or the classification report's accuracy), AUC and the
/// classification report; the macro averages supply F1, precision and recall.
/// The y axis starts at 0.8, values below it are drawn as empty bars.
pub fn plot_metrics_bar_chart<P: AsRef<Path>>(metrics: &MetricsReport, save_dir: P) -> Result<PathBuf> {
    debug!("Creating Evaluation metrics bar chart.");
    let report = metrics
        .classification_report
        .as_ref()
        .ok_or_else(|| PipelineError::Chart("classification report not computed".into()))?;
    let auc = metrics
        .auc
        .ok_or_else(|| PipelineError::Chart("AUC not computed".into()))?;
    let accuracy = metrics.accuracy.unwrap_or(report.accuracy);

    let names = ["Accuracy", "AUC", "F1-Score", "Precision", "Recall"];
    let values = [
        accuracy,
        auc,
        report.macro_avg.f1_score,
        report.macro_avg.precision,
        report.macro_avg.recall,
    ];

    let chart_path = save_dir.as_ref().join("metrics_bar_chart.png");
    draw_bar_chart(&names, &values, &chart_path).map_err(|e| PipelineError::Chart(e.to_string()))?;
    info!("Evaluation metrics bar chart saved at: {}", chart_path.display());
    Ok(chart_path)
}

fn draw_bar_chart(
    names: &[&str],
    values: &[f64],
    output_path: &Path,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(output_path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let n = names.len() as u32;
    let mut chart = ChartBuilder::on(&root)
        .caption("Evaluation Metrics", ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d((0u32..n).into_segmented(), METRICS_Y_FLOOR..1.0f64)?;

    let label = |v: &SegmentValue<u32>| match v {
        SegmentValue::CenterOf(i) => names.get(*i as usize).map(|s| s.to_string()).unwrap_or_default(),
        _ => String::new(),
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Metrics")
        .y_desc("Value")
        .x_label_formatter(&label)
        .draw()?;

    chart.draw_series(values.iter().enumerate().map(|(i, v)| {
        let i = i as u32;
        let mut bar = Rectangle::new(
            [
                (SegmentValue::Exact(i), METRICS_Y_FLOOR),
                (SegmentValue::Exact(i + 1), v.clamp(METRICS_Y_FLOOR, 1.0)),
            ],
            SKYBLUE.filled(),
        );
        bar.set_margin(0, 0, 20, 20);
        bar
    }))?;

    root.present()?;
    Ok(())
}

/// Axis label for a column: underscores become spaces, first letter upper-cased,
/// the rest lower-cased.
pub fn axis_label(column: &str) -> String {
    let spaced = column.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Draw one two-class histogram per column of `data` into `figures_dir`,
/// named `<YYYY-MM-DD>-<column>.png`.
///
/// Figures that fail to render are logged and skipped. Returns the paths of
/// the figures that were written.
pub fn save_figures<P: AsRef<Path>>(data: &Table, figures_dir: P) -> Result<Vec<PathBuf>> {
    let figures_dir = figures_dir.as_ref();
    std::fs::create_dir_all(figures_dir).map_err(|e| PipelineError::write(figures_dir, e))?;
    let labels = data.labels(TARGET)?;
    let date = Local::now().format("%Y-%m-%d");

    let mut written = Vec::new();
    for (name, values) in data.names().iter().zip(data.columns()) {
        let path = figures_dir.join(format!("{date}-{name}.png"));
        match plot_class_histogram(values, &labels, name, &path) {
            Ok(()) => written.push(path),
            Err(e) => warn!("Figure for '{}' not saved: {}", name, e),
        }
    }
    if written.is_empty() {
        warn!("No figures saved.");
    } else {
        info!("{} figures saved to {}.", written.len(), figures_dir.display());
    }
    Ok(written)
}

/// Per-class bin counts over a shared set of equal-width bins.
fn class_counts(values: &[f64], labels: &[u8], lo: f64, width: f64) -> [[usize; HISTOGRAM_BINS]; 2] {
    let mut counts = [[0usize; HISTOGRAM_BINS]; 2];
    for (&v, &label) in values.iter().zip(labels) {
        if !v.is_finite() {
            continue;
        }
        let bin = (((v - lo) / width) as usize).min(HISTOGRAM_BINS - 1);
        counts[usize::from(label == 1)][bin] += 1;
    }
    counts
}

fn plot_class_histogram(
    values: &[f64],
    labels: &[u8],
    column: &str,
    output_path: &Path,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (mut lo, mut hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if lo > hi {
        return Err(format!("column '{column}' has no finite values").into());
    }
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / HISTOGRAM_BINS as f64;
    let counts = class_counts(values, labels, lo, width);
    let max_count = counts.iter().flatten().copied().max().unwrap_or(0).max(1);

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(lo..hi, 0f64..max_count as f64 * 1.1)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(axis_label(column))
        .y_desc("Number of observations")
        .draw()?;

    let half = width / 2.0;
    for (class, color) in CLASS_COLORS.into_iter().enumerate() {
        let bins = counts[class];
        chart
            .draw_series(bins.into_iter().enumerate().map(move |(b, count)| {
                let x0 = lo + b as f64 * width + class as f64 * half;
                Rectangle::new([(x0, 0.0), (x0 + half, count as f64)], color.filled())
            }))?
            .label(format!("class {class}"))
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }
    chart.configure_series_labels().border_style(&BLACK).draw()?;
    root.present()?;
    Ok(())
}
