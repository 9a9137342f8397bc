//! Turns the raw whitespace-delimited record file into a labeled table.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::table::{RawTable, TARGET};

/// Half-open record range `[start, end)` assigned to one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "(usize, usize)")]
pub struct ClassRange {
    pub start: usize,
    pub end: usize,
}

impl From<(usize, usize)> for ClassRange {
    fn from((start, end): (usize, usize)) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for ClassRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl ClassRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn overlaps(&self, other: &ClassRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }
}

/// Check both ranges against the record count and each other.
pub fn validate_ranges(ranges: &[ClassRange; 2], n_records: usize) -> Result<()> {
    for (label, range) in ranges.iter().enumerate() {
        if range.start > range.end {
            return Err(PipelineError::InvalidInput(format!(
                "class {label} range {range} starts after it ends"
            )));
        }
        if range.end > n_records {
            return Err(PipelineError::InvalidInput(format!(
                "class {label} range {range} exceeds the {n_records} records available"
            )));
        }
    }
    if ranges[0].overlaps(&ranges[1]) {
        return Err(PipelineError::InvalidInput(format!(
            "class ranges {} and {} overlap",
            ranges[0], ranges[1]
        )));
    }
    Ok(())
}

/// Split every line on whitespace, dropping empty tokens.
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .map(|line| line.split_whitespace().map(String::from).collect())
        .collect()
}

/// Build the two-class table from the raw record file.
///
/// Rows of `class_ranges[0]` are labeled 0 and precede the rows of
/// `class_ranges[1]`, labeled 1. Tokens map positionally onto `columns`.
pub fn create_dataset<P: AsRef<Path>>(
    file_path: P,
    class_ranges: &[ClassRange; 2],
    columns: &[String],
) -> Result<RawTable> {
    let file_path = file_path.as_ref();
    debug!("Creating dataset from file: {}", file_path.display());
    debug!("Columns used: {:?}", columns);

    let text =
        std::fs::read_to_string(file_path).map_err(|e| PipelineError::read(file_path, e))?;
    let records = parse_records(&text);
    validate_ranges(class_ranges, records.len())?;

    let mut header = columns.to_vec();
    header.push(TARGET.to_string());
    let mut table = RawTable::new(header);

    for (label, range) in class_ranges.iter().enumerate() {
        for (offset, record) in records[range.start..range.end].iter().enumerate() {
            if record.len() > columns.len() {
                return Err(PipelineError::parse(
                    file_path.display().to_string(),
                    format!(
                        "record {} has {} values for {} columns",
                        range.start + offset,
                        record.len(),
                        columns.len()
                    ),
                ));
            }
            let mut row = record.clone();
            row.resize(columns.len(), String::new());
            row.push(label.to_string());
            table.push_row(row)?;
        }
    }

    info!("Dataset created.");
    debug!(
        "Dataset created. Size: ({}, {})",
        table.n_rows(),
        table.columns().len()
    );
    debug!("Class 0 count: {}", class_ranges[0].len());
    debug!("Class 1 count: {}", class_ranges[1].len());
    if table.is_empty() {
        warn!("The created dataset is empty.");
    }
    Ok(table)
}

/// Save the structured dataset as CSV.
pub fn save_dataset<P: AsRef<Path>>(dataset: &RawTable, save_path: P) -> Result<()> {
    let save_path = save_path.as_ref();
    debug!("Saving dataset to path: {}", save_path.display());
    dataset.write_csv(save_path)?;
    info!("Dataset saved successfully.");
    Ok(())
}

/// Read a structured dataset back from CSV.
pub fn read_dataset<P: AsRef<Path>>(file_path: P) -> Result<RawTable> {
    RawTable::read_csv(file_path)
}
