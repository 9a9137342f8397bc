//! In-memory tables and their CSV representation.
//!
//! `RawTable` holds the text cells produced by the dataset structurer;
//! `Table` holds named `f64` columns once the feature engine has coerced them.
//! Missing cells are NaN.

use std::path::Path;

use crate::error::{PipelineError, Result};

/// Name of the label column.
pub const TARGET: &str = "class";

/// Row-major table of text cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row; short rows are padded with empty (missing) cells.
    pub fn push_row(&mut self, mut row: Vec<String>) -> Result<()> {
        if row.len() > self.columns.len() {
            return Err(PipelineError::parse(
                "row",
                format!(
                    "{} values for {} columns",
                    row.len(),
                    self.columns.len()
                ),
            ));
        }
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Text of column `name`, top to bottom.
    pub fn column_values(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Coerce every cell to `f64`.
    pub fn to_numeric(&self) -> Result<Table> {
        let mut table = Table::new();
        for (idx, name) in self.columns.iter().enumerate() {
            let values = self
                .rows
                .iter()
                .map(|row| {
                    parse_cell(&row[idx]).ok_or_else(|| PipelineError::TypeConversion {
                        column: name.clone(),
                        value: row[idx].clone(),
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            table.push_column(name.clone(), values)?;
        }
        if self.columns.is_empty() {
            table.n_rows = self.rows.len();
        }
        Ok(table)
    }

    /// Write the table as CSV with a header row.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer =
            csv::Writer::from_path(path).map_err(|e| PipelineError::write(path, e.into()))?;
        writer
            .write_record(&self.columns)
            .map_err(|e| PipelineError::write(path, e.into()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| PipelineError::write(path, e.into()))?;
        }
        writer.flush().map_err(|e| PipelineError::write(path, e))
    }

    /// Read a CSV file with a header row.
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path).map_err(|e| csv_read_error(path, e))?;
        let columns = reader
            .headers()
            .map_err(|e| csv_read_error(path, e))?
            .iter()
            .map(String::from)
            .collect();
        let mut table = RawTable::new(columns);
        for record in reader.records() {
            let record = record.map_err(|e| csv_read_error(path, e))?;
            table.push_row(record.iter().map(String::from).collect())?;
        }
        Ok(table)
    }
}

/// Column-major table of named `f64` columns.
#[derive(Debug, Clone, Default)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    n_rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, values)` pairs of equal length.
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Vec<f64>)>) -> Result<Self> {
        let mut table = Table::new();
        for (name, values) in columns {
            table.push_column(name.into(), values)?;
        }
        Ok(table)
    }

    fn push_column(&mut self, name: String, values: Vec<f64>) -> Result<()> {
        if self.names.is_empty() {
            self.n_rows = values.len();
        } else if values.len() != self.n_rows {
            return Err(PipelineError::InvalidInput(format!(
                "column '{}' has {} rows, table has {}",
                name,
                values.len(),
                self.n_rows
            )));
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Column values in the same order as [`Table::names`].
    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// Like [`Table::column`] but fails with `MissingColumn`.
    pub fn require(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .ok_or_else(|| PipelineError::missing_column(name))
    }

    /// Insert a column or replace an existing one of the same name.
    ///
    /// Returns `true` when an existing column was overwritten.
    pub fn set_column(&mut self, name: &str, values: Vec<f64>) -> Result<bool> {
        if let Some(idx) = self.names.iter().position(|n| n == name) {
            if values.len() != self.n_rows {
                return Err(PipelineError::InvalidInput(format!(
                    "column '{}' has {} rows, table has {}",
                    name,
                    values.len(),
                    self.n_rows
                )));
            }
            self.columns[idx] = values;
            Ok(true)
        } else {
            self.push_column(name.to_string(), values)?;
            Ok(false)
        }
    }

    /// New table holding `names`, in that order.
    pub fn select(&self, names: &[String]) -> Result<Table> {
        let mut table = Table::new();
        for name in names {
            table.push_column(name.clone(), self.require(name)?.to_vec())?;
        }
        Ok(table)
    }

    /// New table without column `name` (no-op when absent).
    pub fn without(&self, name: &str) -> Table {
        let mut table = Table {
            n_rows: self.n_rows,
            ..Table::default()
        };
        for (n, values) in self.names.iter().zip(&self.columns) {
            if n != name {
                table.names.push(n.clone());
                table.columns.push(values.clone());
            }
        }
        table
    }

    /// New table holding the given rows, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        Table {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| indices.iter().map(|&i| col[i]).collect())
                .collect(),
            n_rows: indices.len(),
        }
    }

    /// Values of row `idx` across all columns.
    pub fn row(&self, idx: usize) -> Vec<f64> {
        self.columns.iter().map(|col| col[idx]).collect()
    }

    /// Binary labels read from column `name`; every value must be 0 or 1.
    pub fn labels(&self, name: &str) -> Result<Vec<u8>> {
        self.require(name)?
            .iter()
            .map(|&v| {
                if v == 0.0 {
                    Ok(0)
                } else if v == 1.0 {
                    Ok(1)
                } else {
                    Err(PipelineError::InvalidInput(format!(
                        "label column '{name}' holds non-binary value {v}"
                    )))
                }
            })
            .collect()
    }

    /// Write the table as CSV with a header row.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer =
            csv::Writer::from_path(path).map_err(|e| PipelineError::write(path, e.into()))?;
        writer
            .write_record(&self.names)
            .map_err(|e| PipelineError::write(path, e.into()))?;
        for r in 0..self.n_rows {
            writer
                .write_record(self.columns.iter().map(|col| format_cell(col[r])))
                .map_err(|e| PipelineError::write(path, e.into()))?;
        }
        writer.flush().map_err(|e| PipelineError::write(path, e))
    }

    /// Read a numeric CSV file; empty cells become NaN.
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        RawTable::read_csv(path)?
            .to_numeric()
            .map_err(|e| match e {
                PipelineError::TypeConversion { column, value } => PipelineError::parse(
                    path.display().to_string(),
                    format!("non-numeric value '{value}' in column '{column}'"),
                ),
                other => other,
            })
    }
}

/// Write a single named column of labels as CSV.
pub fn write_labels<P: AsRef<Path>>(path: P, name: &str, labels: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let mut writer =
        csv::Writer::from_path(path).map_err(|e| PipelineError::write(path, e.into()))?;
    writer
        .write_record([name])
        .map_err(|e| PipelineError::write(path, e.into()))?;
    for label in labels {
        writer
            .write_record([label.to_string()])
            .map_err(|e| PipelineError::write(path, e.into()))?;
    }
    writer.flush().map_err(|e| PipelineError::write(path, e))
}

fn parse_cell(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(f64::NAN);
    }
    cell.parse::<f64>().ok()
}

fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

fn csv_read_error(path: &Path, e: csv::Error) -> PipelineError {
    if e.is_io_error() {
        PipelineError::read(path, e.into())
    } else {
        PipelineError::parse(path.display().to_string(), e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn raw(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        let mut table = RawTable::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table
                .push_row(row.iter().map(|c| c.to_string()).collect())
                .unwrap();
        }
        table
    }

    #[test]
    fn test_to_numeric() {
        let table = raw(&["a", "b"], &[&["1", " 2.5"], &["-3", ""]]);
        let numeric = table.to_numeric().unwrap();
        assert_eq!(numeric.n_rows(), 2);
        assert_eq!(numeric.column("a").unwrap(), &[1.0, -3.0]);
        let b = numeric.column("b").unwrap();
        assert_eq!(b[0], 2.5);
        assert!(b[1].is_nan());
    }

    #[test]
    fn test_to_numeric_rejects_text() {
        let table = raw(&["a"], &[&["1"], &["cloudy"]]);
        match table.to_numeric() {
            Err(PipelineError::TypeConversion { column, value }) => {
                assert_eq!(column, "a");
                assert_eq!(value, "cloudy");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_push_row_pads_and_rejects() {
        let mut table = RawTable::new(vec!["a".into(), "b".into()]);
        table.push_row(vec!["1".into()]).unwrap();
        assert_eq!(table.rows()[0], vec!["1".to_string(), String::new()]);
        assert!(table
            .push_row(vec!["1".into(), "2".into(), "3".into()])
            .is_err());
    }

    #[test]
    fn test_set_column_reports_overwrite() {
        let mut table = Table::from_columns(vec![("a", vec![1.0, 2.0])]).unwrap();
        assert!(!table.set_column("b", vec![3.0, 4.0]).unwrap());
        assert!(table.set_column("a", vec![5.0, 6.0]).unwrap());
        assert_eq!(table.names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(table.column("a").unwrap(), &[5.0, 6.0]);
        assert!(table.set_column("c", vec![1.0]).is_err());
    }

    #[test]
    fn test_select_take_without() {
        let table = Table::from_columns(vec![
            ("a", vec![1.0, 2.0, 3.0]),
            ("b", vec![4.0, 5.0, 6.0]),
            ("class", vec![0.0, 1.0, 1.0]),
        ])
        .unwrap();

        let picked = table.take_rows(&[2, 0]).select(&["b".to_string()]).unwrap();
        assert_eq!(picked.column("b").unwrap(), &[6.0, 4.0]);

        let features = table.without(TARGET);
        assert_eq!(features.n_cols(), 2);
        assert_eq!(features.n_rows(), 3);
        assert_eq!(table.labels(TARGET).unwrap(), vec![0, 1, 1]);

        assert!(matches!(
            table.select(&["zzz".to_string()]),
            Err(PipelineError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_csv_preserves_values_and_missing_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.csv");
        let table = Table::from_columns(vec![
            ("x", vec![0.1875, f64::NAN]),
            ("class", vec![0.0, 1.0]),
        ])
        .unwrap();
        table.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "x,class\n0.1875,0\n,1\n");

        let back = Table::read_csv(&path).unwrap();
        assert_eq!(back.column("x").unwrap()[0], 0.1875);
        assert!(back.column("x").unwrap()[1].is_nan());
    }

    #[test]
    fn test_write_into_missing_directory_is_write_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope").join("table.csv");
        let table = raw(&["a"], &[&["1"]]);
        assert!(table.write_csv(&path).unwrap_err().is_write_failure());
    }
}
