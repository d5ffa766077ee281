//! Small in-memory tabular layer shared by every report.
//!
//! Cells are dynamically typed the way warehouse extracts and vendor
//! spreadsheets actually arrive: a column nominally numeric will contain
//! "$1,234.56", "(500.00)" and blanks, a date column will mix ISO and US
//! formats. Coercion is therefore lenient and failure is per-cell, never
//! per-frame.

use crate::error::{ReportError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;

/// A single spreadsheet-shaped value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Lenient numeric coercion: accepts ints/floats directly and text with
    /// currency symbols, thousands separators, and accounting-style
    /// parenthesized negatives.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            Cell::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                let negative = trimmed.starts_with('(') && trimmed.ends_with(')');
                let cleaned: String = trimmed
                    .chars()
                    .filter(|c| !matches!(c, '$' | ',' | '(' | ')' | ' '))
                    .collect();
                cleaned.parse::<f64>().ok().map(|v| if negative { -v } else { v })
            }
            _ => None,
        }
    }

    /// Lenient date coercion: date/datetime cells directly, text in ISO or
    /// US formats, and datetime text truncated to its date part.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(d) => Some(*d),
            Cell::DateTime(dt) => Some(dt.date()),
            Cell::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"] {
                    if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
                        return Some(d);
                    }
                }
                for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"] {
                    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
                        return Some(dt.date());
                    }
                }
                None
            }
            _ => None,
        }
    }

    /// Display form used for CSV output and text comparison.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Bool(b) => b.to_string(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", *f as i64)
                } else {
                    format!("{}", f)
                }
            }
            Cell::Text(s) => s.clone(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<NaiveDate> for Cell {
    fn from(d: NaiveDate) -> Self {
        Cell::Date(d)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Cell::Empty,
        }
    }
}

/// How to join two frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeHow {
    Inner,
    Left,
}

/// A named-column table of cells.
#[derive(Debug, Clone)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Frame {
    pub fn new<S: Into<String>>(columns: Vec<S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Appends a row, rejecting arity mismatches.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(ReportError::DataQuality {
                message: format!(
                    "row has {} cells but frame has {} columns",
                    row.len(),
                    self.columns.len()
                ),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Cell at (row, column name); None when either is out of range.
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Hash join on the named key columns.
    ///
    /// Semantics follow the dataframe convention: one output row per right
    /// match (one-to-many fan-out), left join fills missing right sides with
    /// `Empty`, and right-side non-key columns that collide with a left
    /// column name are suffixed `_rhs`. Key columns appear once.
    pub fn merge(&self, other: &Frame, on: &[&str], how: MergeHow) -> Result<Frame> {
        let left_keys: Vec<usize> = on
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| ReportError::MissingField(format!("merge key '{}' (left)", name)))
            })
            .collect::<Result<_>>()?;
        let right_keys: Vec<usize> = on
            .iter()
            .map(|name| {
                other.column_index(name).ok_or_else(|| {
                    ReportError::MissingField(format!("merge key '{}' (right)", name))
                })
            })
            .collect::<Result<_>>()?;

        // Right-side columns carried into the output (keys excluded).
        let mut right_carry: Vec<(usize, String)> = Vec::new();
        for (idx, name) in other.columns.iter().enumerate() {
            if right_keys.contains(&idx) {
                continue;
            }
            let out_name = if self.columns.contains(name) {
                format!("{}_rhs", name)
            } else {
                name.clone()
            };
            right_carry.push((idx, out_name));
        }

        let mut out_columns = self.columns.clone();
        out_columns.extend(right_carry.iter().map(|(_, n)| n.clone()));
        let mut out = Frame::new(out_columns);

        // Index the right side by key text.
        let mut index: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
        for (row_idx, row) in other.rows.iter().enumerate() {
            let key: Vec<String> = right_keys.iter().map(|&k| row[k].as_text()).collect();
            index.entry(key).or_default().push(row_idx);
        }

        for left_row in &self.rows {
            let key: Vec<String> = left_keys.iter().map(|&k| left_row[k].as_text()).collect();
            match index.get(&key) {
                Some(matches) => {
                    for &right_idx in matches {
                        let right_row = &other.rows[right_idx];
                        let mut row = left_row.clone();
                        row.extend(right_carry.iter().map(|(idx, _)| right_row[*idx].clone()));
                        out.push_row(row)?;
                    }
                }
                None => {
                    if how == MergeHow::Left {
                        let mut row = left_row.clone();
                        row.extend(right_carry.iter().map(|_| Cell::Empty));
                        out.push_row(row)?;
                    }
                }
            }
        }

        Ok(out)
    }

    /// Coerces a column to floats in place. Cells that fail coercion become
    /// `Empty`; returns how many failed.
    pub fn coerce_numeric(&mut self, column: &str) -> Result<usize> {
        let col = self
            .column_index(column)
            .ok_or_else(|| ReportError::MissingField(format!("column '{}'", column)))?;
        let mut failures = 0;
        for row in &mut self.rows {
            if row[col].is_empty() {
                row[col] = Cell::Empty;
                continue;
            }
            match row[col].as_f64() {
                Some(v) => row[col] = Cell::Float(v),
                None => {
                    row[col] = Cell::Empty;
                    failures += 1;
                }
            }
        }
        Ok(failures)
    }

    /// Coerces a column to dates in place. Cells that fail coercion become
    /// `Empty`; returns how many failed.
    pub fn coerce_dates(&mut self, column: &str) -> Result<usize> {
        let col = self
            .column_index(column)
            .ok_or_else(|| ReportError::MissingField(format!("column '{}'", column)))?;
        let mut failures = 0;
        for row in &mut self.rows {
            if row[col].is_empty() {
                row[col] = Cell::Empty;
                continue;
            }
            match row[col].as_date() {
                Some(d) => row[col] = Cell::Date(d),
                None => {
                    row[col] = Cell::Empty;
                    failures += 1;
                }
            }
        }
        Ok(failures)
    }

    /// Writes the frame as CSV (header row first).
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut w = csv::Writer::from_writer(writer);
        w.write_record(&self.columns)?;
        for row in &self.rows {
            w.write_record(row.iter().map(|c| c.as_text()))?;
        }
        w.flush()?;
        Ok(())
    }
}
