//! Reads a worksheet into a `Frame` with `calamine`. Row 1 is the header;
//! numeric, boolean, and Excel serial-date cells map onto the matching
//! `Cell` variants so the frame coercion sweeps see typed values.

use crate::error::{ReportError, Result};
use crate::frame::{Cell, Frame};
use calamine::{open_workbook, Data, Reader, Xlsx};
use std::path::Path;

fn map_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Float(*f),
        Data::String(s) => {
            if s.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(ex) => match ex.as_datetime() {
            Some(dt) => Cell::DateTime(dt),
            None => Cell::Empty,
        },
        Data::DateTimeIso(s) => Cell::Text(s.clone()),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

/// Reads the named worksheet (or the first one when `sheet` is None) into a
/// frame. Header cells that are blank get positional names so the frame
/// stays addressable.
pub fn read_sheet(path: &Path, sheet: Option<&str>) -> Result<Frame> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e: calamine::XlsxError| ReportError::DropFile(format!(
            "cannot open '{}': {}",
            path.display(),
            e
        )))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ReportError::DropFile(format!("'{}' has no sheets", path.display())))?,
    };

    let range = workbook.worksheet_range(&sheet_name)?;
    let mut rows = range.rows();

    let header_row = rows
        .next()
        .ok_or_else(|| ReportError::DropFile(format!("'{}' sheet is empty", path.display())))?;
    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let text = match cell {
                Data::String(s) => s.trim().to_string(),
                other => map_cell(other).as_text(),
            };
            if text.is_empty() {
                format!("col{}", idx + 1)
            } else {
                text
            }
        })
        .collect();

    let width = headers.len();
    let mut frame = Frame::new(headers);
    for row in rows {
        let mut cells: Vec<Cell> = row.iter().map(map_cell).collect();
        // Trailing columns beyond the header are dropped; short rows pad out
        cells.truncate(width);
        cells.resize(width, Cell::Empty);
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        frame.push_row(cells)?;
    }

    Ok(frame)
}
