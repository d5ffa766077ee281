//! Renders a `ReportBook` to a formatted workbook with `rust_xlsxwriter`:
//! styled header row, frozen panes, autofilter, typed number formats, and a
//! meta trail (title, as-of date, run id) below the first sheet's table.

use crate::error::Result;
use crate::frame::Cell;
use crate::pipeline::{ColumnFormat, ReportBook, SheetTable};
use chrono::NaiveDate;
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, Worksheet};
use uuid::Uuid;

struct SheetFormats {
    header: Format,
    money: Format,
    percent: Format,
    date: Format,
    integer: Format,
    meta_label: Format,
}

impl SheetFormats {
    fn new() -> Self {
        Self {
            header: Format::new()
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(0x1F4E78))
                .set_border_bottom(FormatBorder::Thin),
            money: Format::new().set_num_format("#,##0.00"),
            percent: Format::new().set_num_format("0.0%"),
            date: Format::new().set_num_format("mm/dd/yyyy"),
            integer: Format::new().set_num_format("#,##0"),
            meta_label: Format::new().set_bold().set_font_color(Color::Gray),
        }
    }
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &SheetTable, formats: &SheetFormats) -> Result<()> {
    worksheet.set_name(&sheet.name)?;

    for (col, header) in sheet.frame.columns().iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, &formats.header)?;
        // Width from the header with room for typical cell content
        let width = (header.len() as f64 + 4.0).max(12.0);
        worksheet.set_column_width(col as u16, width)?;
    }

    for (row_idx, row) in sheet.frame.rows().iter().enumerate() {
        let excel_row = (row_idx + 1) as u32;
        for (col_idx, cell) in row.iter().enumerate() {
            let col = col_idx as u16;
            let format = sheet.formats.get(col_idx).copied().unwrap_or(ColumnFormat::Text);
            match cell {
                Cell::Empty => {}
                Cell::Bool(b) => {
                    worksheet.write_boolean(excel_row, col, *b)?;
                }
                Cell::Int(i) => match format {
                    ColumnFormat::Money => {
                        worksheet.write_number_with_format(excel_row, col, *i as f64, &formats.money)?;
                    }
                    ColumnFormat::Percent => {
                        worksheet.write_number_with_format(excel_row, col, *i as f64, &formats.percent)?;
                    }
                    _ => {
                        worksheet.write_number_with_format(excel_row, col, *i as f64, &formats.integer)?;
                    }
                },
                Cell::Float(f) => match format {
                    ColumnFormat::Percent => {
                        worksheet.write_number_with_format(excel_row, col, *f, &formats.percent)?;
                    }
                    ColumnFormat::Integer => {
                        worksheet.write_number_with_format(excel_row, col, *f, &formats.integer)?;
                    }
                    _ => {
                        worksheet.write_number_with_format(excel_row, col, *f, &formats.money)?;
                    }
                },
                Cell::Text(s) => {
                    worksheet.write_string(excel_row, col, s)?;
                }
                Cell::Date(d) => {
                    worksheet.write_datetime_with_format(excel_row, col, d, &formats.date)?;
                }
                Cell::DateTime(dt) => {
                    worksheet.write_datetime_with_format(excel_row, col, dt, &formats.date)?;
                }
            }
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    if !sheet.frame.is_empty() {
        worksheet.autofilter(
            0,
            0,
            sheet.frame.row_count() as u32,
            (sheet.frame.columns().len().saturating_sub(1)) as u16,
        )?;
    }

    Ok(())
}

fn write_meta_trail(
    worksheet: &mut Worksheet,
    sheet: &SheetTable,
    title: &str,
    as_of: NaiveDate,
    run_id: Uuid,
    formats: &SheetFormats,
) -> Result<()> {
    // Two blank rows below the table
    let base = sheet.frame.row_count() as u32 + 3;
    worksheet.write_string_with_format(base, 0, "Report", &formats.meta_label)?;
    worksheet.write_string(base, 1, title)?;
    worksheet.write_string_with_format(base + 1, 0, "As of", &formats.meta_label)?;
    worksheet.write_string(base + 1, 1, &as_of.format("%Y-%m-%d").to_string())?;
    worksheet.write_string_with_format(base + 2, 0, "Run id", &formats.meta_label)?;
    worksheet.write_string(base + 2, 1, &run_id.to_string())?;
    Ok(())
}

fn build_workbook(book: &ReportBook, as_of: NaiveDate, run_id: Uuid) -> Result<Workbook> {
    let formats = SheetFormats::new();
    let mut workbook = Workbook::new();

    for (idx, sheet) in book.sheets.iter().enumerate() {
        let worksheet = workbook.add_worksheet();
        write_sheet(worksheet, sheet, &formats)?;
        if idx == 0 {
            write_meta_trail(worksheet, sheet, &book.title, as_of, run_id, &formats)?;
        }
    }

    Ok(workbook)
}

/// Renders the book to xlsx bytes; the same buffer feeds the archive write
/// and the email attachment.
pub fn render_to_buffer(book: &ReportBook, as_of: NaiveDate, run_id: Uuid) -> Result<Vec<u8>> {
    let mut workbook = build_workbook(book, as_of, run_id)?;
    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ColumnFormat::*;

    #[test]
    fn empty_book_still_renders_headers() {
        let mut book = ReportBook::new("Empty Test");
        book.push_sheet(SheetTable::new(
            "Summary",
            vec![("Category", Text), ("Count", Integer), ("Balance", Money)],
        ));
        let as_of = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();
        let bytes = render_to_buffer(&book, as_of, Uuid::new_v4()).unwrap();
        // A non-trivial xlsx container comes back even with zero data rows
        assert!(bytes.len() > 500);
    }
}
