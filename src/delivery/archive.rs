//! Archive directory layout: one subdirectory per report, workbooks named
//! `<report>_<asof>_<run8>.xlsx` with a `.sha256` sidecar, and optional
//! per-sheet CSV siblings.

use crate::error::Result;
use crate::pipeline::ReportBook;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Writes the workbook bytes, a sha256 sidecar, and (when requested) one CSV
/// per sheet. Returns the workbook path.
pub fn archive_book(
    archive_dir: &Path,
    report_id: &str,
    as_of: NaiveDate,
    run_id: Uuid,
    bytes: &[u8],
    csv_from: Option<&ReportBook>,
) -> Result<PathBuf> {
    let report_dir = archive_dir.join(report_id);
    fs::create_dir_all(&report_dir)?;

    let run8 = &run_id.simple().to_string()[..8];
    let stem = format!("{}_{}_{}", report_id, as_of.format("%Y%m%d"), run8);
    let workbook_path = report_dir.join(format!("{}.xlsx", stem));
    fs::write(&workbook_path, bytes)?;

    let digest = Sha256::digest(bytes);
    let sidecar = format!("{}  {}.xlsx\n", hex::encode(digest), stem);
    fs::write(report_dir.join(format!("{}.xlsx.sha256", stem)), sidecar)?;

    if let Some(book) = csv_from {
        for sheet in &book.sheets {
            let safe_name: String = sheet
                .name
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '_' })
                .collect();
            let csv_path = report_dir.join(format!("{}_{}.csv", stem, safe_name));
            let file = fs::File::create(&csv_path)?;
            sheet.frame.write_csv(file)?;
        }
    }

    Ok(workbook_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ColumnFormat, SheetTable};

    #[test]
    fn writes_workbook_sidecar_and_csv_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let as_of = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();
        let run_id = Uuid::new_v4();

        let mut book = ReportBook::new("Test");
        let mut sheet = SheetTable::new("Summary", vec![("A", ColumnFormat::Text)]);
        sheet.frame.push_row(vec!["x".into()]).unwrap();
        book.push_sheet(sheet);

        let path = archive_book(dir.path(), "test_report", as_of, run_id, b"bytes", Some(&book))
            .unwrap();

        assert!(path.exists());
        assert!(path.to_string_lossy().contains("test_report_20260630_"));
        let sidecar = PathBuf::from(format!("{}.sha256", path.display()));
        let sidecar_text = fs::read_to_string(sidecar).unwrap();
        assert_eq!(sidecar_text.split_whitespace().next().unwrap().len(), 64);

        let csvs: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "csv").unwrap_or(false))
            .collect();
        assert_eq!(csvs.len(), 1);
    }
}
