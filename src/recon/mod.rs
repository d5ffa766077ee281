//! Dealer Track / Route One funding reconciliation: vendor drop-file
//! ingestion and the ordered-pass record-linkage matcher.

pub mod matcher;

use crate::error::{ReportError, Result};
use crate::excel::reader;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// The two indirect-lending vendor portals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VendorSystem {
    DealerTrack,
    RouteOne,
}

impl VendorSystem {
    pub fn label(&self) -> &'static str {
        match self {
            VendorSystem::DealerTrack => "Dealer Track",
            VendorSystem::RouteOne => "Route One",
        }
    }

    /// Drop files are named `<prefix>_*.xlsx`.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            VendorSystem::DealerTrack => "dealertrack",
            VendorSystem::RouteOne => "routeone",
        }
    }

    /// Note-reference tag prefixes this vendor's applications are booked with.
    pub fn reference_prefixes(&self) -> &'static [&'static str] {
        match self {
            VendorSystem::DealerTrack => &["DT", "DLT"],
            VendorSystem::RouteOne => &["RO"],
        }
    }
}

/// One accepted row from a vendor funding spreadsheet.
#[derive(Debug, Clone)]
pub struct VendorRecord {
    pub vendor: VendorSystem,
    pub application_number: String,
    pub applicant_name: String,
    pub dealer_name: Option<String>,
    pub funded_date: NaiveDate,
    pub funded_amount: f64,
    /// 1-based worksheet row for operator traceability.
    pub source_row: usize,
}

/// A row that failed cell coercion, with the reason. Never dropped silently.
#[derive(Debug, Clone)]
pub struct RejectedRow {
    pub vendor: VendorSystem,
    pub source_row: usize,
    pub reason: String,
}

/// A parsed vendor drop file.
#[derive(Debug, Clone)]
pub struct VendorDrop {
    pub vendor: VendorSystem,
    pub path: PathBuf,
    pub records: Vec<VendorRecord>,
    pub rejected: Vec<RejectedRow>,
}

// Header aliases seen across vendor export versions, lowercased.
const APP_NUMBER_ALIASES: &[&str] = &[
    "application number",
    "application #",
    "app number",
    "app #",
    "application id",
    "app id",
];
const APPLICANT_ALIASES: &[&str] = &[
    "applicant name",
    "applicant",
    "borrower name",
    "borrower",
    "customer name",
];
const DEALER_ALIASES: &[&str] = &["dealer name", "dealer", "dealership"];
const FUNDED_DATE_ALIASES: &[&str] = &["funded date", "fund date", "funding date", "date funded"];
const FUNDED_AMOUNT_ALIASES: &[&str] = &[
    "funded amount",
    "fund amount",
    "amount funded",
    "amount financed",
    "amount",
];

fn find_column(frame: &crate::frame::Frame, aliases: &[&str]) -> Option<usize> {
    frame.columns().iter().position(|name| {
        let lowered = name.trim().to_lowercase();
        aliases.contains(&lowered.as_str())
    })
}

/// Finds the newest drop file for a vendor in the shared folder, by file
/// modification time.
pub fn newest_drop(drop_dir: &Path, vendor: VendorSystem) -> Result<PathBuf> {
    let prefix = vendor.file_prefix();
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

    for entry in fs::read_dir(drop_dir).map_err(|e| {
        ReportError::DropFile(format!("cannot read drop dir '{}': {}", drop_dir.display(), e))
    })? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !name.starts_with(prefix) || !name.ends_with(".xlsx") {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
            newest = Some((modified, path));
        }
    }

    newest.map(|(_, p)| p).ok_or_else(|| {
        ReportError::DropFile(format!(
            "no {}_*.xlsx drop found in '{}'",
            prefix,
            drop_dir.display()
        ))
    })
}

/// Parses a vendor spreadsheet into accepted and rejected rows.
pub fn parse_drop(path: &Path, vendor: VendorSystem) -> Result<VendorDrop> {
    let frame = reader::read_sheet(path, None)?;

    let app_col = find_column(&frame, APP_NUMBER_ALIASES).ok_or_else(|| {
        ReportError::DropFile(format!("'{}': no application-number column", path.display()))
    })?;
    let name_col = find_column(&frame, APPLICANT_ALIASES).ok_or_else(|| {
        ReportError::DropFile(format!("'{}': no applicant-name column", path.display()))
    })?;
    let date_col = find_column(&frame, FUNDED_DATE_ALIASES).ok_or_else(|| {
        ReportError::DropFile(format!("'{}': no funded-date column", path.display()))
    })?;
    let amount_col = find_column(&frame, FUNDED_AMOUNT_ALIASES).ok_or_else(|| {
        ReportError::DropFile(format!("'{}': no funded-amount column", path.display()))
    })?;
    let dealer_col = find_column(&frame, DEALER_ALIASES);

    let mut records = Vec::new();
    let mut rejected = Vec::new();

    for (idx, row) in frame.rows().iter().enumerate() {
        // Worksheet row: 1-based, plus the header row
        let source_row = idx + 2;
        let application_number = row[app_col].as_text().trim().to_string();
        if application_number.is_empty() {
            rejected.push(RejectedRow {
                vendor,
                source_row,
                reason: "missing application number".to_string(),
            });
            continue;
        }
        let applicant_name = row[name_col].as_text().trim().to_string();
        if applicant_name.is_empty() {
            rejected.push(RejectedRow {
                vendor,
                source_row,
                reason: "missing applicant name".to_string(),
            });
            continue;
        }
        let Some(funded_date) = row[date_col].as_date() else {
            rejected.push(RejectedRow {
                vendor,
                source_row,
                reason: format!("uncoercible funded date '{}'", row[date_col].as_text()),
            });
            continue;
        };
        let Some(funded_amount) = row[amount_col].as_f64() else {
            rejected.push(RejectedRow {
                vendor,
                source_row,
                reason: format!("uncoercible funded amount '{}'", row[amount_col].as_text()),
            });
            continue;
        };

        let dealer_name = dealer_col.and_then(|c| {
            let text = row[c].as_text().trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        });

        records.push(VendorRecord {
            vendor,
            application_number,
            applicant_name,
            dealer_name,
            funded_date,
            funded_amount,
            source_row,
        });
    }

    Ok(VendorDrop {
        vendor,
        path: path.to_path_buf(),
        records,
        rejected,
    })
}
