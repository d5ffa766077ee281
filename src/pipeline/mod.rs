//! The shared report pipeline: the `ReportJob` trait every report
//! implements, the run context handed to it, the typed sheet-table book it
//! returns, and the runner that renders/archives/emails that book.

pub mod registry;
pub mod runner;

use crate::config::AppConfig;
use crate::error::Result;
use crate::frame::Frame;
use crate::warehouse::{CoreWarehouse, OriginationsWarehouse};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a report needs to build itself: the business date, config, and
/// the two warehouse ports.
#[derive(Clone)]
pub struct RunContext {
    pub as_of: NaiveDate,
    pub config: Arc<AppConfig>,
    pub core: Arc<dyn CoreWarehouse>,
    pub originations: Arc<dyn OriginationsWarehouse>,
}

/// Display format applied to a sheet column when rendered to Excel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFormat {
    Text,
    Integer,
    Money,
    Percent,
    Date,
}

/// One worksheet: a frame plus per-column display formats.
#[derive(Debug, Clone)]
pub struct SheetTable {
    pub name: String,
    pub frame: Frame,
    pub formats: Vec<ColumnFormat>,
}

impl SheetTable {
    /// Builds a sheet from `(header, format)` column specs.
    pub fn new(name: &str, columns: Vec<(&str, ColumnFormat)>) -> Self {
        let formats = columns.iter().map(|(_, f)| *f).collect();
        let headers: Vec<&str> = columns.iter().map(|(h, _)| *h).collect();
        Self {
            name: name.to_string(),
            frame: Frame::new(headers),
            formats,
        }
    }
}

/// The finished product of one report build: a titled set of sheets.
#[derive(Debug, Clone)]
pub struct ReportBook {
    pub title: String,
    pub sheets: Vec<SheetTable>,
}

impl ReportBook {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            sheets: Vec::new(),
        }
    }

    pub fn push_sheet(&mut self, sheet: SheetTable) {
        self.sheets.push(sheet);
    }

    /// Total data rows across all sheets.
    pub fn row_count(&self) -> usize {
        self.sheets.iter().map(|s| s.frame.row_count()).sum()
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetTable> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

/// Core trait every scheduled report implements.
#[async_trait]
pub trait ReportJob: Send + Sync {
    /// Stable id used in config, CLI selection, and archive paths.
    fn report_id(&self) -> &'static str;

    /// Human title used in workbook and email subjects.
    fn title(&self) -> &'static str;

    /// Extract, transform, and return the finished book.
    async fn build(&self, ctx: &RunContext) -> Result<ReportBook>;
}

/// Record of one completed report run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub report_id: String,
    pub as_of: NaiveDate,
    pub rows: usize,
    pub output_path: String,
    pub duration_seconds: f64,
    pub emailed: bool,
    pub warnings: Vec<String>,
}
