//! Dealer Track / Route One funding reconciliation report: parses the two
//! vendor drop files, fans the core and LOS extractions out concurrently,
//! runs the matcher, and lays the categorized buckets out as sheets.

use crate::error::Result;
use crate::frame::Cell;
use crate::observability;
use crate::pipeline::registry::INDIRECT_RECON;
use crate::pipeline::ColumnFormat::{Date, Integer, Money, Percent, Text};
use crate::pipeline::{ReportBook, ReportJob, RunContext, SheetTable};
use crate::recon::matcher::{reconcile, ReconConfig, ReconOutcome};
use crate::recon::{newest_drop, parse_drop, RejectedRow, VendorDrop, VendorRecord, VendorSystem};
use async_trait::async_trait;
use chrono::Duration;
use std::path::Path;
use tracing::{info, instrument, warn};

pub struct IndirectRecon;

fn vendor_row_cells(record: &VendorRecord) -> Vec<Cell> {
    vec![
        record.vendor.label().into(),
        record.application_number.as_str().into(),
        record.applicant_name.as_str().into(),
        record.dealer_name.clone().into(),
        record.funded_date.into(),
        Cell::Float(record.funded_amount),
    ]
}

fn vendor_columns() -> Vec<(&'static str, crate::pipeline::ColumnFormat)> {
    vec![
        ("Vendor", Text),
        ("Application #", Text),
        ("Applicant", Text),
        ("Dealer", Text),
        ("Funded Date", Date),
        ("Funded Amount", Money),
    ]
}

fn load_drop(drop_dir: &Path, vendor: VendorSystem) -> Result<VendorDrop> {
    let path = newest_drop(drop_dir, vendor)?;
    info!("Using {} drop {}", vendor.label(), path.display());
    let drop = parse_drop(&path, vendor)?;
    if !drop.rejected.is_empty() {
        warn!(
            "{}: {} rows rejected during parse",
            vendor.label(),
            drop.rejected.len()
        );
        observability::delivery::drop_rows_rejected(vendor.label(), drop.rejected.len());
    }
    Ok(drop)
}

#[async_trait]
impl ReportJob for IndirectRecon {
    fn report_id(&self) -> &'static str {
        INDIRECT_RECON
    }

    fn title(&self) -> &'static str {
        "Indirect Funding Reconciliation"
    }

    #[instrument(skip(self, ctx), fields(as_of = %ctx.as_of))]
    async fn build(&self, ctx: &RunContext) -> Result<ReportBook> {
        let thresholds = ctx.config.report(self.report_id()).thresholds;
        let drop_dir = Path::new(&ctx.config.run.drop_dir);

        let dealertrack = load_drop(drop_dir, VendorSystem::DealerTrack)?;
        let routeone = load_drop(drop_dir, VendorSystem::RouteOne)?;

        // The two schemas are extracted concurrently; this is the only
        // fan-out in the suite and exists purely to cut wall-clock time.
        let window_start = ctx.as_of - Duration::days(thresholds.recon_lookback_days);
        let (loans, applications) = tokio::try_join!(
            ctx.core.funded_indirect_loans(window_start, ctx.as_of),
            ctx.originations.indirect_applications(window_start, ctx.as_of),
        )?;
        info!(
            "Extracted {} booked indirect loans, {} LOS applications",
            loans.len(),
            applications.len()
        );

        let mut records = dealertrack.records.clone();
        records.extend(routeone.records.iter().cloned());
        let mut rejected: Vec<RejectedRow> = dealertrack.rejected.clone();
        rejected.extend(routeone.rejected.iter().cloned());

        let outcome = reconcile(
            &records,
            &loans,
            &applications,
            ctx.as_of,
            &ReconConfig::from(&thresholds),
        )?;

        let mut book = ReportBook::new(self.title());
        book.push_sheet(summary_sheet(&outcome, &rejected)?);

        // Matched
        let mut matched = {
            let mut columns = vendor_columns();
            columns.push(("Core Account", Text));
            columns.push(("Booked Amount", Money));
            columns.push(("Method", Text));
            columns.push(("Confidence", Percent));
            SheetTable::new("Matched", columns)
        };
        for pair in &outcome.matched {
            let mut row = vendor_row_cells(&pair.record);
            row.push(pair.loan.account_number.as_str().into());
            row.push(Cell::Float(pair.loan.amount));
            row.push(pair.method.label().into());
            row.push(Cell::Float(pair.method.confidence()));
            matched.frame.push_row(row)?;
        }
        book.push_sheet(matched);

        // Funded Not Booked
        let mut fnb = SheetTable::new("Funded Not Booked", vendor_columns());
        for record in &outcome.funded_not_booked {
            fnb.frame.push_row(vendor_row_cells(record))?;
        }
        book.push_sheet(fnb);

        // Booked Not Funded
        let mut bnf = SheetTable::new(
            "Booked Not Funded",
            vec![
                ("Core Account", Text),
                ("Borrower", Text),
                ("Dealer", Text),
                ("Booked Date", Date),
                ("Amount", Money),
                ("Note Reference", Text),
            ],
        );
        for loan in &outcome.booked_not_funded {
            bnf.frame.push_row(vec![
                loan.account_number.as_str().into(),
                loan.borrower_name.as_str().into(),
                loan.dealer_name.clone().into(),
                loan.booked_date.into(),
                Cell::Float(loan.amount),
                loan.note_reference.clone().into(),
            ])?;
        }
        book.push_sheet(bnf);

        // Amount Mismatch
        let mut mismatch = {
            let mut columns = vendor_columns();
            columns.push(("Core Account", Text));
            columns.push(("Booked Amount", Money));
            columns.push(("Difference", Money));
            columns.push(("Method", Text));
            SheetTable::new("Amount Mismatch", columns)
        };
        for item in &outcome.amount_mismatch {
            let mut row = vendor_row_cells(&item.record);
            row.push(item.loan.account_number.as_str().into());
            row.push(Cell::Float(item.loan.amount));
            row.push(Cell::Float(item.difference));
            row.push(item.method.label().into());
            mismatch.frame.push_row(row)?;
        }
        book.push_sheet(mismatch);

        // Pending boarding
        let mut pending = {
            let mut columns = vendor_columns();
            columns.push(("LOS Status", Text));
            columns.push(("LOS Decision Date", Date));
            SheetTable::new("Pending", columns)
        };
        for item in &outcome.pending {
            let mut row = vendor_row_cells(&item.record);
            row.push(item.application.decision_status.as_str().into());
            row.push(item.application.decision_date.into());
            pending.frame.push_row(row)?;
        }
        book.push_sheet(pending);

        // Needs Review
        let mut review = {
            let mut columns = vendor_columns();
            columns.push(("Candidate Account", Text));
            columns.push(("Candidate Borrower", Text));
            columns.push(("Name Similarity", Percent));
            SheetTable::new("Needs Review", columns)
        };
        for item in &outcome.needs_review {
            let mut row = vendor_row_cells(&item.record);
            row.push(item.loan.account_number.as_str().into());
            row.push(item.loan.borrower_name.as_str().into());
            row.push(Cell::Float(item.similarity));
            review.frame.push_row(row)?;
        }
        book.push_sheet(review);

        // Duplicates
        let mut duplicates = SheetTable::new("Duplicates", vendor_columns());
        for record in &outcome.duplicates {
            duplicates.frame.push_row(vendor_row_cells(record))?;
        }
        book.push_sheet(duplicates);

        // Rejected rows, with reasons
        let mut rejects = SheetTable::new(
            "Rejected Rows",
            vec![("Vendor", Text), ("Row", Integer), ("Reason", Text)],
        );
        for row in &rejected {
            rejects.frame.push_row(vec![
                row.vendor.label().into(),
                Cell::Int(row.source_row as i64),
                row.reason.as_str().into(),
            ])?;
        }
        book.push_sheet(rejects);

        Ok(book)
    }
}

/// Summary: per bucket per vendor, row count and dollar total.
fn summary_sheet(outcome: &ReconOutcome, rejected: &[RejectedRow]) -> Result<SheetTable> {
    let mut sheet = SheetTable::new(
        "Summary",
        vec![
            ("Bucket", Text),
            ("Vendor", Text),
            ("Count", Integer),
            ("Amount", Money),
        ],
    );

    let vendors = [VendorSystem::DealerTrack, VendorSystem::RouteOne];
    let mut push = |bucket: &str, vendor: VendorSystem, count: usize, amount: f64| {
        sheet.frame.push_row(vec![
            bucket.into(),
            vendor.label().into(),
            Cell::Int(count as i64),
            Cell::Float(amount),
        ])
    };

    for vendor in vendors {
        let matched: Vec<_> = outcome
            .matched
            .iter()
            .filter(|p| p.record.vendor == vendor)
            .collect();
        push(
            "Matched",
            vendor,
            matched.len(),
            matched.iter().map(|p| p.record.funded_amount).sum(),
        )?;

        let fnb: Vec<_> = outcome
            .funded_not_booked
            .iter()
            .filter(|r| r.vendor == vendor)
            .collect();
        push(
            "Funded Not Booked",
            vendor,
            fnb.len(),
            fnb.iter().map(|r| r.funded_amount).sum(),
        )?;

        let mismatch: Vec<_> = outcome
            .amount_mismatch
            .iter()
            .filter(|m| m.record.vendor == vendor)
            .collect();
        push(
            "Amount Mismatch",
            vendor,
            mismatch.len(),
            mismatch.iter().map(|m| m.record.funded_amount).sum(),
        )?;

        let pending: Vec<_> = outcome
            .pending
            .iter()
            .filter(|p| p.record.vendor == vendor)
            .collect();
        push(
            "Pending Boarding",
            vendor,
            pending.len(),
            pending.iter().map(|p| p.record.funded_amount).sum(),
        )?;

        let review: Vec<_> = outcome
            .needs_review
            .iter()
            .filter(|c| c.record.vendor == vendor)
            .collect();
        push(
            "Needs Review",
            vendor,
            review.len(),
            review.iter().map(|c| c.record.funded_amount).sum(),
        )?;

        let duplicates: Vec<_> = outcome
            .duplicates
            .iter()
            .filter(|r| r.vendor == vendor)
            .collect();
        push(
            "Duplicate Vendor Record",
            vendor,
            duplicates.len(),
            duplicates.iter().map(|r| r.funded_amount).sum(),
        )?;

        let rejects = rejected.iter().filter(|r| r.vendor == vendor).count();
        push("Rejected Rows", vendor, rejects, 0.0)?;
    }

    // Booked-not-funded has no vendor side; reported once against core
    let bnf_amount: f64 = outcome.booked_not_funded.iter().map(|l| l.amount).sum();
    sheet.frame.push_row(vec![
        "Booked Not Funded".into(),
        "Core".into(),
        Cell::Int(outcome.booked_not_funded.len() as i64),
        Cell::Float(bnf_amount),
    ])?;

    Ok(sheet)
}
