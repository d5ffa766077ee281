//! Commercial Portfolio Alerts: delinquency, maturities, line utilization,
//! relationship exposure, nonaccrual, and the risk-rating watch list.

use crate::error::Result;
use crate::frame::Cell;
use crate::pipeline::registry::PORTFOLIO_ALERTS;
use crate::pipeline::ColumnFormat::{Date, Integer, Money, Percent, Text};
use crate::pipeline::{ReportBook, ReportJob, RunContext, SheetTable};
use crate::warehouse::records::{days_past_due, DelinquencyBucket, LoanAccount};
use async_trait::async_trait;
use chrono::Duration;
use std::collections::BTreeMap;
use tracing::{info, instrument};

pub struct PortfolioAlerts;

/// Alert categories tallied on the summary sheet.
const CATEGORIES: &[&str] = &[
    "Delinquent 30+",
    "Maturing",
    "Matured Still Open",
    "Overlimit",
    "High Utilization",
    "House Limit Exceeded",
    "Nonaccrual",
    "Watch List",
];

fn loan_cells(loan: &LoanAccount) -> Vec<Cell> {
    vec![
        loan.account_number.as_str().into(),
        loan.borrower_name.as_str().into(),
        loan.note_type.as_str().into(),
        loan.officer.as_str().into(),
        Cell::Float(loan.balance),
    ]
}

fn loan_columns() -> Vec<(&'static str, crate::pipeline::ColumnFormat)> {
    vec![
        ("Account", Text),
        ("Borrower", Text),
        ("Note Type", Text),
        ("Officer", Text),
        ("Balance", Money),
    ]
}

#[async_trait]
impl ReportJob for PortfolioAlerts {
    fn report_id(&self) -> &'static str {
        PORTFOLIO_ALERTS
    }

    fn title(&self) -> &'static str {
        "Commercial Portfolio Alerts"
    }

    #[instrument(skip(self, ctx), fields(as_of = %ctx.as_of))]
    async fn build(&self, ctx: &RunContext) -> Result<ReportBook> {
        let thresholds = ctx.config.report(self.report_id()).thresholds;
        let loans = ctx.core.open_commercial_loans(ctx.as_of).await?;
        info!("Extracted {} open commercial loans", loans.len());

        let mut book = ReportBook::new(self.title());
        let mut tallies: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
        let mut tally = |category: &'static str, balance: f64| {
            let entry = tallies.entry(category).or_default();
            entry.0 += 1;
            entry.1 += balance;
        };

        // Delinquency: alert rows at 30+ DPD, worst first
        let mut delinquency = {
            let mut columns = loan_columns();
            columns.push(("Next Due", Date));
            columns.push(("DPD", Integer));
            columns.push(("Bucket", Text));
            SheetTable::new("Delinquency", columns)
        };
        let mut delinquent: Vec<(&LoanAccount, i64)> = loans
            .iter()
            .map(|l| (l, days_past_due(l.next_due_date, ctx.as_of)))
            .filter(|(_, dpd)| *dpd >= 30)
            .collect();
        delinquent.sort_by_key(|(_, dpd)| std::cmp::Reverse(*dpd));
        for (loan, dpd) in &delinquent {
            tally("Delinquent 30+", loan.balance);
            let mut row = loan_cells(loan);
            row.push(loan.next_due_date.into());
            row.push(Cell::Int(*dpd));
            row.push(DelinquencyBucket::from_days(*dpd).label().into());
            delinquency.frame.push_row(row)?;
        }
        book.push_sheet(delinquency);

        // Maturities: notes maturing in the window, plus matured-but-open
        let maturity_end = ctx.as_of + Duration::days(thresholds.note_maturity_window_days);
        let mut maturities = {
            let mut columns = loan_columns();
            columns.push(("Maturity Date", Date));
            columns.push(("Status", Text));
            SheetTable::new("Maturities", columns)
        };
        let mut maturing: Vec<(&LoanAccount, &'static str)> = Vec::new();
        for loan in &loans {
            let Some(maturity) = loan.maturity_date else {
                continue;
            };
            if maturity < ctx.as_of && loan.balance > 0.0 {
                maturing.push((loan, "Matured"));
            } else if maturity >= ctx.as_of && maturity <= maturity_end {
                maturing.push((loan, "Maturing"));
            }
        }
        maturing.sort_by_key(|(l, _)| l.maturity_date);
        for (loan, status) in &maturing {
            match *status {
                "Matured" => tally("Matured Still Open", loan.balance),
                _ => tally("Maturing", loan.balance),
            }
            let mut row = loan_cells(loan);
            row.push(loan.maturity_date.into());
            row.push((*status).into());
            maturities.frame.push_row(row)?;
        }
        book.push_sheet(maturities);

        // Revolving line utilization; lines with no commitment are skipped
        let mut lines = {
            let mut columns = loan_columns();
            columns.push(("Commitment", Money));
            columns.push(("Utilization", Percent));
            columns.push(("Flag", Text));
            SheetTable::new("Overlimit Lines", columns)
        };
        for loan in loans.iter().filter(|l| l.revolving) {
            let Some(commitment) = loan.commitment.filter(|c| *c > 0.0) else {
                continue;
            };
            let utilization = loan.balance / commitment;
            let flag = if loan.balance > commitment {
                tally("Overlimit", loan.balance);
                "Overlimit"
            } else if utilization >= thresholds.high_utilization {
                tally("High Utilization", loan.balance);
                "High Utilization"
            } else {
                continue;
            };
            let mut row = loan_cells(loan);
            row.push(Cell::Float(commitment));
            row.push(Cell::Float(utilization));
            row.push(flag.into());
            lines.frame.push_row(row)?;
        }
        book.push_sheet(lines);

        // Relationship exposure: per tax id, sum of max(balance, commitment)
        let mut exposures_by_tax_id: BTreeMap<&str, (String, usize, f64)> = BTreeMap::new();
        for loan in &loans {
            let Some(tax_id) = loan.tax_id.as_deref() else {
                continue;
            };
            let exposure = loan.balance.max(loan.commitment.unwrap_or(0.0));
            let entry = exposures_by_tax_id
                .entry(tax_id)
                .or_insert_with(|| (loan.borrower_name.clone(), 0, 0.0));
            entry.1 += 1;
            entry.2 += exposure;
        }
        let mut exposures: Vec<_> = exposures_by_tax_id.into_iter().collect();
        exposures.sort_by(|a, b| {
            b.1 .2
                .partial_cmp(&a.1 .2)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut top_exposures = SheetTable::new(
            "Top Exposures",
            vec![
                ("Tax Id", Text),
                ("Relationship", Text),
                ("Notes", Integer),
                ("Exposure", Money),
                ("Over House Limit", Text),
            ],
        );
        // The house-limit tally covers every relationship, not just the ones
        // that fit on the top sheet
        for (_, (_, _, exposure)) in &exposures {
            if *exposure >= thresholds.house_limit {
                tally("House Limit Exceeded", *exposure);
            }
        }
        for (tax_id, (name, notes, exposure)) in
            exposures.iter().take(thresholds.top_relationships)
        {
            let over_limit = *exposure >= thresholds.house_limit;
            top_exposures.frame.push_row(vec![
                (*tax_id).into(),
                name.as_str().into(),
                Cell::Int(*notes as i64),
                Cell::Float(*exposure),
                if over_limit { "Yes" } else { "" }.into(),
            ])?;
        }
        book.push_sheet(top_exposures);

        // Nonaccrual
        let mut nonaccrual = SheetTable::new("Nonaccrual", loan_columns());
        for loan in loans.iter().filter(|l| l.nonaccrual) {
            tally("Nonaccrual", loan.balance);
            nonaccrual.frame.push_row(loan_cells(loan))?;
        }
        book.push_sheet(nonaccrual);

        // Watch list by risk rating
        let mut watch = {
            let mut columns = loan_columns();
            columns.push(("Risk Rating", Integer));
            SheetTable::new("Watch List", columns)
        };
        let mut watched: Vec<&LoanAccount> = loans
            .iter()
            .filter(|l| l.risk_rating.map(|r| r >= thresholds.watch_rating).unwrap_or(false))
            .collect();
        watched.sort_by_key(|l| std::cmp::Reverse(l.risk_rating));
        for loan in watched {
            let mut row = loan_cells(loan);
            row.push(loan.risk_rating.map(|r| r as i64).into());
            watch.frame.push_row(row)?;
        }
        let watch_total: f64 = watch
            .frame
            .rows()
            .iter()
            .filter_map(|r| r[4].as_f64())
            .sum();
        tallies.insert("Watch List", (watch.frame.row_count(), watch_total));

        // Summary: count and balance per alert category, in fixed order
        let mut summary = SheetTable::new(
            "Summary",
            vec![("Alert", Text), ("Count", Integer), ("Balance", Money)],
        );
        for category in CATEGORIES {
            let (count, balance) = tallies.get(category).copied().unwrap_or((0, 0.0));
            summary.frame.push_row(vec![
                (*category).into(),
                Cell::Int(count as i64),
                Cell::Float(balance),
            ])?;
        }
        book.sheets.insert(0, summary);
        book.push_sheet(watch);

        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::warehouse::fixtures::FixtureWarehouse;
    use crate::warehouse::records::AccountStatus;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn loan(number: &str, balance: f64) -> LoanAccount {
        LoanAccount {
            account_number: number.to_string(),
            borrower_name: format!("Borrower {}", number),
            tax_id: Some(format!("TAX-{}", number)),
            note_type: "CML".to_string(),
            branch: "Main".to_string(),
            officer: "Officer A".to_string(),
            status: AccountStatus::Open,
            open_date: date(2022, 1, 15),
            maturity_date: None,
            next_due_date: None,
            balance,
            commitment: None,
            rate: 0.065,
            payment_amount: 1_500.0,
            risk_rating: Some(4),
            nonaccrual: false,
            revolving: false,
        }
    }

    fn context(warehouse: FixtureWarehouse, as_of: NaiveDate) -> RunContext {
        let toml_src = r#"
            [run]
            archive_dir = "archive"
            drop_dir = "drops"
            [warehouse]
            [smtp]
            enabled = false
            [reports.portfolio_alerts]
            enabled = true
        "#;
        let config: AppConfig = toml::from_str(toml_src).unwrap();
        let warehouse = Arc::new(warehouse);
        RunContext {
            as_of,
            config: Arc::new(config),
            core: warehouse.clone(),
            originations: warehouse,
        }
    }

    #[tokio::test]
    async fn delinquency_sorts_worst_first_and_missing_due_is_current() {
        let as_of = date(2026, 6, 30);
        let mut warehouse = FixtureWarehouse::new();

        let mut l1 = loan("L1", 100_000.0);
        l1.next_due_date = Some(date(2026, 5, 25)); // 36 DPD
        let mut l2 = loan("L2", 200_000.0);
        l2.next_due_date = Some(date(2026, 3, 1)); // 121 DPD
        let mut l3 = loan("L3", 50_000.0);
        l3.next_due_date = None; // current by definition
        warehouse.loans.extend([l1, l2, l3]);

        let book = PortfolioAlerts.build(&context(warehouse, as_of)).await.unwrap();
        let sheet = book.sheet("Delinquency").unwrap();
        assert_eq!(sheet.frame.row_count(), 2);
        assert_eq!(sheet.frame.get(0, "Account"), Some(&Cell::Text("L2".into())));
        assert_eq!(sheet.frame.get(0, "Bucket"), Some(&Cell::Text("90+ DPD".into())));
    }

    #[tokio::test]
    async fn matured_open_notes_are_flagged_separately() {
        let as_of = date(2026, 6, 30);
        let mut warehouse = FixtureWarehouse::new();

        let mut past = loan("L1", 75_000.0);
        past.maturity_date = Some(date(2026, 6, 1));
        let mut upcoming = loan("L2", 40_000.0);
        upcoming.maturity_date = Some(date(2026, 7, 20));
        let mut far = loan("L3", 30_000.0);
        far.maturity_date = Some(date(2027, 1, 1));
        warehouse.loans.extend([past, upcoming, far]);

        let book = PortfolioAlerts.build(&context(warehouse, as_of)).await.unwrap();
        let sheet = book.sheet("Maturities").unwrap();
        assert_eq!(sheet.frame.row_count(), 2);
        assert_eq!(sheet.frame.get(0, "Status"), Some(&Cell::Text("Matured".into())));
        assert_eq!(sheet.frame.get(1, "Status"), Some(&Cell::Text("Maturing".into())));
    }

    #[tokio::test]
    async fn utilization_skips_lines_without_commitment() {
        let as_of = date(2026, 6, 30);
        let mut warehouse = FixtureWarehouse::new();

        let mut overlimit = loan("L1", 110_000.0);
        overlimit.revolving = true;
        overlimit.commitment = Some(100_000.0);
        let mut high = loan("L2", 97_000.0);
        high.revolving = true;
        high.commitment = Some(100_000.0);
        let mut no_commitment = loan("L3", 50_000.0);
        no_commitment.revolving = true;
        no_commitment.commitment = None;
        let mut comfortable = loan("L4", 10_000.0);
        comfortable.revolving = true;
        comfortable.commitment = Some(100_000.0);
        warehouse.loans.extend([overlimit, high, no_commitment, comfortable]);

        let book = PortfolioAlerts.build(&context(warehouse, as_of)).await.unwrap();
        let sheet = book.sheet("Overlimit Lines").unwrap();
        assert_eq!(sheet.frame.row_count(), 2);
        assert_eq!(sheet.frame.get(0, "Flag"), Some(&Cell::Text("Overlimit".into())));
        assert_eq!(
            sheet.frame.get(1, "Flag"),
            Some(&Cell::Text("High Utilization".into()))
        );
    }

    #[tokio::test]
    async fn exposure_uses_max_of_balance_and_commitment() {
        let as_of = date(2026, 6, 30);
        let mut warehouse = FixtureWarehouse::new();

        // Same relationship across two notes: 4.8M balance + 0.4M committed line
        let mut term = loan("L1", 4_800_000.0);
        term.tax_id = Some("REL-1".to_string());
        let mut line = loan("L2", 100_000.0);
        line.tax_id = Some("REL-1".to_string());
        line.revolving = true;
        line.commitment = Some(400_000.0);
        // No tax id: excluded from the rollup entirely
        let mut orphan = loan("L3", 9_000_000.0);
        orphan.tax_id = None;
        warehouse.loans.extend([term, line, orphan]);

        let book = PortfolioAlerts.build(&context(warehouse, as_of)).await.unwrap();
        let sheet = book.sheet("Top Exposures").unwrap();
        assert_eq!(sheet.frame.row_count(), 1);
        assert_eq!(sheet.frame.get(0, "Exposure"), Some(&Cell::Float(5_200_000.0)));
        assert_eq!(
            sheet.frame.get(0, "Over House Limit"),
            Some(&Cell::Text("Yes".into()))
        );

        let summary = book.sheet("Summary").unwrap();
        let idx = summary
            .frame
            .rows()
            .iter()
            .position(|r| r[0] == Cell::Text("House Limit Exceeded".into()))
            .unwrap();
        assert_eq!(summary.frame.rows()[idx][1], Cell::Int(1));
    }

    #[tokio::test]
    async fn nonaccrual_and_watch_list_populate() {
        let as_of = date(2026, 6, 30);
        let mut warehouse = FixtureWarehouse::new();

        let mut bad = loan("L1", 60_000.0);
        bad.nonaccrual = true;
        bad.risk_rating = Some(8);
        let mut watch_only = loan("L2", 30_000.0);
        watch_only.risk_rating = Some(7);
        let fine = loan("L3", 20_000.0);
        warehouse.loans.extend([bad, watch_only, fine]);

        let book = PortfolioAlerts.build(&context(warehouse, as_of)).await.unwrap();
        assert_eq!(book.sheet("Nonaccrual").unwrap().frame.row_count(), 1);
        let watch = book.sheet("Watch List").unwrap();
        assert_eq!(watch.frame.row_count(), 2);
        assert_eq!(watch.frame.get(0, "Risk Rating"), Some(&Cell::Int(8)));
    }

    #[tokio::test]
    async fn default_note_window_covers_sixty_days() {
        let as_of = date(2026, 6, 30);
        let mut warehouse = FixtureWarehouse::new();

        // 45 days out: inside the note window without any threshold override
        let mut mid_window = loan("L1", 55_000.0);
        mid_window.maturity_date = Some(date(2026, 8, 14));
        warehouse.loans.push(mid_window);

        let book = PortfolioAlerts.build(&context(warehouse, as_of)).await.unwrap();
        let sheet = book.sheet("Maturities").unwrap();
        assert_eq!(sheet.frame.row_count(), 1);
        assert_eq!(sheet.frame.get(0, "Status"), Some(&Cell::Text("Maturing".into())));
    }

    #[tokio::test]
    async fn house_limit_tally_counts_relationships_beyond_the_top_sheet() {
        let as_of = date(2026, 6, 30);
        let mut warehouse = FixtureWarehouse::new();

        let mut big = loan("L1", 9_000_000.0);
        big.tax_id = Some("REL-1".to_string());
        let mut also_big = loan("L2", 6_000_000.0);
        also_big.tax_id = Some("REL-2".to_string());
        warehouse.loans.extend([big, also_big]);

        let toml_src = r#"
            [run]
            archive_dir = "archive"
            drop_dir = "drops"
            [warehouse]
            [smtp]
            enabled = false
            [reports.portfolio_alerts]
            enabled = true
            [reports.portfolio_alerts.thresholds]
            top_relationships = 1
        "#;
        let config: AppConfig = toml::from_str(toml_src).unwrap();
        let warehouse = Arc::new(warehouse);
        let ctx = RunContext {
            as_of,
            config: Arc::new(config),
            core: warehouse.clone(),
            originations: warehouse,
        };

        let book = PortfolioAlerts.build(&ctx).await.unwrap();
        assert_eq!(book.sheet("Top Exposures").unwrap().frame.row_count(), 1);

        let summary = book.sheet("Summary").unwrap();
        let row = summary
            .frame
            .rows()
            .iter()
            .find(|r| r[0] == Cell::Text("House Limit Exceeded".into()))
            .unwrap();
        assert_eq!(row[1], Cell::Int(2));
        assert_eq!(row[2], Cell::Float(15_000_000.0));
    }
}
