//! Financial Difficulty Modifications (TDR tracking): the modified-loan
//! population joined to current loan state, with seasoning, payment
//! performance, re-default detection, and concession summaries by mod type.

use crate::error::Result;
use crate::frame::Cell;
use crate::pipeline::registry::DIFFICULTY_MODS;
use crate::pipeline::ColumnFormat::{Date, Integer, Money, Percent, Text};
use crate::pipeline::{ReportBook, ReportJob, RunContext, SheetTable};
use crate::warehouse::records::{
    days_past_due, whole_months_between, DelinquencyBucket, LoanAccount, LoanModification,
};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, instrument};

pub struct DifficultyMods;

/// One account's modification history collapsed to its governing state.
struct ModifiedLoan<'a> {
    latest: &'a LoanModification,
    history_count: usize,
    loan: Option<&'a LoanAccount>,
}

impl<'a> ModifiedLoan<'a> {
    fn balance(&self) -> f64 {
        self.loan.map(|l| l.balance).unwrap_or(0.0)
    }

    /// Active means the modified loan is still open with a balance; anything
    /// else is released (closed, paid down, or no longer extracted).
    fn is_active(&self) -> bool {
        self.loan
            .map(|l| l.status.is_open() && l.balance > 0.0)
            .unwrap_or(false)
    }

    fn dpd(&self, as_of: NaiveDate) -> i64 {
        self.loan
            .map(|l| days_past_due(l.next_due_date, as_of))
            .unwrap_or(0)
    }

    /// Re-default: the loan crossed 90+ DPD inside the re-default horizon
    /// after the governing modification. The crossing date is recovered from
    /// the current next-due date.
    fn redefaulted(&self, as_of: NaiveDate, horizon_months: u32) -> bool {
        let dpd = self.dpd(as_of);
        if dpd < 90 {
            return false;
        }
        let Some(next_due) = self.loan.and_then(|l| l.next_due_date) else {
            return false;
        };
        let crossed = next_due + Duration::days(90);
        whole_months_between(self.latest.mod_date, crossed) < horizon_months as i64
    }

    fn rate_concession(&self) -> Option<f64> {
        match (self.latest.rate_before, self.latest.rate_after) {
            (Some(before), Some(after)) => Some(before - after),
            _ => None,
        }
    }

    fn payment_concession(&self) -> Option<f64> {
        match (self.latest.payment_before, self.latest.payment_after) {
            (Some(before), Some(after)) => Some(before - after),
            _ => None,
        }
    }
}

fn detail_columns() -> Vec<(&'static str, crate::pipeline::ColumnFormat)> {
    vec![
        ("Account", Text),
        ("Borrower", Text),
        ("Mod Type", Text),
        ("Mod Date", Date),
        ("Mods on Account", Integer),
        ("Balance", Money),
        ("Seasoning (Months)", Integer),
        ("Performance", Text),
        ("Rate Concession", Percent),
        ("Payment Concession", Money),
    ]
}

fn detail_row(entry: &ModifiedLoan<'_>, as_of: NaiveDate) -> Vec<Cell> {
    let borrower = entry
        .loan
        .map(|l| l.borrower_name.as_str())
        .unwrap_or("(not in extract)");
    vec![
        entry.latest.account_number.as_str().into(),
        borrower.into(),
        entry.latest.mod_type.as_str().into(),
        entry.latest.mod_date.into(),
        Cell::Int(entry.history_count as i64),
        Cell::Float(entry.balance()),
        Cell::Int(whole_months_between(entry.latest.mod_date, as_of)),
        DelinquencyBucket::from_days(entry.dpd(as_of)).label().into(),
        entry.rate_concession().into(),
        entry.payment_concession().into(),
    ]
}

#[async_trait]
impl ReportJob for DifficultyMods {
    fn report_id(&self) -> &'static str {
        DIFFICULTY_MODS
    }

    fn title(&self) -> &'static str {
        "Financial Difficulty Modifications"
    }

    #[instrument(skip(self, ctx), fields(as_of = %ctx.as_of))]
    async fn build(&self, ctx: &RunContext) -> Result<ReportBook> {
        let thresholds = ctx.config.report(self.report_id()).thresholds;
        let lookback_start = ctx.as_of - Duration::days(thresholds.mod_lookback_days);
        let modifications = ctx.core.loan_modifications(lookback_start).await?;
        let loans = ctx.core.loan_accounts(ctx.as_of).await?;
        info!(
            "Extracted {} modifications against {} loan records",
            modifications.len(),
            loans.len()
        );

        let loans_by_account: HashMap<&str, &LoanAccount> = loans
            .iter()
            .map(|l| (l.account_number.as_str(), l))
            .collect();

        // Latest modification per account governs; the rest are history.
        let mut by_account: HashMap<&str, Vec<&LoanModification>> = HashMap::new();
        for m in &modifications {
            by_account.entry(m.account_number.as_str()).or_default().push(m);
        }
        let mut population: Vec<ModifiedLoan<'_>> = by_account
            .into_iter()
            .map(|(account, mut mods)| {
                mods.sort_by_key(|m| m.mod_date);
                ModifiedLoan {
                    latest: *mods.last().expect("group never empty"),
                    history_count: mods.len(),
                    loan: loans_by_account.get(account).copied(),
                }
            })
            .collect();
        population.sort_by_key(|e| (e.latest.mod_date, e.latest.account_number.clone()));

        let mut book = ReportBook::new(self.title());

        // Per-type rollup feeding the summary sheet
        struct TypeTally {
            count: usize,
            balance: f64,
            rate_concessions: Vec<f64>,
            redefault_count: usize,
            redefault_balance: f64,
        }
        let mut by_type: BTreeMap<&str, TypeTally> = BTreeMap::new();

        let mut active_sheet = SheetTable::new("Active Modifications", detail_columns());
        let mut new_sheet = SheetTable::new("New Modifications", detail_columns());
        let mut redefault_sheet = SheetTable::new("Redefaults", detail_columns());

        let new_window_start = ctx.as_of - Duration::days(thresholds.activity_window_days);
        let mut active_count = 0usize;
        let mut active_balance = 0.0f64;
        let mut released_count = 0usize;

        for entry in &population {
            let tally = by_type
                .entry(entry.latest.mod_type.as_str())
                .or_insert_with(|| TypeTally {
                    count: 0,
                    balance: 0.0,
                    rate_concessions: Vec::new(),
                    redefault_count: 0,
                    redefault_balance: 0.0,
                });
            tally.count += 1;
            tally.balance += entry.balance();
            if let Some(concession) = entry.rate_concession() {
                tally.rate_concessions.push(concession);
            }

            if entry.is_active() {
                active_count += 1;
                active_balance += entry.balance();
                active_sheet.frame.push_row(detail_row(entry, ctx.as_of))?;
            } else {
                released_count += 1;
            }

            if entry.latest.mod_date > new_window_start && entry.latest.mod_date <= ctx.as_of {
                new_sheet.frame.push_row(detail_row(entry, ctx.as_of))?;
            }

            if entry.redefaulted(ctx.as_of, thresholds.redefault_months) {
                tally.redefault_count += 1;
                tally.redefault_balance += entry.balance();
                redefault_sheet.frame.push_row(detail_row(entry, ctx.as_of))?;
            }
        }

        let mut summary = SheetTable::new(
            "Summary",
            vec![
                ("Mod Type", Text),
                ("Count", Integer),
                ("Balance", Money),
                ("Avg Rate Concession", Percent),
                ("Redefaults", Integer),
                ("Redefault Balance", Money),
            ],
        );
        for (mod_type, tally) in &by_type {
            let avg_concession = if tally.rate_concessions.is_empty() {
                None
            } else {
                Some(tally.rate_concessions.iter().sum::<f64>() / tally.rate_concessions.len() as f64)
            };
            summary.frame.push_row(vec![
                (*mod_type).into(),
                Cell::Int(tally.count as i64),
                Cell::Float(tally.balance),
                avg_concession.into(),
                Cell::Int(tally.redefault_count as i64),
                Cell::Float(tally.redefault_balance),
            ])?;
        }
        summary.frame.push_row(vec![
            "Active Population".into(),
            Cell::Int(active_count as i64),
            Cell::Float(active_balance),
            Cell::Empty,
            Cell::Empty,
            Cell::Empty,
        ])?;
        summary.frame.push_row(vec![
            "Released".into(),
            Cell::Int(released_count as i64),
            Cell::Empty,
            Cell::Empty,
            Cell::Empty,
            Cell::Empty,
        ])?;

        book.push_sheet(summary);
        book.push_sheet(active_sheet);
        book.push_sheet(new_sheet);
        book.push_sheet(redefault_sheet);

        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::warehouse::fixtures::FixtureWarehouse;
    use crate::warehouse::records::AccountStatus;
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
            open_date: date(2021, 1, 15),
            maturity_date: None,
            next_due_date: None,
            balance,
            commitment: None,
            rate: 0.0575,
            payment_amount: 1_200.0,
            risk_rating: Some(5),
            nonaccrual: false,
            revolving: false,
        }
    }

    fn modification(account: &str, when: NaiveDate, mod_type: &str) -> LoanModification {
        LoanModification {
            account_number: account.to_string(),
            mod_date: when,
            mod_type: mod_type.to_string(),
            rate_before: Some(0.0700),
            rate_after: Some(0.0500),
            payment_before: Some(1_500.0),
            payment_after: Some(1_200.0),
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
            [reports.difficulty_mods]
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
    async fn latest_modification_governs_and_history_counts() {
        let as_of = date(2026, 6, 30);
        let mut warehouse = FixtureWarehouse::new();
        warehouse.loans.push(loan("L1", 80_000.0));
        warehouse.modifications.extend([
            modification("L1", date(2024, 3, 1), "Rate Reduction"),
            modification("L1", date(2025, 9, 1), "Term Extension"),
        ]);

        let book = DifficultyMods.build(&context(warehouse, as_of)).await.unwrap();
        let active = book.sheet("Active Modifications").unwrap();
        assert_eq!(active.frame.row_count(), 1);
        assert_eq!(
            active.frame.get(0, "Mod Type"),
            Some(&Cell::Text("Term Extension".into()))
        );
        assert_eq!(active.frame.get(0, "Mods on Account"), Some(&Cell::Int(2)));
        // Seasoning from the governing (latest) mod: Sep 2025 -> Jun 2026 = 9 months
        assert_eq!(active.frame.get(0, "Seasoning (Months)"), Some(&Cell::Int(9)));
    }

    #[tokio::test]
    async fn closed_loans_count_as_released_not_active() {
        let as_of = date(2026, 6, 30);
        let mut warehouse = FixtureWarehouse::new();
        let mut closed = loan("L1", 0.0);
        closed.status = AccountStatus::Closed;
        warehouse.loans.push(closed);
        warehouse
            .modifications
            .push(modification("L1", date(2025, 1, 1), "Rate Reduction"));

        let book = DifficultyMods.build(&context(warehouse, as_of)).await.unwrap();
        assert_eq!(book.sheet("Active Modifications").unwrap().frame.row_count(), 0);
        let summary = book.sheet("Summary").unwrap();
        let released_row = summary
            .frame
            .rows()
            .iter()
            .position(|r| r[0] == Cell::Text("Released".into()))
            .unwrap();
        assert_eq!(summary.frame.rows()[released_row][1], Cell::Int(1));
        let active_row = summary
            .frame
            .rows()
            .iter()
            .position(|r| r[0] == Cell::Text("Active Population".into()))
            .unwrap();
        assert_eq!(summary.frame.rows()[active_row][1], Cell::Int(0));
    }

    #[tokio::test]
    async fn new_modifications_respect_trailing_window() {
        let as_of = date(2026, 6, 30);
        let mut warehouse = FixtureWarehouse::new();
        warehouse.loans.push(loan("L1", 50_000.0));
        warehouse.loans.push(loan("L2", 60_000.0));
        warehouse.modifications.extend([
            modification("L1", date(2026, 6, 15), "Rate Reduction"),
            modification("L2", date(2026, 4, 1), "Rate Reduction"),
        ]);

        let book = DifficultyMods.build(&context(warehouse, as_of)).await.unwrap();
        let new_sheet = book.sheet("New Modifications").unwrap();
        assert_eq!(new_sheet.frame.row_count(), 1);
        assert_eq!(new_sheet.frame.get(0, "Account"), Some(&Cell::Text("L1".into())));
    }

    #[tokio::test]
    async fn redefault_requires_90_dpd_inside_horizon() {
        let as_of = date(2026, 6, 30);
        let mut warehouse = FixtureWarehouse::new();

        // 120 DPD, modified 8 months before the 90-DPD crossing
        let mut redefaulted = loan("L1", 45_000.0);
        redefaulted.next_due_date = Some(date(2026, 3, 2));
        warehouse.loans.push(redefaulted);
        warehouse
            .modifications
            .push(modification("L1", date(2025, 10, 1), "Rate Reduction"));

        // 120 DPD but the modification is four years old
        let mut aged = loan("L2", 30_000.0);
        aged.next_due_date = Some(date(2026, 3, 2));
        warehouse.loans.push(aged);
        warehouse
            .modifications
            .push(modification("L2", date(2022, 10, 1), "Rate Reduction"));

        // Current loan, recent mod
        warehouse.loans.push(loan("L3", 20_000.0));
        warehouse
            .modifications
            .push(modification("L3", date(2026, 1, 1), "Term Extension"));

        let book = DifficultyMods.build(&context(warehouse, as_of)).await.unwrap();
        let redefaults = book.sheet("Redefaults").unwrap();
        assert_eq!(redefaults.frame.row_count(), 1);
        assert_eq!(redefaults.frame.get(0, "Account"), Some(&Cell::Text("L1".into())));

        let summary = book.sheet("Summary").unwrap();
        let rate_row = summary
            .frame
            .rows()
            .iter()
            .position(|r| r[0] == Cell::Text("Rate Reduction".into()))
            .unwrap();
        assert_eq!(summary.frame.rows()[rate_row][4], Cell::Int(1));
        // Average rate concession is 200bps across the fixtures
        let avg = summary.frame.rows()[rate_row][3].as_f64().unwrap();
        assert!((avg - 0.02).abs() < 1e-9);
    }
}
