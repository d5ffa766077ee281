//! Deposit Deep Dive: balance movement, account activity, CD maturities,
//! branch mix, and relationship concentration over the deposit book.

use crate::error::Result;
use crate::frame::Cell;
use crate::pipeline::registry::DEPOSIT_DEEP_DIVE;
use crate::pipeline::ColumnFormat::{Date, Integer, Money, Percent, Text};
use crate::pipeline::{ReportBook, ReportJob, RunContext, SheetTable};
use crate::warehouse::records::DepositAccount;
use async_trait::async_trait;
use chrono::Duration;
use std::collections::BTreeMap;
use tracing::{info, instrument};

pub struct DepositDeepDive;

/// Product classes in presentation order; anything else sorts after.
const PRODUCT_ORDER: &[&str] = &["CK", "SV", "MM", "CD"];

fn product_rank(class: &str) -> usize {
    PRODUCT_ORDER
        .iter()
        .position(|p| *p == class)
        .unwrap_or(PRODUCT_ORDER.len())
}

/// Percent change, omitted (None) when the prior balance is zero.
fn pct_change(prior: f64, current: f64) -> Option<f64> {
    if prior == 0.0 {
        None
    } else {
        Some((current - prior) / prior)
    }
}

#[async_trait]
impl ReportJob for DepositDeepDive {
    fn report_id(&self) -> &'static str {
        DEPOSIT_DEEP_DIVE
    }

    fn title(&self) -> &'static str {
        "Deposit Deep Dive"
    }

    #[instrument(skip(self, ctx), fields(as_of = %ctx.as_of))]
    async fn build(&self, ctx: &RunContext) -> Result<ReportBook> {
        let thresholds = ctx.config.report(self.report_id()).thresholds;
        let accounts = ctx.core.deposit_accounts(ctx.as_of).await?;
        info!("Extracted {} deposit accounts", accounts.len());

        let open: Vec<&DepositAccount> =
            accounts.iter().filter(|a| a.status.is_open()).collect();

        let mut book = ReportBook::new(self.title());

        // Summary by product class
        let mut summary = SheetTable::new(
            "Summary",
            vec![
                ("Product Class", Text),
                ("Accounts", Integer),
                ("Prior Balance", Money),
                ("Current Balance", Money),
                ("Net Change", Money),
                ("Pct Change", Percent),
            ],
        );
        let mut by_class: BTreeMap<&str, (usize, f64, f64)> = BTreeMap::new();
        for account in &open {
            let entry = by_class.entry(account.product_class.as_str()).or_default();
            entry.0 += 1;
            entry.1 += account.prior_balance;
            entry.2 += account.current_balance;
        }
        let mut classes: Vec<_> = by_class.into_iter().collect();
        classes.sort_by_key(|(class, _)| (product_rank(class), class.to_string()));
        let mut total = (0usize, 0.0f64, 0.0f64);
        for (class, (count, prior, current)) in &classes {
            total.0 += count;
            total.1 += prior;
            total.2 += current;
            summary.frame.push_row(vec![
                (*class).into(),
                Cell::Int(*count as i64),
                Cell::Float(*prior),
                Cell::Float(*current),
                Cell::Float(current - prior),
                pct_change(*prior, *current).into(),
            ])?;
        }
        summary.frame.push_row(vec![
            "Total".into(),
            Cell::Int(total.0 as i64),
            Cell::Float(total.1),
            Cell::Float(total.2),
            Cell::Float(total.2 - total.1),
            pct_change(total.1, total.2).into(),
        ])?;
        book.push_sheet(summary);

        // Large movements
        let mut movements = SheetTable::new(
            "Large Movements",
            vec![
                ("Account", Text),
                ("Customer", Text),
                ("Product Class", Text),
                ("Branch", Text),
                ("Prior Balance", Money),
                ("Current Balance", Money),
                ("Change", Money),
                ("Pct Change", Percent),
            ],
        );
        let mut movers: Vec<&&DepositAccount> = open
            .iter()
            .filter(|a| {
                let delta = (a.current_balance - a.prior_balance).abs();
                delta >= thresholds.large_move_floor
                    || (a.prior_balance >= thresholds.large_move_prior_min
                        && delta >= thresholds.large_move_pct * a.prior_balance.abs())
            })
            .collect();
        movers.sort_by(|a, b| {
            let da = (a.current_balance - a.prior_balance).abs();
            let db = (b.current_balance - b.prior_balance).abs();
            db.partial_cmp(&da).unwrap_or(std::cmp::Ordering::Equal)
        });
        for account in movers {
            movements.frame.push_row(vec![
                account.account_number.as_str().into(),
                account.customer_name.as_str().into(),
                account.product_class.as_str().into(),
                account.branch.as_str().into(),
                Cell::Float(account.prior_balance),
                Cell::Float(account.current_balance),
                Cell::Float(account.current_balance - account.prior_balance),
                pct_change(account.prior_balance, account.current_balance).into(),
            ])?;
        }
        book.push_sheet(movements);

        // New and closed accounts in the trailing window
        let window_start = ctx.as_of - Duration::days(thresholds.activity_window_days);
        let account_row = |a: &DepositAccount, event: Option<chrono::NaiveDate>| {
            vec![
                a.account_number.as_str().into(),
                a.customer_name.as_str().into(),
                a.product_class.as_str().into(),
                a.branch.as_str().into(),
                event.into(),
                Cell::Float(a.current_balance),
            ]
        };
        let activity_columns = |event_header| {
            vec![
                ("Account", Text),
                ("Customer", Text),
                ("Product Class", Text),
                ("Branch", Text),
                (event_header, Date),
                ("Current Balance", Money),
            ]
        };

        let mut new_accounts = SheetTable::new("New Accounts", activity_columns("Opened"));
        let mut opened: Vec<&&DepositAccount> = open
            .iter()
            .filter(|a| a.open_date > window_start && a.open_date <= ctx.as_of)
            .collect();
        opened.sort_by_key(|a| a.open_date);
        for account in opened {
            new_accounts
                .frame
                .push_row(account_row(account, Some(account.open_date)))?;
        }
        book.push_sheet(new_accounts);

        let mut closed_accounts = SheetTable::new("Closed Accounts", activity_columns("Closed"));
        let mut closed: Vec<&DepositAccount> = accounts
            .iter()
            .filter(|a| {
                a.close_date
                    .map(|d| d > window_start && d <= ctx.as_of)
                    .unwrap_or(false)
            })
            .collect();
        closed.sort_by_key(|a| a.close_date);
        for account in closed {
            closed_accounts
                .frame
                .push_row(account_row(account, account.close_date))?;
        }
        book.push_sheet(closed_accounts);

        // CDs maturing inside the forward window
        let maturity_end = ctx.as_of + Duration::days(thresholds.maturity_window_days);
        let mut maturing = SheetTable::new(
            "Maturing CDs",
            vec![
                ("Account", Text),
                ("Customer", Text),
                ("Branch", Text),
                ("Maturity Date", Date),
                ("Current Balance", Money),
            ],
        );
        let mut cds: Vec<&&DepositAccount> = open
            .iter()
            .filter(|a| {
                a.product_class == "CD"
                    && a.maturity_date
                        .map(|m| m >= ctx.as_of && m <= maturity_end)
                        .unwrap_or(false)
            })
            .collect();
        cds.sort_by_key(|a| a.maturity_date);
        for account in cds {
            maturing.frame.push_row(vec![
                account.account_number.as_str().into(),
                account.customer_name.as_str().into(),
                account.branch.as_str().into(),
                account.maturity_date.into(),
                Cell::Float(account.current_balance),
            ])?;
        }
        book.push_sheet(maturing);

        // Branch mix
        let mut branch_mix = SheetTable::new(
            "Branch Mix",
            vec![
                ("Branch", Text),
                ("Accounts", Integer),
                ("Balance", Money),
                ("Share of Total", Percent),
            ],
        );
        let bank_total: f64 = open.iter().map(|a| a.current_balance).sum();
        let mut by_branch: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
        for account in &open {
            let entry = by_branch.entry(account.branch.as_str()).or_default();
            entry.0 += 1;
            entry.1 += account.current_balance;
        }
        for (branch, (count, balance)) in by_branch {
            let share = if bank_total == 0.0 {
                None
            } else {
                Some(balance / bank_total)
            };
            branch_mix.frame.push_row(vec![
                branch.into(),
                Cell::Int(count as i64),
                Cell::Float(balance),
                share.into(),
            ])?;
        }
        book.push_sheet(branch_mix);

        // Top relationships by tax id; rows without one are excluded
        let mut top = SheetTable::new(
            "Top Relationships",
            vec![
                ("Tax Id", Text),
                ("Customer", Text),
                ("Accounts", Integer),
                ("Balance", Money),
            ],
        );
        let mut by_tax_id: BTreeMap<&str, (String, usize, f64)> = BTreeMap::new();
        for account in &open {
            let Some(tax_id) = account.tax_id.as_deref() else {
                continue;
            };
            let entry = by_tax_id
                .entry(tax_id)
                .or_insert_with(|| (account.customer_name.clone(), 0, 0.0));
            entry.1 += 1;
            entry.2 += account.current_balance;
        }
        let mut relationships: Vec<_> = by_tax_id.into_iter().collect();
        relationships.sort_by(|a, b| {
            b.1 .2
                .partial_cmp(&a.1 .2)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for (tax_id, (name, count, balance)) in
            relationships.into_iter().take(thresholds.top_relationships)
        {
            top.frame.push_row(vec![
                tax_id.into(),
                name.into(),
                Cell::Int(count as i64),
                Cell::Float(balance),
            ])?;
        }
        book.push_sheet(top);

        Ok(book)
    }
}
