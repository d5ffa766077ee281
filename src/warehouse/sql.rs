//! sqlx adapters for the two warehouse schemas.
//!
//! Column lists are explicit and amounts are cast to double precision at the
//! query so row mapping never depends on the warehouse's NUMBER precisions.
//! Connection strings come from the environment (`DWH_CORE_URL`,
//! `DWH_LOS_URL`); pool sizing comes from config.

use crate::config::WarehouseConfig;
use crate::error::Result;
use crate::observability;
use crate::warehouse::records::*;
use crate::warehouse::{CoreWarehouse, OriginationsWarehouse};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::{Duration, Instant};
use tracing::info;

pub const CORE_URL_VAR: &str = "DWH_CORE_URL";
pub const LOS_URL_VAR: &str = "DWH_LOS_URL";

async fn connect(url_var: &str, config: &WarehouseConfig) -> Result<PgPool> {
    let url = std::env::var(url_var)?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .connect(&url)
        .await?;
    info!("Connected warehouse pool from {}", url_var);
    Ok(pool)
}

fn record_extract(source: &str, rows: usize, started: Instant) {
    observability::extract::rows(source, rows);
    observability::extract::duration_seconds(source, started.elapsed().as_secs_f64());
}

/// Core-banking warehouse over Postgres.
pub struct SqlCoreWarehouse {
    pool: PgPool,
}

impl SqlCoreWarehouse {
    pub async fn connect(config: &WarehouseConfig) -> Result<Self> {
        Ok(Self {
            pool: connect(CORE_URL_VAR, config).await?,
        })
    }
}

fn map_deposit(row: &PgRow) -> sqlx::Result<DepositAccount> {
    Ok(DepositAccount {
        account_number: row.try_get("account_number")?,
        customer_name: row.try_get("customer_name")?,
        tax_id: row.try_get("tax_id")?,
        product_class: row.try_get("product_class")?,
        product_code: row.try_get("product_code")?,
        branch: row.try_get("branch")?,
        status: AccountStatus::from_code(row.try_get::<String, _>("status_code")?.as_str()),
        open_date: row.try_get("open_date")?,
        close_date: row.try_get("close_date")?,
        maturity_date: row.try_get("maturity_date")?,
        current_balance: row.try_get("current_balance")?,
        prior_balance: row.try_get("prior_balance")?,
    })
}

fn map_loan(row: &PgRow) -> sqlx::Result<LoanAccount> {
    Ok(LoanAccount {
        account_number: row.try_get("account_number")?,
        borrower_name: row.try_get("borrower_name")?,
        tax_id: row.try_get("tax_id")?,
        note_type: row.try_get("note_type")?,
        branch: row.try_get("branch")?,
        officer: row.try_get("officer")?,
        status: AccountStatus::from_code(row.try_get::<String, _>("status_code")?.as_str()),
        open_date: row.try_get("open_date")?,
        maturity_date: row.try_get("maturity_date")?,
        next_due_date: row.try_get("next_due_date")?,
        balance: row.try_get("balance")?,
        commitment: row.try_get("commitment")?,
        rate: row.try_get("rate")?,
        payment_amount: row.try_get("payment_amount")?,
        risk_rating: row.try_get("risk_rating")?,
        nonaccrual: row.try_get("nonaccrual")?,
        revolving: row.try_get("revolving")?,
    })
}

const LOAN_COLUMNS: &str = r#"
    account_number, borrower_name, tax_id, note_type, branch, officer,
    status_code, open_date, maturity_date, next_due_date,
    balance::double precision AS balance,
    commitment::double precision AS commitment,
    rate::double precision AS rate,
    payment_amount::double precision AS payment_amount,
    risk_rating, nonaccrual, revolving
"#;

#[async_trait]
impl CoreWarehouse for SqlCoreWarehouse {
    async fn deposit_accounts(&self, as_of: NaiveDate) -> Result<Vec<DepositAccount>> {
        let started = Instant::now();
        let rows = sqlx::query(
            r#"
            SELECT account_number, customer_name, tax_id, product_class,
                   product_code, branch, status_code, open_date, close_date,
                   maturity_date,
                   current_balance::double precision AS current_balance,
                   prior_balance::double precision AS prior_balance
            FROM dw.deposit_accounts
            WHERE snapshot_date = $1
            "#,
        )
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;
        let accounts = rows
            .iter()
            .map(map_deposit)
            .collect::<sqlx::Result<Vec<_>>>()?;
        record_extract("deposit_accounts", accounts.len(), started);
        Ok(accounts)
    }

    async fn open_commercial_loans(&self, as_of: NaiveDate) -> Result<Vec<LoanAccount>> {
        let started = Instant::now();
        let sql = format!(
            "SELECT {LOAN_COLUMNS} FROM dw.loan_accounts \
             WHERE snapshot_date = $1 AND portfolio = 'CML' AND status_code NOT IN ('C', 'CO')"
        );
        let rows = sqlx::query(&sql).bind(as_of).fetch_all(&self.pool).await?;
        let loans = rows.iter().map(map_loan).collect::<sqlx::Result<Vec<_>>>()?;
        record_extract("open_commercial_loans", loans.len(), started);
        Ok(loans)
    }

    async fn loan_accounts(&self, as_of: NaiveDate) -> Result<Vec<LoanAccount>> {
        let started = Instant::now();
        let sql = format!("SELECT {LOAN_COLUMNS} FROM dw.loan_accounts WHERE snapshot_date = $1");
        let rows = sqlx::query(&sql).bind(as_of).fetch_all(&self.pool).await?;
        let loans = rows.iter().map(map_loan).collect::<sqlx::Result<Vec<_>>>()?;
        record_extract("loan_accounts", loans.len(), started);
        Ok(loans)
    }

    async fn loan_modifications(&self, since: NaiveDate) -> Result<Vec<LoanModification>> {
        let started = Instant::now();
        let rows = sqlx::query(
            r#"
            SELECT account_number, mod_date, mod_type,
                   rate_before::double precision AS rate_before,
                   rate_after::double precision AS rate_after,
                   payment_before::double precision AS payment_before,
                   payment_after::double precision AS payment_after
            FROM dw.loan_modifications
            WHERE mod_date >= $1
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        let mods = rows
            .iter()
            .map(|row| {
                Ok(LoanModification {
                    account_number: row.try_get("account_number")?,
                    mod_date: row.try_get("mod_date")?,
                    mod_type: row.try_get("mod_type")?,
                    rate_before: row.try_get("rate_before")?,
                    rate_after: row.try_get("rate_after")?,
                    payment_before: row.try_get("payment_before")?,
                    payment_after: row.try_get("payment_after")?,
                })
            })
            .collect::<sqlx::Result<Vec<_>>>()?;
        record_extract("loan_modifications", mods.len(), started);
        Ok(mods)
    }

    async fn funded_indirect_loans(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<IndirectLoan>> {
        let started = Instant::now();
        let rows = sqlx::query(
            r#"
            SELECT account_number, borrower_name, application_id, note_reference,
                   dealer_name, booked_date,
                   amount::double precision AS amount
            FROM dw.indirect_loans
            WHERE booked_date BETWEEN $1 AND $2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        let loans = rows
            .iter()
            .map(|row| {
                Ok(IndirectLoan {
                    account_number: row.try_get("account_number")?,
                    borrower_name: row.try_get("borrower_name")?,
                    application_id: row.try_get("application_id")?,
                    note_reference: row.try_get("note_reference")?,
                    dealer_name: row.try_get("dealer_name")?,
                    booked_date: row.try_get("booked_date")?,
                    amount: row.try_get("amount")?,
                })
            })
            .collect::<sqlx::Result<Vec<_>>>()?;
        record_extract("funded_indirect_loans", loans.len(), started);
        Ok(loans)
    }

    async fn orgs(&self) -> Result<Vec<Org>> {
        let started = Instant::now();
        let rows = sqlx::query(
            "SELECT org_number, name, tax_id, last_maint, active_accounts FROM dw.org_master",
        )
        .fetch_all(&self.pool)
        .await?;
        let orgs = rows
            .iter()
            .map(|row| {
                Ok(Org {
                    org_number: row.try_get("org_number")?,
                    name: row.try_get("name")?,
                    tax_id: row.try_get("tax_id")?,
                    last_maint: row.try_get("last_maint")?,
                    active_accounts: row.try_get("active_accounts")?,
                })
            })
            .collect::<sqlx::Result<Vec<_>>>()?;
        record_extract("orgs", orgs.len(), started);
        Ok(orgs)
    }

    async fn persons(&self) -> Result<Vec<Pers>> {
        let started = Instant::now();
        let rows = sqlx::query(
            "SELECT pers_number, name, tax_id, last_maint, active_accounts FROM dw.pers_master",
        )
        .fetch_all(&self.pool)
        .await?;
        let persons = rows
            .iter()
            .map(|row| {
                Ok(Pers {
                    pers_number: row.try_get("pers_number")?,
                    name: row.try_get("name")?,
                    tax_id: row.try_get("tax_id")?,
                    last_maint: row.try_get("last_maint")?,
                    active_accounts: row.try_get("active_accounts")?,
                })
            })
            .collect::<sqlx::Result<Vec<_>>>()?;
        record_extract("persons", persons.len(), started);
        Ok(persons)
    }

    async fn address_uses(&self) -> Result<Vec<AddressUse>> {
        let started = Instant::now();
        let rows = sqlx::query(
            "SELECT entity_number, role, line1, city, state, zip, last_maint FROM dw.address_use",
        )
        .fetch_all(&self.pool)
        .await?;
        let addresses = rows
            .iter()
            .map(|row| {
                Ok(AddressUse {
                    entity_number: row.try_get("entity_number")?,
                    role: row.try_get("role")?,
                    line1: row.try_get("line1")?,
                    city: row.try_get("city")?,
                    state: row.try_get("state")?,
                    zip: row.try_get("zip")?,
                    last_maint: row.try_get("last_maint")?,
                })
            })
            .collect::<sqlx::Result<Vec<_>>>()?;
        record_extract("address_uses", addresses.len(), started);
        Ok(addresses)
    }

    async fn user_fields(&self) -> Result<Vec<UserField>> {
        let started = Instant::now();
        let rows = sqlx::query(
            "SELECT entity_number, field_code, field_type, value FROM dw.user_fields",
        )
        .fetch_all(&self.pool)
        .await?;
        let fields = rows
            .iter()
            .map(|row| {
                Ok(UserField {
                    entity_number: row.try_get("entity_number")?,
                    field_code: row.try_get("field_code")?,
                    field_type: row.try_get("field_type")?,
                    value: row.try_get("value")?,
                })
            })
            .collect::<sqlx::Result<Vec<_>>>()?;
        record_extract("user_fields", fields.len(), started);
        Ok(fields)
    }
}

/// Loan-origination system warehouse over Postgres.
pub struct SqlLosWarehouse {
    pool: PgPool,
}

impl SqlLosWarehouse {
    pub async fn connect(config: &WarehouseConfig) -> Result<Self> {
        Ok(Self {
            pool: connect(LOS_URL_VAR, config).await?,
        })
    }
}

#[async_trait]
impl OriginationsWarehouse for SqlLosWarehouse {
    async fn indirect_applications(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<IndirectApplication>> {
        let started = Instant::now();
        let rows = sqlx::query(
            r#"
            SELECT application_id, applicant_name, dealer_name, decision_status,
                   decision_date,
                   amount::double precision AS amount
            FROM los.indirect_applications
            WHERE decision_date BETWEEN $1 AND $2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        let apps = rows
            .iter()
            .map(|row| {
                Ok(IndirectApplication {
                    application_id: row.try_get("application_id")?,
                    applicant_name: row.try_get("applicant_name")?,
                    dealer_name: row.try_get("dealer_name")?,
                    decision_status: row.try_get("decision_status")?,
                    decision_date: row.try_get("decision_date")?,
                    amount: row.try_get("amount")?,
                })
            })
            .collect::<sqlx::Result<Vec<_>>>()?;
        record_extract("indirect_applications", apps.len(), started);
        Ok(apps)
    }
}
