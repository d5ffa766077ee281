//! Warehouse access layer: typed row records, the async extraction ports the
//! reports are written against, the sqlx adapters that hit the real schemas,
//! and an in-memory fixture implementation for tests and dry runs.

pub mod fixtures;
pub mod records;
pub mod sql;

use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use records::*;

/// Extraction port over the core-banking data warehouse schema.
///
/// One method per extract; every report declares its inputs by calling these
/// rather than carrying SQL of its own.
#[async_trait]
pub trait CoreWarehouse: Send + Sync {
    /// Deposit account snapshot with current and prior-period balances.
    async fn deposit_accounts(&self, as_of: NaiveDate) -> Result<Vec<DepositAccount>>;

    /// Open commercial loans as of the business date.
    async fn open_commercial_loans(&self, as_of: NaiveDate) -> Result<Vec<LoanAccount>>;

    /// All loans (open and closed) for modification tracking.
    async fn loan_accounts(&self, as_of: NaiveDate) -> Result<Vec<LoanAccount>>;

    /// Loan modifications with mod dates on or after `since`.
    async fn loan_modifications(&self, since: NaiveDate) -> Result<Vec<LoanModification>>;

    /// Indirect loans booked inside the window (inclusive).
    async fn funded_indirect_loans(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<IndirectLoan>>;

    /// Organization master records.
    async fn orgs(&self) -> Result<Vec<Org>>;

    /// Person master records.
    async fn persons(&self) -> Result<Vec<Pers>>;

    /// Address-use rows for all org/pers entities.
    async fn address_uses(&self) -> Result<Vec<AddressUse>>;

    /// User-defined field values for all org/pers entities.
    async fn user_fields(&self) -> Result<Vec<UserField>>;
}

/// Extraction port over the loan-origination system schema.
#[async_trait]
pub trait OriginationsWarehouse: Send + Sync {
    /// Indirect application decisions inside the window (inclusive).
    async fn indirect_applications(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<IndirectApplication>>;
}
