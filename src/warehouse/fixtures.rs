//! In-memory implementation of both warehouse ports for tests, dry runs, and
//! local development. Filtering mirrors the WHERE clauses of the sqlx
//! adapters so a report behaves the same against either.

use crate::error::Result;
use crate::warehouse::records::*;
use crate::warehouse::{CoreWarehouse, OriginationsWarehouse};
use async_trait::async_trait;
use chrono::NaiveDate;

#[derive(Debug, Default, Clone)]
pub struct FixtureWarehouse {
    pub deposits: Vec<DepositAccount>,
    pub loans: Vec<LoanAccount>,
    pub modifications: Vec<LoanModification>,
    pub indirect_loans: Vec<IndirectLoan>,
    pub orgs: Vec<Org>,
    pub persons: Vec<Pers>,
    pub addresses: Vec<AddressUse>,
    pub user_fields: Vec<UserField>,
    pub applications: Vec<IndirectApplication>,
}

impl FixtureWarehouse {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoreWarehouse for FixtureWarehouse {
    async fn deposit_accounts(&self, _as_of: NaiveDate) -> Result<Vec<DepositAccount>> {
        Ok(self.deposits.clone())
    }

    async fn open_commercial_loans(&self, _as_of: NaiveDate) -> Result<Vec<LoanAccount>> {
        Ok(self
            .loans
            .iter()
            .filter(|l| l.status.is_open())
            .cloned()
            .collect())
    }

    async fn loan_accounts(&self, _as_of: NaiveDate) -> Result<Vec<LoanAccount>> {
        Ok(self.loans.clone())
    }

    async fn loan_modifications(&self, since: NaiveDate) -> Result<Vec<LoanModification>> {
        Ok(self
            .modifications
            .iter()
            .filter(|m| m.mod_date >= since)
            .cloned()
            .collect())
    }

    async fn funded_indirect_loans(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<IndirectLoan>> {
        Ok(self
            .indirect_loans
            .iter()
            .filter(|l| l.booked_date >= from && l.booked_date <= to)
            .cloned()
            .collect())
    }

    async fn orgs(&self) -> Result<Vec<Org>> {
        Ok(self.orgs.clone())
    }

    async fn persons(&self) -> Result<Vec<Pers>> {
        Ok(self.persons.clone())
    }

    async fn address_uses(&self) -> Result<Vec<AddressUse>> {
        Ok(self.addresses.clone())
    }

    async fn user_fields(&self) -> Result<Vec<UserField>> {
        Ok(self.user_fields.clone())
    }
}

#[async_trait]
impl OriginationsWarehouse for FixtureWarehouse {
    async fn indirect_applications(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<IndirectApplication>> {
        Ok(self
            .applications
            .iter()
            // BETWEEN on a nullable column: undecided applications never match
            .filter(|a| match a.decision_date {
                Some(d) => d >= from && d <= to,
                None => false,
            })
            .cloned()
            .collect())
    }
}
