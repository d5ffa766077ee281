//! Typed rows extracted from the core and originations warehouse schemas,
//! plus the shared vocabulary every report speaks: account status,
//! delinquency bucketing, and primary-address selection.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Account lifecycle status as carried in the warehouse status code column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Open,
    Closed,
    Dormant,
    ChargedOff,
}

impl AccountStatus {
    /// Maps the warehouse status codes. Unknown codes fall back to Open so a
    /// new core status code never silently drops accounts from reports.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "C" | "CL" | "CLOSED" => AccountStatus::Closed,
            "D" | "DORM" | "DORMANT" => AccountStatus::Dormant,
            "CO" | "CHGO" | "CHARGED_OFF" => AccountStatus::ChargedOff,
            _ => AccountStatus::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, AccountStatus::Open | AccountStatus::Dormant)
    }
}

/// Days-past-due bucket used across delinquency and modification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DelinquencyBucket {
    Current,
    Days30,
    Days60,
    Days90Plus,
}

impl DelinquencyBucket {
    pub fn from_days(dpd: i64) -> Self {
        match dpd {
            d if d >= 90 => DelinquencyBucket::Days90Plus,
            d if d >= 60 => DelinquencyBucket::Days60,
            d if d >= 30 => DelinquencyBucket::Days30,
            _ => DelinquencyBucket::Current,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DelinquencyBucket::Current => "Current",
            DelinquencyBucket::Days30 => "30-59 DPD",
            DelinquencyBucket::Days60 => "60-89 DPD",
            DelinquencyBucket::Days90Plus => "90+ DPD",
        }
    }
}

/// Days past due as of a business date. A missing or future next-due date
/// means the account is current.
pub fn days_past_due(next_due: Option<NaiveDate>, as_of: NaiveDate) -> i64 {
    match next_due {
        Some(due) if due < as_of => (as_of - due).num_days(),
        _ => 0,
    }
}

/// Deposit account snapshot with current and prior-period balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositAccount {
    pub account_number: String,
    pub customer_name: String,
    pub tax_id: Option<String>,
    /// Product class: CK, SV, MM, or CD.
    pub product_class: String,
    pub product_code: String,
    pub branch: String,
    pub status: AccountStatus,
    pub open_date: NaiveDate,
    pub close_date: Option<NaiveDate>,
    /// Populated for CDs only.
    pub maturity_date: Option<NaiveDate>,
    pub current_balance: f64,
    pub prior_balance: f64,
}

/// Loan account snapshot (commercial portfolio and indirect book).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanAccount {
    pub account_number: String,
    pub borrower_name: String,
    pub tax_id: Option<String>,
    pub note_type: String,
    pub branch: String,
    pub officer: String,
    pub status: AccountStatus,
    pub open_date: NaiveDate,
    pub maturity_date: Option<NaiveDate>,
    pub next_due_date: Option<NaiveDate>,
    pub balance: f64,
    /// Committed amount for revolving lines; None for term notes.
    pub commitment: Option<f64>,
    pub rate: f64,
    pub payment_amount: f64,
    pub risk_rating: Option<i32>,
    pub nonaccrual: bool,
    pub revolving: bool,
}

/// One loan modification event (rate/payment concession) from the
/// financial-difficulty tracking table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanModification {
    pub account_number: String,
    pub mod_date: NaiveDate,
    pub mod_type: String,
    pub rate_before: Option<f64>,
    pub rate_after: Option<f64>,
    pub payment_before: Option<f64>,
    pub payment_after: Option<f64>,
}

/// Indirect (dealer-originated) loan as booked on core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndirectLoan {
    pub account_number: String,
    pub borrower_name: String,
    /// LOS application id carried onto the note at boarding, when present.
    pub application_id: Option<String>,
    /// Free-text note reference; vendor tags (DT/DLT/RO + digits) hide here.
    pub note_reference: Option<String>,
    pub dealer_name: Option<String>,
    pub booked_date: NaiveDate,
    pub amount: f64,
}

/// Application decision from the loan-origination system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndirectApplication {
    pub application_id: String,
    pub applicant_name: String,
    pub dealer_name: Option<String>,
    /// LOS decision status code (e.g. APPROVED, FUNDED, DECLINED).
    pub decision_status: String,
    pub decision_date: Option<NaiveDate>,
    pub amount: f64,
}

/// Organization master record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Org {
    pub org_number: String,
    pub name: String,
    pub tax_id: Option<String>,
    pub last_maint: Option<NaiveDate>,
    pub active_accounts: i64,
}

/// Person master record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pers {
    pub pers_number: String,
    pub name: String,
    pub tax_id: Option<String>,
    pub last_maint: Option<NaiveDate>,
    pub active_accounts: i64,
}

/// One address-use row tied to an org or person master record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressUse {
    /// Owning org/pers number.
    pub entity_number: String,
    /// Address role code; PRI marks the primary address.
    pub role: String,
    pub line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub last_maint: Option<NaiveDate>,
}

/// User-defined field value with its declared type code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserField {
    pub entity_number: String,
    pub field_code: String,
    /// Declared type: DATE, NUM, or TEXT.
    pub field_type: String,
    pub value: String,
}

/// Picks the primary (PRI-role) address from an entity's address uses.
/// When the core carries more than one PRI row, the most recently maintained
/// one wins.
pub fn primary_address(addresses: &[AddressUse]) -> Option<&AddressUse> {
    addresses
        .iter()
        .filter(|a| a.role.eq_ignore_ascii_case("PRI"))
        .max_by_key(|a| a.last_maint)
}

/// Whole months elapsed between two dates (negative-free; same-month is 0).
pub fn whole_months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    if to < from {
        return 0;
    }
    let mut months =
        (to.year() as i64 - from.year() as i64) * 12 + (to.month() as i64 - from.month() as i64);
    if to.day() < from.day() {
        months -= 1;
    }
    months.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn addr(role: &str, maint: Option<NaiveDate>) -> AddressUse {
        AddressUse {
            entity_number: "ORG1".into(),
            role: role.into(),
            line1: Some("1 Main St".into()),
            city: Some("Hartford".into()),
            state: Some("CT".into()),
            zip: Some("06103".into()),
            last_maint: maint,
        }
    }

    #[test]
    fn buckets_follow_dpd_boundaries() {
        assert_eq!(DelinquencyBucket::from_days(0), DelinquencyBucket::Current);
        assert_eq!(DelinquencyBucket::from_days(29), DelinquencyBucket::Current);
        assert_eq!(DelinquencyBucket::from_days(30), DelinquencyBucket::Days30);
        assert_eq!(DelinquencyBucket::from_days(59), DelinquencyBucket::Days30);
        assert_eq!(DelinquencyBucket::from_days(60), DelinquencyBucket::Days60);
        assert_eq!(DelinquencyBucket::from_days(89), DelinquencyBucket::Days60);
        assert_eq!(DelinquencyBucket::from_days(90), DelinquencyBucket::Days90Plus);
        assert_eq!(DelinquencyBucket::from_days(400), DelinquencyBucket::Days90Plus);
    }

    #[test]
    fn missing_or_future_due_date_is_current() {
        let as_of = date(2026, 6, 15);
        assert_eq!(days_past_due(None, as_of), 0);
        assert_eq!(days_past_due(Some(date(2026, 7, 1)), as_of), 0);
        assert_eq!(days_past_due(Some(date(2026, 6, 15)), as_of), 0);
        assert_eq!(days_past_due(Some(date(2026, 5, 1)), as_of), 45);
    }

    #[test]
    fn primary_address_prefers_pri_role_and_newest_maint() {
        let addresses = vec![
            addr("MAIL", Some(date(2026, 1, 1))),
            addr("PRI", Some(date(2020, 5, 1))),
            addr("PRI", Some(date(2024, 3, 1))),
            addr("SEAS", None),
        ];
        let picked = primary_address(&addresses).unwrap();
        assert_eq!(picked.role, "PRI");
        assert_eq!(picked.last_maint, Some(date(2024, 3, 1)));
    }

    #[test]
    fn primary_address_none_without_pri_rows() {
        let addresses = vec![addr("MAIL", Some(date(2026, 1, 1)))];
        assert!(primary_address(&addresses).is_none());
    }

    #[test]
    fn whole_months_counts_complete_months_only() {
        assert_eq!(whole_months_between(date(2026, 1, 15), date(2026, 2, 14)), 0);
        assert_eq!(whole_months_between(date(2026, 1, 15), date(2026, 2, 15)), 1);
        assert_eq!(whole_months_between(date(2025, 1, 31), date(2026, 1, 30)), 11);
        assert_eq!(whole_months_between(date(2026, 3, 1), date(2026, 2, 1)), 0);
    }

    #[test]
    fn status_codes_map_to_lifecycle() {
        assert_eq!(AccountStatus::from_code("C"), AccountStatus::Closed);
        assert_eq!(AccountStatus::from_code("dorm"), AccountStatus::Dormant);
        assert_eq!(AccountStatus::from_code("A"), AccountStatus::Open);
        assert!(AccountStatus::Dormant.is_open());
        assert!(!AccountStatus::Closed.is_open());
    }
}
