//! The ordered-pass matcher behind the funding reconciliation.
//!
//! Each vendor record is tried against the booked indirect loans in
//! descending confidence order: exact application number, vendor tag in the
//! note reference, then normalized name + amount + date. A fuzzy name
//! candidate is never auto-matched; it routes to needs-review. Whatever is
//! left is bucketed (pending boarding, funded-not-booked) against the LOS
//! decisions, and unclaimed loans come back as booked-not-funded.

use crate::config::Thresholds;
use crate::error::{ReportError, Result};
use crate::recon::{VendorRecord, VendorSystem};
use crate::warehouse::records::{IndirectApplication, IndirectLoan};
use chrono::{Datelike, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Vendor tag embedded in a core note reference: DT/DLT/RO prefix plus the
/// application number digits.
static REFERENCE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(DT|DLT|RO)(\d{5,9})\b").expect("valid reference-tag pattern"));

/// How a vendor record was linked to a booked loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    ApplicationNumber,
    NoteReference,
    NameAmountDate,
}

impl MatchMethod {
    pub fn confidence(&self) -> f64 {
        match self {
            MatchMethod::ApplicationNumber => 1.0,
            MatchMethod::NoteReference => 0.95,
            MatchMethod::NameAmountDate => 0.90,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MatchMethod::ApplicationNumber => "Application Number",
            MatchMethod::NoteReference => "Note Reference",
            MatchMethod::NameAmountDate => "Name/Amount/Date",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchedPair {
    pub record: VendorRecord,
    pub loan: IndirectLoan,
    pub method: MatchMethod,
}

/// Identity-matched pair whose amounts disagree beyond tolerance.
#[derive(Debug, Clone)]
pub struct AmountMismatch {
    pub record: VendorRecord,
    pub loan: IndirectLoan,
    pub method: MatchMethod,
    pub difference: f64,
}

/// Fuzzy candidate routed to manual review.
#[derive(Debug, Clone)]
pub struct ReviewCandidate {
    pub record: VendorRecord,
    pub loan: IndirectLoan,
    pub similarity: f64,
}

/// Vendor row the LOS shows approved/funded inside the boarding grace window.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub record: VendorRecord,
    pub application: IndirectApplication,
}

/// Full categorized result of one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReconOutcome {
    pub matched: Vec<MatchedPair>,
    pub duplicates: Vec<VendorRecord>,
    pub pending: Vec<PendingRecord>,
    pub funded_not_booked: Vec<VendorRecord>,
    pub booked_not_funded: Vec<IndirectLoan>,
    pub amount_mismatch: Vec<AmountMismatch>,
    pub needs_review: Vec<ReviewCandidate>,
}

/// Matching knobs, lifted from the report's threshold config.
#[derive(Debug, Clone)]
pub struct ReconConfig {
    pub amount_tolerance: f64,
    pub date_window_days: i64,
    pub fuzzy_threshold: f64,
    pub pending_grace_days: i64,
}

impl From<&Thresholds> for ReconConfig {
    fn from(t: &Thresholds) -> Self {
        Self {
            amount_tolerance: t.amount_tolerance,
            date_window_days: t.funding_date_window_days,
            fuzzy_threshold: t.fuzzy_name_threshold,
            pending_grace_days: t.pending_grace_days,
        }
    }
}

/// Uppercases, strips punctuation, and drops generation suffixes so
/// "Smith, Robert Jr." and "ROBERT SMITH" compare equal as token sets.
pub fn normalize_name(name: &str) -> String {
    const SUFFIXES: &[&str] = &["JR", "SR", "II", "III", "IV", "V"];
    let cleaned: String = name
        .to_uppercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut tokens: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|t| !SUFFIXES.contains(t))
        .collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Token-overlap (Jaccard) similarity over normalized names.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize_name(a);
    let norm_b = normalize_name(b);
    if norm_a == norm_b {
        return 1.0;
    }
    let tokens_a: HashSet<&str> = norm_a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = norm_b.split_whitespace().collect();
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    intersection as f64 / union as f64
}

/// Extracts `(vendor, application number)` from a note reference, when the
/// note carries a recognizable vendor tag.
pub fn reference_tag(note_reference: &str) -> Option<(VendorSystem, String)> {
    let caps = REFERENCE_TAG.captures(note_reference)?;
    let prefix = &caps[1];
    let vendor = [VendorSystem::DealerTrack, VendorSystem::RouteOne]
        .into_iter()
        .find(|v| v.reference_prefixes().contains(&prefix))?;
    Some((vendor, caps[2].to_string()))
}

/// Weekday count strictly after `from`, up to and including `to`.
pub fn business_days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    if to <= from {
        return 0;
    }
    let mut days = 0;
    let mut cursor = from.succ_opt().expect("date overflow");
    loop {
        if !matches!(cursor.weekday(), Weekday::Sat | Weekday::Sun) {
            days += 1;
        }
        if cursor == to {
            break;
        }
        cursor = cursor.succ_opt().expect("date overflow");
    }
    days
}

fn is_boardable(application: &IndirectApplication) -> bool {
    matches!(
        application.decision_status.to_uppercase().as_str(),
        "APPROVED" | "FUNDED"
    )
}

/// Runs the full matcher. Fails with a data-quality error when the core
/// extract carries duplicate account numbers.
pub fn reconcile(
    records: &[VendorRecord],
    loans: &[IndirectLoan],
    applications: &[IndirectApplication],
    as_of: NaiveDate,
    config: &ReconConfig,
) -> Result<ReconOutcome> {
    // The core extract must be unique by account number before any matching.
    let mut seen_accounts: HashSet<&str> = HashSet::new();
    for loan in loans {
        if !seen_accounts.insert(loan.account_number.as_str()) {
            return Err(ReportError::DataQuality {
                message: format!(
                    "duplicate account number '{}' in core indirect extract",
                    loan.account_number
                ),
            });
        }
    }

    let mut outcome = ReconOutcome::default();

    // Identity indexes over the booked loans.
    let by_application_id: HashMap<&str, usize> = loans
        .iter()
        .enumerate()
        .filter_map(|(idx, l)| l.application_id.as_deref().map(|id| (id, idx)))
        .collect();
    let by_reference_tag: HashMap<(VendorSystem, String), usize> = loans
        .iter()
        .enumerate()
        .filter_map(|(idx, l)| {
            l.note_reference
                .as_deref()
                .and_then(reference_tag)
                .map(|tag| (tag, idx))
        })
        .collect();
    let applications_by_id: HashMap<&str, &IndirectApplication> = applications
        .iter()
        .map(|a| (a.application_id.as_str(), a))
        .collect();

    let mut claimed: HashSet<usize> = HashSet::new();
    let mut seen_app_numbers: HashSet<(VendorSystem, &str)> = HashSet::new();

    for record in records {
        // Repeated application number inside one vendor file: the first
        // occurrence continues matching, the rest are duplicates.
        if !seen_app_numbers.insert((record.vendor, record.application_number.as_str())) {
            outcome.duplicates.push(record.clone());
            continue;
        }

        let identity_hit = by_application_id
            .get(record.application_number.as_str())
            .map(|&idx| (idx, MatchMethod::ApplicationNumber))
            .or_else(|| {
                by_reference_tag
                    .get(&(record.vendor, record.application_number.clone()))
                    .map(|&idx| (idx, MatchMethod::NoteReference))
            })
            .filter(|(idx, _)| !claimed.contains(idx));

        if let Some((idx, method)) = identity_hit {
            let loan = &loans[idx];
            claimed.insert(idx);
            let difference = record.funded_amount - loan.amount;
            if difference.abs() <= config.amount_tolerance {
                outcome.matched.push(MatchedPair {
                    record: record.clone(),
                    loan: loan.clone(),
                    method,
                });
            } else {
                outcome.amount_mismatch.push(AmountMismatch {
                    record: record.clone(),
                    loan: loan.clone(),
                    method,
                    difference,
                });
            }
            continue;
        }

        // Name + amount + date pass over the still-unclaimed loans.
        let name_hit = loans.iter().enumerate().find(|(idx, loan)| {
            !claimed.contains(idx)
                && normalize_name(&loan.borrower_name) == normalize_name(&record.applicant_name)
                && (record.funded_amount - loan.amount).abs() <= config.amount_tolerance
                && (record.funded_date - loan.booked_date).num_days().abs()
                    <= config.date_window_days
        });
        if let Some((idx, loan)) = name_hit {
            claimed.insert(idx);
            outcome.matched.push(MatchedPair {
                record: record.clone(),
                loan: loan.clone(),
                method: MatchMethod::NameAmountDate,
            });
            continue;
        }

        // Fuzzy candidate: surfaced for review, never auto-matched, and the
        // loan stays available to later passes.
        let fuzzy_hit = loans
            .iter()
            .enumerate()
            .filter(|(idx, loan)| {
                !claimed.contains(idx)
                    && (record.funded_amount - loan.amount).abs() <= config.amount_tolerance
            })
            .map(|(idx, loan)| {
                (
                    idx,
                    loan,
                    name_similarity(&loan.borrower_name, &record.applicant_name),
                )
            })
            .filter(|(_, _, sim)| *sim >= config.fuzzy_threshold)
            .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
        if let Some((_, loan, similarity)) = fuzzy_hit {
            outcome.needs_review.push(ReviewCandidate {
                record: record.clone(),
                loan: loan.clone(),
                similarity,
            });
            continue;
        }

        // Nothing on core. Pending when the LOS shows it boardable and the
        // funded date is inside the business-day grace window.
        if let Some(application) = applications_by_id.get(record.application_number.as_str()) {
            if is_boardable(application)
                && business_days_between(record.funded_date, as_of) <= config.pending_grace_days
            {
                outcome.pending.push(PendingRecord {
                    record: record.clone(),
                    application: (*application).clone(),
                });
                continue;
            }
        }
        outcome.funded_not_booked.push(record.clone());
    }

    outcome.booked_not_funded = loans
        .iter()
        .enumerate()
        .filter(|(idx, _)| !claimed.contains(idx))
        .map(|(_, loan)| loan.clone())
        .collect();

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn vendor_record(app: &str, name: &str, amount: f64, funded: NaiveDate) -> VendorRecord {
        VendorRecord {
            vendor: VendorSystem::DealerTrack,
            application_number: app.to_string(),
            applicant_name: name.to_string(),
            dealer_name: Some("Capital Motors".to_string()),
            funded_date: funded,
            funded_amount: amount,
            source_row: 2,
        }
    }

    fn loan(acct: &str, name: &str, amount: f64, booked: NaiveDate) -> IndirectLoan {
        IndirectLoan {
            account_number: acct.to_string(),
            borrower_name: name.to_string(),
            application_id: None,
            note_reference: None,
            dealer_name: Some("Capital Motors".to_string()),
            booked_date: booked,
            amount,
        }
    }

    fn config() -> ReconConfig {
        ReconConfig {
            amount_tolerance: 1.0,
            date_window_days: 7,
            fuzzy_threshold: 0.6,
            pending_grace_days: 5,
        }
    }

    fn application(app: &str, status: &str) -> IndirectApplication {
        IndirectApplication {
            application_id: app.to_string(),
            applicant_name: "Robert Smith".to_string(),
            dealer_name: Some("Capital Motors".to_string()),
            decision_status: status.to_string(),
            decision_date: Some(date(2026, 6, 1)),
            amount: 25_000.0,
        }
    }

    #[test]
    fn exact_application_number_match_wins_first() {
        let mut booked = loan("L1", "Different Name", 25_000.0, date(2026, 6, 2));
        booked.application_id = Some("1234567".to_string());
        let records = vec![vendor_record("1234567", "Robert Smith", 25_000.0, date(2026, 6, 1))];

        let outcome = reconcile(&records, &[booked], &[], date(2026, 6, 10), &config()).unwrap();
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.matched[0].method, MatchMethod::ApplicationNumber);
        assert!(outcome.booked_not_funded.is_empty());
    }

    #[test]
    fn note_reference_tag_matches_vendor_application() {
        let mut booked = loan("L1", "Robert Smith", 25_000.0, date(2026, 6, 2));
        booked.note_reference = Some("IND AUTO DT1234567 2026".to_string());
        let records = vec![vendor_record("1234567", "R Smith", 25_000.0, date(2026, 6, 1))];

        let outcome = reconcile(&records, &[booked], &[], date(2026, 6, 10), &config()).unwrap();
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.matched[0].method, MatchMethod::NoteReference);
        assert!((outcome.matched[0].method.confidence() - 0.95).abs() < 1e-9);
    }

    #[test]
    fn reference_tag_requires_matching_vendor_prefix() {
        // An RO tag must not satisfy a Dealer Track record
        let mut booked = loan("L1", "Someone Else", 25_000.0, date(2026, 6, 2));
        booked.note_reference = Some("RO1234567".to_string());
        let records = vec![vendor_record("1234567", "Robert Smith", 25_000.0, date(2026, 6, 1))];

        let outcome = reconcile(&records, &[booked], &[], date(2026, 6, 10), &config()).unwrap();
        assert!(outcome.matched.is_empty());
        assert_eq!(outcome.funded_not_booked.len(), 1);
        assert_eq!(outcome.booked_not_funded.len(), 1);
    }

    #[test]
    fn name_amount_date_match_normalizes_suffix_and_order() {
        let booked = loan("L1", "Smith, Robert Jr.", 25_000.50, date(2026, 6, 5));
        let records = vec![vendor_record("999", "ROBERT SMITH", 25_000.0, date(2026, 6, 1))];

        let outcome = reconcile(&records, &[booked], &[], date(2026, 6, 10), &config()).unwrap();
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.matched[0].method, MatchMethod::NameAmountDate);
    }

    #[test]
    fn name_match_respects_date_window() {
        let booked = loan("L1", "Robert Smith", 25_000.0, date(2026, 6, 20));
        let records = vec![vendor_record("999", "Robert Smith", 25_000.0, date(2026, 6, 1))];

        let outcome = reconcile(&records, &[booked], &[], date(2026, 6, 30), &config()).unwrap();
        assert!(outcome.matched.is_empty());
    }

    #[test]
    fn identity_match_with_amount_gap_is_a_mismatch_not_a_match() {
        let mut booked = loan("L1", "Robert Smith", 26_500.0, date(2026, 6, 2));
        booked.application_id = Some("1234567".to_string());
        let records = vec![vendor_record("1234567", "Robert Smith", 25_000.0, date(2026, 6, 1))];

        let outcome = reconcile(&records, &[booked], &[], date(2026, 6, 10), &config()).unwrap();
        assert!(outcome.matched.is_empty());
        assert_eq!(outcome.amount_mismatch.len(), 1);
        assert!((outcome.amount_mismatch[0].difference - (-1_500.0)).abs() < 1e-9);
        // The loan is claimed by the mismatch pair, not booked-not-funded
        assert!(outcome.booked_not_funded.is_empty());
    }

    #[test]
    fn repeated_vendor_application_number_goes_to_duplicates() {
        let mut booked = loan("L1", "Robert Smith", 25_000.0, date(2026, 6, 2));
        booked.application_id = Some("1234567".to_string());
        let records = vec![
            vendor_record("1234567", "Robert Smith", 25_000.0, date(2026, 6, 1)),
            vendor_record("1234567", "Robert Smith", 25_000.0, date(2026, 6, 1)),
        ];

        let outcome = reconcile(&records, &[booked], &[], date(2026, 6, 10), &config()).unwrap();
        // First occurrence still matches
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.duplicates.len(), 1);
    }

    #[test]
    fn fuzzy_candidate_routes_to_review_and_leaves_loan_unclaimed() {
        let booked = loan("L1", "Robert A Smith", 25_000.0, date(2026, 6, 2));
        let records = vec![vendor_record("999", "Robert Smith", 25_000.0, date(2026, 6, 20))];

        let outcome = reconcile(&records, &[booked], &[], date(2026, 6, 30), &config()).unwrap();
        assert!(outcome.matched.is_empty());
        assert_eq!(outcome.needs_review.len(), 1);
        assert!(outcome.needs_review[0].similarity >= 0.6);
        // Never auto-matched, so the loan still shows as booked-not-funded
        assert_eq!(outcome.booked_not_funded.len(), 1);
    }

    #[test]
    fn approved_within_grace_is_pending_boarding() {
        // Funded Wednesday 2026-06-03; as-of Monday 2026-06-08 is 3 business days
        let records = vec![vendor_record("777", "Robert Smith", 25_000.0, date(2026, 6, 3))];
        let apps = vec![application("777", "APPROVED")];

        let outcome = reconcile(&records, &[], &apps, date(2026, 6, 8), &config()).unwrap();
        assert_eq!(outcome.pending.len(), 1);
        assert!(outcome.funded_not_booked.is_empty());
    }

    #[test]
    fn grace_exhausted_or_declined_is_funded_not_booked() {
        let records = vec![
            vendor_record("777", "Robert Smith", 25_000.0, date(2026, 5, 1)),
            vendor_record("888", "Jane Doe", 10_000.0, date(2026, 6, 5)),
        ];
        let apps = vec![application("777", "APPROVED"), application("888", "DECLINED")];

        let outcome = reconcile(&records, &[], &apps, date(2026, 6, 8), &config()).unwrap();
        assert!(outcome.pending.is_empty());
        assert_eq!(outcome.funded_not_booked.len(), 2);
    }

    #[test]
    fn duplicate_core_account_numbers_fail_data_quality() {
        let loans = vec![
            loan("L1", "Robert Smith", 25_000.0, date(2026, 6, 2)),
            loan("L1", "Robert Smith", 25_000.0, date(2026, 6, 2)),
        ];
        let err = reconcile(&[], &loans, &[], date(2026, 6, 10), &config()).unwrap_err();
        assert!(matches!(err, ReportError::DataQuality { .. }));
    }

    #[test]
    fn business_day_math_skips_weekends() {
        // Friday to Monday is one business day
        assert_eq!(business_days_between(date(2026, 6, 5), date(2026, 6, 8)), 1);
        // Monday to Friday same week is four
        assert_eq!(business_days_between(date(2026, 6, 8), date(2026, 6, 12)), 4);
        assert_eq!(business_days_between(date(2026, 6, 8), date(2026, 6, 8)), 0);
        assert_eq!(business_days_between(date(2026, 6, 12), date(2026, 6, 8)), 0);
    }

    #[test]
    fn normalize_name_strips_punctuation_and_suffixes() {
        assert_eq!(normalize_name("Smith, Robert Jr."), "ROBERT SMITH");
        assert_eq!(normalize_name("ROBERT SMITH"), "ROBERT SMITH");
        assert!((name_similarity("Robert A Smith", "Robert Smith") - 2.0 / 3.0).abs() < 1e-9);
    }
}
