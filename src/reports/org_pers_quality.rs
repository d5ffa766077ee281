//! Data Quality Org/Pers: master-data exception checks over the ORG, PERS,
//! address-use, and user-defined-field tables, each with a severity.

use crate::error::Result;
use crate::frame::Cell;
use crate::pipeline::registry::ORG_PERS_QUALITY;
use crate::pipeline::ColumnFormat::{Integer, Text};
use crate::pipeline::{ReportBook, ReportJob, RunContext, SheetTable};
use crate::warehouse::records::{primary_address, AddressUse, UserField};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, instrument};

pub struct OrgPersQuality;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    fn label(&self) -> &'static str {
        match self {
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }
}

/// The individual checks, each mapping to one detail-sheet group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExceptionKind {
    DuplicateTaxId,
    MissingTaxId,
    MissingPriAddress,
    MultiplePriAddresses,
    IncompletePriAddress,
    MalformedZip,
    UserFieldTypeMismatch,
    StaleMasterRecord,
}

impl ExceptionKind {
    fn label(&self) -> &'static str {
        match self {
            ExceptionKind::DuplicateTaxId => "Duplicate Tax Id",
            ExceptionKind::MissingTaxId => "Missing Tax Id",
            ExceptionKind::MissingPriAddress => "Missing PRI Address",
            ExceptionKind::MultiplePriAddresses => "Multiple PRI Addresses",
            ExceptionKind::IncompletePriAddress => "Incomplete PRI Address",
            ExceptionKind::MalformedZip => "Malformed ZIP",
            ExceptionKind::UserFieldTypeMismatch => "User Field Type Mismatch",
            ExceptionKind::StaleMasterRecord => "Stale Master Record",
        }
    }

    fn severity(&self) -> Severity {
        match self {
            ExceptionKind::DuplicateTaxId | ExceptionKind::MissingTaxId => Severity::High,
            ExceptionKind::MissingPriAddress => Severity::High,
            ExceptionKind::MultiplePriAddresses
            | ExceptionKind::IncompletePriAddress
            | ExceptionKind::MalformedZip
            | ExceptionKind::UserFieldTypeMismatch => Severity::Medium,
            ExceptionKind::StaleMasterRecord => Severity::Low,
        }
    }

    /// Detail-sheet grouping; several address checks share one sheet.
    fn sheet_name(&self) -> &'static str {
        match self {
            ExceptionKind::DuplicateTaxId => "Duplicate Tax Ids",
            ExceptionKind::MissingTaxId => "Missing Tax Ids",
            ExceptionKind::MissingPriAddress
            | ExceptionKind::MultiplePriAddresses
            | ExceptionKind::IncompletePriAddress
            | ExceptionKind::MalformedZip => "Address Exceptions",
            ExceptionKind::UserFieldTypeMismatch => "User Field Mismatches",
            ExceptionKind::StaleMasterRecord => "Stale Records",
        }
    }

    fn all() -> &'static [ExceptionKind] {
        &[
            ExceptionKind::DuplicateTaxId,
            ExceptionKind::MissingTaxId,
            ExceptionKind::MissingPriAddress,
            ExceptionKind::MultiplePriAddresses,
            ExceptionKind::IncompletePriAddress,
            ExceptionKind::MalformedZip,
            ExceptionKind::UserFieldTypeMismatch,
            ExceptionKind::StaleMasterRecord,
        ]
    }
}

/// One flagged entity with the detail an operator needs to fix it.
#[derive(Debug, Clone)]
struct Exception {
    kind: ExceptionKind,
    entity_kind: &'static str,
    entity_number: String,
    entity_name: String,
    detail: String,
}

/// Uniform view over Org and Pers rows so every check runs once.
struct MasterRecord<'a> {
    entity_kind: &'static str,
    number: &'a str,
    name: &'a str,
    tax_id: Option<&'a str>,
    last_maint: Option<NaiveDate>,
    active_accounts: i64,
}

fn zip_is_malformed(zip: &str) -> bool {
    let digits: String = zip.chars().filter(|c| c.is_ascii_digit()).collect();
    !(digits.len() == 5 || digits.len() == 9) || zip.chars().any(|c| c.is_ascii_alphabetic())
}

#[async_trait]
impl ReportJob for OrgPersQuality {
    fn report_id(&self) -> &'static str {
        ORG_PERS_QUALITY
    }

    fn title(&self) -> &'static str {
        "Data Quality - Org/Pers"
    }

    #[instrument(skip(self, ctx), fields(as_of = %ctx.as_of))]
    async fn build(&self, ctx: &RunContext) -> Result<ReportBook> {
        let thresholds = ctx.config.report(self.report_id()).thresholds;
        let orgs = ctx.core.orgs().await?;
        let persons = ctx.core.persons().await?;
        let addresses = ctx.core.address_uses().await?;
        let user_fields = ctx.core.user_fields().await?;
        info!(
            "Extracted {} orgs, {} persons, {} addresses, {} user fields",
            orgs.len(),
            persons.len(),
            addresses.len(),
            user_fields.len()
        );

        let masters: Vec<MasterRecord<'_>> = orgs
            .iter()
            .map(|o| MasterRecord {
                entity_kind: "Org",
                number: &o.org_number,
                name: &o.name,
                tax_id: o.tax_id.as_deref(),
                last_maint: o.last_maint,
                active_accounts: o.active_accounts,
            })
            .chain(persons.iter().map(|p| MasterRecord {
                entity_kind: "Pers",
                number: &p.pers_number,
                name: &p.name,
                tax_id: p.tax_id.as_deref(),
                last_maint: p.last_maint,
                active_accounts: p.active_accounts,
            }))
            .collect();

        let mut addresses_by_entity: HashMap<&str, Vec<&AddressUse>> = HashMap::new();
        for address in &addresses {
            addresses_by_entity
                .entry(address.entity_number.as_str())
                .or_default()
                .push(address);
        }
        let mut fields_by_entity: HashMap<&str, Vec<&UserField>> = HashMap::new();
        for field in &user_fields {
            fields_by_entity
                .entry(field.entity_number.as_str())
                .or_default()
                .push(field);
        }

        let mut exceptions: Vec<Exception> = Vec::new();
        let mut flag = |kind: ExceptionKind, record: &MasterRecord<'_>, detail: String| {
            exceptions.push(Exception {
                kind,
                entity_kind: record.entity_kind,
                entity_number: record.number.to_string(),
                entity_name: record.name.to_string(),
                detail,
            });
        };

        // Duplicate tax ids across orgs and persons together
        let mut by_tax_id: BTreeMap<&str, Vec<&MasterRecord<'_>>> = BTreeMap::new();
        for record in &masters {
            if let Some(tax_id) = record.tax_id {
                if !tax_id.trim().is_empty() {
                    by_tax_id.entry(tax_id).or_default().push(record);
                }
            }
        }
        for (tax_id, holders) in &by_tax_id {
            if holders.len() > 1 {
                for record in holders {
                    flag(
                        ExceptionKind::DuplicateTaxId,
                        record,
                        format!("tax id {} held by {} entities", tax_id, holders.len()),
                    );
                }
            }
        }

        let stale_cutoff = {
            let y = ctx.as_of.year() - thresholds.stale_master_years;
            NaiveDate::from_ymd_opt(y, ctx.as_of.month(), ctx.as_of.day().min(28))
                .unwrap_or(ctx.as_of)
        };

        for record in &masters {
            // Missing tax id only matters with active accounts
            let tax_missing = record.tax_id.map(|t| t.trim().is_empty()).unwrap_or(true);
            if tax_missing && record.active_accounts > 0 {
                flag(
                    ExceptionKind::MissingTaxId,
                    record,
                    format!("{} active accounts", record.active_accounts),
                );
            }

            // PRI address checks
            let entity_addresses: Vec<AddressUse> = addresses_by_entity
                .get(record.number)
                .map(|v| v.iter().map(|a| (*a).clone()).collect())
                .unwrap_or_default();
            let pri_count = entity_addresses
                .iter()
                .filter(|a| a.role.eq_ignore_ascii_case("PRI"))
                .count();
            match pri_count {
                0 => flag(
                    ExceptionKind::MissingPriAddress,
                    record,
                    "no PRI-role address on file".to_string(),
                ),
                1 => {}
                n => flag(
                    ExceptionKind::MultiplePriAddresses,
                    record,
                    format!("{} PRI-role addresses on file", n),
                ),
            }
            if let Some(pri) = primary_address(&entity_addresses) {
                let mut missing = Vec::new();
                if pri.line1.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    missing.push("line1");
                }
                if pri.city.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    missing.push("city");
                }
                if pri.zip.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    missing.push("zip");
                }
                if !missing.is_empty() {
                    flag(
                        ExceptionKind::IncompletePriAddress,
                        record,
                        format!("missing {}", missing.join(", ")),
                    );
                } else if let Some(zip) = pri.zip.as_deref() {
                    if zip_is_malformed(zip) {
                        flag(
                            ExceptionKind::MalformedZip,
                            record,
                            format!("zip '{}' is not 5 or 9 digits", zip),
                        );
                    }
                }
            }

            // User-field type checks against the frame coercions
            if let Some(fields) = fields_by_entity.get(record.number) {
                for field in fields {
                    let cell = Cell::Text(field.value.clone());
                    let mismatched = match field.field_type.to_uppercase().as_str() {
                        "DATE" => cell.as_date().is_none(),
                        "NUM" => cell.as_f64().is_none(),
                        _ => false,
                    };
                    if mismatched {
                        flag(
                            ExceptionKind::UserFieldTypeMismatch,
                            record,
                            format!(
                                "{} declared {} but holds '{}'",
                                field.field_code, field.field_type, field.value
                            ),
                        );
                    }
                }
            }

            // Stale master: untouched for years while accounts stay active
            if record.active_accounts > 0 {
                match record.last_maint {
                    Some(maint) if maint >= stale_cutoff => {}
                    Some(maint) => flag(
                        ExceptionKind::StaleMasterRecord,
                        record,
                        format!("last maintained {}", maint.format("%Y-%m-%d")),
                    ),
                    None => flag(
                        ExceptionKind::StaleMasterRecord,
                        record,
                        "no maintenance date on file".to_string(),
                    ),
                }
            }
        }

        let mut book = ReportBook::new(self.title());

        // Exception Summary: count per check per entity kind
        let mut summary = SheetTable::new(
            "Exception Summary",
            vec![
                ("Check", Text),
                ("Severity", Text),
                ("Orgs", Integer),
                ("Persons", Integer),
                ("Total", Integer),
            ],
        );
        for kind in ExceptionKind::all() {
            let org_count = exceptions
                .iter()
                .filter(|e| e.kind == *kind && e.entity_kind == "Org")
                .count();
            let pers_count = exceptions
                .iter()
                .filter(|e| e.kind == *kind && e.entity_kind == "Pers")
                .count();
            summary.frame.push_row(vec![
                kind.label().into(),
                kind.severity().label().into(),
                Cell::Int(org_count as i64),
                Cell::Int(pers_count as i64),
                Cell::Int((org_count + pers_count) as i64),
            ])?;
        }
        book.push_sheet(summary);

        // One detail sheet per exception group, keeping check order
        let mut group_order: Vec<&'static str> = Vec::new();
        for kind in ExceptionKind::all() {
            if !group_order.contains(&kind.sheet_name()) {
                group_order.push(kind.sheet_name());
            }
        }
        for group in group_order {
            let mut sheet = SheetTable::new(
                group,
                vec![
                    ("Check", Text),
                    ("Severity", Text),
                    ("Entity", Text),
                    ("Number", Text),
                    ("Name", Text),
                    ("Detail", Text),
                ],
            );
            for exception in exceptions.iter().filter(|e| e.kind.sheet_name() == group) {
                sheet.frame.push_row(vec![
                    exception.kind.label().into(),
                    exception.kind.severity().label().into(),
                    exception.entity_kind.into(),
                    exception.entity_number.as_str().into(),
                    exception.entity_name.as_str().into(),
                    exception.detail.as_str().into(),
                ])?;
            }
            book.push_sheet(sheet);
        }

        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::warehouse::fixtures::FixtureWarehouse;
    use crate::warehouse::records::{Org, Pers};
    use std::sync::Arc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn org(number: &str, tax_id: Option<&str>) -> Org {
        Org {
            org_number: number.to_string(),
            name: format!("Org {}", number),
            tax_id: tax_id.map(|t| t.to_string()),
            last_maint: Some(date(2025, 1, 1)),
            active_accounts: 2,
        }
    }

    fn pers(number: &str, tax_id: Option<&str>) -> Pers {
        Pers {
            pers_number: number.to_string(),
            name: format!("Person {}", number),
            tax_id: tax_id.map(|t| t.to_string()),
            last_maint: Some(date(2025, 1, 1)),
            active_accounts: 1,
        }
    }

    fn pri_address(entity: &str, zip: &str) -> AddressUse {
        AddressUse {
            entity_number: entity.to_string(),
            role: "PRI".to_string(),
            line1: Some("1 Main St".to_string()),
            city: Some("Hartford".to_string()),
            state: Some("CT".to_string()),
            zip: Some(zip.to_string()),
            last_maint: Some(date(2025, 1, 1)),
        }
    }

    fn context(warehouse: FixtureWarehouse) -> RunContext {
        let toml_src = r#"
            [run]
            archive_dir = "archive"
            drop_dir = "drops"
            [warehouse]
            [smtp]
            enabled = false
            [reports.org_pers_quality]
            enabled = true
        "#;
        let config: AppConfig = toml::from_str(toml_src).unwrap();
        let warehouse = Arc::new(warehouse);
        RunContext {
            as_of: date(2026, 6, 30),
            config: Arc::new(config),
            core: warehouse.clone(),
            originations: warehouse,
        }
    }

    fn count(book: &ReportBook, check: &str) -> i64 {
        let summary = book.sheet("Exception Summary").unwrap();
        let row = summary
            .frame
            .rows()
            .iter()
            .find(|r| r[0] == Cell::Text(check.into()))
            .unwrap();
        match row[4] {
            Cell::Int(n) => n,
            _ => panic!("total column should be an integer"),
        }
    }

    #[tokio::test]
    async fn duplicate_tax_id_spans_orgs_and_persons() {
        let mut warehouse = FixtureWarehouse::new();
        warehouse.orgs.push(org("O1", Some("06-1234567")));
        warehouse.persons.push(pers("P1", Some("06-1234567")));
        warehouse.addresses.push(pri_address("O1", "06103"));
        warehouse.addresses.push(pri_address("P1", "06103"));

        let book = OrgPersQuality.build(&context(warehouse)).await.unwrap();
        // Both holders of the shared tax id are flagged
        assert_eq!(count(&book, "Duplicate Tax Id"), 2);
        let detail = book.sheet("Duplicate Tax Ids").unwrap();
        assert_eq!(detail.frame.row_count(), 2);
    }

    #[tokio::test]
    async fn missing_tax_id_requires_active_accounts() {
        let mut warehouse = FixtureWarehouse::new();
        let mut dormant = org("O1", None);
        dormant.active_accounts = 0;
        warehouse.orgs.push(dormant);
        warehouse.orgs.push(org("O2", None));
        warehouse.addresses.push(pri_address("O1", "06103"));
        warehouse.addresses.push(pri_address("O2", "06103"));

        let book = OrgPersQuality.build(&context(warehouse)).await.unwrap();
        assert_eq!(count(&book, "Missing Tax Id"), 1);
    }

    #[tokio::test]
    async fn address_checks_cover_missing_multiple_and_malformed() {
        let mut warehouse = FixtureWarehouse::new();
        // No address at all
        warehouse.orgs.push(org("O1", Some("06-1111111")));
        // Two PRI rows
        warehouse.orgs.push(org("O2", Some("06-2222222")));
        warehouse.addresses.push(pri_address("O2", "06103"));
        warehouse.addresses.push(pri_address("O2", "06105"));
        // Malformed zip
        warehouse.orgs.push(org("O3", Some("06-3333333")));
        warehouse.addresses.push(pri_address("O3", "ABC12"));
        // Incomplete: no city
        warehouse.orgs.push(org("O4", Some("06-4444444")));
        let mut no_city = pri_address("O4", "06103");
        no_city.city = None;
        warehouse.addresses.push(no_city);

        let book = OrgPersQuality.build(&context(warehouse)).await.unwrap();
        assert_eq!(count(&book, "Missing PRI Address"), 1);
        assert_eq!(count(&book, "Multiple PRI Addresses"), 1);
        assert_eq!(count(&book, "Malformed ZIP"), 1);
        assert_eq!(count(&book, "Incomplete PRI Address"), 1);
        assert_eq!(book.sheet("Address Exceptions").unwrap().frame.row_count(), 4);
    }

    #[tokio::test]
    async fn user_field_type_mismatches_use_lenient_coercion() {
        let mut warehouse = FixtureWarehouse::new();
        warehouse.persons.push(pers("P1", Some("06-5555555")));
        warehouse.addresses.push(pri_address("P1", "06103"));
        warehouse.user_fields.extend([
            UserField {
                entity_number: "P1".to_string(),
                field_code: "REVIEWDT".to_string(),
                field_type: "DATE".to_string(),
                value: "not a date".to_string(),
            },
            // US-format date passes the lenient coercion
            UserField {
                entity_number: "P1".to_string(),
                field_code: "OPENDT".to_string(),
                field_type: "DATE".to_string(),
                value: "03/15/2024".to_string(),
            },
            UserField {
                entity_number: "P1".to_string(),
                field_code: "LIMIT".to_string(),
                field_type: "NUM".to_string(),
                value: "$12,500.00".to_string(),
            },
        ]);

        let book = OrgPersQuality.build(&context(warehouse)).await.unwrap();
        assert_eq!(count(&book, "User Field Type Mismatch"), 1);
    }

    #[tokio::test]
    async fn stale_master_needs_old_maint_and_active_accounts() {
        let mut warehouse = FixtureWarehouse::new();
        let mut stale = org("O1", Some("06-6666666"));
        stale.last_maint = Some(date(2015, 5, 1));
        warehouse.orgs.push(stale);
        let mut stale_but_inactive = org("O2", Some("06-7777777"));
        stale_but_inactive.last_maint = Some(date(2015, 5, 1));
        stale_but_inactive.active_accounts = 0;
        warehouse.orgs.push(stale_but_inactive);
        warehouse.addresses.push(pri_address("O1", "06103"));
        warehouse.addresses.push(pri_address("O2", "06103"));

        let book = OrgPersQuality.build(&context(warehouse)).await.unwrap();
        assert_eq!(count(&book, "Stale Master Record"), 1);
    }
}
