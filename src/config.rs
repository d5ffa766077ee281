use crate::error::{ReportError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Top-level configuration loaded from `config.toml`.
///
/// Secrets (warehouse DSNs, SMTP credentials) never live here; they come from
/// the environment (`DWH_CORE_URL`, `DWH_LOS_URL`, `SMTP_USER`, `SMTP_PASSWORD`),
/// loaded via dotenv at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub run: RunConfig,
    pub warehouse: WarehouseConfig,
    pub smtp: SmtpConfig,
    /// Per-report registry keyed by report id.
    #[serde(default)]
    pub reports: BTreeMap<String, ReportConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Directory where finished workbooks (and checksum sidecars) land.
    pub archive_dir: String,
    /// Shared folder the vendor funding spreadsheets are dropped into.
    pub drop_dir: String,
    /// Also write one CSV per sheet next to the archived workbook.
    #[serde(default)]
    pub csv_siblings: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub from: String,
}

fn default_smtp_port() -> u16 {
    587
}

/// Per-report settings: whether it runs, who receives it, and the business
/// thresholds its rules use.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub enabled: bool,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub thresholds: Thresholds,
}

/// Business-rule thresholds. Every field has the production default so a
/// report section only overrides what it cares about.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Absolute balance-change floor for the large-movements sheet.
    pub large_move_floor: f64,
    /// Relative balance-change trigger, as a fraction of the prior balance.
    pub large_move_pct: f64,
    /// Prior balance must be at least this for the relative trigger to apply.
    pub large_move_prior_min: f64,
    /// Trailing window for new/closed account sheets, in days.
    pub activity_window_days: i64,
    /// Forward window for the maturing-CD sheet, in days.
    pub maturity_window_days: i64,
    /// Forward window for the commercial note-maturity sheet, in days.
    pub note_maturity_window_days: i64,
    /// Number of relationships on the top-relationships/top-exposures sheets.
    pub top_relationships: usize,
    /// Utilization fraction that flags a revolving line as high.
    pub high_utilization: f64,
    /// Relationship exposure at or above this is flagged against house limit.
    pub house_limit: f64,
    /// Risk ratings at or above this land on the watch list.
    pub watch_rating: i32,
    /// How far back loan modifications are pulled, in days.
    pub mod_lookback_days: i64,
    /// Months after modification inside which a 90+ DPD counts as re-default.
    pub redefault_months: u32,
    /// Dollar tolerance for vendor/core amount comparison.
    pub amount_tolerance: f64,
    /// Calendar-day window for funded-vs-booked date comparison.
    pub funding_date_window_days: i64,
    /// Token-overlap similarity at or above this routes to needs-review.
    pub fuzzy_name_threshold: f64,
    /// Business days of boarding grace before a vendor row is funded-not-booked.
    pub pending_grace_days: i64,
    /// Lookback for the core funded-indirect extract, in days.
    pub recon_lookback_days: i64,
    /// Years without maintenance before a master record counts as stale.
    pub stale_master_years: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            large_move_floor: 250_000.0,
            large_move_pct: 0.25,
            large_move_prior_min: 100_000.0,
            activity_window_days: 30,
            maturity_window_days: 30,
            note_maturity_window_days: 60,
            top_relationships: 25,
            high_utilization: 0.95,
            house_limit: 5_000_000.0,
            watch_rating: 7,
            mod_lookback_days: 1825,
            redefault_months: 12,
            amount_tolerance: 1.0,
            funding_date_window_days: 7,
            fuzzy_name_threshold: 0.6,
            pending_grace_days: 5,
            recon_lookback_days: 90,
            stale_master_years: 7,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            ReportError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: AppConfig = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for id in self.reports.keys() {
            if !crate::pipeline::registry::supported_reports().contains(&id.as_str()) {
                return Err(ReportError::Config(format!(
                    "Unknown report id '{}' in [reports] section",
                    id
                )));
            }
        }
        if self.smtp.enabled && self.smtp.host.is_empty() {
            return Err(ReportError::Config(
                "smtp.enabled is set but smtp.host is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Reports enabled in config, in registry order.
    pub fn enabled_reports(&self) -> Vec<String> {
        crate::pipeline::registry::supported_reports()
            .iter()
            .filter(|id| self.reports.get(**id).map(|r| r.enabled).unwrap_or(false))
            .map(|id| id.to_string())
            .collect()
    }

    /// Settings for one report; defaults (disabled, no recipients) when the
    /// config file has no section for it.
    pub fn report(&self, id: &str) -> ReportConfig {
        self.reports.get(id).cloned().unwrap_or(ReportConfig {
            enabled: false,
            recipients: Vec::new(),
            thresholds: Thresholds::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_with_threshold_override() {
        let toml_src = r#"
            [run]
            archive_dir = "archive"
            drop_dir = "drops"

            [warehouse]

            [smtp]
            enabled = false

            [reports.deposit_deep_dive]
            enabled = true
            recipients = ["deposits@bank.example"]

            [reports.deposit_deep_dive.thresholds]
            large_move_floor = 100000.0
        "#;
        let config: AppConfig = toml::from_str(toml_src).unwrap();
        config.validate().unwrap();

        let report = config.report("deposit_deep_dive");
        assert!(report.enabled);
        assert_eq!(report.thresholds.large_move_floor, 100_000.0);
        // Untouched thresholds keep their defaults
        assert_eq!(report.thresholds.top_relationships, 25);
        assert_eq!(config.enabled_reports(), vec!["deposit_deep_dive"]);
    }

    #[test]
    fn rejects_unknown_report_id() {
        let toml_src = r#"
            [run]
            archive_dir = "archive"
            drop_dir = "drops"

            [warehouse]

            [smtp]
            enabled = false

            [reports.not_a_report]
            enabled = true
        "#;
        let config: AppConfig = toml::from_str(toml_src).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_without_reports_section_parses_with_none_enabled() {
        let toml_src = r#"
            [run]
            archive_dir = "archive"
            drop_dir = "drops"

            [warehouse]

            [smtp]
            enabled = false
        "#;
        let config: AppConfig = toml::from_str(toml_src).unwrap();
        config.validate().unwrap();
        assert!(config.enabled_reports().is_empty());
    }

    #[test]
    fn maturity_windows_default_independently() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.maturity_window_days, 30);
        assert_eq!(thresholds.note_maturity_window_days, 60);
    }
}
