//! Metric name catalog for the reporting suite.
//!
//! Eliminates magic strings: every counter/histogram the runner emits is an
//! enum variant with a fixed Prometheus-style name.

use metrics::{counter, histogram};

/// All metric names used by the reporting suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    ReportRuns,
    ReportFailures,
    ReportRows,
    ReportDurationSeconds,
    ExtractRows,
    ExtractDurationSeconds,
    WorkbooksArchived,
    EmailsSent,
    EmailFailures,
    DropRowsRejected,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::ReportRuns => "dwh_report_runs_total",
            MetricName::ReportFailures => "dwh_report_failures_total",
            MetricName::ReportRows => "dwh_report_rows_total",
            MetricName::ReportDurationSeconds => "dwh_report_duration_seconds",
            MetricName::ExtractRows => "dwh_extract_rows_total",
            MetricName::ExtractDurationSeconds => "dwh_extract_duration_seconds",
            MetricName::WorkbooksArchived => "dwh_workbooks_archived_total",
            MetricName::EmailsSent => "dwh_emails_sent_total",
            MetricName::EmailFailures => "dwh_email_failures_total",
            MetricName::DropRowsRejected => "dwh_drop_rows_rejected_total",
        }
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-report counters and timings emitted by the runner.
pub mod report {
    use super::*;

    pub fn runs(report: &str) {
        counter!(MetricName::ReportRuns.as_str(), "report" => report.to_string()).increment(1);
    }

    pub fn failures(report: &str) {
        counter!(MetricName::ReportFailures.as_str(), "report" => report.to_string()).increment(1);
    }

    pub fn rows(report: &str, n: usize) {
        counter!(MetricName::ReportRows.as_str(), "report" => report.to_string())
            .increment(n as u64);
    }

    pub fn duration_seconds(report: &str, secs: f64) {
        histogram!(MetricName::ReportDurationSeconds.as_str(), "report" => report.to_string())
            .record(secs);
    }

    pub fn workbooks_archived(report: &str) {
        counter!(MetricName::WorkbooksArchived.as_str(), "report" => report.to_string())
            .increment(1);
    }
}

/// Warehouse extraction metrics.
pub mod extract {
    use super::*;

    pub fn rows(source: &str, n: usize) {
        counter!(MetricName::ExtractRows.as_str(), "source" => source.to_string())
            .increment(n as u64);
    }

    pub fn duration_seconds(source: &str, secs: f64) {
        histogram!(MetricName::ExtractDurationSeconds.as_str(), "source" => source.to_string())
            .record(secs);
    }
}

/// Delivery metrics.
pub mod delivery {
    use super::*;

    pub fn emails_sent(report: &str) {
        counter!(MetricName::EmailsSent.as_str(), "report" => report.to_string()).increment(1);
    }

    pub fn email_failures(report: &str) {
        counter!(MetricName::EmailFailures.as_str(), "report" => report.to_string()).increment(1);
    }

    pub fn drop_rows_rejected(vendor: &str, n: usize) {
        counter!(MetricName::DropRowsRejected.as_str(), "vendor" => vendor.to_string())
            .increment(n as u64);
    }
}
