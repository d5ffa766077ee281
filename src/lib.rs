//! Scheduled data-warehouse reporting jobs for a retail and commercial bank.
//!
//! Each report extracts from the core banking warehouse (and the loan
//! origination system where needed), shapes the data into a workbook of
//! typed sheets, archives the workbook with a checksum sidecar, and mails
//! it to the configured recipients.

pub mod config;
pub mod delivery;
pub mod error;
pub mod excel;
pub mod frame;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod recon;
pub mod reports;
pub mod warehouse;
