//! The scheduled reports. Each module is one independent pipeline
//! implementing `ReportJob`; the registry maps ids onto them.

pub mod deposit_deep_dive;
pub mod difficulty_mods;
pub mod indirect_recon;
pub mod org_pers_quality;
pub mod portfolio_alerts;
