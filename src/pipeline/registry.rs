//! Report id constants and the id → job factory.

use crate::pipeline::ReportJob;
use crate::reports::deposit_deep_dive::DepositDeepDive;
use crate::reports::difficulty_mods::DifficultyMods;
use crate::reports::indirect_recon::IndirectRecon;
use crate::reports::org_pers_quality::OrgPersQuality;
use crate::reports::portfolio_alerts::PortfolioAlerts;

pub const DEPOSIT_DEEP_DIVE: &str = "deposit_deep_dive";
pub const PORTFOLIO_ALERTS: &str = "portfolio_alerts";
pub const DIFFICULTY_MODS: &str = "difficulty_mods";
pub const INDIRECT_RECON: &str = "indirect_recon";
pub const ORG_PERS_QUALITY: &str = "org_pers_quality";

/// All report ids, in the order a full run executes them.
pub fn supported_reports() -> Vec<&'static str> {
    vec![
        DEPOSIT_DEEP_DIVE,
        PORTFOLIO_ALERTS,
        DIFFICULTY_MODS,
        INDIRECT_RECON,
        ORG_PERS_QUALITY,
    ]
}

/// Builds the job for a report id; None for unknown ids.
pub fn create_report(report_id: &str) -> Option<Box<dyn ReportJob>> {
    match report_id {
        DEPOSIT_DEEP_DIVE => Some(Box::new(DepositDeepDive)),
        PORTFOLIO_ALERTS => Some(Box::new(PortfolioAlerts)),
        DIFFICULTY_MODS => Some(Box::new(DifficultyMods)),
        INDIRECT_RECON => Some(Box::new(IndirectRecon)),
        ORG_PERS_QUALITY => Some(Box::new(OrgPersQuality)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_id_has_a_factory() {
        for id in supported_reports() {
            let job = create_report(id).expect("factory missing");
            assert_eq!(job.report_id(), id);
        }
        assert!(create_report("nope").is_none());
    }
}
