use anyhow::{bail, Context, Result};
use clap::Parser;
use dwh_reports::recon::{parse_drop, VendorSystem};
use std::path::PathBuf;

/// Parse a vendor funding drop file and print what would be accepted or
/// rejected, without touching the warehouse.
#[derive(Parser, Debug)]
#[command(name = "inspect-dropfile", version, about = "Inspect a vendor funding drop file")]
struct Cli {
    /// Path to the vendor .xlsx drop file
    path: PathBuf,

    /// Vendor system: dealertrack or routeone (inferred from the file name
    /// when omitted)
    #[arg(long)]
    vendor: Option<String>,
}

fn resolve_vendor(args: &Cli) -> Result<VendorSystem> {
    if let Some(name) = &args.vendor {
        return match name.to_lowercase().as_str() {
            "dealertrack" | "dt" => Ok(VendorSystem::DealerTrack),
            "routeone" | "ro" => Ok(VendorSystem::RouteOne),
            other => bail!("unknown vendor '{}', expected dealertrack or routeone", other),
        };
    }
    let file_name = args
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    for vendor in [VendorSystem::DealerTrack, VendorSystem::RouteOne] {
        if file_name.starts_with(vendor.file_prefix()) {
            return Ok(vendor);
        }
    }
    bail!(
        "cannot infer vendor from '{}'; pass --vendor dealertrack|routeone",
        file_name
    )
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let vendor = resolve_vendor(&args)?;

    let drop = parse_drop(&args.path, vendor)
        .with_context(|| format!("parsing {}", args.path.display()))?;

    println!("📄 {} ({})", drop.path.display(), vendor.label());
    println!("   Accepted rows: {}", drop.records.len());
    println!("   Rejected rows: {}", drop.rejected.len());

    if !drop.records.is_empty() {
        println!("\n✅ Accepted:");
        for record in &drop.records {
            println!(
                "   row {:>4}  app {:<12}  {:<30}  {}  ${:>12.2}",
                record.source_row,
                record.application_number,
                record.applicant_name,
                record.funded_date,
                record.funded_amount
            );
        }
    }

    if !drop.rejected.is_empty() {
        println!("\n⚠️  Rejected:");
        for rejected in &drop.rejected {
            println!("   row {:>4}  {}", rejected.source_row, rejected.reason);
        }
    }

    Ok(())
}
