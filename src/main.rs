use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use dwh_reports::config::AppConfig;
use dwh_reports::delivery::email::{DisabledMailer, Mailer, SmtpMailer};
use dwh_reports::logging;
use dwh_reports::pipeline::runner::Runner;
use dwh_reports::pipeline::{registry, RunContext};
use dwh_reports::warehouse::sql::{SqlCoreWarehouse, SqlLosWarehouse};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "dwh-reports")]
#[command(about = "Scheduled data-warehouse reporting jobs")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, archive, and deliver reports
    Run {
        /// Specific reports to run (comma-separated ids); defaults to every
        /// enabled report in config
        #[arg(long)]
        reports: Option<String>,
        /// Business date as YYYY-MM-DD; defaults to today
        #[arg(long)]
        as_of: Option<String>,
        /// Path to the config file
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
        /// Archive workbooks but skip email delivery
        #[arg(long)]
        no_email: bool,
    },
    /// List the supported report ids and whether each is enabled
    List {
        /// Path to the config file
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            reports,
            as_of,
            config,
            no_email,
        } => {
            let config = AppConfig::load(&config)
                .with_context(|| format!("loading config from {}", config.display()))?;
            let config = Arc::new(config);

            let as_of = match as_of {
                Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .with_context(|| format!("invalid --as-of date '{}'", raw))?,
                None => Local::now().date_naive(),
            };

            let report_ids: Vec<String> = match reports {
                Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
                None => config.enabled_reports(),
            };
            if report_ids.is_empty() {
                println!("⚠️  No reports requested and none enabled in config");
                return Ok(());
            }

            println!("🔄 Running {} report(s) as of {}", report_ids.len(), as_of);
            info!(%as_of, reports = ?report_ids, "Starting report batch");

            let core = SqlCoreWarehouse::connect(&config.warehouse)
                .await
                .context("connecting to the core warehouse")?;
            let originations = SqlLosWarehouse::connect(&config.warehouse)
                .await
                .context("connecting to the origination warehouse")?;

            // With smtp disabled the runner never reaches the mailer
            let smtp_enabled = config.smtp.enabled;
            let mailer: Arc<dyn Mailer> = if smtp_enabled {
                Arc::new(SmtpMailer::new(config.smtp.clone()).context("building SMTP mailer")?)
            } else {
                Arc::new(DisabledMailer)
            };

            let ctx = RunContext {
                as_of,
                config,
                core: Arc::new(core),
                originations: Arc::new(originations),
            };
            let runner = Runner::new(ctx, mailer, no_email || !smtp_enabled);

            let outcomes = runner.run_reports(&report_ids).await;
            let failures = outcomes.iter().filter(|(_, r)| r.is_err()).count();
            println!(
                "\n✅ Batch complete: {} succeeded, {} failed",
                outcomes.len() - failures,
                failures
            );
            if failures > 0 {
                anyhow::bail!("{} report(s) failed", failures);
            }
        }
        Commands::List { config } => {
            let config = AppConfig::load(&config)
                .with_context(|| format!("loading config from {}", config.display()))?;
            println!("📋 Supported reports:");
            for report_id in registry::supported_reports() {
                let report_config = config.report(report_id);
                let status = if report_config.enabled {
                    "enabled"
                } else {
                    "disabled"
                };
                println!(
                    "   {} ({}, {} recipient(s))",
                    report_id,
                    status,
                    report_config.recipients.len()
                );
            }
        }
    }

    Ok(())
}
