//! Per-report run loop: build the book, render it, archive it, email it,
//! and record the outcome. A failing report never takes down the rest of the
//! run; a failing email delivery degrades to a warning on the outcome.

use crate::delivery::archive;
use crate::delivery::email::{Mailer, ReportMail};
use crate::error::{ReportError, Result};
use crate::excel::writer;
use crate::observability;
use crate::pipeline::{registry, ReportJob, RunContext, RunOutcome};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub struct Runner {
    ctx: RunContext,
    mailer: Arc<dyn Mailer>,
    no_email: bool,
}

impl Runner {
    pub fn new(ctx: RunContext, mailer: Arc<dyn Mailer>, no_email: bool) -> Self {
        Self {
            ctx,
            mailer,
            no_email,
        }
    }

    /// Runs one report end to end and returns its outcome.
    #[instrument(skip(self, job), fields(report = %job.report_id()))]
    pub async fn run_report(&self, job: &dyn ReportJob) -> Result<RunOutcome> {
        let report_id = job.report_id().to_string();
        let run_id = Uuid::new_v4();
        let mut warnings = Vec::new();

        info!("Starting report run {}", run_id);
        observability::report::runs(&report_id);
        let started = std::time::Instant::now();

        // Step 1: extract and transform
        let book = job.build(&self.ctx).await?;
        let rows = book.row_count();
        info!("Built {} sheets ({} rows)", book.sheets.len(), rows);
        observability::report::rows(&report_id, rows);

        // Step 2: render
        let bytes = writer::render_to_buffer(&book, self.ctx.as_of, run_id)?;

        // Step 3: archive
        let archive_dir = std::path::Path::new(&self.ctx.config.run.archive_dir);
        let output_path = archive::archive_book(
            archive_dir,
            &report_id,
            self.ctx.as_of,
            run_id,
            &bytes,
            self.ctx.config.run.csv_siblings.then_some(&book),
        )?;
        info!("Archived workbook to {}", output_path.display());
        observability::report::workbooks_archived(&report_id);

        // Step 4: email
        let report_config = self.ctx.config.report(&report_id);
        let mut emailed = false;
        if !self.no_email && !report_config.recipients.is_empty() {
            let mail = ReportMail {
                to: report_config.recipients.clone(),
                subject: format!("{} - {}", book.title, self.ctx.as_of.format("%Y-%m-%d")),
                body: run_summary_body(&book.title, run_id, rows, &output_path),
                attachment_name: output_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| format!("{}.xlsx", report_id)),
                attachment: bytes,
            };
            match self.mailer.send(&mail).await {
                Ok(()) => {
                    emailed = true;
                    observability::delivery::emails_sent(&report_id);
                    info!("Emailed workbook to {} recipients", mail.to.len());
                }
                Err(e) => {
                    observability::delivery::email_failures(&report_id);
                    warn!("Email delivery failed: {}", e);
                    warnings.push(format!("email delivery failed: {}", e));
                }
            }
        }

        let duration_seconds = started.elapsed().as_secs_f64();
        observability::report::duration_seconds(&report_id, duration_seconds);

        Ok(RunOutcome {
            run_id,
            report_id,
            as_of: self.ctx.as_of,
            rows,
            output_path: output_path.to_string_lossy().to_string(),
            duration_seconds,
            emailed,
            warnings,
        })
    }

    /// Runs each requested report, isolating failures so one bad report never
    /// aborts the rest. Returns one entry per requested id.
    pub async fn run_reports(&self, report_ids: &[String]) -> Vec<(String, Result<RunOutcome>)> {
        let mut outcomes = Vec::new();
        for report_id in report_ids {
            let Some(job) = registry::create_report(report_id) else {
                // A typo in --reports must fail the batch, not exit clean
                observability::report::failures(report_id);
                warn!("Unknown report id {}", report_id);
                println!("❌ Unknown report: {}", report_id);
                outcomes.push((
                    report_id.clone(),
                    Err(ReportError::Config(format!(
                        "unknown report id '{}'",
                        report_id
                    ))),
                ));
                continue;
            };

            println!("🚀 Running {} ...", report_id);
            match self.run_report(job.as_ref()).await {
                Ok(outcome) => {
                    println!("\n📊 {} ({})", job.title(), outcome.report_id);
                    println!("   Rows: {}", outcome.rows);
                    println!("   Output: {}", outcome.output_path);
                    println!("   Emailed: {}", if outcome.emailed { "yes" } else { "no" });
                    println!("   Duration: {:.2}s", outcome.duration_seconds);
                    if !outcome.warnings.is_empty() {
                        println!("⚠️  Warnings:");
                        for w in &outcome.warnings {
                            println!("   - {}", w);
                        }
                    }
                    outcomes.push((report_id.clone(), Ok(outcome)));
                }
                Err(e) => {
                    observability::report::failures(report_id);
                    error!("Report {} failed: {}", report_id, e);
                    println!("❌ {} failed: {}", report_id, e);
                    outcomes.push((report_id.clone(), Err(e)));
                }
            }
        }
        outcomes
    }
}

fn run_summary_body(title: &str, run_id: Uuid, rows: usize, output_path: &std::path::Path) -> String {
    format!(
        "{}\n\nRun id: {}\nRows: {}\nArchived at: {}\n\nThe workbook is attached.\n",
        title,
        run_id,
        rows,
        output_path.display()
    )
}
