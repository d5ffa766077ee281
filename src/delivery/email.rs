//! Mail delivery port. `SmtpMailer` sends one message per report over
//! STARTTLS with the workbook attached; `MockMailer` captures messages for
//! tests. SMTP credentials come from the environment (`SMTP_USER`,
//! `SMTP_PASSWORD`), relay host/port/from from config.

use crate::config::SmtpConfig;
use crate::error::{ReportError, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Mutex;

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// One outbound report message.
#[derive(Debug, Clone)]
pub struct ReportMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub attachment: Vec<u8>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &ReportMail) -> Result<()>;
}

pub struct SmtpMailer {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        if !config.enabled {
            return Err(ReportError::Config(
                "SmtpMailer constructed but smtp.enabled is false".to_string(),
            ));
        }
        let user = std::env::var("SMTP_USER")?;
        let password = std::env::var("SMTP_PASSWORD")?;
        let creds = Credentials::new(user, password);

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self { config, transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &ReportMail) -> Result<()> {
        let from: Mailbox = self.config.from.parse()?;

        let mut builder = Message::builder().from(from).subject(mail.subject.clone());
        for recipient in &mail.to {
            builder = builder.to(recipient.parse::<Mailbox>()?);
        }

        let attachment_type = ContentType::parse(XLSX_MIME)
            .map_err(|e| ReportError::Config(format!("bad attachment MIME type: {}", e)))?;
        let message = builder.multipart(
            MultiPart::mixed()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(mail.body.clone()),
                )
                .singlepart(
                    Attachment::new(mail.attachment_name.clone())
                        .body(mail.attachment.clone(), attachment_type),
                ),
        )?;

        self.transport.send(message).await?;
        Ok(())
    }
}

/// Stands in when `smtp.enabled` is false. The runner skips delivery when it
/// holds this mailer, and any stray send surfaces as a run warning.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _mail: &ReportMail) -> Result<()> {
        Err(ReportError::Config(
            "smtp delivery is disabled in config".to_string(),
        ))
    }
}

/// Captures sent mail in memory for tests.
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<ReportMail>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<ReportMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, mail: &ReportMail) -> Result<()> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}
