use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("warehouse query failed: {0}")]
    Db(#[from] sqlx::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("workbook write failed: {0}")]
    WorkbookWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("workbook read failed: {0}")]
    WorkbookRead(#[from] calamine::XlsxError),

    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("mail message error: {0}")]
    Mail(#[from] lettre::error::Error),

    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("data quality check failed: {message}")]
    DataQuality { message: String },

    #[error("vendor drop file error: {0}")]
    DropFile(String),

    #[error("environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, ReportError>;
