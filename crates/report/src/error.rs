//! Errors raised while rendering or reloading a report.

#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Malformed report: {0}")]
    Malformed(String),
}

pub type ReportResult<T> = Result<T, ReportError>;
