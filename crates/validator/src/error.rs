use thiserror::Error;

/// Operational failures of a validation run. Findings about the app itself
/// are never errors; they go to the report.
#[derive(Error, Debug)]
pub enum ValidatorError {
    /// IO errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The package is not a readable zip archive
    #[error("Corrupt ZIP file: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// The wall-clock guard for the run elapsed
    #[error("Validation timeout after {seconds} seconds")]
    ValidationTimeout { seconds: u64 },

    /// Resource loading errors
    #[error("Resource loading error: {0}")]
    Resource(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ValidatorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ValidatorError::ValidationTimeout { .. })
    }

    /// Returns true if the package itself could not be read
    pub fn is_package_error(&self) -> bool {
        matches!(self, ValidatorError::Zip(_) | ValidatorError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, ValidatorError>;
