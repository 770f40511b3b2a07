use thiserror::Error;

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid version '{version}': {reason}")]
    VersionParse { version: String, reason: String },

    #[error("Unknown privacy level: {0}")]
    InvalidPrivacyLevel(i32),

    #[error("Product not available: {0}")]
    ProductUnavailable(String),

    #[error("Reporting sink error: {0}")]
    Sink(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<serde_json::Error> for UsageError {
    fn from(err: serde_json::Error) -> Self {
        UsageError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for UsageError {
    fn from(err: url::ParseError) -> Self {
        UsageError::InvalidUrl(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, UsageError>;
