use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("CONFIGURATION_MISSING: {0}")]
    ConfigurationMissing(String),
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
    #[error("SCHEMA_FETCH_FAILED: {0}")]
    SchemaFetch(String),
    #[error("VALIDATION_FAILED: {0}")]
    Validation(String),
    #[error("NOTION_FAILURE: {0}")]
    Notion(String),
    #[error("SUBMISSION_FAILED: {0}")]
    Submission(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    /// Message without the category prefix, suitable for `{ "error": ... }` bodies.
    pub fn message(&self) -> &str {
        match self {
            Self::ConfigurationMissing(message)
            | Self::InvalidInput(message)
            | Self::SchemaFetch(message)
            | Self::Validation(message)
            | Self::Notion(message)
            | Self::Submission(message)
            | Self::Io(message)
            | Self::NotFound(message)
            | Self::Internal(message) => message,
        }
    }

    pub fn not_configured() -> Self {
        Self::ConfigurationMissing(
            "Notion is not configured. Please configure your credentials first.".to_string(),
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
