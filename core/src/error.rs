use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Decode(String),

    #[error("source {source_id} not found")]
    NotFound { source_id: String },

    #[error("credential lookup for source {source_id} failed (status {status:?}): {details}")]
    Lookup {
        source_id: String,
        status: Option<u16>,
        details: String,
    },

    #[error("{provider} probe failed: {details}")]
    Probe { provider: String, details: String },

    #[error("outbound send of {count} messages failed: {details}")]
    Transport { count: usize, details: String },

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::Io(_) => true,
            Error::Lookup { status, .. } => status.map_or(true, |s| s >= 500),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
