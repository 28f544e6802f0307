use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// The upstream chat API failed: connection error, non-2xx status,
    /// explicit `error` event, or a stream that ended without a terminal.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// An upstream frame could not be decoded.
    #[error("Upstream protocol error: {0}")]
    UpstreamProtocol(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The conversation store was unavailable when the turn had to be persisted.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
