use thiserror::Error;

/// Custom Result type for cabquote operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cabquote
#[derive(Debug, Error)]
pub enum Error {
    /// Formula syntax error
    #[error("parse error {0}")]
    Parse(String),
    /// Formula evaluation error (unresolved name, division by zero, overflow)
    #[error("eval error {0}")]
    Eval(String),
    /// Internal error (schema mismatch, unknown column, broken log entry)
    #[error("internal error {0}")]
    Internal(String),
    /// Configuration error
    #[error("config error {0}")]
    Config(String),
    #[error("sqlite error {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error {0}")]
    Io(#[from] std::io::Error),
}

impl From<rust_decimal::Error> for Error {
    fn from(value: rust_decimal::Error) -> Self {
        Error::Parse(value.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(value: toml::de::Error) -> Self {
        Error::Config(value.to_string())
    }
}
