use thiserror::Error;

/// Rejected input at a value-type constructor or parse boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} out of range: {value} (expected a value in [0, 1])")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unknown window: {0:?} (expected today, last-week, last-month, last-year or lifetime)")]
    UnknownWindow(String),
}

#[derive(Error, Debug)]
pub enum LumenError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Classification error: {0}")]
    Classification(#[from] crate::classifier::ClassificationError),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::store::StorageError),

    #[error("Other error: {0}")]
    Other(String),
}
