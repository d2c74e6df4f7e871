use crate::validate::FieldViolations;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    Validation(FieldViolations),

    /// Malformed page token, or a token issued for a different query
    /// context. Both are rejected the same way.
    #[error("invalid page token")]
    InvalidPageToken,

    /// Soft signal for a missing item, e.g. a device with no threshold
    /// config. Not a hard failure inside metric recording.
    #[error("not found")]
    NotFound,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
