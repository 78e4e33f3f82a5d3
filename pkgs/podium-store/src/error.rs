//! Error types for log store operations

use sea_orm::DbErr;
use thiserror::Error;

/// Result alias used by every collaborator trait
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while talking to the backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<DbErr> for BackendError {
    fn from(e: DbErr) -> Self {
        match e {
            DbErr::RecordNotFound(what) => BackendError::NotFound(what),
            other => BackendError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Serialization(e.to_string())
    }
}
