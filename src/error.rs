use thiserror::Error;

use crate::services::{DirectoryError, StoreError};

/// Facade-level error taxonomy.
///
/// Read operations almost never surface these: missing data degrades to
/// empty results. Write operations (preference saves, interaction
/// recording) propagate validation and storage failures explicitly.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl From<DirectoryError> for EngineError {
    fn from(err: DirectoryError) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(err: validator::ValidationErrors) -> Self {
        EngineError::Validation(err.to_string())
    }
}
