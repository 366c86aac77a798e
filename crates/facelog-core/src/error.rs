use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FaceLogError {
    /// Malformed or out-of-range input. Caller error, never retried.
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Durable write or read failure reported by the storage layer.
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T, E = FaceLogError> = std::result::Result<T, E>;
