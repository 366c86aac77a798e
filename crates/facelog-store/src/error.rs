use facelog_core::FaceLogError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for FaceLogError {
    fn from(err: StoreError) -> Self {
        FaceLogError::Storage(err.to_string())
    }
}

/// Shorthand for mapping a failed `Connection::call` into the core error.
pub(crate) fn storage(err: tokio_rusqlite::Error) -> FaceLogError {
    StoreError::from(err).into()
}
