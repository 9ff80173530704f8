use std::path::PathBuf;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing file is gone; the request was removed concurrently
    #[error("Request {id} not found in store")]
    NotFound { id: Uuid },

    #[error("Persistence failure on {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    #[error("Cannot serialize request {id}: {reason}")]
    Serialization { id: Uuid, reason: String },

    #[error("Invalid store key: {0}")]
    InvalidKey(String),
}

impl StoreError {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the caller should stop working on the request rather than report a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
