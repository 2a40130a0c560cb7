//! # Store Errors

use thiserror::Error;

use super::entity::{EntityId, EntityKind};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Content, learner and option storage errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Entity does not exist
    #[error("Entity not found: {0}")]
    NotFound(EntityId),

    /// Entity exists but is not of the expected kind
    #[error("Entity {id} is not a {expected}")]
    WrongKind { id: EntityId, expected: EntityKind },

    /// Checkpoint was already released or rolled back
    #[error("Unknown or released checkpoint: {0}")]
    InvalidCheckpoint(u64),

    /// Backend failure (lock poisoned, I/O)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::NotFound(_) => 404,
            StoreError::WrongKind { .. } => 404,
            StoreError::InvalidCheckpoint(_) => 500,
            StoreError::Storage(_) => 500,
            StoreError::Serialization(_) => 500,
        }
    }

    pub(crate) fn poisoned() -> Self {
        StoreError::Storage("Lock poisoned".to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
