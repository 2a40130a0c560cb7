//! # Enrolment Errors

use thiserror::Error;

use crate::store::{EntityId, StoreError};

/// Result type for enrolment operations
pub type EnrolmentResult<T> = Result<T, EnrolmentError>;

/// Enrolment and access evaluation errors
#[derive(Debug, Clone, Error)]
pub enum EnrolmentError {
    /// Course id does not name a course
    #[error("Course not found: {0}")]
    CourseNotFound(EntityId),

    /// No provider registered under this id
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// A provider with this id is already registered
    #[error("Provider already registered: {0}")]
    DuplicateProvider(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EnrolmentError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            EnrolmentError::CourseNotFound(_) => 404,
            EnrolmentError::ProviderNotFound(_) => 404,
            EnrolmentError::DuplicateProvider(_) => 409,
            EnrolmentError::Store(err) => err.status_code(),
            EnrolmentError::Internal(_) => 500,
        }
    }

    pub(crate) fn poisoned() -> Self {
        EnrolmentError::Internal("Lock poisoned".to_string())
    }
}

/// Failure of a single provider during evaluation.
///
/// Never aborts an evaluation: the provider's contribution becomes an
/// abstention.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Provider {provider} failed: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn store(provider: impl Into<String>, err: StoreError) -> Self {
        Self::new(provider, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(EnrolmentError::CourseNotFound(1).status_code(), 404);
        assert_eq!(EnrolmentError::DuplicateProvider("manual".into()).status_code(), 409);
        assert_eq!(EnrolmentError::Store(StoreError::NotFound(2)).status_code(), 404);
        assert_eq!(EnrolmentError::poisoned().status_code(), 500);
    }

    #[test]
    fn test_provider_error_message() {
        let err = ProviderError::store("payments", StoreError::Storage("offline".into()));
        assert_eq!(err.to_string(), "Provider payments failed: Storage error: offline");
    }
}
