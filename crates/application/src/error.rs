//! Application layer error types

use domain::DomainError;
use thiserror::Error;

use crate::ports::ProviderError;

/// Errors that can occur in the application layer
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Domain validation or lookup failure
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Requested entity does not exist (or belongs to another user)
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation is not valid in the current state
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A provider call failed for reasons worth retrying
    #[error("external service error: {0}")]
    ExternalService(String),

    /// The provider rejected our tokens; user must reconnect
    #[error("credential error: {0}")]
    CredentialError(String),

    /// The provider throttled us
    #[error("rate limited by provider")]
    RateLimited,

    /// Missing or inconsistent wiring (no adapter registered, bad config)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Persistence failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Whether a later retry of the same call could succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalService(_) | Self::RateLimited)
    }
}

impl From<ProviderError> for ApplicationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Transient(msg) => Self::ExternalService(msg),
            ProviderError::RateLimited => Self::RateLimited,
            ProviderError::Credential(msg) => Self::CredentialError(msg),
            ProviderError::EventNotFound(id) => Self::NotFound(format!("remote event {id}")),
            ProviderError::InvalidResponse(msg) => {
                Self::ExternalService(format!("malformed provider response: {msg}"))
            }
        }
    }
}
