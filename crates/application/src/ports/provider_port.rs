//! Provider port - uniform interface over external calendar APIs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::entities::CalendarEvent;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a provider adapter can report
///
/// Adapters normalize provider-specific failures (HTTP statuses, OAuth error
/// codes, response shapes) into this taxonomy so the sync layer never has to
/// know which provider it is talking to.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure, timeout, or provider 5xx; safe to retry later
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Provider throttled the request (HTTP 429)
    #[error("rate limited")]
    RateLimited,

    /// Token rejected, revoked grant, or failed refresh; user must reconnect
    #[error("credential rejected: {0}")]
    Credential(String),

    /// The referenced remote event no longer exists
    #[error("remote event not found: {0}")]
    EventNotFound(String),

    /// Response did not match the provider's documented shape
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether a later retry of the same call could succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited)
    }

    /// Whether the failure means the stored tokens are no longer usable
    #[must_use]
    pub const fn is_credential(&self) -> bool {
        matches!(self, Self::Credential(_))
    }
}

/// Tokens returned by a code exchange or refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Short-lived bearer token
    pub access_token: String,
    /// New refresh token, when the provider rotates it
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds
    pub expires_in_secs: i64,
}

impl TokenGrant {
    /// Absolute expiry of the access token, given the moment it was issued
    #[must_use]
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        issued_at + chrono::Duration::seconds(self.expires_in_secs)
    }
}

/// An event as the provider reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEvent {
    /// Provider-assigned identifier
    pub external_id: String,
    /// Event title/summary
    pub title: String,
    /// Optional detailed description
    pub description: Option<String>,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// End time
    pub end_time: DateTime<Utc>,
    /// Location, when the provider reports one
    pub location: Option<String>,
}

/// Payload for creating or replacing a remote event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRemoteEvent {
    /// Event title/summary
    pub title: String,
    /// Optional detailed description
    pub description: Option<String>,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// End time
    pub end_time: DateTime<Utc>,
    /// Location, when known
    pub location: Option<String>,
}

impl From<&CalendarEvent> for NewRemoteEvent {
    fn from(event: &CalendarEvent) -> Self {
        Self {
            title: event.title.clone(),
            description: event.description.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            location: event.location.clone(),
        }
    }
}

/// The provider-side account the tokens belong to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountIdentity {
    /// Provider-scoped account identifier (usually an email address)
    pub account_id: String,
    /// Display name, when the provider reports one
    pub display_name: Option<String>,
}

/// Port for one external calendar provider
///
/// One implementation per provider; all methods take the access token
/// explicitly so the adapter holds no per-user state.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProviderPort: Send + Sync {
    /// Exchange an OAuth authorization code for tokens
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError>;

    /// Obtain a fresh access token from a refresh token
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError>;

    /// List events within a time window
    async fn list_events(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>, ProviderError>;

    /// Create a remote event, returning its provider-assigned identifier
    async fn create_event(
        &self,
        access_token: &str,
        event: &NewRemoteEvent,
    ) -> Result<String, ProviderError>;

    /// Replace the remote event's fields
    async fn update_event(
        &self,
        access_token: &str,
        external_id: &str,
        event: &NewRemoteEvent,
    ) -> Result<(), ProviderError>;

    /// Delete a remote event
    ///
    /// Deleting an event that is already gone is a success, so callers can
    /// retry deletes without tracking prior outcomes.
    async fn delete_event(&self, access_token: &str, external_id: &str)
    -> Result<(), ProviderError>;

    /// Identify the provider-side account the tokens belong to
    async fn account_identity(&self, access_token: &str)
    -> Result<AccountIdentity, ProviderError>;
}

impl std::fmt::Debug for dyn ProviderPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ProviderPort")
    }
}
