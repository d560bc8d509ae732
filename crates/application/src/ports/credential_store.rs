//! Credential store port - persistence for provider OAuth tokens

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::entities::Credential;
use domain::value_objects::{CredentialId, Provider, UserId};
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Port for persisting provider credentials
///
/// The store enforces at most one credential per (user, provider) pair.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialStorePort: Send + Sync {
    /// Insert a credential, replacing any existing one for the same
    /// (user, provider) pair
    async fn upsert(&self, credential: &Credential) -> Result<(), ApplicationError>;

    /// Get the credential for a (user, provider) pair
    async fn get(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<Option<Credential>, ApplicationError>;

    /// Get a credential by its identifier
    async fn get_by_id(&self, id: &CredentialId) -> Result<Option<Credential>, ApplicationError>;

    /// Persist the outcome of a token refresh
    ///
    /// `refresh_token` is only written when the provider rotated it.
    async fn update_tokens<'a>(
        &self,
        id: &CredentialId,
        access_token: &str,
        refresh_token: Option<&'a str>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError>;

    /// Toggle the active flag, returning whether the credential existed
    async fn set_active(
        &self,
        user_id: UserId,
        provider: Provider,
        active: bool,
    ) -> Result<bool, ApplicationError>;

    /// All active credentials across users (sweep input)
    async fn list_active(&self) -> Result<Vec<Credential>, ApplicationError>;
}
