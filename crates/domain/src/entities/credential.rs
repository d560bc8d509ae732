//! Provider credential entity - OAuth tokens for one user/provider pair

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{CredentialId, Provider, UserId};

/// OAuth credentials for one (user, provider) pair
///
/// At most one credential exists per pair; the storage layer enforces this
/// with a unique index and upserts on conflict. A credential is soft-disabled
/// on explicit disconnect and is never deactivated by sync failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Unique identifier
    pub id: CredentialId,
    /// Owning user
    pub user_id: UserId,
    /// Which provider issued these tokens
    pub provider: Provider,
    /// Short-lived bearer token
    pub access_token: String,
    /// Long-lived token used to obtain fresh access tokens
    pub refresh_token: String,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
    /// Whether the connection is active (false after explicit disconnect)
    pub is_active: bool,
    /// When this credential was created
    pub created_at: DateTime<Utc>,
    /// When this credential was last updated
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Create a new active credential from a successful code exchange
    #[must_use]
    pub fn new(
        user_id: UserId,
        provider: Provider,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CredentialId::new(),
            user_id,
            provider,
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the access token expires within the given margin
    #[must_use]
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at - Utc::now() <= margin
    }

    /// Apply a successful refresh in place
    ///
    /// Providers may rotate the refresh token; when they do, the new one
    /// replaces the old.
    pub fn apply_refresh(
        &mut self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) {
        self.access_token = access_token.into();
        if let Some(rotated) = refresh_token {
            self.refresh_token = rotated;
        }
        self.expires_at = expires_at;
        self.updated_at = Utc::now();
    }

    /// Soft-disable this credential (explicit user disconnect)
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.updated_at = Utc::now();
    }
}
