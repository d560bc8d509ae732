//! Token service - OAuth connect/disconnect and access token refresh

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use domain::entities::Credential;
use domain::value_objects::{CredentialId, Provider, UserId};
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::error::ApplicationError;
use crate::ports::{CredentialStorePort, ProviderRegistry};

/// Tunables for token handling
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Refresh the access token when it expires within this many seconds
    pub refresh_margin_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: 300,
        }
    }
}

/// Manages provider credentials and keeps access tokens fresh
///
/// Refreshes are serialized per credential: concurrent callers that find the
/// same token expiring take one async lock, and only the first performs the
/// provider round-trip. The others re-read and reuse the refreshed token.
pub struct TokenService<C: CredentialStorePort> {
    credentials: Arc<C>,
    providers: Arc<ProviderRegistry>,
    config: TokenConfig,
    refresh_locks: Mutex<HashMap<CredentialId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<C: CredentialStorePort> TokenService<C> {
    /// Create a new token service
    #[must_use]
    pub fn new(credentials: Arc<C>, providers: Arc<ProviderRegistry>, config: TokenConfig) -> Self {
        Self {
            credentials,
            providers,
            config,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Exchange an OAuth authorization code and store the resulting credential
    ///
    /// Replaces any existing credential for the same (user, provider) pair,
    /// which also reactivates a previously disconnected one.
    ///
    /// # Errors
    ///
    /// Returns an error when no adapter is registered, the exchange fails, or
    /// the provider withholds a refresh token.
    #[instrument(skip(self, code))]
    pub async fn connect(
        &self,
        user_id: UserId,
        provider: Provider,
        code: &str,
    ) -> Result<Credential, ApplicationError> {
        let adapter = self.providers.get(provider)?;
        let grant = adapter.exchange_code(code).await?;
        let refresh_token = grant.refresh_token.clone().ok_or_else(|| {
            ApplicationError::ExternalService(format!(
                "{provider} did not return a refresh token; was offline access requested?"
            ))
        })?;

        let credential = Credential::new(
            user_id,
            provider,
            grant.access_token.clone(),
            refresh_token,
            grant.expires_at(Utc::now()),
        );
        self.credentials.upsert(&credential).await?;

        // Best effort; connection is usable even if the identity probe fails.
        match adapter.account_identity(&grant.access_token).await {
            Ok(identity) => {
                info!(%user_id, %provider, account = %identity.account_id, "provider connected");
            }
            Err(err) => {
                warn!(%user_id, %provider, error = %err, "connected but identity lookup failed");
            }
        }

        Ok(credential)
    }

    /// Disconnect a provider for a user
    ///
    /// Soft-disables the credential; local events pulled from the provider
    /// are kept.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::NotFound`] when no credential exists for
    /// the pair.
    #[instrument(skip(self))]
    pub async fn disconnect(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<(), ApplicationError> {
        let existed = self.credentials.set_active(user_id, provider, false).await?;
        if !existed {
            return Err(ApplicationError::NotFound(format!(
                "no {provider} credential for user {user_id}"
            )));
        }
        info!(%user_id, %provider, "provider disconnected");
        Ok(())
    }

    /// Return a usable access token for the credential, refreshing if needed
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::CredentialError`] when the credential is
    /// inactive or the provider rejects the refresh token.
    #[instrument(skip(self, credential), fields(credential_id = %credential.id))]
    pub async fn get_valid_access_token(
        &self,
        credential: &Credential,
    ) -> Result<String, ApplicationError> {
        if !credential.is_active {
            return Err(ApplicationError::CredentialError(format!(
                "{} credential for user {} is disconnected",
                credential.provider, credential.user_id
            )));
        }

        let margin = Duration::seconds(self.config.refresh_margin_secs);
        if !credential.expires_within(margin) {
            return Ok(credential.access_token.clone());
        }

        let lock = self.lock_for(credential.id);
        let _guard = lock.lock().await;

        // Re-read under the lock: a concurrent caller may have refreshed
        // while we were waiting.
        let fresh = self
            .credentials
            .get_by_id(&credential.id)
            .await?
            .ok_or_else(|| {
                ApplicationError::NotFound(format!("credential {}", credential.id))
            })?;
        if !fresh.expires_within(margin) {
            return Ok(fresh.access_token);
        }

        let adapter = self.providers.get(fresh.provider)?;
        let grant = adapter.refresh_token(&fresh.refresh_token).await?;
        let expires_at = grant.expires_at(Utc::now());

        // A failed persist leaves the old row in place; the token we return
        // is still valid, and the next caller refreshes again.
        if let Err(err) = self
            .credentials
            .update_tokens(
                &fresh.id,
                &grant.access_token,
                grant.refresh_token.as_deref(),
                expires_at,
            )
            .await
        {
            warn!(credential_id = %fresh.id, error = %err, "failed to persist refreshed tokens");
        }

        info!(credential_id = %fresh.id, provider = %fresh.provider, "access token refreshed");
        Ok(grant.access_token)
    }

    fn lock_for(&self, id: CredentialId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.refresh_locks.lock();
        Arc::clone(locks.entry(id).or_default())
    }
}

#[cfg(test)]
mod tests {
    use domain::value_objects::Provider;
    use mockall::predicate::eq;

    use super::*;
    use crate::ports::{MockCredentialStorePort, MockProviderPort, TokenGrant};

    fn grant(access: &str, refresh: Option<&str>, expires_in_secs: i64) -> TokenGrant {
        TokenGrant {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in_secs,
        }
    }

    fn credential(expires_in_mins: i64) -> Credential {
        Credential::new(
            UserId::new(),
            Provider::Google,
            "access-old",
            "refresh-1",
            Utc::now() + Duration::minutes(expires_in_mins),
        )
    }

    fn service(
        store: MockCredentialStorePort,
        provider: MockProviderPort,
    ) -> TokenService<MockCredentialStorePort> {
        let registry =
            ProviderRegistry::new().with_adapter(Provider::Google, Arc::new(provider));
        TokenService::new(Arc::new(store), Arc::new(registry), TokenConfig::default())
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_refresh() {
        let store = MockCredentialStorePort::new();
        let provider = MockProviderPort::new();
        let svc = service(store, provider);

        let cred = credential(60);
        let token = svc.get_valid_access_token(&cred).await.unwrap();
        assert_eq!(token, "access-old");
    }

    #[tokio::test]
    async fn expiring_token_triggers_refresh_and_persist() {
        let cred = credential(2);
        let cred_id = cred.id;

        let mut store = MockCredentialStorePort::new();
        let reread = cred.clone();
        store
            .expect_get_by_id()
            .with(eq(cred_id))
            .times(1)
            .returning(move |_| Ok(Some(reread.clone())));
        store
            .expect_update_tokens()
            .withf(move |id, access, refresh, _| {
                *id == cred_id && access == "access-new" && refresh == &Some("refresh-2")
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut provider = MockProviderPort::new();
        provider
            .expect_refresh_token()
            .with(eq("refresh-1"))
            .times(1)
            .returning(|_| Ok(grant("access-new", Some("refresh-2"), 3600)));

        let svc = service(store, provider);
        let token = svc.get_valid_access_token(&cred).await.unwrap();
        assert_eq!(token, "access-new");
    }

    #[tokio::test]
    async fn race_loser_reuses_winner_token() {
        // The re-read under the lock finds an already-fresh credential, so
        // no provider call is made.
        let mut cred = credential(2);
        let cred_id = cred.id;
        cred.access_token = "access-stale-view".to_string();

        let mut store = MockCredentialStorePort::new();
        store.expect_get_by_id().with(eq(cred_id)).returning(|_| {
            let mut winner = credential(60);
            winner.access_token = "access-won".to_string();
            Ok(Some(winner))
        });

        let provider = MockProviderPort::new();
        let svc = service(store, provider);
        let token = svc.get_valid_access_token(&cred).await.unwrap();
        assert_eq!(token, "access-won");
    }

    #[tokio::test]
    async fn rejected_refresh_surfaces_credential_error() {
        let cred = credential(2);

        let mut store = MockCredentialStorePort::new();
        let reread = cred.clone();
        store
            .expect_get_by_id()
            .returning(move |_| Ok(Some(reread.clone())));

        let mut provider = MockProviderPort::new();
        provider.expect_refresh_token().returning(|_| {
            Err(crate::ports::ProviderError::Credential(
                "invalid_grant".to_string(),
            ))
        });

        let svc = service(store, provider);
        let err = svc.get_valid_access_token(&cred).await.unwrap_err();
        assert!(matches!(err, ApplicationError::CredentialError(_)));
    }

    #[tokio::test]
    async fn inactive_credential_is_rejected() {
        let mut cred = credential(60);
        cred.deactivate();

        let svc = service(MockCredentialStorePort::new(), MockProviderPort::new());
        let err = svc.get_valid_access_token(&cred).await.unwrap_err();
        assert!(matches!(err, ApplicationError::CredentialError(_)));
    }

    #[tokio::test]
    async fn persist_failure_still_returns_refreshed_token() {
        let cred = credential(2);

        let mut store = MockCredentialStorePort::new();
        let reread = cred.clone();
        store
            .expect_get_by_id()
            .returning(move |_| Ok(Some(reread.clone())));
        store
            .expect_update_tokens()
            .returning(|_, _, _, _| Err(ApplicationError::Storage("disk full".to_string())));

        let mut provider = MockProviderPort::new();
        provider
            .expect_refresh_token()
            .returning(|_| Ok(grant("access-new", None, 3600)));

        let svc = service(store, provider);
        let token = svc.get_valid_access_token(&cred).await.unwrap();
        assert_eq!(token, "access-new");
    }

    #[tokio::test]
    async fn connect_requires_refresh_token() {
        let mut provider = MockProviderPort::new();
        provider
            .expect_exchange_code()
            .returning(|_| Ok(grant("access-1", None, 3600)));

        let svc = service(MockCredentialStorePort::new(), provider);
        let err = svc
            .connect(UserId::new(), Provider::Google, "auth-code")
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::ExternalService(_)));
    }

    #[tokio::test]
    async fn connect_stores_active_credential() {
        let user_id = UserId::new();

        let mut provider = MockProviderPort::new();
        provider
            .expect_exchange_code()
            .with(eq("auth-code"))
            .returning(|_| Ok(grant("access-1", Some("refresh-1"), 3600)));
        provider.expect_account_identity().returning(|_| {
            Ok(crate::ports::AccountIdentity {
                account_id: "agent@example.com".to_string(),
                display_name: None,
            })
        });

        let mut store = MockCredentialStorePort::new();
        store
            .expect_upsert()
            .withf(move |c| c.user_id == user_id && c.is_active && c.refresh_token == "refresh-1")
            .times(1)
            .returning(|_| Ok(()));

        let svc = service(store, provider);
        let cred = svc
            .connect(user_id, Provider::Google, "auth-code")
            .await
            .unwrap();
        assert_eq!(cred.access_token, "access-1");
    }

    #[tokio::test]
    async fn disconnect_unknown_pair_is_not_found() {
        let mut store = MockCredentialStorePort::new();
        store.expect_set_active().returning(|_, _, _| Ok(false));

        let svc = service(store, MockProviderPort::new());
        let err = svc
            .disconnect(UserId::new(), Provider::Google)
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound(_)));
    }
}
