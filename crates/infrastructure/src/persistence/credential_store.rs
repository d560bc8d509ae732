//! SQLite-based credential persistence

use std::str::FromStr;
use std::sync::Arc;

use application::{error::ApplicationError, ports::CredentialStorePort};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::entities::Credential;
use domain::value_objects::{CredentialId, Provider, UserId};
use rusqlite::{OptionalExtension, Row, params};
use tokio::task;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::connection::ConnectionPool;

/// SQLite-based credential store
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: Arc<ConnectionPool>,
}

impl SqliteCredentialStore {
    /// Create a new SQLite credential store
    #[must_use]
    pub const fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStorePort for SqliteCredentialStore {
    #[instrument(skip(self, credential), fields(credential_id = %credential.id))]
    async fn upsert(&self, credential: &Credential) -> Result<(), ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let credential = credential.clone();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            // Re-connecting replaces the tokens and reactivates the row; the
            // original id and created_at survive.
            conn.execute(
                "INSERT INTO credentials (
                    id, user_id, provider, access_token, refresh_token,
                    expires_at, is_active, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(user_id, provider) DO UPDATE SET
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    expires_at = excluded.expires_at,
                    is_active = excluded.is_active,
                    updated_at = excluded.updated_at",
                params![
                    credential.id.to_string(),
                    credential.user_id.to_string(),
                    credential.provider.as_str(),
                    credential.access_token,
                    credential.refresh_token,
                    credential.expires_at.to_rfc3339(),
                    credential.is_active,
                    credential.created_at.to_rfc3339(),
                    credential.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            debug!("Saved credential");
            Ok(())
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn get(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<Option<Credential>, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let user_id_str = user_id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            conn.query_row(
                "SELECT id, user_id, provider, access_token, refresh_token,
                    expires_at, is_active, created_at, updated_at
                 FROM credentials WHERE user_id = ?1 AND provider = ?2",
                params![user_id_str, provider.as_str()],
                row_to_credential,
            )
            .optional()
            .map_err(|e| ApplicationError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self), fields(credential_id = %id))]
    async fn get_by_id(&self, id: &CredentialId) -> Result<Option<Credential>, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let id_str = id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            conn.query_row(
                "SELECT id, user_id, provider, access_token, refresh_token,
                    expires_at, is_active, created_at, updated_at
                 FROM credentials WHERE id = ?1",
                [&id_str],
                row_to_credential,
            )
            .optional()
            .map_err(|e| ApplicationError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self, access_token, refresh_token), fields(credential_id = %id))]
    async fn update_tokens<'a>(
        &self,
        id: &CredentialId,
        access_token: &str,
        refresh_token: Option<&'a str>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let id_str = id.to_string();
        let access_token = access_token.to_string();
        let refresh_token = refresh_token.map(str::to_string);

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let affected = conn
                .execute(
                    "UPDATE credentials SET
                        access_token = ?1,
                        refresh_token = COALESCE(?2, refresh_token),
                        expires_at = ?3,
                        updated_at = ?4
                     WHERE id = ?5",
                    params![
                        access_token,
                        refresh_token,
                        expires_at.to_rfc3339(),
                        Utc::now().to_rfc3339(),
                        id_str,
                    ],
                )
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            if affected == 0 {
                return Err(ApplicationError::NotFound(format!("credential {id_str}")));
            }

            debug!("Updated credential tokens");
            Ok(())
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn set_active(
        &self,
        user_id: UserId,
        provider: Provider,
        active: bool,
    ) -> Result<bool, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let user_id_str = user_id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let affected = conn
                .execute(
                    "UPDATE credentials SET is_active = ?1, updated_at = ?2
                     WHERE user_id = ?3 AND provider = ?4",
                    params![
                        active,
                        Utc::now().to_rfc3339(),
                        user_id_str,
                        provider.as_str()
                    ],
                )
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            Ok(affected > 0)
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn list_active(&self) -> Result<Vec<Credential>, ApplicationError> {
        let pool = Arc::clone(&self.pool);

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, provider, access_token, refresh_token,
                        expires_at, is_active, created_at, updated_at
                     FROM credentials WHERE is_active = 1
                     ORDER BY user_id, provider",
                )
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let credentials: Vec<Credential> = stmt
                .query_map([], row_to_credential)
                .map_err(|e| ApplicationError::Storage(e.to_string()))?
                .filter_map(Result::ok)
                .collect();

            debug!(count = credentials.len(), "Fetched active credentials");
            Ok(credentials)
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }
}

/// Convert a database row to a Credential domain entity
fn row_to_credential(row: &Row<'_>) -> rusqlite::Result<Credential> {
    let id_str: String = row.get(0)?;
    let user_id_str: String = row.get(1)?;
    let provider_str: String = row.get(2)?;
    let access_token: String = row.get(3)?;
    let refresh_token: String = row.get(4)?;
    let expires_at_str: String = row.get(5)?;
    let is_active: bool = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    let id = CredentialId::parse(&id_str).unwrap_or_else(|_| CredentialId::from(Uuid::new_v4()));
    let user_id = UserId::parse(&user_id_str).unwrap_or_else(|_| UserId::from(Uuid::new_v4()));
    // The CHECK constraint keeps provider values valid; the fallback only
    // fires on a manually edited database.
    let provider = Provider::from_str(&provider_str).unwrap_or(Provider::Google);

    Ok(Credential {
        id,
        user_id,
        provider,
        access_token,
        refresh_token,
        expires_at: parse_instant(&expires_at_str),
        is_active,
        created_at: parse_instant(&created_at_str),
        updated_at: parse_instant(&updated_at_str),
    })
}

pub(super) fn parse_instant(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
