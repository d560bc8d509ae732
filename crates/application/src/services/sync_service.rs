//! Sync service - bidirectional reconciliation with calendar providers

use std::sync::Arc;

use chrono::Utc;
use domain::entities::{CalendarEvent, EventType};
use domain::value_objects::{EventId, Provider, SyncWindow, UserId};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::ApplicationError;
use crate::ports::{
    CredentialStorePort, EventStorePort, NewRemoteEvent, ProviderRegistry, RemoteEvent,
};
use crate::services::TokenService;

/// Tunables for sync runs
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Window of remote events considered during pull
    pub window: SyncWindow,
}

/// Which half of a sync run an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    /// Obtaining a usable access token
    Auth,
    /// Local-to-remote writes
    Push,
    /// Remote-to-local merge
    Pull,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Auth => "auth",
            Self::Push => "push",
            Self::Pull => "pull",
        };
        write!(f, "{s}")
    }
}

/// One failed item within an otherwise successful sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItemError {
    /// Where in the run the failure happened
    pub stage: SyncStage,
    /// Local event involved, when known
    pub event_id: Option<EventId>,
    /// Remote identifier involved, when known
    pub external_id: Option<String>,
    /// Human-readable failure description
    pub message: String,
}

/// Outcome of one sync run for one (user, provider) pair
///
/// Item-level failures never abort the run; they are collected here and the
/// run is still reported as completed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Events pushed to the provider
    pub pushed: u32,
    /// Events created or updated locally from the provider
    pub pulled: u32,
    /// Item-level failures
    pub errors: Vec<SyncItemError>,
}

impl SyncReport {
    /// Whether the run completed without any item failures
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, stage: SyncStage, event_id: Option<EventId>, message: String) {
        self.errors.push(SyncItemError {
            stage,
            event_id,
            external_id: None,
            message,
        });
    }
}

/// Outcome of one credential within a sweep over all active credentials
#[derive(Debug)]
pub struct SyncOutcome {
    /// Owning user
    pub user_id: UserId,
    /// Provider synced
    pub provider: Provider,
    /// The run's report; hard failures become a report with one auth error
    pub report: SyncReport,
}

/// Reconciles local events with external calendar providers
///
/// Push happens before pull so locally created events gain their external
/// identifier first and the subsequent pull merges into them instead of
/// duplicating.
pub struct SyncService<C: CredentialStorePort, E: EventStorePort> {
    credentials: Arc<C>,
    events: Arc<E>,
    providers: Arc<ProviderRegistry>,
    tokens: Arc<TokenService<C>>,
    config: SyncConfig,
}

impl<C: CredentialStorePort, E: EventStorePort> SyncService<C, E> {
    /// Create a new sync service
    #[must_use]
    pub fn new(
        credentials: Arc<C>,
        events: Arc<E>,
        providers: Arc<ProviderRegistry>,
        tokens: Arc<TokenService<C>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            credentials,
            events,
            providers,
            tokens,
            config,
        }
    }

    /// Run one push-then-pull cycle for a (user, provider) pair
    ///
    /// # Errors
    ///
    /// Returns an error when the pair has no active credential or no usable
    /// access token. Item-level failures are collected in the report instead.
    #[instrument(skip(self))]
    pub async fn sync_provider(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<SyncReport, ApplicationError> {
        let credential = self
            .credentials
            .get(user_id, provider)
            .await?
            .ok_or_else(|| {
                ApplicationError::NotFound(format!("no {provider} credential for user {user_id}"))
            })?;
        let token = self.tokens.get_valid_access_token(&credential).await?;
        let adapter = self.providers.get(provider)?;

        let mut report = SyncReport::default();

        let pending = self.events.list_pending_push(user_id, provider).await?;
        for event in pending {
            let payload = NewRemoteEvent::from(&event);
            let outcome = match &event.external_id {
                None => adapter.create_event(&token, &payload).await.map(Some),
                Some(ext) => adapter
                    .update_event(&token, ext, &payload)
                    .await
                    .map(|()| None),
            };
            match outcome {
                Ok(created_id) => {
                    let external_id = created_id.or_else(|| event.external_id.clone());
                    let Some(external_id) = external_id else {
                        report.record(
                            SyncStage::Push,
                            Some(event.id),
                            "provider returned no event identifier".to_string(),
                        );
                        continue;
                    };
                    if let Err(err) = self
                        .events
                        .mark_pushed(user_id, &event.id, provider, &external_id, Utc::now())
                        .await
                    {
                        report.record(SyncStage::Push, Some(event.id), err.to_string());
                    } else {
                        report.pushed += 1;
                    }
                }
                Err(err) => {
                    warn!(event_id = %event.id, error = %err, "push failed for event");
                    report.record(SyncStage::Push, Some(event.id), err.to_string());
                }
            }
        }

        let (start, end) = self.config.window.bounds(Utc::now());
        match adapter.list_events(&token, start, end).await {
            Ok(remote_events) => {
                for remote in remote_events {
                    if let Err(err) = self.merge_remote(user_id, provider, &remote, &mut report).await
                    {
                        report.errors.push(SyncItemError {
                            stage: SyncStage::Pull,
                            event_id: None,
                            external_id: Some(remote.external_id.clone()),
                            message: err.to_string(),
                        });
                    }
                }
            }
            Err(err) => {
                warn!(%provider, error = %err, "pull listing failed");
                report.record(SyncStage::Pull, None, err.to_string());
            }
        }

        info!(
            %user_id,
            %provider,
            pushed = report.pushed,
            pulled = report.pulled,
            errors = report.errors.len(),
            "sync run finished"
        );
        Ok(report)
    }

    /// Merge one remote event into the local store (last-write-wins pull)
    async fn merge_remote(
        &self,
        user_id: UserId,
        provider: Provider,
        remote: &RemoteEvent,
        report: &mut SyncReport,
    ) -> Result<(), ApplicationError> {
        let existing = self
            .events
            .get_by_external_id(user_id, provider, &remote.external_id)
            .await?;

        match existing {
            Some(mut local) => {
                if remote_differs(&local, remote) {
                    local.apply_remote(
                        remote.title.clone(),
                        remote.description.clone(),
                        remote.start_time,
                        remote.end_time,
                        remote.location.clone(),
                    );
                    self.events.update(&local).await?;
                    report.pulled += 1;
                }
            }
            None => {
                let mut event = CalendarEvent::new(
                    user_id,
                    remote.title.clone(),
                    remote.start_time,
                    remote.end_time,
                    EventType::Imported,
                )
                .with_external_id(provider, remote.external_id.clone());
                event.description = remote.description.clone();
                event.location = remote.location.clone();
                // Already in sync with the provider; nothing to push back.
                event.last_pushed_at = Some(Utc::now());
                self.events.insert(&event).await?;
                report.pulled += 1;
            }
        }
        Ok(())
    }

    /// Delete an event locally and, best effort, at its provider
    ///
    /// Remote deletion failures are logged and swallowed; a remote leftover
    /// is acceptable, a local leftover is not.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::NotFound`] when the event does not exist
    /// for this user.
    #[instrument(skip(self))]
    pub async fn delete_event(
        &self,
        user_id: UserId,
        event_id: &EventId,
    ) -> Result<(), ApplicationError> {
        let event = self
            .events
            .get(user_id, event_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("event {event_id}")))?;

        if let (Some(provider), Some(external_id)) = (event.provider, &event.external_id) {
            self.try_remote_delete(user_id, provider, external_id).await;
        }

        self.events.delete(user_id, event_id).await?;
        Ok(())
    }

    async fn try_remote_delete(&self, user_id: UserId, provider: Provider, external_id: &str) {
        let credential = match self.credentials.get(user_id, provider).await {
            Ok(Some(c)) if c.is_active => c,
            Ok(_) => return,
            Err(err) => {
                warn!(%provider, error = %err, "credential lookup failed; skipping remote delete");
                return;
            }
        };
        let token = match self.tokens.get_valid_access_token(&credential).await {
            Ok(t) => t,
            Err(err) => {
                warn!(%provider, error = %err, "no usable token; skipping remote delete");
                return;
            }
        };
        let adapter = match self.providers.get(provider) {
            Ok(a) => a,
            Err(err) => {
                warn!(%provider, error = %err, "skipping remote delete");
                return;
            }
        };
        if let Err(err) = adapter.delete_event(&token, external_id).await {
            warn!(%provider, external_id, error = %err, "remote delete failed; leaving remote copy");
        }
    }

    /// Sync every active credential across all users
    ///
    /// Per-credential hard failures (expired refresh token, missing adapter)
    /// are folded into that credential's report so one broken connection
    /// never stops the sweep.
    ///
    /// # Errors
    ///
    /// Returns an error only when the active credential listing itself fails.
    #[instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<Vec<SyncOutcome>, ApplicationError> {
        let credentials = self.credentials.list_active().await?;
        let mut outcomes = Vec::with_capacity(credentials.len());

        for credential in credentials {
            let report = match self
                .sync_provider(credential.user_id, credential.provider)
                .await
            {
                Ok(report) => report,
                Err(err) => {
                    warn!(
                        user_id = %credential.user_id,
                        provider = %credential.provider,
                        error = %err,
                        "sync run failed"
                    );
                    let mut report = SyncReport::default();
                    report.record(SyncStage::Auth, None, err.to_string());
                    report
                }
            };
            outcomes.push(SyncOutcome {
                user_id: credential.user_id,
                provider: credential.provider,
                report,
            });
        }

        Ok(outcomes)
    }
}

fn remote_differs(local: &CalendarEvent, remote: &RemoteEvent) -> bool {
    local.title != remote.title
        || local.description != remote.description
        || local.start_time != remote.start_time
        || local.end_time != remote.end_time
        || local.location != remote.location
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use domain::entities::Credential;
    use mockall::predicate::{always, eq};

    use super::*;
    use crate::ports::{
        MockCredentialStorePort, MockEventStorePort, MockProviderPort, ProviderError, TokenGrant,
    };
    use crate::services::TokenConfig;

    fn active_credential(user_id: UserId) -> Credential {
        Credential::new(
            user_id,
            Provider::Google,
            "access-1",
            "refresh-1",
            Utc::now() + Duration::hours(1),
        )
    }

    fn local_event(user_id: UserId, title: &str) -> CalendarEvent {
        let start = Utc::now() + Duration::days(3);
        CalendarEvent::new(
            user_id,
            title,
            start,
            start + Duration::hours(1),
            EventType::Deadline,
        )
    }

    fn remote_event(external_id: &str, title: &str) -> RemoteEvent {
        let start = Utc::now() + Duration::days(5);
        RemoteEvent {
            external_id: external_id.to_string(),
            title: title.to_string(),
            description: None,
            start_time: start,
            end_time: start + Duration::hours(1),
            location: None,
        }
    }

    fn service(
        credentials: MockCredentialStorePort,
        events: MockEventStorePort,
        provider: MockProviderPort,
    ) -> SyncService<MockCredentialStorePort, MockEventStorePort> {
        let credentials = Arc::new(credentials);
        let registry = Arc::new(
            ProviderRegistry::new().with_adapter(Provider::Google, Arc::new(provider)),
        );
        let tokens = Arc::new(TokenService::new(
            Arc::clone(&credentials),
            Arc::clone(&registry),
            TokenConfig::default(),
        ));
        SyncService::new(
            credentials,
            Arc::new(events),
            registry,
            tokens,
            SyncConfig::default(),
        )
    }

    #[tokio::test]
    async fn push_creates_unpushed_events_and_records_external_id() {
        let user_id = UserId::new();
        let event = local_event(user_id, "Closing");
        let event_id = event.id;

        let mut credentials = MockCredentialStorePort::new();
        credentials
            .expect_get()
            .returning(move |_, _| Ok(Some(active_credential(user_id))));

        let mut events = MockEventStorePort::new();
        events
            .expect_list_pending_push()
            .returning(move |_, _| Ok(vec![event.clone()]));
        events
            .expect_mark_pushed()
            .with(
                eq(user_id),
                eq(event_id),
                eq(Provider::Google),
                eq("ext-created"),
                always(),
            )
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));

        let mut provider = MockProviderPort::new();
        provider
            .expect_create_event()
            .times(1)
            .returning(|_, _| Ok("ext-created".to_string()));
        provider.expect_list_events().returning(|_, _, _| Ok(vec![]));

        let report = service(credentials, events, provider)
            .sync_provider(user_id, Provider::Google)
            .await
            .unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.pulled, 0);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn partial_push_failure_keeps_going() {
        // Three pending events; the second create fails. The other two land
        // and the failure is reported, not raised.
        let user_id = UserId::new();
        let pending = vec![
            local_event(user_id, "one"),
            local_event(user_id, "two"),
            local_event(user_id, "three"),
        ];
        let failing_id = pending[1].id;

        let mut credentials = MockCredentialStorePort::new();
        credentials
            .expect_get()
            .returning(move |_, _| Ok(Some(active_credential(user_id))));

        let mut events = MockEventStorePort::new();
        let batch = pending.clone();
        events
            .expect_list_pending_push()
            .returning(move |_, _| Ok(batch.clone()));
        events
            .expect_mark_pushed()
            .times(2)
            .returning(|_, _, _, _, _| Ok(()));

        let mut provider = MockProviderPort::new();
        provider.expect_create_event().returning(|_, payload| {
            if payload.title == "two" {
                Err(ProviderError::Transient("503".to_string()))
            } else {
                Ok(format!("ext-{}", payload.title))
            }
        });
        provider.expect_list_events().returning(|_, _, _| Ok(vec![]));

        let report = service(credentials, events, provider)
            .sync_provider(user_id, Provider::Google)
            .await
            .unwrap();
        assert_eq!(report.pushed, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].stage, SyncStage::Push);
        assert_eq!(report.errors[0].event_id, Some(failing_id));
    }

    #[tokio::test]
    async fn pull_inserts_unknown_remote_events_as_imported() {
        let user_id = UserId::new();

        let mut credentials = MockCredentialStorePort::new();
        credentials
            .expect_get()
            .returning(move |_, _| Ok(Some(active_credential(user_id))));

        let mut events = MockEventStorePort::new();
        events
            .expect_list_pending_push()
            .returning(|_, _| Ok(vec![]));
        events
            .expect_get_by_external_id()
            .with(eq(user_id), eq(Provider::Google), eq("ext-9"))
            .returning(|_, _, _| Ok(None));
        events
            .expect_insert()
            .withf(|e| {
                e.event_type == EventType::Imported
                    && e.external_id.as_deref() == Some("ext-9")
                    && !e.needs_push()
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut provider = MockProviderPort::new();
        provider
            .expect_list_events()
            .returning(|_, _, _| Ok(vec![remote_event("ext-9", "Team standup")]));

        let report = service(credentials, events, provider)
            .sync_provider(user_id, Provider::Google)
            .await
            .unwrap();
        assert_eq!(report.pulled, 1);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn pull_overwrites_changed_local_copy() {
        let user_id = UserId::new();
        let mut local = local_event(user_id, "Old title");
        local.mark_pushed(Provider::Google, "ext-9", Utc::now());

        let mut credentials = MockCredentialStorePort::new();
        credentials
            .expect_get()
            .returning(move |_, _| Ok(Some(active_credential(user_id))));

        let mut events = MockEventStorePort::new();
        events
            .expect_list_pending_push()
            .returning(|_, _| Ok(vec![]));
        let stored = local.clone();
        events
            .expect_get_by_external_id()
            .returning(move |_, _, _| Ok(Some(stored.clone())));
        events
            .expect_update()
            .withf(|e| e.title == "New title" && !e.needs_push())
            .times(1)
            .returning(|_| Ok(()));

        let mut provider = MockProviderPort::new();
        provider
            .expect_list_events()
            .returning(|_, _, _| Ok(vec![remote_event("ext-9", "New title")]));

        let report = service(credentials, events, provider)
            .sync_provider(user_id, Provider::Google)
            .await
            .unwrap();
        assert_eq!(report.pulled, 1);
    }

    #[tokio::test]
    async fn second_sync_of_unchanged_state_writes_nothing() {
        let user_id = UserId::new();
        let remote = remote_event("ext-9", "Stable");
        let mut local = local_event(user_id, "Stable");
        local.apply_remote(
            remote.title.clone(),
            remote.description.clone(),
            remote.start_time,
            remote.end_time,
            remote.location.clone(),
        );
        local.mark_pushed(Provider::Google, "ext-9", Utc::now());

        let mut credentials = MockCredentialStorePort::new();
        credentials
            .expect_get()
            .returning(move |_, _| Ok(Some(active_credential(user_id))));

        let mut events = MockEventStorePort::new();
        events
            .expect_list_pending_push()
            .returning(|_, _| Ok(vec![]));
        let stored = local.clone();
        events
            .expect_get_by_external_id()
            .returning(move |_, _, _| Ok(Some(stored.clone())));
        // No insert/update expectations: any write would fail the test.

        let mut provider = MockProviderPort::new();
        let listed = remote.clone();
        provider
            .expect_list_events()
            .returning(move |_, _, _| Ok(vec![listed.clone()]));

        let report = service(credentials, events, provider)
            .sync_provider(user_id, Provider::Google)
            .await
            .unwrap();
        assert_eq!(report.pushed, 0);
        assert_eq!(report.pulled, 0);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn missing_credential_is_not_found() {
        let mut credentials = MockCredentialStorePort::new();
        credentials.expect_get().returning(|_, _| Ok(None));

        let err = service(credentials, MockEventStorePort::new(), MockProviderPort::new())
            .sync_provider(UserId::new(), Provider::Google)
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound(_)));
    }

    #[tokio::test]
    async fn pull_listing_failure_is_reported_not_raised() {
        let user_id = UserId::new();

        let mut credentials = MockCredentialStorePort::new();
        credentials
            .expect_get()
            .returning(move |_, _| Ok(Some(active_credential(user_id))));

        let mut events = MockEventStorePort::new();
        events
            .expect_list_pending_push()
            .returning(|_, _| Ok(vec![]));

        let mut provider = MockProviderPort::new();
        provider
            .expect_list_events()
            .returning(|_, _, _| Err(ProviderError::RateLimited));

        let report = service(credentials, events, provider)
            .sync_provider(user_id, Provider::Google)
            .await
            .unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].stage, SyncStage::Pull);
    }

    #[tokio::test]
    async fn delete_event_removes_local_even_when_remote_fails() {
        let user_id = UserId::new();
        let mut event = local_event(user_id, "Doomed");
        event.mark_pushed(Provider::Google, "ext-1", Utc::now());
        let event_id = event.id;

        let mut credentials = MockCredentialStorePort::new();
        credentials
            .expect_get()
            .returning(move |_, _| Ok(Some(active_credential(user_id))));

        let mut events = MockEventStorePort::new();
        let stored = event.clone();
        events
            .expect_get()
            .returning(move |_, _| Ok(Some(stored.clone())));
        events
            .expect_delete()
            .with(eq(user_id), eq(event_id))
            .times(1)
            .returning(|_, _| Ok(true));

        let mut provider = MockProviderPort::new();
        provider
            .expect_delete_event()
            .returning(|_, _| Err(ProviderError::Transient("offline".to_string())));

        service(credentials, events, provider)
            .delete_event(user_id, &event_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_unsynced_event_skips_provider() {
        let user_id = UserId::new();
        let event = local_event(user_id, "Local only");
        let event_id = event.id;

        let mut events = MockEventStorePort::new();
        let stored = event.clone();
        events
            .expect_get()
            .returning(move |_, _| Ok(Some(stored.clone())));
        events.expect_delete().returning(|_, _| Ok(true));

        service(
            MockCredentialStorePort::new(),
            events,
            MockProviderPort::new(),
        )
        .delete_event(user_id, &event_id)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn sweep_folds_hard_failures_into_reports() {
        let user_id = UserId::new();
        let mut broken = active_credential(user_id);
        broken.expires_at = Utc::now() - Duration::hours(1);

        let mut credentials = MockCredentialStorePort::new();
        let listed = broken.clone();
        credentials
            .expect_list_active()
            .returning(move || Ok(vec![listed.clone()]));
        let fetched = broken.clone();
        credentials
            .expect_get()
            .returning(move |_, _| Ok(Some(fetched.clone())));
        credentials
            .expect_get_by_id()
            .returning(move |_| Ok(Some(broken.clone())));

        let mut provider = MockProviderPort::new();
        provider
            .expect_refresh_token()
            .returning(|_| Err(ProviderError::Credential("invalid_grant".to_string())));

        let outcomes = service(credentials, MockEventStorePort::new(), provider)
            .sync_all()
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].report.errors.len(), 1);
        assert_eq!(outcomes[0].report.errors[0].stage, SyncStage::Auth);
    }
}
