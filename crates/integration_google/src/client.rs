//! Google Calendar client
//!
//! HTTP client for the Google Calendar v3 API and Google's OAuth token
//! endpoint. Failures are normalized into [`ProviderError`] so the sync
//! layer stays provider-agnostic.

use application::ports::{
    AccountIdentity, NewRemoteEvent, ProviderError, ProviderPort, RemoteEvent, TokenGrant,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Google Calendar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// OAuth client identifier
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Redirect URI registered for the OAuth flow
    pub redirect_uri: String,

    /// Calendar to sync against (default: "primary")
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,

    /// OAuth token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Calendar API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Userinfo endpoint for account identification
    #[serde(default = "default_userinfo_url")]
    pub userinfo_url: String,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_api_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_userinfo_url() -> String {
    "https://www.googleapis.com/oauth2/v2/userinfo".to_string()
}

const fn default_timeout() -> u64 {
    30
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

const fn default_expires_in() -> i64 {
    3600
}

/// OAuth error body ({"error": "invalid_grant", ...})
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Event timestamp: timed events carry `dateTime`, all-day events `date`
#[derive(Debug, Default, Serialize, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
}

impl EventTime {
    fn timed(at: DateTime<Utc>) -> Self {
        Self {
            date_time: Some(at.to_rfc3339()),
            date: None,
        }
    }

    /// All-day events resolve to midnight UTC
    fn resolve(&self) -> Option<DateTime<Utc>> {
        if let Some(dt) = &self.date_time {
            return DateTime::parse_from_rfc3339(dt)
                .ok()
                .map(|t| t.with_timezone(&Utc));
        }
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
    }
}

/// An event resource as the Calendar API returns it
#[derive(Debug, Deserialize)]
struct GoogleEvent {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    start: Option<EventTime>,
    #[serde(default)]
    end: Option<EventTime>,
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    #[serde(rename = "nextPageToken", default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct EventPayload {
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    start: EventTime,
    end: EventTime,
}

impl From<&NewRemoteEvent> for EventPayload {
    fn from(event: &NewRemoteEvent) -> Self {
        Self {
            summary: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start: EventTime::timed(event.start_time),
            end: EventTime::timed(event.end_time),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: String,
    #[serde(default)]
    name: Option<String>,
}

/// Google Calendar HTTP client
#[derive(Debug)]
pub struct GoogleCalendarClient {
    client: Client,
    config: GoogleConfig,
}

impl GoogleCalendarClient {
    /// Create a new client with the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(config: GoogleConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.config.api_base_url, self.config.calendar_id
        )
    }

    /// POST to the token endpoint and parse the grant
    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant, ProviderError> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_token_failure(status, &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in_secs: token.expires_in,
        })
    }

    /// Turn a non-success API response into a `ProviderError`
    async fn api_failure(response: Response) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_api_failure(status, &body)
    }
}

/// Map OAuth endpoint failures
///
/// Google reports revoked or expired grants as HTTP 400 with
/// `"error": "invalid_grant"` in the body.
fn classify_token_failure(status: StatusCode, body: &str) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ProviderError::RateLimited;
    }
    if status.is_server_error() {
        return ProviderError::Transient(format!("token endpoint returned HTTP {status}"));
    }

    if let Ok(oauth) = serde_json::from_str::<OAuthErrorBody>(body) {
        let detail = oauth.error_description.unwrap_or_else(|| oauth.error.clone());
        if oauth.error == "invalid_grant" || oauth.error == "invalid_client" {
            return ProviderError::Credential(detail);
        }
        return ProviderError::InvalidResponse(detail);
    }

    ProviderError::InvalidResponse(format!("token endpoint returned HTTP {status}"))
}

/// Map Calendar API failures
fn classify_api_failure(status: StatusCode, body: &str) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Credential(format!("HTTP {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            ProviderError::EventNotFound(format!("HTTP {status}"))
        }
        s if s.is_server_error() => ProviderError::Transient(format!("HTTP {status}")),
        _ => ProviderError::InvalidResponse(format!("HTTP {status}: {body}")),
    }
}

/// Map an event resource into the provider-neutral shape
///
/// Cancelled events and events without a resolvable time are skipped.
fn map_event(event: GoogleEvent) -> Option<RemoteEvent> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let start_time = event.start.as_ref().and_then(EventTime::resolve);
    let end_time = event.end.as_ref().and_then(EventTime::resolve);
    let (Some(start_time), Some(end_time)) = (start_time, end_time) else {
        warn!(event_id = %event.id, "skipping event without resolvable times");
        return None;
    };

    Some(RemoteEvent {
        external_id: event.id,
        title: event.summary.unwrap_or_else(|| "(no title)".to_string()),
        description: event.description,
        start_time,
        end_time,
        location: event.location,
    })
}

#[async_trait]
impl ProviderPort for GoogleCalendarClient {
    #[instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        debug!("Exchanging authorization code");
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
            ("redirect_uri", &self.config.redirect_uri),
        ])
        .await
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        debug!("Refreshing access token");
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
        ])
        .await
    }

    #[instrument(skip(self, access_token))]
    async fn list_events(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>, ProviderError> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeMin", start.to_rfc3339()),
                ("timeMax", end.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("maxResults", "2500".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .client
                .get(self.events_url())
                .bearer_auth(access_token)
                .query(&query)
                .send()
                .await
                .map_err(|e| ProviderError::Transient(e.to_string()))?;

            if !response.status().is_success() {
                return Err(Self::api_failure(response).await);
            }

            let page: EventListResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

            events.extend(page.items.into_iter().filter_map(map_event));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = events.len(), "Listed remote events");
        Ok(events)
    }

    #[instrument(skip(self, access_token, event))]
    async fn create_event(
        &self,
        access_token: &str,
        event: &NewRemoteEvent,
    ) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.events_url())
            .bearer_auth(access_token)
            .json(&EventPayload::from(event))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::api_failure(response).await);
        }

        let created: CreatedEvent = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        debug!(external_id = %created.id, "Created remote event");
        Ok(created.id)
    }

    #[instrument(skip(self, access_token, event))]
    async fn update_event(
        &self,
        access_token: &str,
        external_id: &str,
        event: &NewRemoteEvent,
    ) -> Result<(), ProviderError> {
        let response = self
            .client
            .put(format!("{}/{external_id}", self.events_url()))
            .bearer_auth(access_token)
            .json(&EventPayload::from(event))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::api_failure(response).await);
        }

        debug!("Updated remote event");
        Ok(())
    }

    #[instrument(skip(self, access_token))]
    async fn delete_event(
        &self,
        access_token: &str,
        external_id: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(format!("{}/{external_id}", self.events_url()))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = response.status();
        // Already-deleted events count as success; deletes stay retryable.
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            debug!("Remote event already gone");
            return Ok(());
        }
        if !status.is_success() {
            return Err(Self::api_failure(response).await);
        }

        debug!("Deleted remote event");
        Ok(())
    }

    #[instrument(skip(self, access_token))]
    async fn account_identity(
        &self,
        access_token: &str,
    ) -> Result<AccountIdentity, ProviderError> {
        let response = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::api_failure(response).await);
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(AccountIdentity {
            account_id: info.email,
            display_name: info.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GoogleConfig {
        GoogleConfig {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://app.example.com/oauth/google".to_string(),
            calendar_id: default_calendar_id(),
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
            userinfo_url: default_userinfo_url(),
            timeout_secs: default_timeout(),
        }
    }

    #[test]
    fn config_defaults_from_partial_json() {
        let parsed: GoogleConfig = serde_json::from_str(
            r#"{"client_id":"a","client_secret":"b","redirect_uri":"https://x/cb"}"#,
        )
        .unwrap();
        assert_eq!(parsed.calendar_id, "primary");
        assert!(parsed.token_url.contains("oauth2.googleapis.com"));
        assert_eq!(parsed.timeout_secs, 30);
    }

    #[test]
    fn events_url_embeds_calendar_id() {
        let client = GoogleCalendarClient::new(GoogleConfig {
            calendar_id: "work".to_string(),
            ..config()
        })
        .unwrap();
        assert!(client.events_url().ends_with("/calendars/work/events"));
    }

    #[test]
    fn invalid_grant_classified_as_credential() {
        let err = classify_token_failure(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Token has been revoked"}"#,
        );
        assert!(matches!(err, ProviderError::Credential(_)));
    }

    #[test]
    fn token_server_errors_are_transient() {
        let err = classify_token_failure(StatusCode::BAD_GATEWAY, "");
        assert!(err.is_transient());
        let err = classify_token_failure(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, ProviderError::RateLimited));
    }

    #[test]
    fn api_status_classification() {
        assert!(classify_api_failure(StatusCode::UNAUTHORIZED, "").is_credential());
        assert!(matches!(
            classify_api_failure(StatusCode::NOT_FOUND, ""),
            ProviderError::EventNotFound(_)
        ));
        assert!(classify_api_failure(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
    }

    #[test]
    fn cancelled_events_are_skipped() {
        let event = GoogleEvent {
            id: "e1".to_string(),
            status: Some("cancelled".to_string()),
            summary: None,
            description: None,
            location: None,
            start: None,
            end: None,
        };
        assert!(map_event(event).is_none());
    }

    #[test]
    fn all_day_events_resolve_to_midnight_utc() {
        let time = EventTime {
            date_time: None,
            date: Some("2026-09-01".to_string()),
        };
        let resolved = time.resolve().unwrap();
        assert_eq!(resolved.to_rfc3339(), "2026-09-01T00:00:00+00:00");
    }

    #[test]
    fn timed_events_keep_their_offset() {
        let time = EventTime {
            date_time: Some("2026-09-01T10:00:00-04:00".to_string()),
            date: None,
        };
        let resolved = time.resolve().unwrap();
        assert_eq!(resolved.to_rfc3339(), "2026-09-01T14:00:00+00:00");
    }

    #[test]
    fn untitled_events_get_placeholder() {
        let event = GoogleEvent {
            id: "e2".to_string(),
            status: Some("confirmed".to_string()),
            summary: None,
            description: None,
            location: None,
            start: Some(EventTime {
                date_time: Some("2026-09-01T10:00:00Z".to_string()),
                date: None,
            }),
            end: Some(EventTime {
                date_time: Some("2026-09-01T11:00:00Z".to_string()),
                date: None,
            }),
        };
        let mapped = map_event(event).unwrap();
        assert_eq!(mapped.title, "(no title)");
        assert_eq!(mapped.external_id, "e2");
    }
}
