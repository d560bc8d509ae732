//! Outlook calendar client
//!
//! HTTP client for the Microsoft Graph calendar endpoints and the
//! Microsoft identity platform token endpoint. Graph reports event times
//! as naive datetimes paired with a timezone name; this client requests
//! and writes everything in UTC.

use application::ports::{
    AccountIdentity, NewRemoteEvent, ProviderError, ProviderPort, RemoteEvent, TokenGrant,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Outlook calendar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlookConfig {
    /// OAuth client identifier
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Redirect URI registered for the OAuth flow
    pub redirect_uri: String,

    /// OAuth token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Microsoft Graph base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_token_url() -> String {
    "https://login.microsoftonline.com/common/oauth2/v2.0/token".to_string()
}

fn default_api_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

const fn default_timeout() -> u64 {
    30
}

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

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Graph datetime: naive timestamp plus a timezone name
#[derive(Debug, Serialize, Deserialize)]
struct GraphDateTime {
    #[serde(rename = "dateTime")]
    date_time: String,
    #[serde(rename = "timeZone", default)]
    time_zone: Option<String>,
}

impl GraphDateTime {
    fn utc(at: DateTime<Utc>) -> Self {
        Self {
            date_time: at.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            time_zone: Some("UTC".to_string()),
        }
    }

    /// Resolve to UTC; only UTC payloads are expected since every request
    /// asks Graph for UTC via the `Prefer` header.
    fn resolve(&self) -> Option<DateTime<Utc>> {
        if let Some(zone) = &self.time_zone {
            if !zone.eq_ignore_ascii_case("utc") {
                warn!(zone = %zone, "unexpected timezone in Graph response");
            }
        }
        let naive = NaiveDateTime::parse_from_str(&self.date_time, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(&self.date_time, "%Y-%m-%dT%H:%M:%S"))
            .ok()?;
        Some(Utc.from_utc_datetime(&naive))
    }
}

#[derive(Debug, Deserialize)]
struct GraphEvent {
    id: String,
    #[serde(rename = "isCancelled", default)]
    is_cancelled: bool,
    #[serde(default)]
    subject: Option<String>,
    #[serde(rename = "bodyPreview", default)]
    body_preview: Option<String>,
    #[serde(default)]
    location: Option<GraphLocation>,
    #[serde(default)]
    start: Option<GraphDateTime>,
    #[serde(default)]
    end: Option<GraphDateTime>,
}

#[derive(Debug, Deserialize)]
struct GraphLocation {
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    value: Vec<GraphEvent>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Serialize)]
struct EventPayload {
    subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<GraphBody>,
    start: GraphDateTime,
    end: GraphDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<GraphLocationPayload>,
}

#[derive(Debug, Serialize)]
struct GraphBody {
    #[serde(rename = "contentType")]
    content_type: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct GraphLocationPayload {
    #[serde(rename = "displayName")]
    display_name: String,
}

impl From<&NewRemoteEvent> for EventPayload {
    fn from(event: &NewRemoteEvent) -> Self {
        Self {
            subject: event.title.clone(),
            body: event.description.clone().map(|content| GraphBody {
                content_type: "text",
                content,
            }),
            start: GraphDateTime::utc(event.start_time),
            end: GraphDateTime::utc(event.end_time),
            location: event
                .location
                .clone()
                .map(|display_name| GraphLocationPayload { display_name }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphUser {
    #[serde(rename = "userPrincipalName", default)]
    user_principal_name: Option<String>,
    #[serde(default)]
    mail: Option<String>,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
}

/// Outlook calendar HTTP client
#[derive(Debug)]
pub struct OutlookCalendarClient {
    client: Client,
    config: OutlookConfig,
}

impl OutlookCalendarClient {
    /// Create a new client with the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(config: OutlookConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn events_url(&self) -> String {
        format!("{}/me/events", self.config.api_base_url)
    }

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

    async fn api_failure(response: Response) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_api_failure(status, &body)
    }
}

/// Map identity platform failures
///
/// Revoked or expired grants come back as HTTP 400 with
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

/// Map Graph API failures
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

fn map_event(event: GraphEvent) -> Option<RemoteEvent> {
    if event.is_cancelled {
        return None;
    }

    let start_time = event.start.as_ref().and_then(GraphDateTime::resolve);
    let end_time = event.end.as_ref().and_then(GraphDateTime::resolve);
    let (Some(start_time), Some(end_time)) = (start_time, end_time) else {
        warn!(event_id = %event.id, "skipping event without resolvable times");
        return None;
    };

    Some(RemoteEvent {
        external_id: event.id,
        title: event.subject.unwrap_or_else(|| "(no subject)".to_string()),
        description: event.body_preview.filter(|s| !s.is_empty()),
        start_time,
        end_time,
        location: event
            .location
            .and_then(|l| l.display_name)
            .filter(|s| !s.is_empty()),
    })
}

#[async_trait]
impl ProviderPort for OutlookCalendarClient {
    #[instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        debug!("Exchanging authorization code");
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
            ("redirect_uri", &self.config.redirect_uri),
            ("scope", "offline_access Calendars.ReadWrite User.Read"),
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
        let first_url = format!("{}/me/calendarview", self.config.api_base_url);
        let mut next: Option<String> = None;

        loop {
            let mut request = match &next {
                // nextLink is a complete URL including the original query
                Some(link) => self.client.get(link),
                None => self.client.get(&first_url).query(&[
                    ("startDateTime", start.to_rfc3339()),
                    ("endDateTime", end.to_rfc3339()),
                    ("$top", "200".to_string()),
                ]),
            };
            request = request
                .bearer_auth(access_token)
                .header("Prefer", "outlook.timezone=\"UTC\"");

            let response = request
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

            events.extend(page.value.into_iter().filter_map(map_event));

            match page.next_link {
                Some(link) => next = Some(link),
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
            .patch(format!("{}/{external_id}", self.events_url()))
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
            .get(format!("{}/me", self.config.api_base_url))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::api_failure(response).await);
        }

        let user: GraphUser = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let account_id = user
            .mail
            .or(user.user_principal_name)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("user profile has no address".to_string())
            })?;

        Ok(AccountIdentity {
            account_id,
            display_name: user.display_name,
        })
    }
}
