//! Calendar provider OAuth/API configuration

use serde::{Deserialize, Serialize};

/// Google Calendar connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleAppConfig {
    /// OAuth client identifier
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Redirect URI registered with the OAuth client
    pub redirect_uri: String,

    /// Calendar to sync against
    #[serde(default = "default_google_calendar")]
    pub calendar_id: String,

    /// OAuth token endpoint (overridable for testing)
    #[serde(default = "default_google_token_url")]
    pub token_url: String,

    /// Calendar API base URL (overridable for testing)
    #[serde(default = "default_google_api_base")]
    pub api_base_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_google_calendar() -> String {
    "primary".to_string()
}

fn default_google_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_google_api_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

/// Outlook (Microsoft Graph) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlookAppConfig {
    /// OAuth client identifier
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Redirect URI registered with the OAuth client
    pub redirect_uri: String,

    /// OAuth token endpoint (overridable for testing)
    #[serde(default = "default_outlook_token_url")]
    pub token_url: String,

    /// Graph API base URL (overridable for testing)
    #[serde(default = "default_outlook_api_base")]
    pub api_base_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_outlook_token_url() -> String {
    "https://login.microsoftonline.com/common/oauth2/v2.0/token".to_string()
}

fn default_outlook_api_base() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}
