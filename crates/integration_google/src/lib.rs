//! Google Calendar integration
//!
//! Implements the provider port over the Google Calendar v3 REST API and
//! Google's OAuth 2.0 token endpoint.

mod client;

pub use client::{GoogleCalendarClient, GoogleConfig};
