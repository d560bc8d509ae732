//! Outlook calendar integration
//!
//! Implements the provider port over the Microsoft Graph calendar API and
//! the Microsoft identity platform token endpoint.

mod client;

pub use client::{OutlookCalendarClient, OutlookConfig};
