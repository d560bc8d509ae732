//! Value objects - Immutable domain primitives

mod credential_id;
mod event_id;
mod provider;
mod reminder_id;
mod sync_window;
mod user_id;

pub use credential_id::CredentialId;
pub use event_id::EventId;
pub use provider::Provider;
pub use reminder_id::ReminderId;
pub use sync_window::SyncWindow;
pub use user_id::UserId;
