//! Port definitions for application layer
//!
//! Ports are interfaces that define how the application interacts with
//! external systems. Adapters in the infrastructure and integration layers
//! implement these ports.

mod credential_store;
mod event_store;
mod notifier_port;
mod provider_port;
mod registry;
mod reminder_store;

pub use credential_store::CredentialStorePort;
#[cfg(test)]
pub use credential_store::MockCredentialStorePort;
pub use event_store::EventStorePort;
#[cfg(test)]
pub use event_store::MockEventStorePort;
#[cfg(test)]
pub use notifier_port::MockNotifierPort;
pub use notifier_port::NotifierPort;
#[cfg(test)]
pub use provider_port::MockProviderPort;
pub use provider_port::{
    AccountIdentity, NewRemoteEvent, ProviderError, ProviderPort, RemoteEvent, TokenGrant,
};
pub use registry::ProviderRegistry;
#[cfg(test)]
pub use reminder_store::MockReminderStorePort;
pub use reminder_store::ReminderStorePort;
