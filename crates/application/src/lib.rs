//! Application layer - use cases and ports
//!
//! Orchestrates calendar sync, reminder dispatch, and record projection over
//! the domain layer. External systems (providers, storage, notification
//! channels) are reached exclusively through the port traits in [`ports`];
//! infrastructure and integration crates supply the adapters.

pub mod error;
pub mod ports;
pub mod services;

pub use error::ApplicationError;
