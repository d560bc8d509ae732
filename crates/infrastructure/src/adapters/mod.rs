//! Outbound adapters

pub mod log_notifier;

pub use log_notifier::LogNotifier;
