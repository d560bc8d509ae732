//! Application services
//!
//! Services orchestrate domain entities through ports. They hold no I/O of
//! their own; adapters are injected behind the port traits.

mod dispatch_service;
mod projection_service;
mod sync_service;
mod token_service;

pub use dispatch_service::{DispatchError, DispatchReport, DispatchService};
pub use projection_service::{ProjectionConfig, ProjectionService};
pub use sync_service::{
    SyncConfig, SyncItemError, SyncOutcome, SyncReport, SyncService, SyncStage,
};
pub use token_service::{TokenConfig, TokenService};
