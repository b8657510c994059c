//! Optimistic mutation of cached remote entities.
//!
//! A mutation moves through `Idle -> Applied -> Committed`, or
//! `Applied -> RolledBack` when the remote write fails. The `Coordinator` is
//! the only writer of managed resources, so reactive state and the cache entry
//! never disagree for longer than one synchronous step.

pub mod coordinator;
pub mod error;
pub mod resource;

pub use coordinator::{Committed, Coordinator, LoadSource, MutationPhase, Pending};
pub use error::MutationError;
pub use resource::ManagedResource;
