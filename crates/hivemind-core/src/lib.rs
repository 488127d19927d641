//! Core types shared by every Hivemind crate.
//!
//! This crate provides the unified error enum used across the coordinator,
//! the execution bridge and the shutdown controller, plus the typed
//! publish/subscribe bus over which swarm lifecycle events are delivered.
//!
//! # Main types
//!
//! - [`HivemindError`]: Unified error enum for all Hivemind subsystems.
//! - [`HivemindResult`]: Convenience alias for `Result<T, HivemindError>`.
//! - [`EventBus`]: Broadcast bus for lifecycle events.
//! - [`EventTopic`]: Closed set of event topics (`swarm.created`, `task.failed`, ...).
//! - [`SwarmEvent`]: A single emitted event with its payload.

/// Error taxonomy.
pub mod error;
/// Lifecycle event bus.
pub mod event;
/// Panic scoping for units of work.
pub mod fault;

pub use error::{EntityKind, HivemindError, HivemindResult};
pub use event::{EventBus, EventBusError, EventReceiver, EventTopic, SwarmEvent, SwarmEventReceiver};
