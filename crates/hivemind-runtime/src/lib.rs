//! Execution bridge and process shutdown for Hivemind.
//!
//! The [`ExecutionBridge`] routes each unit of work to exactly one execution
//! path (the delegated service, an interactive CLI hand-off, or an explicitly
//! opted-in simulation) and reports which path produced the result. The
//! [`ShutdownController`] runs registered cleanup once on signal, fault or
//! completion and guarantees the process exits within a bounded time.
//!
//! # Main types
//!
//! - [`ExecutionBridge`]: Routing, timeout and registry of in-flight executions.
//! - [`ExecutionBackend`]: Trait implemented by every execution path.
//! - [`ExecutionEnvironment`]: Interactive vs. automation context detection.
//! - [`ShutdownController`]: Exactly-once, bounded-time cleanup and exit.

/// Execution paths.
pub mod backends;
/// The execution bridge.
pub mod bridge;
/// Bridge and shutdown configuration.
pub mod config;
/// Execution context detection.
pub mod environment;
/// In-flight execution registry.
pub mod registry;
/// Shutdown controller.
pub mod shutdown;

pub use backends::{
    BackendOutput, DelegatedBackend, ExecutionBackend, InteractiveBackend, SimulatedBackend,
    WorkUnit,
};
pub use bridge::{ExecutionBridge, ExecutionReport, ExecutionRequest};
pub use config::{BridgeConfig, ShutdownConfig};
pub use environment::ExecutionEnvironment;
pub use registry::{ExecutionInfo, ExecutionRegistry};
pub use shutdown::{ExitHook, ShutdownController, ShutdownOutcome, ShutdownReason, ShutdownState};
