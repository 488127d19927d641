//! Swarm, agent and task lifecycle coordination.
//!
//! A swarm decomposes one objective into tasks according to a strategy,
//! spawns a typed roster of agents, matches tasks to agents by capability
//! and drives each task through execution via a pluggable [`TaskExecutor`].
//!
//! # Main types
//!
//! - [`SwarmCoordinator`]: Owns every swarm and exposes the lifecycle operations.
//! - [`Swarm`]: Aggregate of one objective with its agents and tasks.
//! - [`AgentPool`]: Per-swarm agent registry with capability matching.
//! - [`TaskGraph`]: Per-swarm task store with validated status transitions.
//! - [`Strategy`]: Objective decomposition and initial roster policy.
//! - [`TaskExecutor`]: Seam through which tasks are actually performed.

/// Per-swarm agent registry and matching.
pub mod agent_pool;
/// Capability taxonomy.
pub mod capability;
/// Coordinator configuration.
pub mod config;
/// The swarm coordinator.
pub mod coordinator;
/// Task execution seam.
pub mod executor;
/// Host resource sampling and threshold checks.
pub mod monitor;
/// Decomposition strategies.
pub mod strategy;
/// The swarm aggregate.
pub mod swarm;
/// Per-swarm task store.
pub mod task_graph;
/// Shared swarm, agent and task types.
pub mod types;

pub use agent_pool::{AgentPool, MatchingPolicy};
pub use capability::{Capability, CapabilitySet};
pub use config::{CoordinatorConfig, ResourceThresholds};
pub use coordinator::{SwarmCoordinator, SwarmOptions};
pub use executor::{TaskExecutor, TaskOutput};
pub use monitor::{check_thresholds, ResourceProbe, ResourceSample, SystemProbe, ThresholdBreach};
pub use strategy::Strategy;
pub use swarm::Swarm;
pub use task_graph::TaskGraph;
pub use types::{
    Agent, AgentId, AgentSpec, AgentStatus, AgentType, ExecutionOrigin, LogEntry, LogLevel,
    SwarmContext, SwarmMetrics, SwarmResults, SwarmStatus, SwarmSummary, Task, TaskDefinition,
    TaskError, TaskErrorKind, TaskId, TaskOutcome, TaskPriority, TaskResult, TaskStatus,
};
