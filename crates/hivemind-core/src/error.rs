use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A convenience `Result` alias using [`HivemindError`].
pub type HivemindResult<T> = Result<T, HivemindError>;

/// The kind of entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Swarm,
    Agent,
    Task,
    Execution,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Swarm => write!(f, "swarm"),
            EntityKind::Agent => write!(f, "agent"),
            EntityKind::Task => write!(f, "task"),
            EntityKind::Execution => write!(f, "execution"),
        }
    }
}

/// Top-level error type for Hivemind.
///
/// Structural variants (`NotFound`, `CapacityExceeded`, `InvalidTransition`,
/// `MissingObjective`) are returned synchronously to the caller of the
/// operation that triggered them. Execution variants (`Timeout`,
/// `ExecutionFailed`, `InteractiveHandoffFailed`) are normally captured onto
/// the failing task and surfaced through a `task.failed` event instead.
#[derive(Error, Debug)]
pub enum HivemindError {
    /// Unknown swarm, agent, task or execution id.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// A configured maximum (swarms, agents or tasks) would be exceeded.
    #[error("capacity exceeded: {resource} limit is {limit}")]
    CapacityExceeded { resource: String, limit: usize },

    /// The requested status change is not permitted from the current status.
    #[error("invalid {entity} transition for {id}: {from} -> {to}")]
    InvalidTransition {
        entity: EntityKind,
        id: String,
        from: String,
        to: String,
    },

    /// An execution was requested with an empty objective.
    #[error("objective must not be empty")]
    MissingObjective,

    /// The delegated-service path was selected but no credential is configured.
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// An execution path exceeded its time budget.
    #[error("execution timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The underlying executor failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Spawning the local interactive session failed.
    #[error("interactive hand-off failed: {0}")]
    InteractiveHandoffFailed(String),

    /// Invalid or unreadable configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HivemindError {
    /// `NotFound` for an unknown id.
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        HivemindError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// `CapacityExceeded` for `resource` at `limit`.
    pub fn capacity(resource: impl Into<String>, limit: usize) -> Self {
        HivemindError::CapacityExceeded {
            resource: resource.into(),
            limit,
        }
    }

    /// `InvalidTransition` from `from` to `to`.
    pub fn invalid_transition(
        entity: EntityKind,
        id: impl Into<String>,
        from: impl fmt::Display,
        to: impl fmt::Display,
    ) -> Self {
        HivemindError::InvalidTransition {
            entity,
            id: id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Errors caused by the shape of a request rather than by execution.
    /// These are never retried internally.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            HivemindError::NotFound { .. }
                | HivemindError::CapacityExceeded { .. }
                | HivemindError::InvalidTransition { .. }
                | HivemindError::MissingObjective
        )
    }

    /// Errors raised while running an execution path.
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            HivemindError::Timeout { .. }
                | HivemindError::ExecutionFailed(_)
                | HivemindError::InteractiveHandoffFailed(_)
                | HivemindError::Http(_)
        )
    }
}
