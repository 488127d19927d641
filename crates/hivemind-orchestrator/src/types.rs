use crate::capability::CapabilitySet;
use chrono::{DateTime, Utc};
use hivemind_core::{EntityKind, HivemindError, HivemindResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Swarm-scoped agent identifier, e.g. `agent-developer-2`.
pub type AgentId = String;
/// Swarm-scoped task identifier, e.g. `task-0003`.
pub type TaskId = String;

// --- Swarm ---

/// Lifecycle status of a swarm.
///
/// `created -> executing -> {paused <-> executing} -> completed | stopped`,
/// with `deleted` as the final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmStatus {
    Created,
    Executing,
    Paused,
    Completed,
    Stopped,
    Deleted,
}

impl SwarmStatus {
    /// Completed, stopped and deleted swarms never execute tasks again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SwarmStatus::Completed | SwarmStatus::Stopped | SwarmStatus::Deleted
        )
    }

    /// Whether `self -> next` is a legal swarm transition.
    pub fn can_transition_to(&self, next: SwarmStatus) -> bool {
        use SwarmStatus::*;
        matches!(
            (self, next),
            (Created, Executing)
                | (Executing, Paused)
                | (Paused, Executing)
                | (Created | Executing | Paused, Completed)
                | (Created | Executing | Paused, Stopped)
                | (_, Deleted)
        ) && *self != Deleted
    }
}

impl fmt::Display for SwarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwarmStatus::Created => "created",
            SwarmStatus::Executing => "executing",
            SwarmStatus::Paused => "paused",
            SwarmStatus::Completed => "completed",
            SwarmStatus::Stopped => "stopped",
            SwarmStatus::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// Resource ceilings attached to a swarm's execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Process memory above which a warning event is emitted.
    pub max_memory_mb: u64,
    /// Global CPU usage above which a warning event is emitted.
    pub max_cpu_percent: f32,
    /// Bound on a single task execution.
    pub task_timeout_ms: u64,
}

/// Isolated namespaces a swarm's tasks run under.
///
/// The paths are namespaces only; the coordinator never touches the disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmContext {
    pub working_dir: PathBuf,
    pub log_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub limits: ResourceLimits,
}

impl SwarmContext {
    /// Namespaces rooted at `<root>/<swarm_id>`.
    pub fn new(root: &std::path::Path, swarm_id: Uuid, limits: ResourceLimits) -> Self {
        let base = root.join(swarm_id.to_string());
        Self {
            working_dir: base.join("work"),
            log_dir: base.join("logs"),
            temp_dir: base.join("tmp"),
            limits,
        }
    }
}

// --- Agent ---

/// Type of an agent; selects its default capability profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Coordinator,
    Architect,
    Developer,
    Tester,
    Reviewer,
    Researcher,
    Analyst,
    Documenter,
}

impl AgentType {
    /// Every agent type.
    pub const ALL: [AgentType; 8] = [
        AgentType::Coordinator,
        AgentType::Architect,
        AgentType::Developer,
        AgentType::Tester,
        AgentType::Reviewer,
        AgentType::Researcher,
        AgentType::Analyst,
        AgentType::Documenter,
    ];
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentType::Coordinator => "coordinator",
            AgentType::Architect => "architect",
            AgentType::Developer => "developer",
            AgentType::Tester => "tester",
            AgentType::Reviewer => "reviewer",
            AgentType::Researcher => "researcher",
            AgentType::Analyst => "analyst",
            AgentType::Documenter => "documenter",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for AgentType {
    type Err = HivemindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentType::ALL
            .into_iter()
            .find(|t| t.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HivemindError::Config(format!("unknown agent type '{s}'")))
    }
}

/// Lifecycle of an agent. `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Available,
    Busy,
    Terminated,
}

impl AgentStatus {
    /// Whether `self -> next` is a legal agent transition.
    pub fn can_transition_to(&self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        matches!(
            (self, next),
            (Available, Busy) | (Busy, Available) | (Available | Busy, Terminated)
        )
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Available => "available",
            AgentStatus::Busy => "busy",
            AgentStatus::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Request to add an agent to a swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub agent_type: AgentType,
    #[serde(default)]
    pub name: Option<String>,
    /// Overrides the type's default capability profile.
    #[serde(default)]
    pub capabilities: Option<CapabilitySet>,
}

impl AgentSpec {
    /// Spec with the type's default capabilities.
    pub fn new(agent_type: AgentType) -> Self {
        Self {
            agent_type,
            name: None,
            capabilities: None,
        }
    }

    /// Replace the agent type's default capabilities.
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Set a display name instead of `<type> #<n>`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Per-agent counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub total_duration_ms: u64,
}

/// A typed worker identity inside a swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub swarm_id: Uuid,
    pub agent_type: AgentType,
    pub instance: u32,
    pub name: String,
    pub capabilities: CapabilitySet,
    pub status: AgentStatus,
    /// Looked up by id in the owning swarm's task graph; never owned.
    pub current_task: Option<TaskId>,
    pub metrics: AgentMetrics,
    pub spawned_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
}

impl Agent {
    /// Available agents can take a new task.
    pub fn is_available(&self) -> bool {
        self.status == AgentStatus::Available
    }
}

// --- Task ---

/// Lifecycle of a task. `Completed`, `Failed` and `Cancelled` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Created,
    Assigned,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Completed, failed and cancelled tasks never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Statuses in which the task holds an agent.
    pub fn holds_agent(&self) -> bool {
        matches!(
            self,
            TaskStatus::Assigned | TaskStatus::Running | TaskStatus::Paused
        )
    }

    /// Forward-only transitions plus the `running -> paused -> assigned` side branch.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Created, Assigned)
                | (Created, Cancelled)
                | (Assigned, Running)
                | (Assigned, Failed)
                | (Assigned, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, Paused)
                | (Paused, Assigned)
                | (Paused, Failed)
                | (Paused, Cancelled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Created => "created",
            TaskStatus::Assigned => "assigned",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Ordering key for assignment; higher runs first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// What a task needs from the agent that runs it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRequirements {
    #[serde(default)]
    pub capabilities: CapabilitySet,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Caller-supplied definition of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    pub description: String,
    #[serde(default = "default_task_type")]
    pub task_type: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub requirements: TaskRequirements,
}

fn default_task_type() -> String {
    "general".to_string()
}

impl TaskDefinition {
    /// Normal-priority `general` task with no requirements.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            task_type: default_task_type(),
            priority: TaskPriority::Normal,
            requirements: TaskRequirements::default(),
        }
    }

    /// Set the task type tag.
    pub fn with_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Capabilities the assigned agent must have under strict matching.
    pub fn requiring(mut self, capabilities: CapabilitySet) -> Self {
        self.requirements.capabilities = capabilities;
        self
    }
}

/// Where a result came from. Simulated output is never reported as delegated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOrigin {
    Delegated,
    Interactive,
    Simulated,
}

impl ExecutionOrigin {
    /// Whether this origin is the simulated path.
    pub fn is_simulated(&self) -> bool {
        *self == ExecutionOrigin::Simulated
    }
}

impl fmt::Display for ExecutionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionOrigin::Delegated => "delegated",
            ExecutionOrigin::Interactive => "interactive",
            ExecutionOrigin::Simulated => "simulated",
        };
        f.write_str(s)
    }
}

/// Payload attached to a completed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub output: String,
    pub quality_score: f64,
    pub origin: ExecutionOrigin,
    pub agent_id: AgentId,
    pub duration_ms: u64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Why a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    ExecutionError,
    AgentTerminated,
}

/// Payload attached to a failed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    /// Short machine-readable cause: `timeout`, `execution_failed`, ...
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub recoverable: bool,
    pub occurred_at: DateTime<Utc>,
}

impl TaskError {
    /// Classify an execution-path error. Always retryable and recoverable.
    pub fn from_execution(err: &HivemindError) -> Self {
        let code = match err {
            HivemindError::Timeout { .. } => "timeout",
            HivemindError::InteractiveHandoffFailed(_) => "interactive_handoff_failed",
            HivemindError::MissingCredential(_) => "missing_credential",
            HivemindError::Http(_) => "http",
            _ => "execution_failed",
        };
        Self {
            kind: TaskErrorKind::ExecutionError,
            code: code.to_string(),
            message: err.to_string(),
            retryable: true,
            recoverable: true,
            occurred_at: Utc::now(),
        }
    }

    /// Failure for a task whose agent was terminated under it.
    pub fn agent_terminated(agent_id: &str) -> Self {
        Self {
            kind: TaskErrorKind::AgentTerminated,
            code: "agent_terminated".to_string(),
            message: format!("agent {agent_id} was terminated while holding the task"),
            retryable: true,
            recoverable: true,
            occurred_at: Utc::now(),
        }
    }
}

/// One entry of a task's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A decomposed unit of work inside a swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub swarm_id: Uuid,
    pub sequence: u32,
    pub priority: TaskPriority,
    pub name: String,
    pub description: String,
    pub task_type: String,
    pub requirements: TaskRequirements,
    pub status: TaskStatus,
    /// Looked up by id in the owning swarm's agent pool; never owned.
    pub assigned_agent: Option<AgentId>,
    pub result: Option<TaskResult>,
    pub error: Option<TaskError>,
    pub history: Vec<StatusTransition>,
    /// Incremented on every dispatch; stale executions carry an older value.
    pub attempt: u32,
    #[serde(default)]
    pub retry_of: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A fresh `created` task with id `task-NNNN` from its sequence number.
    pub fn new(swarm_id: Uuid, sequence: u32, def: TaskDefinition) -> Self {
        Self {
            id: format!("task-{sequence:04}"),
            swarm_id,
            sequence,
            priority: def.priority,
            name: def.name,
            description: def.description,
            task_type: def.task_type,
            requirements: def.requirements,
            status: TaskStatus::Created,
            assigned_agent: None,
            result: None,
            error: None,
            history: Vec::new(),
            attempt: 0,
            retry_of: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to `next`, recording the change in the audit history.
    pub fn transition(&mut self, next: TaskStatus, reason: Option<&str>) -> HivemindResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(HivemindError::invalid_transition(
                EntityKind::Task,
                &self.id,
                self.status,
                next,
            ));
        }
        let now = Utc::now();
        self.history.push(StatusTransition {
            from: self.status,
            to: next,
            at: now,
            reason: reason.map(str::to_string),
        });
        self.status = next;
        match next {
            TaskStatus::Running => self.started_at = Some(now),
            s if s.is_terminal() => self.completed_at = Some(now),
            _ => {}
        }
        Ok(())
    }

    /// The definition this task was created from, used by retry.
    pub fn definition(&self) -> TaskDefinition {
        TaskDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            task_type: self.task_type.clone(),
            priority: self.priority,
            requirements: self.requirements.clone(),
        }
    }
}

// --- Reporting ---

/// Aggregated counters for a swarm.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmMetrics {
    pub total_agents: usize,
    pub available_agents: usize,
    pub busy_agents: usize,
    pub terminated_agents: usize,
    pub total_tasks: usize,
    pub created_tasks: usize,
    pub assigned_tasks: usize,
    pub running_tasks: usize,
    pub paused_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub cancelled_tasks: usize,
    pub average_task_duration_ms: u64,
    pub overall_quality: Option<f64>,
    pub uptime_ms: u64,
}

/// Snapshot returned by `get_swarm_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSummary {
    pub id: Uuid,
    pub objective: String,
    pub strategy: String,
    pub status: SwarmStatus,
    pub context: SwarmContext,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metrics: SwarmMetrics,
}

/// One completed task's contribution to the swarm result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub name: String,
    pub task_type: String,
    pub agent_id: AgentId,
    pub output: String,
    pub quality_score: f64,
    pub origin: ExecutionOrigin,
}

/// Aggregate of every completed task's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmResults {
    pub swarm_id: Uuid,
    pub objective: String,
    pub status: SwarmStatus,
    pub outcomes: Vec<TaskOutcome>,
    /// Mean of per-task quality scores; `None` when nothing completed.
    pub overall_quality: Option<f64>,
    pub failed_tasks: usize,
    /// Number of outcomes produced by the simulated path.
    pub simulated_outcomes: usize,
}

/// Severity of a swarm log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// An entry in a swarm's in-memory log ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(Uuid::new_v4(), 1, TaskDefinition::new("Design", "Design the API"))
    }

    #[test]
    fn test_task_creation() {
        let task = task();
        assert_eq!(task.id, "task-0001");
        assert_eq!(task.status, TaskStatus::Created);
        assert!(task.history.is_empty());
        assert!(task.assigned_agent.is_none());
    }

    #[test]
    fn test_happy_path_transitions_are_recorded() {
        let mut task = task();
        task.transition(TaskStatus::Assigned, None).unwrap();
        task.transition(TaskStatus::Running, None).unwrap();
        task.transition(TaskStatus::Completed, Some("done")).unwrap();
        assert_eq!(task.history.len(), 3);
        assert_eq!(task.history[2].reason.as_deref(), Some("done"));
        assert!(task.started_at.is_some());
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled] {
            for next in [
                TaskStatus::Created,
                TaskStatus::Assigned,
                TaskStatus::Running,
                TaskStatus::Paused,
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_pause_side_branch() {
        let mut task = task();
        task.transition(TaskStatus::Assigned, None).unwrap();
        task.transition(TaskStatus::Running, None).unwrap();
        task.transition(TaskStatus::Paused, None).unwrap();
        task.transition(TaskStatus::Assigned, None).unwrap();
        assert!(task.transition(TaskStatus::Paused, None).is_err());
    }

    #[test]
    fn test_invalid_transition_error() {
        let mut task = task();
        let err = task.transition(TaskStatus::Completed, None).unwrap_err();
        assert!(matches!(err, HivemindError::InvalidTransition { .. }));
        assert_eq!(task.status, TaskStatus::Created);
        assert!(task.history.is_empty());
    }

    #[test]
    fn test_swarm_status_transitions() {
        assert!(SwarmStatus::Created.can_transition_to(SwarmStatus::Executing));
        assert!(SwarmStatus::Executing.can_transition_to(SwarmStatus::Paused));
        assert!(SwarmStatus::Paused.can_transition_to(SwarmStatus::Executing));
        assert!(!SwarmStatus::Completed.can_transition_to(SwarmStatus::Executing));
        assert!(SwarmStatus::Completed.can_transition_to(SwarmStatus::Deleted));
        assert!(!SwarmStatus::Deleted.can_transition_to(SwarmStatus::Deleted));
        assert!(!SwarmStatus::Created.can_transition_to(SwarmStatus::Paused));
    }

    #[test]
    fn test_agent_status_transitions() {
        assert!(AgentStatus::Available.can_transition_to(AgentStatus::Busy));
        assert!(AgentStatus::Busy.can_transition_to(AgentStatus::Available));
        assert!(AgentStatus::Busy.can_transition_to(AgentStatus::Terminated));
        assert!(!AgentStatus::Terminated.can_transition_to(AgentStatus::Available));
    }

    #[test]
    fn test_agent_type_parse() {
        assert_eq!("Developer".parse::<AgentType>().unwrap(), AgentType::Developer);
        assert!("wizard".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_task_error_codes() {
        let timeout = TaskError::from_execution(&HivemindError::Timeout { after_ms: 5 });
        assert_eq!(timeout.code, "timeout");
        assert_eq!(timeout.kind, TaskErrorKind::ExecutionError);
        assert!(timeout.retryable && timeout.recoverable);

        let failed = TaskError::from_execution(&HivemindError::ExecutionFailed("x".into()));
        assert_eq!(failed.code, "execution_failed");
    }

    #[test]
    fn test_context_namespaces() {
        let id = Uuid::new_v4();
        let ctx = SwarmContext::new(
            std::path::Path::new("/srv/swarms"),
            id,
            ResourceLimits {
                max_memory_mb: 512,
                max_cpu_percent: 50.0,
                task_timeout_ms: 1000,
            },
        );
        assert!(ctx.working_dir.starts_with(format!("/srv/swarms/{id}")));
        assert_ne!(ctx.log_dir, ctx.temp_dir);
    }
}
