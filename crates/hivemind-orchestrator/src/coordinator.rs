use crate::agent_pool::MatchingPolicy;
use crate::config::CoordinatorConfig;
use crate::executor::{TaskExecutor, TaskOutput};
use crate::monitor::{check_thresholds, ResourceProbe, ResourceSample, SystemProbe};
use crate::strategy::Strategy;
use crate::swarm::Swarm;
use crate::types::{
    Agent, AgentId, AgentSpec, LogEntry, LogLevel, SwarmContext, SwarmMetrics, SwarmResults,
    SwarmStatus, SwarmSummary, Task, TaskDefinition, TaskError, TaskId, TaskResult, TaskStatus,
};
use chrono::Utc;
use futures_util::future::BoxFuture;
use hivemind_core::{fault, EntityKind, EventBus, EventReceiver, EventTopic, HivemindError, HivemindResult};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-swarm overrides applied at creation time.
#[derive(Debug, Clone, Default)]
pub struct SwarmOptions {
    /// Strategy tag. Falls back to the configured default.
    pub strategy: Option<String>,
    /// Agent cap for this swarm.
    pub max_agents: Option<usize>,
    /// Task cap for this swarm.
    pub max_tasks: Option<usize>,
}

impl SwarmOptions {
    /// Options with only the strategy tag set.
    pub fn strategy(tag: impl Into<String>) -> Self {
        Self {
            strategy: Some(tag.into()),
            ..Self::default()
        }
    }

    /// Override the per-swarm agent maximum.
    pub fn with_max_agents(mut self, max: usize) -> Self {
        self.max_agents = Some(max);
        self
    }

    /// Override the per-swarm task maximum.
    pub fn with_max_tasks(mut self, max: usize) -> Self {
        self.max_tasks = Some(max);
        self
    }
}

type SwarmMap = HashMap<Uuid, SwarmRecord>;

/// A swarm plus the bookkeeping that never leaves the coordinator.
struct SwarmRecord {
    swarm: Swarm,
    logs: VecDeque<LogEntry>,
    log_capacity: usize,
    housekeeping: Option<JoinHandle<()>>,
}

impl SwarmRecord {
    fn log(&mut self, level: LogLevel, message: impl Into<String>, data: serde_json::Value) {
        if self.log_capacity == 0 {
            return;
        }
        while self.logs.len() >= self.log_capacity {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            data,
        });
    }

    /// Publish a lifecycle event and mirror it into the swarm log.
    fn emit(&mut self, bus: &EventBus, topic: EventTopic, payload: serde_json::Value) {
        let level = match topic {
            EventTopic::TaskFailed | EventTopic::ResourceThresholdExceeded => LogLevel::Warn,
            _ => LogLevel::Info,
        };
        self.log(level, topic.as_str(), payload.clone());
        bus.emit(topic, self.swarm.id, payload);
    }

    fn stop_housekeeping(&mut self) {
        if let Some(handle) = self.housekeeping.take() {
            handle.abort();
        }
    }

    /// Bind a task to a specific agent. The agent is validated before the
    /// task moves so a failure leaves both untouched.
    fn bind(&mut self, bus: &EventBus, task_id: &str, agent_id: &str) -> HivemindResult<()> {
        let agent = self.swarm.agents.get(agent_id)?;
        if !agent.is_available() {
            return Err(HivemindError::invalid_transition(
                EntityKind::Agent,
                agent_id,
                agent.status,
                "busy",
            ));
        }
        let agent_id = agent.id.clone();
        self.swarm.tasks.mark_assigned(task_id, &agent_id)?;
        self.swarm.agents.occupy(&agent_id, &task_id.to_string())?;
        self.emit(
            bus,
            EventTopic::TaskAssigned,
            json!({ "task_id": task_id, "agent_id": agent_id }),
        );
        Ok(())
    }

    /// Assign every unassigned task to a capable, available agent. Tasks that
    /// find no agent stay `created` until the next release.
    fn assign_pending(&mut self, bus: &EventBus, policy: MatchingPolicy) {
        if self.swarm.status != SwarmStatus::Executing {
            return;
        }
        for task_id in self.swarm.tasks.unassigned() {
            if self.swarm.agents.available().is_empty() {
                break;
            }
            let required = match self.swarm.tasks.get(&task_id) {
                Ok(task) => task.requirements.capabilities.clone(),
                Err(_) => continue,
            };
            let Some(agent_id) = self.swarm.agents.select(&required, policy) else {
                debug!(swarm_id = %self.swarm.id, task_id = %task_id, "No capable agent available");
                continue;
            };
            if let Err(e) = self.bind(bus, &task_id, &agent_id) {
                warn!(swarm_id = %self.swarm.id, task_id = %task_id, error = %e, "Assignment failed");
            }
        }
    }

    /// Tasks ready to be handed to the executor.
    fn dispatchable(&self) -> Vec<TaskId> {
        if self.swarm.status == SwarmStatus::Executing {
            self.swarm.tasks.ids_with_status(TaskStatus::Assigned)
        } else {
            Vec::new()
        }
    }

    /// Cancel outstanding tasks, retire agents and enter `final_status`.
    fn halt(&mut self, bus: &EventBus, final_status: SwarmStatus, reason: &str) -> HivemindResult<()> {
        self.swarm.set_status(final_status)?;
        for task_id in self.swarm.tasks.non_terminal() {
            if self
                .swarm
                .tasks
                .transition(&task_id, TaskStatus::Cancelled, Some(reason))
                .is_ok()
            {
                self.emit(bus, EventTopic::TaskCancelled, json!({ "task_id": task_id, "reason": reason }));
            }
        }
        for agent_id in self.swarm.agents.live_ids() {
            if self.swarm.agents.terminate(&agent_id).is_ok() {
                self.emit(bus, EventTopic::AgentTerminated, json!({ "agent_id": agent_id }));
            }
        }
        self.stop_housekeeping();
        let topic = if final_status == SwarmStatus::Stopped {
            EventTopic::SwarmStopped
        } else {
            EventTopic::SwarmCompleted
        };
        let metrics = self.swarm.metrics();
        self.emit(bus, topic, json!({ "reason": reason, "metrics": metrics }));
        Ok(())
    }

    /// Complete an executing swarm once every task is terminal.
    fn maybe_complete(&mut self, bus: &EventBus) {
        if self.swarm.status == SwarmStatus::Executing
            && !self.swarm.tasks.is_empty()
            && self.swarm.tasks.is_done()
        {
            info!(swarm_id = %self.swarm.id, "All tasks finished, completing swarm");
            if let Err(e) = self.halt(bus, SwarmStatus::Completed, "all tasks finished") {
                warn!(swarm_id = %self.swarm.id, error = %e, "Auto-completion failed");
            }
        }
    }

    /// Re-run assignment, then auto-completion. Returns the tasks to dispatch.
    fn settle(&mut self, bus: &EventBus, policy: MatchingPolicy) -> Vec<TaskId> {
        self.assign_pending(bus, policy);
        self.maybe_complete(bus);
        self.dispatchable()
    }

    /// Apply an execution result, unless the task moved on while it ran.
    fn apply_outcome(
        &mut self,
        bus: &EventBus,
        task_id: &str,
        agent_id: &str,
        attempt: u32,
        outcome: HivemindResult<TaskOutput>,
        duration_ms: u64,
    ) {
        let current = match self.swarm.tasks.get(task_id) {
            Ok(task) => (task.status, task.attempt),
            Err(_) => return,
        };
        if current != (TaskStatus::Running, attempt) {
            info!(
                swarm_id = %self.swarm.id,
                task_id,
                status = %current.0,
                "Discarding result for task that is no longer running"
            );
            self.log(
                LogLevel::Warn,
                format!("discarded late result for {task_id} ({})", current.0),
                json!({ "task_id": task_id, "attempt": attempt, "ok": outcome.is_ok() }),
            );
            return;
        }

        match outcome {
            Ok(output) => {
                let quality = output.quality_score;
                let origin = output.origin;
                if let Ok(task) = self.swarm.tasks.transition(task_id, TaskStatus::Completed, None) {
                    task.result = Some(TaskResult {
                        output: output.content,
                        quality_score: quality,
                        origin,
                        agent_id: agent_id.to_string(),
                        duration_ms,
                        metadata: output.metadata,
                    });
                }
                self.release_agent(agent_id);
                self.swarm.agents.record_outcome(agent_id, true, duration_ms);
                info!(swarm_id = %self.swarm.id, task_id, agent_id, duration_ms, %origin, "Task completed");
                self.emit(
                    bus,
                    EventTopic::TaskCompleted,
                    json!({
                        "task_id": task_id,
                        "agent_id": agent_id,
                        "duration_ms": duration_ms,
                        "quality_score": quality,
                        "origin": origin,
                    }),
                );
            }
            Err(e) => {
                let error = TaskError::from_execution(&e);
                let code = error.code.clone();
                if let Ok(task) =
                    self.swarm
                        .tasks
                        .transition(task_id, TaskStatus::Failed, Some(&error.message))
                {
                    task.error = Some(error);
                }
                self.release_agent(agent_id);
                self.swarm.agents.record_outcome(agent_id, false, duration_ms);
                warn!(swarm_id = %self.swarm.id, task_id, agent_id, error = %e, "Task failed");
                self.emit(
                    bus,
                    EventTopic::TaskFailed,
                    json!({
                        "task_id": task_id,
                        "agent_id": agent_id,
                        "code": code,
                        "error": e.to_string(),
                    }),
                );
            }
        }
    }

    fn release_agent(&mut self, agent_id: &str) {
        if let Err(e) = self.swarm.agents.release(agent_id) {
            warn!(swarm_id = %self.swarm.id, agent_id, error = %e, "Agent release failed");
            self.log(
                LogLevel::Warn,
                format!("could not release {agent_id}: {e}"),
                json!({ "agent_id": agent_id }),
            );
        }
    }

    /// Periodic health check, threshold monitoring and metrics refresh.
    fn housekeep(&mut self, bus: &EventBus, sample: &ResourceSample) {
        for breach in check_thresholds(sample, &self.swarm.context.limits) {
            warn!(swarm_id = %self.swarm.id, ?breach, "Resource threshold exceeded");
            self.emit(
                bus,
                EventTopic::ResourceThresholdExceeded,
                json!({ "breach": breach, "sample": sample }),
            );
        }

        let overdue_after = chrono::Duration::milliseconds(
            i64::try_from(self.swarm.context.limits.task_timeout_ms.saturating_mul(2))
                .unwrap_or(i64::MAX),
        );
        let now = Utc::now();
        let overdue: Vec<TaskId> = self
            .swarm
            .tasks
            .with_status(TaskStatus::Running)
            .into_iter()
            .filter(|t| t.started_at.is_some_and(|s| now - s > overdue_after))
            .map(|t| t.id.clone())
            .collect();
        for task_id in overdue {
            warn!(swarm_id = %self.swarm.id, task_id = %task_id, "Task running well past its timeout");
            self.log(
                LogLevel::Warn,
                format!("{task_id} is running well past its timeout"),
                json!({ "task_id": task_id }),
            );
        }

        let metrics = self.swarm.metrics();
        debug!(
            swarm_id = %self.swarm.id,
            busy_agents = metrics.busy_agents,
            running_tasks = metrics.running_tasks,
            completed_tasks = metrics.completed_tasks,
            "Swarm metrics refreshed"
        );
    }
}

/// Owns every swarm and drives the swarm/agent/task lifecycles.
///
/// Cheap to clone; all clones share the same state. Every mutation happens
/// under one write lock, so events for a swarm are emitted in the order
/// their operations complete. Executor calls run outside the lock.
#[derive(Clone)]
pub struct SwarmCoordinator {
    config: Arc<CoordinatorConfig>,
    swarms: Arc<RwLock<SwarmMap>>,
    executor: Arc<dyn TaskExecutor>,
    events: EventBus,
    probe: Arc<dyn ResourceProbe>,
}

impl SwarmCoordinator {
    /// Build a coordinator that runs tasks through `executor`.
    pub fn new(config: CoordinatorConfig, executor: Arc<dyn TaskExecutor>) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            config: Arc::new(config),
            swarms: Arc::new(RwLock::new(HashMap::new())),
            executor,
            events,
            probe: Arc::new(SystemProbe::new()),
        }
    }

    /// Replace the resource probe used by housekeeping.
    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Lifecycle event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to events from every swarm.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    // ---------------------------------------------------------------
    // Swarm lifecycle
    // ---------------------------------------------------------------

    /// Create a swarm in `created` status. Nothing is allocated when the
    /// swarm limit is already reached.
    pub async fn create_swarm(&self, objective: &str, options: SwarmOptions) -> HivemindResult<Uuid> {
        let objective = objective.trim();
        if objective.is_empty() {
            return Err(HivemindError::MissingObjective);
        }
        let mut swarms = self.swarms.write().await;
        if swarms.len() >= self.config.max_swarms {
            return Err(HivemindError::capacity("swarms", self.config.max_swarms));
        }

        let id = Uuid::new_v4();
        let strategy = options
            .strategy
            .unwrap_or_else(|| self.config.default_strategy.clone());
        let context = SwarmContext::new(&self.config.workspace_root, id, self.config.resource_limits());
        let swarm = Swarm::new(
            id,
            objective,
            strategy.clone(),
            context,
            options.max_agents.unwrap_or(self.config.max_agents_per_swarm),
            options.max_tasks.unwrap_or(self.config.max_tasks_per_swarm),
        );
        let mut record = SwarmRecord {
            swarm,
            logs: VecDeque::new(),
            log_capacity: self.config.log_capacity,
            housekeeping: None,
        };
        info!(swarm_id = %id, strategy = %strategy, "Swarm created");
        record.emit(
            &self.events,
            EventTopic::SwarmCreated,
            json!({ "objective": objective, "strategy": strategy }),
        );
        swarms.insert(id, record);
        Ok(id)
    }

    /// Decompose the objective, spawn the initial roster and start assigning.
    pub async fn start_swarm(&self, swarm_id: Uuid) -> HivemindResult<SwarmSummary> {
        let (summary, dispatch) = {
            let mut swarms = self.swarms.write().await;
            let record = Self::record_mut(&mut swarms, swarm_id)?;
            // Only a fresh swarm is started; a paused one goes through resume.
            if record.swarm.status != SwarmStatus::Created {
                return Err(HivemindError::invalid_transition(
                    EntityKind::Swarm,
                    swarm_id.to_string(),
                    record.swarm.status,
                    SwarmStatus::Executing,
                ));
            }
            record.swarm.set_status(SwarmStatus::Executing)?;
            let strategy = Strategy::from_tag(&record.swarm.strategy);
            info!(swarm_id = %swarm_id, %strategy, "Starting swarm");
            record.emit(&self.events, EventTopic::SwarmStarted, json!({ "strategy": strategy.to_string() }));

            let objective = record.swarm.objective.clone();
            for def in strategy.decompose(&objective) {
                match record.swarm.tasks.create(def) {
                    Ok(task) => {
                        let payload = json!({ "task_id": task.id, "name": task.name, "task_type": task.task_type });
                        record.emit(&self.events, EventTopic::TaskCreated, payload);
                    }
                    Err(e) => {
                        warn!(swarm_id = %swarm_id, error = %e, "Decomposition truncated");
                        break;
                    }
                }
            }
            for spec in strategy.roster() {
                if !record.swarm.agents.has_capacity() {
                    debug!(swarm_id = %swarm_id, "Roster capped at agent maximum");
                    break;
                }
                let agent = record.swarm.agents.spawn(spec)?;
                let payload = json!({ "agent_id": agent.id, "agent_type": agent.agent_type });
                record.emit(&self.events, EventTopic::AgentSpawned, payload);
            }

            let dispatch = record.settle(&self.events, self.config.matching_policy);
            if let Some(interval) = self.config.housekeeping_interval() {
                record.housekeeping = Some(self.spawn_housekeeping(swarm_id, interval));
            }
            (record.swarm.summary(), dispatch)
        };
        self.spawn_dispatches(swarm_id, dispatch);
        Ok(summary)
    }

    /// Pause an executing swarm. Running tasks become `paused` and keep their
    /// agents; results that arrive while paused are discarded.
    pub async fn pause_swarm(&self, swarm_id: Uuid) -> HivemindResult<()> {
        let mut swarms = self.swarms.write().await;
        let record = Self::record_mut(&mut swarms, swarm_id)?;
        record.swarm.set_status(SwarmStatus::Paused)?;
        for task_id in record.swarm.tasks.ids_with_status(TaskStatus::Running) {
            record
                .swarm
                .tasks
                .transition(&task_id, TaskStatus::Paused, Some("swarm paused"))?;
            record.emit(&self.events, EventTopic::TaskPaused, json!({ "task_id": task_id }));
        }
        info!(swarm_id = %swarm_id, "Swarm paused");
        record.emit(&self.events, EventTopic::SwarmPaused, json!({}));
        Ok(())
    }

    /// Resume a paused swarm. Paused tasks go back to `assigned` on the same
    /// agent and are dispatched again.
    pub async fn resume_swarm(&self, swarm_id: Uuid) -> HivemindResult<()> {
        let dispatch = {
            let mut swarms = self.swarms.write().await;
            let record = Self::record_mut(&mut swarms, swarm_id)?;
            record.swarm.set_status(SwarmStatus::Executing)?;
            for task_id in record.swarm.tasks.ids_with_status(TaskStatus::Paused) {
                record
                    .swarm
                    .tasks
                    .transition(&task_id, TaskStatus::Assigned, Some("swarm resumed"))?;
            }
            info!(swarm_id = %swarm_id, "Swarm resumed");
            record.emit(&self.events, EventTopic::SwarmResumed, json!({}));
            record.settle(&self.events, self.config.matching_policy)
        };
        self.spawn_dispatches(swarm_id, dispatch);
        Ok(())
    }

    /// Stop a swarm: outstanding tasks are cancelled, agents terminated and
    /// the swarm marked `completed`.
    pub async fn stop_swarm(&self, swarm_id: Uuid) -> HivemindResult<SwarmResults> {
        let mut swarms = self.swarms.write().await;
        let record = Self::record_mut(&mut swarms, swarm_id)?;
        record.halt(&self.events, SwarmStatus::Completed, "stopped by request")?;
        info!(swarm_id = %swarm_id, "Swarm stopped");
        Ok(record.swarm.results())
    }

    /// Stop the swarm if it is still live, then remove it and everything it owns.
    pub async fn delete_swarm(&self, swarm_id: Uuid) -> HivemindResult<()> {
        let mut swarms = self.swarms.write().await;
        let record = Self::record_mut(&mut swarms, swarm_id)?;
        if !record.swarm.status.is_terminal() {
            record.halt(&self.events, SwarmStatus::Completed, "deleted")?;
        }
        record.swarm.set_status(SwarmStatus::Deleted)?;
        record.stop_housekeeping();
        record.emit(&self.events, EventTopic::SwarmDeleted, json!({}));
        swarms.remove(&swarm_id);
        info!(swarm_id = %swarm_id, "Swarm deleted");
        Ok(())
    }

    /// Move every live swarm to `stopped`. Used during process shutdown.
    pub async fn shutdown(&self) -> usize {
        let mut swarms = self.swarms.write().await;
        let mut stopped = 0;
        for record in swarms.values_mut() {
            if record.swarm.status.is_terminal() {
                continue;
            }
            match record.halt(&self.events, SwarmStatus::Stopped, "coordinator shutdown") {
                Ok(()) => stopped += 1,
                Err(e) => warn!(swarm_id = %record.swarm.id, error = %e, "Failed to stop swarm"),
            }
        }
        info!(stopped, "Coordinator shut down");
        stopped
    }

    // ---------------------------------------------------------------
    // Agents
    // ---------------------------------------------------------------

    /// Add an agent to the swarm; fails past the agent maximum.
    pub async fn spawn_agent(&self, swarm_id: Uuid, spec: AgentSpec) -> HivemindResult<Agent> {
        let (agent, dispatch) = {
            let mut swarms = self.swarms.write().await;
            let record = Self::record_mut(&mut swarms, swarm_id)?;
            record.swarm.ensure_mutable("spawn agent")?;
            let agent = record.swarm.agents.spawn(spec)?.clone();
            info!(swarm_id = %swarm_id, agent_id = %agent.id, "Agent spawned");
            record.emit(
                &self.events,
                EventTopic::AgentSpawned,
                json!({ "agent_id": agent.id, "agent_type": agent.agent_type }),
            );
            (agent, record.settle(&self.events, self.config.matching_policy))
        };
        self.spawn_dispatches(swarm_id, dispatch);
        Ok(agent)
    }

    /// Terminate an agent. A task it was holding fails with `AgentTerminated`.
    pub async fn terminate_agent(&self, swarm_id: Uuid, agent_id: &str) -> HivemindResult<()> {
        let dispatch = {
            let mut swarms = self.swarms.write().await;
            let record = Self::record_mut(&mut swarms, swarm_id)?;
            let held = record.swarm.agents.terminate(agent_id)?;
            if let Some(task_id) = held {
                let error = TaskError::agent_terminated(agent_id);
                let message = error.message.clone();
                let failed = record
                    .swarm
                    .tasks
                    .transition(&task_id, TaskStatus::Failed, Some(&message))
                    .map(|task| task.error = Some(error))
                    .is_ok();
                if failed {
                    record.emit(
                        &self.events,
                        EventTopic::TaskFailed,
                        json!({
                            "task_id": task_id,
                            "agent_id": agent_id,
                            "code": "agent_terminated",
                            "error": message,
                        }),
                    );
                }
            }
            info!(swarm_id = %swarm_id, agent_id, "Agent terminated");
            record.emit(&self.events, EventTopic::AgentTerminated, json!({ "agent_id": agent_id }));
            record.settle(&self.events, self.config.matching_policy)
        };
        self.spawn_dispatches(swarm_id, dispatch);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------

    /// Add a task and try to assign it right away.
    pub async fn create_task(&self, swarm_id: Uuid, def: TaskDefinition) -> HivemindResult<Task> {
        let (task, dispatch) = {
            let mut swarms = self.swarms.write().await;
            let record = Self::record_mut(&mut swarms, swarm_id)?;
            record.swarm.ensure_mutable("create task")?;
            let task = record.swarm.tasks.create(def)?.clone();
            record.emit(
                &self.events,
                EventTopic::TaskCreated,
                json!({ "task_id": task.id, "name": task.name, "task_type": task.task_type }),
            );
            let dispatch = record.settle(&self.events, self.config.matching_policy);
            let task = record.swarm.tasks.get(&task.id)?.clone();
            (task, dispatch)
        };
        self.spawn_dispatches(swarm_id, dispatch);
        Ok(task)
    }

    /// Assign a `created` task, either to `agent_id` or to the best match.
    ///
    /// Returns `None` when no agent qualifies; the task stays `created` and
    /// is retried on the next agent release.
    pub async fn assign_task(
        &self,
        swarm_id: Uuid,
        task_id: &str,
        agent_id: Option<&str>,
    ) -> HivemindResult<Option<AgentId>> {
        let (assigned, dispatch) = {
            let mut swarms = self.swarms.write().await;
            let record = Self::record_mut(&mut swarms, swarm_id)?;
            record.swarm.ensure_mutable("assign task")?;
            let task = record.swarm.tasks.get(task_id)?;
            if task.status != TaskStatus::Created {
                return Err(HivemindError::invalid_transition(
                    EntityKind::Task,
                    task_id,
                    task.status,
                    TaskStatus::Assigned,
                ));
            }
            let target = match agent_id {
                Some(id) => Some(id.to_string()),
                None => {
                    let required = task.requirements.capabilities.clone();
                    record.swarm.agents.select(&required, self.config.matching_policy)
                }
            };
            let Some(target) = target else {
                debug!(swarm_id = %swarm_id, task_id, "Task left pending, no agent qualifies");
                return Ok(None);
            };
            record.bind(&self.events, task_id, &target)?;
            (Some(target), record.settle(&self.events, self.config.matching_policy))
        };
        self.spawn_dispatches(swarm_id, dispatch);
        Ok(assigned)
    }

    /// Cancel a non-terminal task and free its agent immediately. An
    /// in-flight execution is left to finish; its result is discarded.
    pub async fn cancel_task(&self, swarm_id: Uuid, task_id: &str) -> HivemindResult<Task> {
        let (task, dispatch) = {
            let mut swarms = self.swarms.write().await;
            let record = Self::record_mut(&mut swarms, swarm_id)?;
            let task = record
                .swarm
                .tasks
                .transition(task_id, TaskStatus::Cancelled, Some("cancelled by request"))?;
            let agent = task.assigned_agent.clone();
            if let Some(agent_id) = &agent {
                record.swarm.agents.release(agent_id)?;
            }
            record.emit(
                &self.events,
                EventTopic::TaskCancelled,
                json!({ "task_id": task_id, "agent_id": agent }),
            );
            let task = record.swarm.tasks.get(task_id)?.clone();
            (task, record.settle(&self.events, self.config.matching_policy))
        };
        self.spawn_dispatches(swarm_id, dispatch);
        Ok(task)
    }

    /// Re-submit a failed or cancelled task as a fresh task linked by `retry_of`.
    pub async fn retry_task(&self, swarm_id: Uuid, task_id: &str) -> HivemindResult<Task> {
        let (task, dispatch) = {
            let mut swarms = self.swarms.write().await;
            let record = Self::record_mut(&mut swarms, swarm_id)?;
            record.swarm.ensure_mutable("retry task")?;
            let original = record.swarm.tasks.get(task_id)?;
            if !matches!(original.status, TaskStatus::Failed | TaskStatus::Cancelled) {
                return Err(HivemindError::invalid_transition(
                    EntityKind::Task,
                    task_id,
                    original.status,
                    "retry",
                ));
            }
            let def = original.definition();
            let new_id = {
                let task = record.swarm.tasks.create(def)?;
                task.id.clone()
            };
            record.swarm.tasks.get_mut(&new_id)?.retry_of = Some(task_id.to_string());
            info!(swarm_id = %swarm_id, task_id, retry = %new_id, "Task resubmitted");
            record.emit(
                &self.events,
                EventTopic::TaskCreated,
                json!({ "task_id": new_id, "retry_of": task_id }),
            );
            let dispatch = record.settle(&self.events, self.config.matching_policy);
            (record.swarm.tasks.get(&new_id)?.clone(), dispatch)
        };
        self.spawn_dispatches(swarm_id, dispatch);
        Ok(task)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Status, strategy and metrics of one swarm.
    pub async fn get_swarm_status(&self, swarm_id: Uuid) -> HivemindResult<SwarmSummary> {
        self.read(swarm_id, |r| r.swarm.summary()).await
    }

    /// Summaries of every swarm, oldest first.
    pub async fn list_swarms(&self) -> Vec<SwarmSummary> {
        let swarms = self.swarms.read().await;
        let mut all: Vec<SwarmSummary> = swarms.values().map(|r| r.swarm.summary()).collect();
        all.sort_by_key(|s| s.created_at);
        all
    }

    /// Every agent in the swarm, terminated ones included.
    pub async fn get_agents(&self, swarm_id: Uuid) -> HivemindResult<Vec<Agent>> {
        self.read(swarm_id, |r| r.swarm.agents.all().into_iter().cloned().collect())
            .await
    }

    /// One agent by id.
    pub async fn get_agent(&self, swarm_id: Uuid, agent_id: &str) -> HivemindResult<Agent> {
        self.read(swarm_id, |r| r.swarm.agents.get(agent_id).cloned())
            .await?
    }

    /// Every task in the swarm.
    pub async fn get_tasks(&self, swarm_id: Uuid) -> HivemindResult<Vec<Task>> {
        self.read(swarm_id, |r| r.swarm.tasks.all().into_iter().cloned().collect())
            .await
    }

    /// One task by id.
    pub async fn get_task(&self, swarm_id: Uuid, task_id: &str) -> HivemindResult<Task> {
        self.read(swarm_id, |r| r.swarm.tasks.get(task_id).cloned())
            .await?
    }

    /// Completed outputs plus the mean quality score.
    pub async fn get_results(&self, swarm_id: Uuid) -> HivemindResult<SwarmResults> {
        self.read(swarm_id, |r| r.swarm.results()).await
    }

    /// Agent and task counters.
    pub async fn get_metrics(&self, swarm_id: Uuid) -> HivemindResult<SwarmMetrics> {
        self.read(swarm_id, |r| r.swarm.metrics()).await
    }

    /// Most recent log entries, oldest first. `limit` keeps only the tail.
    pub async fn get_logs(&self, swarm_id: Uuid, limit: Option<usize>) -> HivemindResult<Vec<LogEntry>> {
        self.read(swarm_id, |r| {
            let skip = limit.map_or(0, |n| r.logs.len().saturating_sub(n));
            r.logs.iter().skip(skip).cloned().collect()
        })
        .await
    }

    /// Snapshot of the full swarm aggregate.
    pub async fn snapshot(&self, swarm_id: Uuid) -> HivemindResult<Swarm> {
        self.read(swarm_id, |r| r.swarm.clone()).await
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn record_mut(swarms: &mut SwarmMap, swarm_id: Uuid) -> HivemindResult<&mut SwarmRecord> {
        swarms
            .get_mut(&swarm_id)
            .ok_or_else(|| HivemindError::not_found(EntityKind::Swarm, swarm_id.to_string()))
    }

    async fn read<T>(&self, swarm_id: Uuid, f: impl FnOnce(&SwarmRecord) -> T) -> HivemindResult<T> {
        let swarms = self.swarms.read().await;
        swarms
            .get(&swarm_id)
            .map(f)
            .ok_or_else(|| HivemindError::not_found(EntityKind::Swarm, swarm_id.to_string()))
    }

    fn spawn_dispatches(&self, swarm_id: Uuid, task_ids: Vec<TaskId>) {
        for task_id in task_ids {
            tokio::spawn(self.clone().run_task(swarm_id, task_id));
        }
    }

    /// Execute one assigned task end to end.
    ///
    /// Dispatch is idempotent: only the first run to find the task still
    /// `assigned` in an executing swarm proceeds.
    fn run_task(self, swarm_id: Uuid, task_id: TaskId) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let prepared = {
                let mut swarms = self.swarms.write().await;
                let Some(record) = swarms.get_mut(&swarm_id) else {
                    return;
                };
                prepare_run(record, &task_id)
            };
            let Some((task, agent, attempt, timeout)) = prepared else {
                return;
            };

            debug!(swarm_id = %swarm_id, task_id = %task_id, agent_id = %agent.id, attempt, "Executing task");
            let started = Instant::now();
            let agent_id = agent.id.clone();
            let outcome = self.invoke(task, agent, timeout).await;
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let dispatch = {
                let mut swarms = self.swarms.write().await;
                let Some(record) = swarms.get_mut(&swarm_id) else {
                    debug!(swarm_id = %swarm_id, task_id = %task_id, "Swarm gone, result discarded");
                    return;
                };
                record.apply_outcome(&self.events, &task_id, &agent_id, attempt, outcome, duration_ms);
                record.settle(&self.events, self.config.matching_policy)
            };
            self.spawn_dispatches(swarm_id, dispatch);
        })
    }

    /// Call the executor under a timeout. On timeout the call is left running
    /// in the background and whatever it eventually returns is dropped.
    async fn invoke(&self, task: Task, agent: Agent, timeout: Duration) -> HivemindResult<TaskOutput> {
        let executor = Arc::clone(&self.executor);
        let task_id = task.id.clone();
        // A panic in the executor fails this task only.
        let mut handle = tokio::spawn(fault::contain(async move { executor.execute(&task, &agent).await }));
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(HivemindError::ExecutionFailed(format!(
                "executor did not finish: {join_err}"
            ))),
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(task_id = %task_id, timeout_ms, "Task execution timed out");
                tokio::spawn(async move {
                    if let Ok(late) = handle.await {
                        debug!(task_id = %task_id, ok = late.is_ok(), "Timed-out execution finished, result dropped");
                    }
                });
                Err(HivemindError::Timeout { after_ms: timeout_ms })
            }
        }
    }

    fn spawn_housekeeping(&self, swarm_id: Uuid, interval: Duration) -> JoinHandle<()> {
        let swarms: Weak<RwLock<SwarmMap>> = Arc::downgrade(&self.swarms);
        let events = self.events.clone();
        let probe = Arc::clone(&self.probe);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(swarms) = swarms.upgrade() else {
                    break;
                };
                let sample = probe.sample();
                let mut guard = swarms.write().await;
                let Some(record) = guard.get_mut(&swarm_id) else {
                    break;
                };
                if record.swarm.status.is_terminal() {
                    break;
                }
                record.housekeep(&events, &sample);
            }
            debug!(swarm_id = %swarm_id, "Housekeeping loop finished");
        })
    }
}

/// Move an assigned task to running. Returns what the executor needs.
fn prepare_run(record: &mut SwarmRecord, task_id: &str) -> Option<(Task, Agent, u32, Duration)> {
    if record.swarm.status != SwarmStatus::Executing {
        return None;
    }
    let task = record.swarm.tasks.get(task_id).ok()?;
    if task.status != TaskStatus::Assigned {
        return None;
    }
    let agent_id = task.assigned_agent.clone()?;
    let attempt = match record.swarm.tasks.mark_running(task_id) {
        Ok(attempt) => attempt,
        Err(e) => {
            warn!(swarm_id = %record.swarm.id, task_id, error = %e, "Could not start task");
            return None;
        }
    };
    let task = record.swarm.tasks.get(task_id).ok()?.clone();
    let agent = record.swarm.agents.get(&agent_id).ok()?.clone();
    record.log(
        LogLevel::Info,
        format!("{task_id} running on {agent_id}"),
        json!({ "task_id": task_id, "agent_id": agent_id, "attempt": attempt }),
    );
    let timeout = Duration::from_millis(record.swarm.context.limits.task_timeout_ms);
    Some((task, agent, attempt, timeout))
}
