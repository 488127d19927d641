use crate::types::{AgentId, Task, TaskDefinition, TaskId, TaskStatus};
use hivemind_core::{EntityKind, HivemindError, HivemindResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The tasks owned by one swarm, keyed by task id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGraph {
    swarm_id: Uuid,
    tasks: BTreeMap<TaskId, Task>,
    next_sequence: u32,
    max_tasks: usize,
}

impl TaskGraph {
    /// Empty graph capped at `max_tasks` tasks.
    pub fn new(swarm_id: Uuid, max_tasks: usize) -> Self {
        Self {
            swarm_id,
            tasks: BTreeMap::new(),
            next_sequence: 1,
            max_tasks,
        }
    }

    /// Create a task in `created` status.
    pub fn create(&mut self, def: TaskDefinition) -> HivemindResult<&Task> {
        if self.tasks.len() >= self.max_tasks {
            return Err(HivemindError::capacity("tasks per swarm", self.max_tasks));
        }
        let task = Task::new(self.swarm_id, self.next_sequence, def);
        self.next_sequence += 1;
        let id = task.id.clone();
        Ok(self.tasks.entry(id).or_insert(task))
    }

    /// Look up a task, `NotFound` if unknown.
    pub fn get(&self, id: &str) -> HivemindResult<&Task> {
        self.tasks
            .get(id)
            .ok_or_else(|| HivemindError::not_found(EntityKind::Task, id))
    }

    /// Mutable lookup, `NotFound` if unknown.
    pub fn get_mut(&mut self, id: &str) -> HivemindResult<&mut Task> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| HivemindError::not_found(EntityKind::Task, id))
    }

    /// Apply a status transition, recording it in the task's history.
    pub fn transition(
        &mut self,
        id: &str,
        next: TaskStatus,
        reason: Option<&str>,
    ) -> HivemindResult<&mut Task> {
        let task = self.get_mut(id)?;
        task.transition(next, reason)?;
        Ok(task)
    }

    /// Bind a `created` (or resumed `paused`) task to an agent.
    pub fn mark_assigned(&mut self, id: &str, agent_id: &AgentId) -> HivemindResult<()> {
        let task = self.transition(id, TaskStatus::Assigned, Some(agent_id.as_str()))?;
        task.assigned_agent = Some(agent_id.clone());
        Ok(())
    }

    /// Move an assigned task to running and bump its attempt counter.
    /// Returns the attempt number that the execution must report back with.
    pub fn mark_running(&mut self, id: &str) -> HivemindResult<u32> {
        let task = self.transition(id, TaskStatus::Running, None)?;
        task.attempt += 1;
        Ok(task.attempt)
    }

    /// All tasks ordered by sequence number.
    pub fn all(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by_key(|t| t.sequence);
        tasks
    }

    /// Tasks in `status`, in sequence order.
    pub fn with_status(&self, status: TaskStatus) -> Vec<&Task> {
        self.all().into_iter().filter(|t| t.status == status).collect()
    }

    /// Unassigned tasks in the order they should be offered to agents:
    /// highest priority first, then creation order.
    pub fn unassigned(&self) -> Vec<TaskId> {
        let mut pending: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Created)
            .collect();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.sequence.cmp(&b.sequence)));
        pending.into_iter().map(|t| t.id.clone()).collect()
    }

    /// Ids of the tasks in `status`.
    pub fn ids_with_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.with_status(status).into_iter().map(|t| t.id.clone()).collect()
    }

    /// Tasks currently in `status`.
    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }

    /// Tasks ever created.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task was ever created.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// True when every task is completed, failed or cancelled.
    pub fn is_done(&self) -> bool {
        self.tasks.values().all(|t| t.status.is_terminal())
    }

    /// Ids of every task that is not yet terminal.
    pub fn non_terminal(&self) -> Vec<TaskId> {
        self.all()
            .into_iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.id.clone())
            .collect()
    }
}
