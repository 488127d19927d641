use crate::agent_pool::AgentPool;
use crate::task_graph::TaskGraph;
use crate::types::{
    AgentStatus, SwarmContext, SwarmMetrics, SwarmResults, SwarmStatus, SwarmSummary, TaskOutcome,
    TaskStatus,
};
use chrono::{DateTime, Utc};
use hivemind_core::{EntityKind, HivemindError, HivemindResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate root: one objective with the agents and tasks it exclusively owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swarm {
    pub id: Uuid,
    pub objective: String,
    pub strategy: String,
    pub status: SwarmStatus,
    pub context: SwarmContext,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub agents: AgentPool,
    pub tasks: TaskGraph,
}

impl Swarm {
    /// A `created` swarm with empty pools.
    pub fn new(
        id: Uuid,
        objective: impl Into<String>,
        strategy: impl Into<String>,
        context: SwarmContext,
        max_agents: usize,
        max_tasks: usize,
    ) -> Self {
        Self {
            id,
            objective: objective.into(),
            strategy: strategy.into(),
            status: SwarmStatus::Created,
            context,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            agents: AgentPool::new(id, max_agents),
            tasks: TaskGraph::new(id, max_tasks),
        }
    }

    /// Move to `next`, or fail with `InvalidTransition`.
    pub fn set_status(&mut self, next: SwarmStatus) -> HivemindResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(HivemindError::invalid_transition(
                EntityKind::Swarm,
                self.id.to_string(),
                self.status,
                next,
            ));
        }
        let now = Utc::now();
        match next {
            SwarmStatus::Executing if self.started_at.is_none() => self.started_at = Some(now),
            SwarmStatus::Completed | SwarmStatus::Stopped => self.completed_at = Some(now),
            _ => {}
        }
        self.status = next;
        Ok(())
    }

    /// Fails with `InvalidTransition` when the swarm can no longer change.
    pub fn ensure_mutable(&self, action: &str) -> HivemindResult<()> {
        if self.status.is_terminal() {
            return Err(HivemindError::invalid_transition(
                EntityKind::Swarm,
                self.id.to_string(),
                self.status,
                action,
            ));
        }
        Ok(())
    }

    /// Counters computed from the current agents and tasks.
    pub fn metrics(&self) -> SwarmMetrics {
        let finished: Vec<u64> = self
            .tasks
            .all()
            .into_iter()
            .filter_map(|t| t.result.as_ref().map(|r| r.duration_ms))
            .collect();
        let average_task_duration_ms = if finished.is_empty() {
            0
        } else {
            finished.iter().sum::<u64>() / finished.len() as u64
        };
        let end = self.completed_at.unwrap_or_else(Utc::now);
        let uptime_ms = self
            .started_at
            .map(|s| (end - s).num_milliseconds().max(0) as u64)
            .unwrap_or(0);

        SwarmMetrics {
            total_agents: self.agents.len(),
            available_agents: self.agents.count(AgentStatus::Available),
            busy_agents: self.agents.count(AgentStatus::Busy),
            terminated_agents: self.agents.count(AgentStatus::Terminated),
            total_tasks: self.tasks.len(),
            created_tasks: self.tasks.count(TaskStatus::Created),
            assigned_tasks: self.tasks.count(TaskStatus::Assigned),
            running_tasks: self.tasks.count(TaskStatus::Running),
            paused_tasks: self.tasks.count(TaskStatus::Paused),
            completed_tasks: self.tasks.count(TaskStatus::Completed),
            failed_tasks: self.tasks.count(TaskStatus::Failed),
            cancelled_tasks: self.tasks.count(TaskStatus::Cancelled),
            average_task_duration_ms,
            overall_quality: self.overall_quality(),
            uptime_ms,
        }
    }

    /// Arithmetic mean of completed tasks' quality scores.
    pub fn overall_quality(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .tasks
            .with_status(TaskStatus::Completed)
            .into_iter()
            .filter_map(|t| t.result.as_ref().map(|r| r.quality_score))
            .collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    /// Status plus metrics, without the agent and task collections.
    pub fn summary(&self) -> SwarmSummary {
        SwarmSummary {
            id: self.id,
            objective: self.objective.clone(),
            strategy: self.strategy.clone(),
            status: self.status,
            context: self.context.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            metrics: self.metrics(),
        }
    }

    /// Completed outputs and their mean quality.
    pub fn results(&self) -> SwarmResults {
        let outcomes: Vec<TaskOutcome> = self
            .tasks
            .with_status(TaskStatus::Completed)
            .into_iter()
            .filter_map(|t| {
                t.result.as_ref().map(|r| TaskOutcome {
                    task_id: t.id.clone(),
                    name: t.name.clone(),
                    task_type: t.task_type.clone(),
                    agent_id: r.agent_id.clone(),
                    output: r.output.clone(),
                    quality_score: r.quality_score,
                    origin: r.origin,
                })
            })
            .collect();
        let simulated_outcomes = outcomes.iter().filter(|o| o.origin.is_simulated()).count();

        SwarmResults {
            swarm_id: self.id,
            objective: self.objective.clone(),
            status: self.status,
            overall_quality: self.overall_quality(),
            failed_tasks: self.tasks.count(TaskStatus::Failed),
            simulated_outcomes,
            outcomes,
        }
    }

    /// Verify the agent/task cross-reference invariants.
    ///
    /// A task holds an agent (assigned, running or paused) exactly when that
    /// agent is busy and points back at it.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut holders = 0;
        for task in self.tasks.all() {
            if task.status.holds_agent() {
                holders += 1;
                let agent_id = task
                    .assigned_agent
                    .as_deref()
                    .ok_or_else(|| format!("{} is {} without an agent", task.id, task.status))?;
                let agent = self
                    .agents
                    .get(agent_id)
                    .map_err(|_| format!("{} references unknown {agent_id}", task.id))?;
                if agent.status != AgentStatus::Busy {
                    return Err(format!("{agent_id} holds {} but is {}", task.id, agent.status));
                }
                if agent.current_task.as_deref() != Some(task.id.as_str()) {
                    return Err(format!("{agent_id} does not point back at {}", task.id));
                }
            }
        }
        for agent in self.agents.all() {
            if agent.status == AgentStatus::Busy {
                let task_id = agent
                    .current_task
                    .as_deref()
                    .ok_or_else(|| format!("{} is busy without a task", agent.id))?;
                let task = self
                    .tasks
                    .get(task_id)
                    .map_err(|_| format!("{} points at unknown {task_id}", agent.id))?;
                if task.status.is_terminal() {
                    return Err(format!("{} is busy with terminal {task_id}", agent.id));
                }
            } else if agent.current_task.is_some() {
                return Err(format!("{} is {} but holds a task", agent.id, agent.status));
            }
        }
        let busy = self.agents.count(AgentStatus::Busy);
        if busy != holders {
            return Err(format!("{busy} busy agents but {holders} tasks holding agents"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{
        AgentSpec, AgentType, ExecutionOrigin, ResourceLimits, TaskDefinition, TaskResult,
    };

    fn swarm() -> Swarm {
        let id = Uuid::new_v4();
        let ctx = SwarmContext::new(
            std::path::Path::new("/tmp/hive"),
            id,
            ResourceLimits {
                max_memory_mb: 0,
                max_cpu_percent: 0.0,
                task_timeout_ms: 1000,
            },
        );
        Swarm::new(id, "objective", "development", ctx, 4, 10)
    }

    fn complete(swarm: &mut Swarm, task_id: &str, agent_id: &str, quality: f64) {
        swarm.tasks.transition(task_id, TaskStatus::Running, None).unwrap();
        let task = swarm.tasks.transition(task_id, TaskStatus::Completed, None).unwrap();
        task.result = Some(TaskResult {
            output: "ok".into(),
            quality_score: quality,
            origin: ExecutionOrigin::Delegated,
            agent_id: agent_id.into(),
            duration_ms: 10,
            metadata: serde_json::Value::Null,
        });
        swarm.agents.release(agent_id).unwrap();
    }

    fn assign(swarm: &mut Swarm, task_id: &str, agent_id: &str) {
        swarm.tasks.mark_assigned(task_id, &agent_id.to_string()).unwrap();
        swarm.agents.occupy(agent_id, &task_id.to_string()).unwrap();
    }

    #[test]
    fn test_status_timestamps() {
        let mut swarm = swarm();
        swarm.set_status(SwarmStatus::Executing).unwrap();
        assert!(swarm.started_at.is_some());
        swarm.set_status(SwarmStatus::Completed).unwrap();
        assert!(swarm.completed_at.is_some());
        assert!(swarm.set_status(SwarmStatus::Executing).is_err());
        assert!(swarm.ensure_mutable("spawn").is_err());
    }

    #[test]
    fn test_quality_mean() {
        let mut swarm = swarm();
        assert_eq!(swarm.overall_quality(), None);
        let a = swarm.agents.spawn(AgentSpec::new(AgentType::Developer)).unwrap().id.clone();
        let t1 = swarm.tasks.create(TaskDefinition::new("1", "1")).unwrap().id.clone();
        let t2 = swarm.tasks.create(TaskDefinition::new("2", "2")).unwrap().id.clone();
        assign(&mut swarm, &t1, &a);
        complete(&mut swarm, &t1, &a, 0.5);
        assign(&mut swarm, &t2, &a);
        complete(&mut swarm, &t2, &a, 1.0);

        let results = swarm.results();
        assert_eq!(results.outcomes.len(), 2);
        assert_eq!(results.overall_quality, Some(0.75));
        assert_eq!(results.simulated_outcomes, 0);
        assert_eq!(swarm.metrics().average_task_duration_ms, 10);
    }

    #[test]
    fn test_invariants_hold_through_lifecycle() {
        let mut swarm = swarm();
        let a = swarm.agents.spawn(AgentSpec::new(AgentType::Developer)).unwrap().id.clone();
        let t = swarm.tasks.create(TaskDefinition::new("1", "1")).unwrap().id.clone();
        swarm.check_invariants().unwrap();
        assign(&mut swarm, &t, &a);
        swarm.check_invariants().unwrap();
        complete(&mut swarm, &t, &a, 1.0);
        swarm.check_invariants().unwrap();
    }

    #[test]
    fn test_invariant_violation_detected() {
        let mut swarm = swarm();
        let a = swarm.agents.spawn(AgentSpec::new(AgentType::Developer)).unwrap().id.clone();
        let t = swarm.tasks.create(TaskDefinition::new("1", "1")).unwrap().id.clone();
        swarm.tasks.mark_assigned(&t, &a).unwrap();
        assert!(swarm.check_invariants().is_err());
    }
}
