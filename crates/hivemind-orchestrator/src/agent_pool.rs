use crate::capability::CapabilitySet;
use crate::types::{Agent, AgentId, AgentMetrics, AgentSpec, AgentStatus, AgentType, TaskId};
use chrono::Utc;
use hivemind_core::{EntityKind, HivemindError, HivemindResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// How a task is matched to an agent when no agent is named explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingPolicy {
    /// Only agents whose capabilities cover the task's requirements qualify.
    Strict,
    /// Prefer a capable agent, otherwise take the first available one.
    #[default]
    BestEffort,
}

/// The agents owned by one swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPool {
    swarm_id: Uuid,
    agents: BTreeMap<AgentId, Agent>,
    /// Per-type instance counters; spawn order within a type.
    instances: BTreeMap<AgentType, u32>,
    /// Spawn order across the whole pool.
    order: Vec<AgentId>,
    max_agents: usize,
}

impl AgentPool {
    /// Empty pool capped at `max_agents` live agents.
    pub fn new(swarm_id: Uuid, max_agents: usize) -> Self {
        Self {
            swarm_id,
            agents: BTreeMap::new(),
            instances: BTreeMap::new(),
            order: Vec::new(),
            max_agents,
        }
    }

    /// Cap on live (non-terminated) agents.
    pub fn max_agents(&self) -> usize {
        self.max_agents
    }

    /// Agents that still count against the per-swarm maximum.
    pub fn active_count(&self) -> usize {
        self.agents
            .values()
            .filter(|a| a.status != AgentStatus::Terminated)
            .count()
    }

    /// Whether another agent may be spawned.
    pub fn has_capacity(&self) -> bool {
        self.active_count() < self.max_agents
    }

    /// Add a new `available` agent.
    pub fn spawn(&mut self, spec: AgentSpec) -> HivemindResult<&Agent> {
        if !self.has_capacity() {
            return Err(HivemindError::capacity("agents per swarm", self.max_agents));
        }
        let instance = self.instances.entry(spec.agent_type).or_insert(0);
        *instance += 1;
        let instance = *instance;
        let id = format!("agent-{}-{}", spec.agent_type, instance);
        let agent = Agent {
            id: id.clone(),
            swarm_id: self.swarm_id,
            agent_type: spec.agent_type,
            instance,
            name: spec
                .name
                .unwrap_or_else(|| format!("{} #{}", spec.agent_type, instance)),
            capabilities: spec
                .capabilities
                .unwrap_or_else(|| CapabilitySet::for_agent_type(spec.agent_type)),
            status: AgentStatus::Available,
            current_task: None,
            metrics: AgentMetrics::default(),
            spawned_at: Utc::now(),
            terminated_at: None,
        };
        self.order.push(id.clone());
        Ok(self.agents.entry(id).or_insert(agent))
    }

    /// Look up an agent, `NotFound` if unknown.
    pub fn get(&self, id: &str) -> HivemindResult<&Agent> {
        self.agents
            .get(id)
            .ok_or_else(|| HivemindError::not_found(EntityKind::Agent, id))
    }

    /// Mutable lookup, `NotFound` if unknown.
    pub fn get_mut(&mut self, id: &str) -> HivemindResult<&mut Agent> {
        self.agents
            .get_mut(id)
            .ok_or_else(|| HivemindError::not_found(EntityKind::Agent, id))
    }

    /// Agents in spawn order.
    pub fn all(&self) -> Vec<&Agent> {
        self.order.iter().filter_map(|id| self.agents.get(id)).collect()
    }

    /// Available agents in spawn order.
    pub fn available(&self) -> Vec<&Agent> {
        self.all().into_iter().filter(|a| a.is_available()).collect()
    }

    /// Agents currently in `status`.
    pub fn count(&self, status: AgentStatus) -> usize {
        self.agents.values().filter(|a| a.status == status).count()
    }

    /// Agents ever spawned, terminated ones included.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent was ever spawned.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Pick an agent for a task with the given requirements.
    ///
    /// Iterates available agents in spawn order and returns the first whose
    /// capabilities cover `required`. Under [`MatchingPolicy::BestEffort`] the
    /// first available agent is returned when nobody qualifies.
    pub fn select(&self, required: &CapabilitySet, policy: MatchingPolicy) -> Option<AgentId> {
        let available = self.available();
        if let Some(agent) = available
            .iter()
            .find(|a| a.capabilities.is_superset_of(required))
        {
            return Some(agent.id.clone());
        }
        match policy {
            MatchingPolicy::Strict => None,
            MatchingPolicy::BestEffort => available.first().map(|a| a.id.clone()),
        }
    }

    /// Mark an available agent busy with `task_id`.
    pub fn occupy(&mut self, agent_id: &str, task_id: &TaskId) -> HivemindResult<()> {
        let agent = self.get_mut(agent_id)?;
        if !agent.status.can_transition_to(AgentStatus::Busy) {
            return Err(HivemindError::invalid_transition(
                EntityKind::Agent,
                agent_id,
                agent.status,
                AgentStatus::Busy,
            ));
        }
        agent.status = AgentStatus::Busy;
        agent.current_task = Some(task_id.clone());
        Ok(())
    }

    /// Return a busy agent to `available`. Releasing an agent that is not
    /// busy is a no-op so terminal-state races resolve quietly.
    pub fn release(&mut self, agent_id: &str) -> HivemindResult<()> {
        let agent = self.get_mut(agent_id)?;
        if agent.status == AgentStatus::Busy {
            agent.status = AgentStatus::Available;
            agent.current_task = None;
        }
        Ok(())
    }

    /// Terminate an agent, returning the task it held, if any.
    pub fn terminate(&mut self, agent_id: &str) -> HivemindResult<Option<TaskId>> {
        let agent = self.get_mut(agent_id)?;
        if agent.status == AgentStatus::Terminated {
            return Err(HivemindError::invalid_transition(
                EntityKind::Agent,
                agent_id,
                agent.status,
                AgentStatus::Terminated,
            ));
        }
        agent.status = AgentStatus::Terminated;
        agent.terminated_at = Some(Utc::now());
        Ok(agent.current_task.take())
    }

    /// Ids of every agent not yet terminated.
    pub fn live_ids(&self) -> Vec<AgentId> {
        self.all()
            .into_iter()
            .filter(|a| a.status != AgentStatus::Terminated)
            .map(|a| a.id.clone())
            .collect()
    }

    /// Fold one finished task into the agent's counters.
    pub fn record_outcome(&mut self, agent_id: &str, success: bool, duration_ms: u64) {
        if let Some(agent) = self.agents.get_mut(agent_id) {
            if success {
                agent.metrics.tasks_completed += 1;
            } else {
                agent.metrics.tasks_failed += 1;
            }
            agent.metrics.total_duration_ms += duration_ms;
        }
    }
}
