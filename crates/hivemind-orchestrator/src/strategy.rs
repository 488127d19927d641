use crate::capability::{Capability, CapabilitySet};
use crate::types::{AgentSpec, AgentType, TaskDefinition, TaskPriority};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decomposition strategy, selected by the swarm's strategy tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// architecture -> implementation -> testing.
    Development,
    /// review -> analysis.
    Research,
    /// Anything else: one catch-all task.
    Generic(String),
}

impl Strategy {
    /// Parse a strategy tag. Unknown tags map to the catch-all strategy.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Strategy::Development,
            "research" => Strategy::Research,
            other => Strategy::Generic(other.to_string()),
        }
    }

    /// Ordered task list for `objective`.
    pub fn decompose(&self, objective: &str) -> Vec<TaskDefinition> {
        match self {
            Strategy::Development => development_tasks(objective),
            Strategy::Research => research_tasks(objective),
            Strategy::Generic(_) => vec![TaskDefinition::new(
                "Execute objective",
                format!("Complete the following objective end to end: {objective}"),
            )
            .with_type("general")],
        }
    }

    /// Initial agent roster, in spawn order. Callers cap it at the swarm's
    /// agent maximum.
    pub fn roster(&self) -> Vec<AgentSpec> {
        let types: &[AgentType] = match self {
            Strategy::Development => &[AgentType::Architect, AgentType::Developer, AgentType::Tester],
            Strategy::Research => &[AgentType::Researcher, AgentType::Analyst],
            Strategy::Generic(_) => &[AgentType::Coordinator],
        };
        types.iter().copied().map(AgentSpec::new).collect()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Development => f.write_str("development"),
            Strategy::Research => f.write_str("research"),
            Strategy::Generic(tag) => f.write_str(tag),
        }
    }
}

fn development_tasks(objective: &str) -> Vec<TaskDefinition> {
    vec![
        TaskDefinition::new(
            "Architecture",
            format!("Design the architecture and component boundaries for: {objective}"),
        )
        .with_type("architecture")
        .with_priority(TaskPriority::High)
        .requiring(CapabilitySet::new().with(Capability::SystemDesign)),
        TaskDefinition::new("Implementation", format!("Implement: {objective}"))
            .with_type("implementation")
            .with_priority(TaskPriority::Normal)
            .requiring(CapabilitySet::new().with(Capability::CodeGeneration)),
        TaskDefinition::new("Testing", format!("Write and run tests for: {objective}"))
            .with_type("testing")
            .with_priority(TaskPriority::Normal)
            .requiring(CapabilitySet::new().with(Capability::Testing)),
    ]
}

fn research_tasks(objective: &str) -> Vec<TaskDefinition> {
    vec![
        TaskDefinition::new(
            "Literature review",
            format!("Gather and review existing sources on: {objective}"),
        )
        .with_type("research")
        .with_priority(TaskPriority::High)
        .requiring(CapabilitySet::new().with(Capability::Research)),
        TaskDefinition::new(
            "Analysis",
            format!("Analyze the gathered findings and summarize conclusions on: {objective}"),
        )
        .with_type("analysis")
        .requiring(CapabilitySet::new().with(Capability::Analysis)),
    ]
}
