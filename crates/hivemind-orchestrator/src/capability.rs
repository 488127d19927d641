use crate::types::AgentType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single named capability an agent may declare and a task may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CodeGeneration,
    CodeReview,
    Testing,
    Documentation,
    Research,
    Analysis,
    WebSearch,
    ApiIntegration,
    FileSystem,
    TerminalAccess,
    SystemDesign,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 11] = [
        Capability::CodeGeneration,
        Capability::CodeReview,
        Capability::Testing,
        Capability::Documentation,
        Capability::Research,
        Capability::Analysis,
        Capability::WebSearch,
        Capability::ApiIntegration,
        Capability::FileSystem,
        Capability::TerminalAccess,
        Capability::SystemDesign,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::CodeGeneration => "code_generation",
            Capability::CodeReview => "code_review",
            Capability::Testing => "testing",
            Capability::Documentation => "documentation",
            Capability::Research => "research",
            Capability::Analysis => "analysis",
            Capability::WebSearch => "web_search",
            Capability::ApiIntegration => "api_integration",
            Capability::FileSystem => "file_system",
            Capability::TerminalAccess => "terminal_access",
            Capability::SystemDesign => "system_design",
        };
        f.write_str(name)
    }
}

/// A closed set of [`Capability`] flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// The empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`CapabilitySet::insert`].
    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    /// Add a capability; `false` if it was already present.
    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    /// Whether `capability` is in the set.
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// True when every capability in `required` is also present here.
    /// The empty set is satisfied by any agent.
    pub fn is_superset_of(&self, required: &CapabilitySet) -> bool {
        self.0.is_superset(&required.0)
    }

    /// Capabilities in `required` that this set lacks.
    pub fn missing(&self, required: &CapabilitySet) -> Vec<Capability> {
        required.0.difference(&self.0).copied().collect()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of capabilities.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Members in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Default capability profile for an agent type.
    pub fn for_agent_type(agent_type: AgentType) -> Self {
        use Capability::*;
        let caps: &[Capability] = match agent_type {
            AgentType::Coordinator => &[Analysis, Documentation, Research, SystemDesign],
            AgentType::Architect => &[SystemDesign, Analysis, Documentation, CodeReview],
            AgentType::Developer => &[CodeGeneration, FileSystem, TerminalAccess, ApiIntegration],
            AgentType::Tester => &[Testing, CodeReview, FileSystem, TerminalAccess],
            AgentType::Reviewer => &[CodeReview, Analysis, Documentation],
            AgentType::Researcher => &[Research, WebSearch, Analysis, Documentation],
            AgentType::Analyst => &[Analysis, Research, Documentation],
            AgentType::Documenter => &[Documentation, FileSystem],
        };
        caps.iter().copied().collect()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
