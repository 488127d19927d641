/// Anthropic Messages API.
pub mod delegated;
/// Local interactive session.
pub mod interactive;
/// Deterministic offline output.
pub mod simulated;

use async_trait::async_trait;
use hivemind_core::HivemindResult;
use hivemind_orchestrator::ExecutionOrigin;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use delegated::DelegatedBackend;
pub use interactive::InteractiveBackend;
pub use simulated::SimulatedBackend;

/// One unit of work handed to a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    pub execution_id: Uuid,
    pub objective: String,
    /// Optional framing sent ahead of the objective (e.g. the agent's role).
    #[serde(default)]
    pub context: Option<String>,
}

/// What a backend produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendOutput {
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl BackendOutput {
    /// Plain text with no metadata.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// Trait for execution paths.
///
/// Each path (delegated service, interactive hand-off, simulation) implements
/// this trait. The bridge picks one per unit and tags the result with
/// [`ExecutionBackend::origin`], so a backend must never report an origin it
/// does not actually represent.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn origin(&self) -> ExecutionOrigin;

    async fn run(&self, unit: &WorkUnit) -> HivemindResult<BackendOutput>;
}
