use super::{BackendOutput, ExecutionBackend, WorkUnit};
use async_trait::async_trait;
use hivemind_core::HivemindResult;
use hivemind_orchestrator::ExecutionOrigin;

/// Deterministic scripted output. Only ever reachable through the explicit
/// fallback opt-in, and always tagged [`ExecutionOrigin::Simulated`].
#[derive(Default)]
pub struct SimulatedBackend;

#[async_trait]
impl ExecutionBackend for SimulatedBackend {
    fn origin(&self) -> ExecutionOrigin {
        ExecutionOrigin::Simulated
    }

    async fn run(&self, unit: &WorkUnit) -> HivemindResult<BackendOutput> {
        let mut content = String::from("[SIMULATED] No delegated service was contacted.\n");
        if let Some(context) = &unit.context {
            content.push_str(&format!("Context: {context}\n"));
        }
        content.push_str(&format!("Objective: {}\n", unit.objective));
        content.push_str("Steps: analyse the objective, plan the work, produce a draft, review.");
        Ok(BackendOutput {
            content,
            metadata: serde_json::json!({ "simulated": true }),
        })
    }
}
