use crate::backends::{
    BackendOutput, DelegatedBackend, ExecutionBackend, InteractiveBackend, SimulatedBackend,
    WorkUnit,
};
use crate::config::BridgeConfig;
use crate::environment::ExecutionEnvironment;
use crate::registry::{ExecutionInfo, ExecutionRegistry};
use crate::shutdown::{ShutdownController, ShutdownReason};
use async_trait::async_trait;
use hivemind_core::{fault, HivemindError, HivemindResult};
use hivemind_orchestrator::{Agent, ExecutionOrigin, Task, TaskExecutor, TaskOutput};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A unit of work for [`ExecutionBridge::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    /// What to do. Must not be blank.
    pub objective: String,
    /// Framing sent ahead of the objective.
    pub context: Option<String>,
    /// Overrides the configured timeout.
    pub timeout: Option<Duration>,
    /// Overrides `exit_on_completion`.
    pub exit_on_completion: Option<bool>,
    /// Overrides `allow_simulated_fallback`.
    pub allow_simulated_fallback: Option<bool>,
}

impl ExecutionRequest {
    /// Request with every setting taken from the bridge config.
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            ..Self::default()
        }
    }

    /// Attach framing for the objective.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Override the configured timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Never trigger the completion-exit path for this unit.
    pub fn without_exit(mut self) -> Self {
        self.exit_on_completion = Some(false);
        self
    }

    /// Allow or forbid the simulated path for this unit.
    pub fn with_simulated_fallback(mut self, allow: bool) -> Self {
        self.allow_simulated_fallback = Some(allow);
        self
    }
}

/// Normalized result of one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Registry id of the execution.
    pub execution_id: Uuid,
    /// Which path actually produced the content.
    pub origin: ExecutionOrigin,
    /// Text produced by the path.
    pub content: String,
    /// Wall-clock time including any wait for the terminal.
    pub duration_ms: u64,
    /// Path-specific details such as token usage.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Picks and runs exactly one execution path per unit of work.
///
/// Routing, first match wins:
/// 1. a credential is configured: delegated service;
/// 2. automation context without a credential: delegated service, which
///    fails with `MissingCredential` unless the simulated fallback is allowed;
/// 3. otherwise: interactive hand-off, falling back to the delegated service
///    when the hand-off fails and a credential exists.
///
/// Interactive hand-offs run one at a time; a queued hand-off spends its
/// wait inside its own timeout.
#[derive(Clone)]
pub struct ExecutionBridge {
    config: Arc<BridgeConfig>,
    env: ExecutionEnvironment,
    delegated: Option<Arc<dyn ExecutionBackend>>,
    interactive: Arc<dyn ExecutionBackend>,
    simulated: Arc<dyn ExecutionBackend>,
    registry: Arc<ExecutionRegistry>,
    /// One interactive session at a time: they all share this terminal.
    terminal: Arc<tokio::sync::Mutex<()>>,
    shutdown: Option<ShutdownController>,
}

impl ExecutionBridge {
    /// Build the default backends from config. The delegated backend is only
    /// created when a credential is present.
    pub fn new(config: BridgeConfig, env: ExecutionEnvironment) -> HivemindResult<Self> {
        let delegated: Option<Arc<dyn ExecutionBackend>> = match config.credential() {
            Some(_) => Some(Arc::new(DelegatedBackend::from_config(&config)?)),
            None => None,
        };
        let interactive = Arc::new(InteractiveBackend::from_config(&config));
        Ok(Self {
            config: Arc::new(config),
            env,
            delegated,
            interactive,
            simulated: Arc::new(SimulatedBackend),
            registry: Arc::new(ExecutionRegistry::new()),
            terminal: Arc::new(tokio::sync::Mutex::new(())),
            shutdown: None,
        })
    }

    /// Replace the delegated-service backend.
    pub fn with_delegated(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.delegated = Some(backend);
        self
    }

    /// Replace the interactive hand-off backend.
    pub fn with_interactive(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.interactive = backend;
        self
    }

    /// Replace the simulated backend.
    pub fn with_simulated(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.simulated = backend;
        self
    }

    /// Controller notified through the completion-exit path.
    pub fn with_shutdown(mut self, controller: ShutdownController) -> Self {
        self.shutdown = Some(controller);
        self
    }

    /// Detected execution context.
    pub fn environment(&self) -> &ExecutionEnvironment {
        &self.env
    }

    /// Whether a delegated backend is available.
    pub fn has_credential(&self) -> bool {
        self.delegated.is_some()
    }

    /// Executions currently in flight.
    pub fn active_executions(&self) -> Vec<ExecutionInfo> {
        self.registry.list()
    }

    /// Abort an in-flight execution. Its caller sees `ExecutionFailed`.
    pub fn cancel(&self, execution_id: Uuid) -> HivemindResult<()> {
        self.registry.cancel(execution_id)
    }

    /// Abort every in-flight execution.
    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }

    /// The path the routing policy would try first.
    pub fn planned_origin(&self) -> ExecutionOrigin {
        if self.delegated.is_some() || self.env.is_automation() {
            ExecutionOrigin::Delegated
        } else {
            ExecutionOrigin::Interactive
        }
    }

    /// Run one unit of work under a timeout.
    ///
    /// On timeout the in-flight call is abandoned, not killed: it keeps
    /// running in the background and its eventual result is only logged.
    pub async fn execute(&self, request: ExecutionRequest) -> HivemindResult<ExecutionReport> {
        let objective = request.objective.trim();
        if objective.is_empty() {
            return Err(HivemindError::MissingObjective);
        }

        let execution_id = Uuid::new_v4();
        let timeout = request.timeout.unwrap_or_else(|| self.config.timeout());
        let allow_simulated = request
            .allow_simulated_fallback
            .unwrap_or(self.config.allow_simulated_fallback);
        let unit = WorkUnit {
            execution_id,
            objective: objective.to_string(),
            context: request.context.clone(),
        };

        let planned = self.planned_origin();
        self.registry.register(execution_id, objective, planned);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        info!(execution_id = %execution_id, planned = %planned, timeout_ms, "Execution started");

        let started = Instant::now();
        let this = self.clone();
        let mut handle = tokio::spawn(fault::contain(async move { this.route(&unit, allow_simulated).await }));
        self.registry.attach(execution_id, handle.abort_handle());

        let outcome = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_cancelled() => Err(HivemindError::ExecutionFailed(
                format!("execution {execution_id} was cancelled"),
            )),
            Ok(Err(join_err)) => Err(HivemindError::ExecutionFailed(format!(
                "execution {execution_id} panicked: {join_err}"
            ))),
            Err(_) => {
                warn!(execution_id = %execution_id, "Execution timed out, abandoning in-flight call");
                tokio::spawn(async move {
                    if let Ok(late) = handle.await {
                        debug!(
                            execution_id = %execution_id,
                            ok = late.is_ok(),
                            "Abandoned execution finished, result discarded"
                        );
                    }
                });
                Err(HivemindError::Timeout { after_ms: timeout_ms })
            }
        };
        self.registry.remove(execution_id);

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = outcome
            .map(|(origin, output)| ExecutionReport {
                execution_id,
                origin,
                content: output.content,
                duration_ms,
                metadata: output.metadata,
            })
            .map_err(normalize);

        match &report {
            Ok(r) => info!(execution_id = %execution_id, origin = %r.origin, duration_ms, "Execution finished"),
            Err(e) => warn!(execution_id = %execution_id, error = %e, duration_ms, "Execution failed"),
        }

        let exit = request
            .exit_on_completion
            .unwrap_or(self.config.exit_on_completion);
        if exit && self.env.is_automation() {
            if let Some(controller) = &self.shutdown {
                controller.request(ShutdownReason::Completed {
                    success: report.is_ok(),
                });
            }
        }
        report
    }

    async fn route(
        &self,
        unit: &WorkUnit,
        allow_simulated: bool,
    ) -> HivemindResult<(ExecutionOrigin, BackendOutput)> {
        if self.delegated.is_some() || self.env.is_automation() {
            return self.run_delegated(unit, allow_simulated).await;
        }

        let handoff = {
            let _terminal = self.terminal.lock().await;
            self.interactive.run(unit).await
        };
        match handoff {
            Ok(output) => Ok((self.interactive.origin(), output)),
            Err(e) => {
                warn!(execution_id = %unit.execution_id, error = %e, "Interactive hand-off failed");
                if self.delegated.is_some() {
                    return self.run_delegated(unit, allow_simulated).await;
                }
                Err(match e {
                    HivemindError::InteractiveHandoffFailed(_) => e,
                    other => HivemindError::InteractiveHandoffFailed(other.to_string()),
                })
            }
        }
    }

    async fn run_delegated(
        &self,
        unit: &WorkUnit,
        allow_simulated: bool,
    ) -> HivemindResult<(ExecutionOrigin, BackendOutput)> {
        match &self.delegated {
            Some(backend) => Ok((backend.origin(), backend.run(unit).await?)),
            None if allow_simulated => {
                info!(execution_id = %unit.execution_id, "No credential configured, running simulated path");
                let output = self.simulated.run(unit).await?;
                Ok((ExecutionOrigin::Simulated, output))
            }
            None => Err(HivemindError::MissingCredential(
                "delegated path selected but no API key is configured".into(),
            )),
        }
    }
}

/// Map backend failures onto the bridge's error taxonomy.
fn normalize(err: HivemindError) -> HivemindError {
    match err {
        HivemindError::MissingObjective
        | HivemindError::MissingCredential(_)
        | HivemindError::Timeout { .. }
        | HivemindError::ExecutionFailed(_)
        | HivemindError::InteractiveHandoffFailed(_) => err,
        other => HivemindError::ExecutionFailed(other.to_string()),
    }
}

/// Quality estimate attached to bridge-produced task output.
fn quality_for(origin: ExecutionOrigin, content: &str) -> f64 {
    match origin {
        ExecutionOrigin::Simulated => 0.5,
        _ if content.trim().is_empty() => 0.0,
        _ => 1.0,
    }
}

#[async_trait]
impl TaskExecutor for ExecutionBridge {
    async fn execute(&self, task: &Task, agent: &Agent) -> HivemindResult<TaskOutput> {
        let request = ExecutionRequest::new(format!("{}\n\n{}", task.name, task.description))
            .with_context(format!(
                "You are the {} agent '{}' working on a {} task.",
                agent.agent_type, agent.name, task.task_type
            ))
            .without_exit();
        let report = ExecutionBridge::execute(self, request).await?;
        let quality = quality_for(report.origin, &report.content);
        Ok(TaskOutput::new(report.content, report.origin)
            .with_quality(quality)
            .with_metadata(serde_json::json!({
                "execution_id": report.execution_id,
                "duration_ms": report.duration_ms,
                "backend": report.metadata,
            })))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_wraps_transport_errors() {
        let err = normalize(HivemindError::Http("502".into()));
        assert!(matches!(err, HivemindError::ExecutionFailed(_)));
        let err = normalize(HivemindError::Timeout { after_ms: 5 });
        assert!(matches!(err, HivemindError::Timeout { .. }));
    }

    #[test]
    fn test_quality() {
        assert_eq!(quality_for(ExecutionOrigin::Simulated, "x"), 0.5);
        assert_eq!(quality_for(ExecutionOrigin::Delegated, " "), 0.0);
        assert_eq!(quality_for(ExecutionOrigin::Delegated, "done"), 1.0);
    }

    #[test]
    fn test_planned_origin() {
        let bridge =
            ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::interactive())
                .unwrap();
        assert_eq!(bridge.planned_origin(), ExecutionOrigin::Interactive);
        assert!(!bridge.has_credential());

        let bridge =
            ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::headless()).unwrap();
        assert_eq!(bridge.planned_origin(), ExecutionOrigin::Delegated);
    }

    #[tokio::test]
    async fn test_empty_objective_rejected() {
        let bridge =
            ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::headless()).unwrap();
        let err = bridge.execute(ExecutionRequest::new("  \n")).await.unwrap_err();
        assert!(matches!(err, HivemindError::MissingObjective));
        assert!(bridge.active_executions().is_empty());
    }
}
