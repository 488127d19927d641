use super::{BackendOutput, ExecutionBackend, WorkUnit};
use crate::config::BridgeConfig;
use async_trait::async_trait;
use hivemind_core::{HivemindError, HivemindResult};
use hivemind_orchestrator::ExecutionOrigin;
use std::process::Stdio;

/// Interactive hand-off: runs a local CLI session attached to this terminal.
///
/// The session owns stdin/stdout until it exits, so nothing is captured; the
/// output only records how the session ended.
pub struct InteractiveBackend {
    command: String,
    args: Vec<String>,
}

impl InteractiveBackend {
    /// Run `command <objective>`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Arguments placed before the objective.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Command and arguments from the bridge config.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.interactive_command.clone()).with_args(config.interactive_args.clone())
    }
}

#[async_trait]
impl ExecutionBackend for InteractiveBackend {
    fn origin(&self) -> ExecutionOrigin {
        ExecutionOrigin::Interactive
    }

    async fn run(&self, unit: &WorkUnit) -> HivemindResult<BackendOutput> {
        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.args(&self.args)
            .arg(&unit.objective)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        tracing::info!(
            execution_id = %unit.execution_id,
            command = %self.command,
            "Handing off to interactive session"
        );

        let status = cmd.status().await.map_err(|e| {
            HivemindError::InteractiveHandoffFailed(format!(
                "failed to launch '{}': {e}",
                self.command
            ))
        })?;

        if !status.success() {
            return Err(HivemindError::InteractiveHandoffFailed(format!(
                "'{}' exited with code {}",
                self.command,
                status.code().unwrap_or(-1)
            )));
        }

        Ok(BackendOutput {
            content: format!("Interactive session '{}' completed", self.command),
            metadata: serde_json::json!({ "exit_code": status.code() }),
        })
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn unit() -> WorkUnit {
        WorkUnit {
            execution_id: Uuid::new_v4(),
            objective: "objective".into(),
            context: None,
        }
    }

    #[tokio::test]
    async fn test_successful_session() {
        let out = InteractiveBackend::new("true").run(&unit()).await.unwrap();
        assert_eq!(out.metadata["exit_code"], 0);
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let err = InteractiveBackend::new("false").run(&unit()).await.unwrap_err();
        assert!(matches!(err, HivemindError::InteractiveHandoffFailed(_)));
    }

    #[tokio::test]
    async fn test_missing_command_fails() {
        let err = InteractiveBackend::new("hivemind-no-such-command")
            .run(&unit())
            .await
            .unwrap_err();
        assert!(matches!(err, HivemindError::InteractiveHandoffFailed(_)));
    }
}
