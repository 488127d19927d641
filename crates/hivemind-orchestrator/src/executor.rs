use crate::types::{Agent, ExecutionOrigin, Task};
use async_trait::async_trait;
use hivemind_core::HivemindResult;
use serde::{Deserialize, Serialize};

/// Output of one executed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    pub content: String,
    /// Quality estimate in `[0.0, 1.0]`.
    pub quality_score: f64,
    pub origin: ExecutionOrigin,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl TaskOutput {
    /// Output with the default quality score.
    pub fn new(content: impl Into<String>, origin: ExecutionOrigin) -> Self {
        Self {
            content: content.into(),
            quality_score: 1.0,
            origin,
            metadata: serde_json::Value::Null,
        }
    }

    /// Set the quality score, clamped to `0.0..=1.0`.
    pub fn with_quality(mut self, score: f64) -> Self {
        self.quality_score = score.clamp(0.0, 1.0);
        self
    }

    /// Attach executor-specific details.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Performs one unit of delegated work for a task on behalf of an agent.
///
/// The coordinator calls this without holding any of its locks, so
/// implementations may be slow. They must be safe to invoke concurrently
/// for distinct task/agent pairs.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, agent: &Agent) -> HivemindResult<TaskOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_is_clamped() {
        let out = TaskOutput::new("x", ExecutionOrigin::Delegated).with_quality(3.5);
        assert_eq!(out.quality_score, 1.0);
        let out = TaskOutput::new("x", ExecutionOrigin::Delegated).with_quality(-1.0);
        assert_eq!(out.quality_score, 0.0);
    }
}
