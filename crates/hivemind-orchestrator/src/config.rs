use crate::agent_pool::MatchingPolicy;
use crate::types::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Limits and policies for the swarm coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Global swarm limit.
    #[serde(default = "default_max_swarms")]
    pub max_swarms: usize,
    #[serde(default = "default_max_agents")]
    pub max_agents_per_swarm: usize,
    #[serde(default = "default_max_tasks")]
    pub max_tasks_per_swarm: usize,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    #[serde(default)]
    pub matching_policy: MatchingPolicy,
    /// Interval of the per-swarm health/metrics loop. `0` disables it.
    #[serde(default = "default_housekeeping_secs")]
    pub housekeeping_interval_secs: u64,
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    #[serde(default = "default_strategy")]
    pub default_strategy: String,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub resources: ResourceThresholds,
}

/// Memory/CPU levels above which `resource.threshold.exceeded` is emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceThresholds {
    /// Memory warning threshold.
    #[serde(default = "default_memory_mb")]
    pub memory_threshold_mb: u64,
    /// CPU warning threshold.
    #[serde(default = "default_cpu_percent")]
    pub cpu_threshold_percent: f32,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            memory_threshold_mb: default_memory_mb(),
            cpu_threshold_percent: default_cpu_percent(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_swarms: default_max_swarms(),
            max_agents_per_swarm: default_max_agents(),
            max_tasks_per_swarm: default_max_tasks(),
            task_timeout_secs: default_task_timeout_secs(),
            matching_policy: MatchingPolicy::default(),
            housekeeping_interval_secs: default_housekeeping_secs(),
            log_capacity: default_log_capacity(),
            workspace_root: default_workspace_root(),
            default_strategy: default_strategy(),
            event_capacity: default_event_capacity(),
            resources: ResourceThresholds::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Per-task execution bound.
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// `None` disables housekeeping.
    pub fn housekeeping_interval(&self) -> Option<Duration> {
        (self.housekeeping_interval_secs > 0)
            .then(|| Duration::from_secs(self.housekeeping_interval_secs))
    }

    /// Limits stamped onto every new swarm's context.
    pub fn resource_limits(&self) -> ResourceLimits {
        ResourceLimits {
            max_memory_mb: self.resources.memory_threshold_mb,
            max_cpu_percent: self.resources.cpu_threshold_percent,
            task_timeout_ms: self.task_timeout_secs * 1000,
        }
    }
}

fn default_max_swarms() -> usize {
    10
}
fn default_max_agents() -> usize {
    10
}
fn default_max_tasks() -> usize {
    100
}
fn default_task_timeout_secs() -> u64 {
    300
}
fn default_housekeeping_secs() -> u64 {
    30
}
fn default_log_capacity() -> usize {
    1000
}
fn default_workspace_root() -> PathBuf {
    PathBuf::from("./swarms")
}
fn default_strategy() -> String {
    "auto".to_string()
}
fn default_event_capacity() -> usize {
    1024
}
fn default_memory_mb() -> u64 {
    2048
}
fn default_cpu_percent() -> f32 {
    90.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_swarms, 10);
        assert_eq!(config.matching_policy, MatchingPolicy::BestEffort);
        assert_eq!(config.task_timeout(), Duration::from_secs(300));
        assert_eq!(config.resource_limits().task_timeout_ms, 300_000);
    }

    #[test]
    fn test_partial_deserialize() {
        let config: CoordinatorConfig = serde_json::from_value(serde_json::json!({
            "max_swarms": 2,
            "matching_policy": "strict",
            "housekeeping_interval_secs": 0
        }))
        .unwrap();
        assert_eq!(config.max_swarms, 2);
        assert_eq!(config.max_agents_per_swarm, 10);
        assert_eq!(config.matching_policy, MatchingPolicy::Strict);
        assert!(config.housekeeping_interval().is_none());
    }
}
