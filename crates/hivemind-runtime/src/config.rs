use crate::environment::ExecutionEnvironment;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Execution bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Delegated-service credential. Absent means the delegated path is unavailable.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Default execution timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Run the simulated path instead of failing when no credential exists.
    #[serde(default)]
    pub allow_simulated_fallback: bool,
    /// Exit after a unit finishes in an automation context.
    #[serde(default = "default_true")]
    pub exit_on_completion: bool,
    /// Executable launched for the interactive hand-off.
    #[serde(default = "default_interactive_command")]
    pub interactive_command: String,
    #[serde(default)]
    pub interactive_args: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: default_api_base_url(),
            model_id: default_model_id(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            allow_simulated_fallback: false,
            exit_on_completion: true,
            interactive_command: default_interactive_command(),
            interactive_args: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// The credential, if one is set and non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// `timeout_secs` as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Fill an absent key from `HIVEMIND_API_KEY` or `ANTHROPIC_API_KEY`.
    pub fn with_env_credential(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.credential().is_none() {
            self.api_key = lookup("HIVEMIND_API_KEY")
                .or_else(|| lookup("ANTHROPIC_API_KEY"))
                .filter(|k| !k.trim().is_empty());
        }
        self
    }
}

/// Shutdown controller bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long cleanup actions get to settle.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Hard ceiling after which the process exits regardless.
    #[serde(default = "default_force_kill_ms")]
    pub force_kill_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            force_kill_ms: default_force_kill_ms(),
        }
    }
}

impl ShutdownConfig {
    /// How long cleanup may run.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Hard ceiling on the whole shutdown.
    pub fn force_kill(&self) -> Duration {
        Duration::from_millis(self.force_kill_ms)
    }

    /// Apply `HIVEMIND_SHUTDOWN_GRACE_MS` / `HIVEMIND_FORCE_KILL_MS`.
    pub fn with_overrides(mut self, env: &ExecutionEnvironment) -> Self {
        if let Some(ms) = env.grace_period_override_ms {
            self.grace_period_ms = ms;
        }
        if let Some(ms) = env.force_kill_override_ms {
            self.force_kill_ms = ms;
        }
        self
    }
}

fn default_api_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_model_id() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_true() -> bool {
    true
}
fn default_interactive_command() -> String {
    "claude".to_string()
}
fn default_grace_period_ms() -> u64 {
    5000
}
fn default_force_kill_ms() -> u64 {
    10_000
}
