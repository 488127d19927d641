//! `hivemind.toml` loading.

use hivemind_core::{HivemindError, HivemindResult};
use hivemind_orchestrator::{CoordinatorConfig, ResourceThresholds};
use hivemind_runtime::{BridgeConfig, ShutdownConfig};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Full binary configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HivemindConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Top-level `[resources]`; takes precedence over `[coordinator.resources]`.
    #[serde(default)]
    pub resources: Option<ResourceThresholds>,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl HivemindConfig {
    /// Read `path`, or fall back to defaults when it does not exist.
    pub fn load(path: &Path) -> HivemindResult<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
            .map_err(|e| HivemindError::Config(format!("{}: {e}", path.display())))
    }

    /// Parse TOML text.
    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Fill a missing bridge credential from the environment.
    pub fn with_env_credential(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        self.bridge = self.bridge.with_env_credential(lookup);
        self
    }

    /// Coordinator settings with the `[resources]` section folded in.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let mut config = self.coordinator.clone();
        if let Some(resources) = &self.resources {
            config.resources = resources.clone();
        }
        config
    }
}
