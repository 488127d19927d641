use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::Path;

/// Process-environment facts that steer routing and shutdown behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEnvironment {
    /// Both stdin and stdout are attached to a terminal.
    pub interactive_terminal: bool,
    /// `HIVEMIND_HEADLESS` forces automation mode.
    pub forced_headless: bool,
    /// `CI` is set.
    pub ci: bool,
    /// `/.dockerenv`, `container` or `KUBERNETES_SERVICE_HOST` is present.
    pub container: bool,
    /// `HIVEMIND_ENV=production`.
    pub production: bool,
    /// `HIVEMIND_SHUTDOWN_GRACE_MS`.
    pub grace_period_override_ms: Option<u64>,
    /// `HIVEMIND_FORCE_KILL_MS`.
    pub force_kill_override_ms: Option<u64>,
}

impl ExecutionEnvironment {
    /// Inspect the real process environment.
    pub fn detect() -> Self {
        let interactive = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
        let dockerenv = Path::new("/.dockerenv").exists();
        Self::from_lookup(|key| std::env::var(key).ok(), interactive, dockerenv)
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        interactive_terminal: bool,
        dockerenv: bool,
    ) -> Self {
        let flag = |key: &str| lookup(key).is_some_and(|v| truthy(&v));
        let present = |key: &str| lookup(key).is_some_and(|v| !v.trim().is_empty());
        let millis = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            interactive_terminal,
            forced_headless: flag("HIVEMIND_HEADLESS"),
            ci: lookup("CI").is_some_and(|v| !v.trim().is_empty() && !falsy(&v)),
            container: dockerenv || present("container") || present("KUBERNETES_SERVICE_HOST"),
            production: lookup("HIVEMIND_ENV")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("production")),
            grace_period_override_ms: millis("HIVEMIND_SHUTDOWN_GRACE_MS"),
            force_kill_override_ms: millis("HIVEMIND_FORCE_KILL_MS"),
        }
    }

    /// An attended terminal session with no automation indicators.
    pub fn interactive() -> Self {
        Self {
            interactive_terminal: true,
            ..Self::default()
        }
    }

    /// Explicitly forced headless mode.
    pub fn headless() -> Self {
        Self {
            forced_headless: true,
            ..Self::default()
        }
    }

    /// True when nobody is expected to be watching the process.
    pub fn is_automation(&self) -> bool {
        !self.interactive_terminal || self.forced_headless || self.ci || self.container || self.production
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn falsy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
