use chrono::{DateTime, Utc};
use hivemind_core::{EntityKind, HivemindError, HivemindResult};
use hivemind_orchestrator::ExecutionOrigin;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Public view of an in-flight execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub id: Uuid,
    pub objective: String,
    pub planned_origin: ExecutionOrigin,
    pub started_at: DateTime<Utc>,
}

struct ActiveExecution {
    info: ExecutionInfo,
    abort: Option<AbortHandle>,
}

/// Registry of in-flight bridge executions, queryable and cancellable by id.
#[derive(Default)]
pub struct ExecutionRegistry {
    active: Mutex<HashMap<Uuid, ActiveExecution>>,
}

impl ExecutionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new execution. Its abort handle is attached separately.
    pub fn register(&self, id: Uuid, objective: &str, planned_origin: ExecutionOrigin) {
        let info = ExecutionInfo {
            id,
            objective: objective.chars().take(200).collect(),
            planned_origin,
            started_at: Utc::now(),
        };
        self.active
            .lock()
            .insert(id, ActiveExecution { info, abort: None });
    }

    /// Attach the handle used by [`ExecutionRegistry::cancel`].
    pub fn attach(&self, id: Uuid, abort: AbortHandle) {
        if let Some(entry) = self.active.lock().get_mut(&id) {
            entry.abort = Some(abort);
        }
    }

    /// Forget an execution; `false` if it was unknown.
    pub fn remove(&self, id: Uuid) -> bool {
        self.active.lock().remove(&id).is_some()
    }

    /// Snapshot of one execution.
    pub fn get(&self, id: Uuid) -> Option<ExecutionInfo> {
        self.active.lock().get(&id).map(|e| e.info.clone())
    }

    /// Snapshot ordered by start time.
    pub fn list(&self) -> Vec<ExecutionInfo> {
        let mut all: Vec<ExecutionInfo> = self.active.lock().values().map(|e| e.info.clone()).collect();
        all.sort_by_key(|i| i.started_at);
        all
    }

    /// Executions in flight.
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }

    /// Abort an in-flight execution and drop it from the registry.
    pub fn cancel(&self, id: Uuid) -> HivemindResult<()> {
        let entry = self
            .active
            .lock()
            .remove(&id)
            .ok_or_else(|| HivemindError::not_found(EntityKind::Execution, id.to_string()))?;
        if let Some(abort) = entry.abort {
            abort.abort();
        }
        tracing::info!(execution_id = %id, "Execution cancelled");
        Ok(())
    }

    /// Abort everything still registered. Returns how many were aborted.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<ActiveExecution> = self.active.lock().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            if let Some(abort) = &entry.abort {
                abort.abort();
            }
        }
        drained.len()
    }
}
