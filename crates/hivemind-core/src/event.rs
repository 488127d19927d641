use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Closed set of lifecycle topics emitted by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    #[serde(rename = "swarm.created")]
    SwarmCreated,
    #[serde(rename = "swarm.started")]
    SwarmStarted,
    #[serde(rename = "swarm.paused")]
    SwarmPaused,
    #[serde(rename = "swarm.resumed")]
    SwarmResumed,
    #[serde(rename = "swarm.completed")]
    SwarmCompleted,
    #[serde(rename = "swarm.stopped")]
    SwarmStopped,
    #[serde(rename = "swarm.deleted")]
    SwarmDeleted,
    #[serde(rename = "agent.spawned")]
    AgentSpawned,
    #[serde(rename = "agent.terminated")]
    AgentTerminated,
    #[serde(rename = "task.created")]
    TaskCreated,
    #[serde(rename = "task.assigned")]
    TaskAssigned,
    #[serde(rename = "task.paused")]
    TaskPaused,
    #[serde(rename = "task.cancelled")]
    TaskCancelled,
    #[serde(rename = "task.completed")]
    TaskCompleted,
    #[serde(rename = "task.failed")]
    TaskFailed,
    #[serde(rename = "resource.threshold.exceeded")]
    ResourceThresholdExceeded,
}

impl EventTopic {
    /// Dotted wire name, e.g. `task.failed`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTopic::SwarmCreated => "swarm.created",
            EventTopic::SwarmStarted => "swarm.started",
            EventTopic::SwarmPaused => "swarm.paused",
            EventTopic::SwarmResumed => "swarm.resumed",
            EventTopic::SwarmCompleted => "swarm.completed",
            EventTopic::SwarmStopped => "swarm.stopped",
            EventTopic::SwarmDeleted => "swarm.deleted",
            EventTopic::AgentSpawned => "agent.spawned",
            EventTopic::AgentTerminated => "agent.terminated",
            EventTopic::TaskCreated => "task.created",
            EventTopic::TaskAssigned => "task.assigned",
            EventTopic::TaskPaused => "task.paused",
            EventTopic::TaskCancelled => "task.cancelled",
            EventTopic::TaskCompleted => "task.completed",
            EventTopic::TaskFailed => "task.failed",
            EventTopic::ResourceThresholdExceeded => "resource.threshold.exceeded",
        }
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmEvent {
    pub topic: EventTopic,
    pub swarm_id: Uuid,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl SwarmEvent {
    /// Event stamped with the current time.
    pub fn new(topic: EventTopic, swarm_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            topic,
            swarm_id,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Receive-side errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventBusError {
    #[error("event bus closed")]
    Closed,
    #[error("receiver lagged by {0} events")]
    Lagged(u64),
    #[error("no event available")]
    Empty,
}

/// Broadcast bus for [`SwarmEvent`]s.
///
/// Publishing never blocks and never fails; events published while nobody
/// is subscribed are dropped. Slow subscribers lose the oldest events once
/// the channel capacity is exhausted and observe [`EventBusError::Lagged`].
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SwarmEvent>,
}

impl EventBus {
    /// Bus whose subscribers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send to every subscriber. No subscribers is not an error.
    pub fn publish(&self, event: SwarmEvent) {
        debug!(topic = %event.topic, swarm_id = %event.swarm_id, "Publishing event");
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    /// Convenience wrapper building the event in place.
    pub fn emit(&self, topic: EventTopic, swarm_id: Uuid, payload: serde_json::Value) {
        self.publish(SwarmEvent::new(topic, swarm_id, payload));
    }

    /// Subscribe to every event on the bus.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of a single swarm.
    pub fn subscribe_swarm(&self, swarm_id: Uuid) -> SwarmEventReceiver {
        SwarmEventReceiver {
            inner: self.subscribe(),
            swarm_id,
        }
    }

    /// Live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Receiver for all events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<SwarmEvent>,
}

impl EventReceiver {
    /// Wait for the next event. `Lagged` reports events lost to overflow.
    pub async fn recv(&mut self) -> Result<SwarmEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Next buffered event, or `Empty`.
    pub fn try_recv(&mut self) -> Result<SwarmEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Drain every event currently buffered for this receiver.
    pub fn drain(&mut self) -> Vec<SwarmEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(event) => events.push(event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }
}

/// Receiver filtered to one swarm.
pub struct SwarmEventReceiver {
    inner: EventReceiver,
    swarm_id: Uuid,
}

impl SwarmEventReceiver {
    /// Wait for the next event for this swarm.
    pub async fn recv(&mut self) -> Result<SwarmEvent, EventBusError> {
        loop {
            let event = self.inner.recv().await?;
            if event.swarm_id == self.swarm_id {
                return Ok(event);
            }
        }
    }

    /// Next buffered event for this swarm, skipping other swarms' events.
    pub fn try_recv(&mut self) -> Result<SwarmEvent, EventBusError> {
        loop {
            let event = self.inner.try_recv()?;
            if event.swarm_id == self.swarm_id {
                return Ok(event);
            }
        }
    }

    /// The swarm this receiver is filtered to.
    pub fn swarm_id(&self) -> Uuid {
        self.swarm_id
    }
}
