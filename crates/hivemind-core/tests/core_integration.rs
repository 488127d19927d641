#![allow(clippy::unwrap_used, clippy::expect_used)]

use hivemind_core::*;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// 1. Event wire format
// ---------------------------------------------------------------------------

#[test]
fn event_serializes_with_dotted_topic() {
    let swarm_id = Uuid::new_v4();
    let event = SwarmEvent::new(
        EventTopic::ResourceThresholdExceeded,
        swarm_id,
        serde_json::json!({"breach": {"resource": "memory"}}),
    );

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["topic"], "resource.threshold.exceeded");
    assert_eq!(json["swarm_id"], swarm_id.to_string());

    let back: SwarmEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back.topic, EventTopic::ResourceThresholdExceeded);
    assert_eq!(back.payload["breach"]["resource"], "memory");
}

// ---------------------------------------------------------------------------
// 2. Bus fan-out and per-swarm filtering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_subscriber_sees_every_event() {
    let bus = EventBus::new(16);
    let mut a = bus.subscribe();
    let mut b = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);

    let swarm_id = Uuid::new_v4();
    bus.emit(EventTopic::SwarmCreated, swarm_id, serde_json::json!({}));
    bus.emit(EventTopic::SwarmStarted, swarm_id, serde_json::json!({}));

    for rx in [&mut a, &mut b] {
        assert_eq!(rx.recv().await.unwrap().topic, EventTopic::SwarmCreated);
        assert_eq!(rx.recv().await.unwrap().topic, EventTopic::SwarmStarted);
    }
}

#[tokio::test]
async fn swarm_receiver_skips_other_swarms() {
    let bus = EventBus::default();
    let mine = Uuid::new_v4();
    let theirs = Uuid::new_v4();
    let mut rx = bus.subscribe_swarm(mine);

    bus.emit(EventTopic::TaskCreated, theirs, serde_json::json!({}));
    bus.emit(EventTopic::TaskCreated, mine, serde_json::json!({"n": 1}));
    bus.emit(EventTopic::TaskFailed, theirs, serde_json::json!({}));

    let event = rx.recv().await.unwrap();
    assert_eq!(event.swarm_id, mine);
    assert_eq!(event.payload["n"], 1);
    assert_eq!(rx.try_recv().unwrap_err(), EventBusError::Empty);
}

#[test]
fn publishing_without_subscribers_is_silent() {
    let bus = EventBus::new(4);
    bus.emit(EventTopic::SwarmDeleted, Uuid::new_v4(), serde_json::Value::Null);
    let mut late = bus.subscribe();
    assert!(late.drain().is_empty());
}

#[test]
fn slow_subscriber_loses_oldest_events() {
    let bus = EventBus::new(2);
    let mut rx = bus.subscribe();
    let swarm_id = Uuid::new_v4();
    for _ in 0..5 {
        bus.emit(EventTopic::TaskCompleted, swarm_id, serde_json::json!({}));
    }
    assert!(matches!(rx.try_recv(), Err(EventBusError::Lagged(3))));
    assert_eq!(rx.drain().len(), 2);
}

// ---------------------------------------------------------------------------
// 3. Error classification
// ---------------------------------------------------------------------------

#[test]
fn structural_and_execution_errors_are_disjoint() {
    let structural = [
        HivemindError::not_found(EntityKind::Task, "t-1"),
        HivemindError::capacity("agents", 8),
        HivemindError::invalid_transition(EntityKind::Swarm, "s", "completed", "executing"),
        HivemindError::MissingObjective,
    ];
    for err in &structural {
        assert!(err.is_structural(), "{err}");
        assert!(!err.is_execution(), "{err}");
    }

    let execution = [
        HivemindError::Timeout { after_ms: 10 },
        HivemindError::ExecutionFailed("boom".into()),
        HivemindError::InteractiveHandoffFailed("no tty".into()),
        HivemindError::Http("503".into()),
    ];
    for err in &execution {
        assert!(err.is_execution(), "{err}");
        assert!(!err.is_structural(), "{err}");
    }

    assert!(!HivemindError::MissingCredential("none".into()).is_execution());
}

#[test]
fn error_messages_name_the_entity() {
    let err = HivemindError::invalid_transition(EntityKind::Agent, "agent-coder-1", "terminated", "busy");
    assert_eq!(
        err.to_string(),
        "invalid agent transition for agent-coder-1: terminated -> busy"
    );
    let err = HivemindError::capacity("swarms", 3);
    assert_eq!(err.to_string(), "capacity exceeded: swarms limit is 3");
}

#[test]
fn io_and_json_errors_convert() {
    let io: HivemindError = std::io::Error::other("disk gone").into();
    assert!(matches!(io, HivemindError::Io(_)));
    let json: HivemindError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
    assert!(matches!(json, HivemindError::Json(_)));
}
