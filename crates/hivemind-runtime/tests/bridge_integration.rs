//! Execution bridge tests: routing, simulated opt-in, the delegated service
//! over HTTP, timeouts, cancellation and the completion-exit path.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use hivemind_core::{HivemindError, HivemindResult};
use hivemind_orchestrator::{
    CoordinatorConfig, ExecutionOrigin, SwarmCoordinator, SwarmOptions, SwarmStatus,
};
use hivemind_runtime::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Backend that never answers.
struct StalledBackend;

#[async_trait]
impl ExecutionBackend for StalledBackend {
    fn origin(&self) -> ExecutionOrigin {
        ExecutionOrigin::Delegated
    }

    async fn run(&self, _unit: &WorkUnit) -> HivemindResult<BackendOutput> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(BackendOutput::text("too late"))
    }
}

/// Backend with a fixed answer, tagged with whatever origin it is given.
struct FixedBackend {
    origin: ExecutionOrigin,
    result: Result<&'static str, &'static str>,
}

#[async_trait]
impl ExecutionBackend for FixedBackend {
    fn origin(&self) -> ExecutionOrigin {
        self.origin
    }

    async fn run(&self, _unit: &WorkUnit) -> HivemindResult<BackendOutput> {
        match self.result {
            Ok(text) => Ok(BackendOutput::text(text)),
            Err(msg) => Err(HivemindError::InteractiveHandoffFailed(msg.into())),
        }
    }
}

/// Interactive backend that records how many sessions overlap.
#[derive(Default)]
struct SessionBackend {
    active: AtomicUsize,
    peak: AtomicUsize,
    runs: AtomicUsize,
}

#[async_trait]
impl ExecutionBackend for SessionBackend {
    fn origin(&self) -> ExecutionOrigin {
        ExecutionOrigin::Interactive
    }

    async fn run(&self, _unit: &WorkUnit) -> HivemindResult<BackendOutput> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(BackendOutput::text("session ended"))
    }
}

fn recorder() -> (ExitHook, Arc<Mutex<Vec<i32>>>) {
    let codes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&codes);
    (Arc::new(move |code| sink.lock().push(code)), codes)
}

fn quick_shutdown() -> ShutdownConfig {
    ShutdownConfig {
        grace_period_ms: 200,
        force_kill_ms: 400,
    }
}

fn messages_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "msg_1",
        "type": "message",
        "role": "assistant",
        "model": "claude-sonnet-4-20250514",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 12, "output_tokens": 34}
    })
}

fn keyed_config(base_url: &str) -> BridgeConfig {
    BridgeConfig {
        api_key: Some("sk-test".into()),
        api_base_url: base_url.into(),
        ..BridgeConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_objective_fails_before_any_path_runs() {
    let bridge =
        ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::interactive()).unwrap();
    let err = bridge.execute(ExecutionRequest::new("")).await.unwrap_err();
    assert!(matches!(err, HivemindError::MissingObjective));
}

#[tokio::test]
async fn test_headless_without_credential_fails() {
    let bridge =
        ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::headless()).unwrap();
    let err = bridge
        .execute(ExecutionRequest::new("write docs").without_exit())
        .await
        .unwrap_err();
    assert!(matches!(err, HivemindError::MissingCredential(_)));
}

#[tokio::test]
async fn test_simulated_output_only_with_opt_in() {
    let bridge =
        ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::headless()).unwrap();
    let report = bridge
        .execute(
            ExecutionRequest::new("write docs")
                .without_exit()
                .with_simulated_fallback(true),
        )
        .await
        .unwrap();
    assert_eq!(report.origin, ExecutionOrigin::Simulated);
    assert!(report.content.contains("write docs"));
}

#[tokio::test]
async fn test_interactive_context_hands_off() {
    let bridge = ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::interactive())
        .unwrap()
        .with_interactive(Arc::new(FixedBackend {
            origin: ExecutionOrigin::Interactive,
            result: Ok("session ended"),
        }));
    let report = bridge.execute(ExecutionRequest::new("refactor")).await.unwrap();
    assert_eq!(report.origin, ExecutionOrigin::Interactive);
}

#[tokio::test]
async fn test_failed_hand_off_without_credential() {
    let bridge = ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::interactive())
        .unwrap()
        .with_interactive(Arc::new(FixedBackend {
            origin: ExecutionOrigin::Interactive,
            result: Err("not installed"),
        }));
    let err = bridge.execute(ExecutionRequest::new("refactor")).await.unwrap_err();
    assert!(matches!(err, HivemindError::InteractiveHandoffFailed(_)));
}

#[tokio::test]
async fn test_interactive_sessions_never_overlap() {
    let sessions = Arc::new(SessionBackend::default());
    let bridge = ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::interactive())
        .unwrap()
        .with_interactive(sessions.clone());

    let (a, b, c) = tokio::join!(
        bridge.execute(ExecutionRequest::new("design")),
        bridge.execute(ExecutionRequest::new("implement")),
        bridge.execute(ExecutionRequest::new("test")),
    );
    for report in [a, b, c] {
        assert_eq!(report.unwrap().origin, ExecutionOrigin::Interactive);
    }
    assert_eq!(sessions.runs.load(Ordering::SeqCst), 3);
    assert_eq!(sessions.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_credential_wins_over_interactive_terminal() {
    let bridge = ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::interactive())
        .unwrap()
        .with_delegated(Arc::new(FixedBackend {
            origin: ExecutionOrigin::Delegated,
            result: Ok("api answer"),
        }))
        .with_interactive(Arc::new(FixedBackend {
            origin: ExecutionOrigin::Interactive,
            result: Err("must not run"),
        }));
    let report = bridge.execute(ExecutionRequest::new("refactor")).await.unwrap();
    assert_eq!(report.origin, ExecutionOrigin::Delegated);
    assert_eq!(report.content, "api answer");
}

// ---------------------------------------------------------------------------
// Delegated service over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_delegated_service_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(messages_body("the plan")))
        .expect(1)
        .mount(&server)
        .await;

    let bridge =
        ExecutionBridge::new(keyed_config(&server.uri()), ExecutionEnvironment::headless()).unwrap();
    let report = bridge
        .execute(ExecutionRequest::new("plan the release").without_exit())
        .await
        .unwrap();

    assert_eq!(report.origin, ExecutionOrigin::Delegated);
    assert_eq!(report.content, "the plan");
    assert_eq!(report.metadata["output_tokens"], 34);
    assert!(bridge.active_executions().is_empty());
}

#[tokio::test]
async fn test_delegated_service_error_is_execution_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(serde_json::json!({"error": {"message": "overloaded"}})),
        )
        .mount(&server)
        .await;

    let bridge =
        ExecutionBridge::new(keyed_config(&server.uri()), ExecutionEnvironment::headless()).unwrap();
    let err = bridge
        .execute(
            ExecutionRequest::new("plan the release")
                .without_exit()
                .with_simulated_fallback(true),
        )
        .await
        .unwrap_err();
    // A configured credential never degrades to simulation.
    assert!(matches!(err, HivemindError::ExecutionFailed(_)));
}

#[tokio::test]
async fn test_non_json_error_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(502)
                .set_body_raw("<html><body>Bad Gateway</body></html>", "text/html"),
        )
        .mount(&server)
        .await;

    let bridge =
        ExecutionBridge::new(keyed_config(&server.uri()), ExecutionEnvironment::headless()).unwrap();
    let err = bridge
        .execute(ExecutionRequest::new("plan the release").without_exit())
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, HivemindError::ExecutionFailed(_)));
    assert!(message.contains("502"), "{message}");
    assert!(message.contains("Bad Gateway"), "{message}");
}

// ---------------------------------------------------------------------------
// Timeout and cancellation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_timeout_abandons_call() {
    let bridge = ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::headless())
        .unwrap()
        .with_delegated(Arc::new(StalledBackend));
    let err = bridge
        .execute(
            ExecutionRequest::new("slow work")
                .without_exit()
                .with_timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HivemindError::Timeout { after_ms: 2000 }));
    assert!(bridge.active_executions().is_empty());
}

#[tokio::test]
async fn test_cancel_in_flight_execution() {
    let bridge = ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::headless())
        .unwrap()
        .with_delegated(Arc::new(StalledBackend));

    let runner = bridge.clone();
    let pending = tokio::spawn(async move {
        runner
            .execute(ExecutionRequest::new("long work").without_exit())
            .await
    });

    let mut active = Vec::new();
    for _ in 0..200 {
        active = bridge.active_executions();
        if !active.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].objective, "long work");

    bridge.cancel(active[0].id).unwrap();
    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, HivemindError::ExecutionFailed(_)));
    assert!(bridge.cancel(active[0].id).is_err());
}

// ---------------------------------------------------------------------------
// Completion exit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_headless_completion_requests_exit() {
    let (hook, codes) = recorder();
    let controller = ShutdownController::with_exit_hook(quick_shutdown(), hook);
    let bridge = ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::headless())
        .unwrap()
        .with_shutdown(controller.clone());

    bridge
        .execute(ExecutionRequest::new("one shot").with_simulated_fallback(true))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), controller.wait())
        .await
        .unwrap();
    assert_eq!(*codes.lock(), vec![0]);
}

#[tokio::test]
async fn test_failed_headless_run_exits_non_zero() {
    let (hook, codes) = recorder();
    let controller = ShutdownController::with_exit_hook(quick_shutdown(), hook);
    let bridge = ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::headless())
        .unwrap()
        .with_shutdown(controller.clone());

    assert!(bridge.execute(ExecutionRequest::new("one shot")).await.is_err());

    tokio::time::timeout(Duration::from_secs(2), controller.wait())
        .await
        .unwrap();
    assert_eq!(*codes.lock(), vec![1]);
}

#[tokio::test]
async fn test_interactive_completion_keeps_running() {
    let (hook, codes) = recorder();
    let controller = ShutdownController::with_exit_hook(quick_shutdown(), hook);
    let bridge = ExecutionBridge::new(BridgeConfig::default(), ExecutionEnvironment::interactive())
        .unwrap()
        .with_interactive(Arc::new(FixedBackend {
            origin: ExecutionOrigin::Interactive,
            result: Ok("done"),
        }))
        .with_shutdown(controller.clone());

    bridge.execute(ExecutionRequest::new("one shot")).await.unwrap();
    assert_eq!(controller.state(), ShutdownState::Idle);
    assert!(codes.lock().is_empty());
}

#[tokio::test]
async fn test_swarm_tasks_never_trigger_exit() {
    let (hook, codes) = recorder();
    let controller = ShutdownController::with_exit_hook(quick_shutdown(), hook);
    let bridge = ExecutionBridge::new(
        BridgeConfig {
            allow_simulated_fallback: true,
            ..BridgeConfig::default()
        },
        ExecutionEnvironment::headless(),
    )
    .unwrap()
    .with_shutdown(controller.clone());

    let coordinator = SwarmCoordinator::new(
        CoordinatorConfig {
            housekeeping_interval_secs: 0,
            ..CoordinatorConfig::default()
        },
        Arc::new(bridge),
    );
    let id = coordinator
        .create_swarm("ship the feature", SwarmOptions::strategy("development"))
        .await
        .unwrap();
    coordinator.start_swarm(id).await.unwrap();

    let mut status = SwarmStatus::Executing;
    for _ in 0..500 {
        status = coordinator.get_swarm_status(id).await.unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, SwarmStatus::Completed);

    let results = coordinator.get_results(id).await.unwrap();
    assert_eq!(results.simulated_outcomes, results.outcomes.len());
    assert_eq!(results.overall_quality, Some(0.5));
    assert_eq!(controller.state(), ShutdownState::Idle);
    assert!(codes.lock().is_empty());
}
