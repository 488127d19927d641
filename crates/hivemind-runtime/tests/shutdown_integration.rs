//! Shutdown controller tests: exactly-once cleanup, failure isolation, the
//! grace period and the force-kill bound.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use hivemind_core::{HivemindError, HivemindResult};
use hivemind_runtime::{ExitHook, ShutdownConfig, ShutdownController, ShutdownReason, ShutdownState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn recorder() -> (ExitHook, Arc<Mutex<Vec<i32>>>) {
    let codes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&codes);
    (Arc::new(move |code| sink.lock().push(code)), codes)
}

fn config(grace_period_ms: u64, force_kill_ms: u64) -> ShutdownConfig {
    ShutdownConfig {
        grace_period_ms,
        force_kill_ms,
    }
}

// ---------------------------------------------------------------------------
// Cleanup sequence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failing_action_does_not_block_others() {
    let (hook, codes) = recorder();
    let controller = ShutdownController::with_exit_hook(config(2_000, 30_000), hook);
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&ran);
    controller.register_cleanup("flush-logs", move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    controller.register_cleanup("explodes", || -> std::future::Ready<HivemindResult<()>> {
        panic!("cleanup exploded before returning a future")
    });
    controller.register_cleanup("rejects", || async {
        Err(HivemindError::Config("already closed".into()))
    });
    let counter = Arc::clone(&ran);
    controller.register_cleanup("stop-swarms", move || {
        let counter = Arc::clone(&counter);
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let outcome = controller
        .shutdown(ShutdownReason::Fault("worker crashed".into()))
        .await
        .unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.actions_total, 4);
    assert_eq!(outcome.exit_code, 1);
    assert!(!outcome.timed_out);
    assert_eq!(outcome.outstanding, 0);
    let mut failed = outcome.actions_failed.clone();
    failed.sort();
    assert_eq!(failed, vec!["explodes".to_string(), "rejects".to_string()]);
    assert_eq!(*codes.lock(), vec![1]);
}

#[tokio::test]
async fn test_second_trigger_is_a_no_op() {
    let (hook, codes) = recorder();
    let controller = ShutdownController::with_exit_hook(config(500, 30_000), hook);
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    controller.register_cleanup("once", move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let first = controller
        .shutdown(ShutdownReason::Signal("SIGTERM".into()))
        .await;
    let second = controller
        .shutdown(ShutdownReason::Signal("SIGINT".into()))
        .await;
    assert!(!controller.request(ShutdownReason::Fault("late".into())));

    assert_eq!(first.unwrap().exit_code, 0);
    assert!(second.is_none());
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(*codes.lock(), vec![0]);
    assert_eq!(controller.state(), ShutdownState::Exited);
}

#[tokio::test]
async fn test_clones_share_one_sequence() {
    let (hook, codes) = recorder();
    let controller = ShutdownController::with_exit_hook(config(500, 30_000), hook);
    let other = controller.clone();

    assert!(controller.request(ShutdownReason::Completed { success: true }));
    assert!(!other.request(ShutdownReason::Completed { success: false }));

    tokio::time::timeout(Duration::from_secs(2), other.wait())
        .await
        .unwrap();
    assert_eq!(*codes.lock(), vec![0]);
}

// ---------------------------------------------------------------------------
// Time bounds
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_grace_period_bounds_cleanup() {
    let (hook, codes) = recorder();
    let controller = ShutdownController::with_exit_hook(config(1_000, 600_000), hook);
    controller.register_cleanup("never-settles", || std::future::pending::<HivemindResult<()>>());
    controller.register_cleanup("quick", || async { Ok(()) });

    let outcome = controller
        .shutdown(ShutdownReason::Requested)
        .await
        .unwrap();

    assert!(outcome.timed_out);
    assert_eq!(outcome.outstanding, 1);
    assert!(outcome.actions_failed.is_empty());
    assert_eq!(*codes.lock(), vec![0]);
}

#[tokio::test]
async fn test_force_kill_fires_when_sequence_stalls() {
    let (hook, codes) = recorder();
    // Grace far longer than the force-kill bound: only the watchdog can exit.
    let controller = ShutdownController::with_exit_hook(config(60_000, 100), hook);
    controller.register_cleanup("never-settles", || std::future::pending::<HivemindResult<()>>());

    assert!(controller.request(ShutdownReason::Signal("SIGTERM".into())));
    tokio::time::timeout(Duration::from_secs(5), controller.wait())
        .await
        .unwrap();

    assert_eq!(*codes.lock(), vec![0]);
    assert_eq!(controller.state(), ShutdownState::Exited);
}

// ---------------------------------------------------------------------------
// Fault escalation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_panicking_background_task_escalates() {
    let (hook, codes) = recorder();
    let controller = ShutdownController::with_exit_hook(config(500, 30_000), hook);

    let worker = tokio::spawn(async {
        panic!("worker lost its state");
    });
    controller.watch_task(worker);

    tokio::time::timeout(Duration::from_secs(2), controller.wait())
        .await
        .unwrap();
    assert_eq!(*codes.lock(), vec![1]);
}

#[tokio::test]
async fn test_finished_background_task_is_ignored() {
    let (hook, codes) = recorder();
    let controller = ShutdownController::with_exit_hook(config(500, 30_000), hook);

    let watcher = controller.watch_task(tokio::spawn(async { 7 }));
    watcher.await.unwrap();

    assert_eq!(controller.state(), ShutdownState::Idle);
    assert!(codes.lock().is_empty());
}
