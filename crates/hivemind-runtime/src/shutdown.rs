//! Process shutdown coordination.
//!
//! A [`ShutdownController`] is constructed once, handed to every collaborator
//! that needs to register cleanup, and triggered at most once. The sequence
//! runs every cleanup action concurrently, waits up to the grace period,
//! then exits through the configured exit hook. A watchdog thread enforces
//! the force-kill bound even if the async sequence itself stalls.

use crate::config::ShutdownConfig;
use futures_util::future::{join_all, BoxFuture};
use hivemind_core::{fault, HivemindResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle of a [`ShutdownController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownState {
    Idle,
    ShuttingDown,
    Exited,
}

/// What triggered the shutdown. Determines the exit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "trigger", content = "detail", rename_all = "snake_case")]
pub enum ShutdownReason {
    /// SIGINT or SIGTERM. Both are handled the same way.
    Signal(String),
    /// A panic or a failed background task.
    Fault(String),
    /// Work finished in an unattended context.
    Completed { success: bool },
    /// Explicit programmatic request.
    Requested,
}

impl ShutdownReason {
    /// 0 for signals, requests and successful completion; 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Signal(_) | ShutdownReason::Requested => 0,
            ShutdownReason::Fault(_) => 1,
            ShutdownReason::Completed { success } => i32::from(!*success),
        }
    }
}

/// Summary of a completed shutdown sequence.
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownOutcome {
    pub reason: ShutdownReason,
    pub exit_code: i32,
    pub actions_total: usize,
    /// Names of actions that returned an error or panicked.
    pub actions_failed: Vec<String>,
    /// Actions still running when the grace period ended.
    pub outstanding: usize,
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

/// Called exactly once with the final exit code.
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

type CleanupFn = Arc<dyn Fn() -> BoxFuture<'static, HivemindResult<()>> + Send + Sync>;

struct CleanupAction {
    name: String,
    run: CleanupFn,
}

struct Inner {
    config: ShutdownConfig,
    state: Mutex<ShutdownState>,
    actions: Mutex<Vec<CleanupAction>>,
    exit_hook: ExitHook,
    exited: AtomicBool,
    done: watch::Sender<bool>,
}

impl Inner {
    fn exit_once(&self, code: i32) -> bool {
        if self.exited.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.state.lock() = ShutdownState::Exited;
        self.done.send_replace(true);
        (self.exit_hook)(code);
        true
    }
}

/// Runs cleanup exactly once and guarantees the process exits.
#[derive(Clone)]
pub struct ShutdownController {
    inner: Arc<Inner>,
}

impl ShutdownController {
    /// Controller that terminates the process with `std::process::exit`.
    pub fn new(config: ShutdownConfig) -> Self {
        Self::with_exit_hook(config, Arc::new(|code| std::process::exit(code)))
    }

    /// Controller with a custom exit hook, e.g. to observe the exit code in tests.
    pub fn with_exit_hook(config: ShutdownConfig, exit_hook: ExitHook) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ShutdownState::Idle),
                actions: Mutex::new(Vec::new()),
                exit_hook,
                exited: AtomicBool::new(false),
                done,
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ShutdownState {
        *self.inner.state.lock()
    }

    /// Grace period and force-kill bound in effect.
    pub fn config(&self) -> &ShutdownConfig {
        &self.inner.config
    }

    /// Register a cleanup action. Ignored (returns `false`) once shutdown began.
    pub fn register_cleanup<F, Fut>(&self, name: impl Into<String>, action: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HivemindResult<()>> + Send + 'static,
    {
        let name = name.into();
        let state = self.inner.state.lock();
        if *state != ShutdownState::Idle {
            debug!(action = %name, "Shutdown in progress, cleanup registration ignored");
            return false;
        }
        let run: CleanupFn = Arc::new(move || -> BoxFuture<'static, HivemindResult<()>> {
            Box::pin(action())
        });
        self.inner.actions.lock().push(CleanupAction { name, run });
        true
    }

    /// Cleanup actions waiting for a shutdown.
    pub fn registered_actions(&self) -> usize {
        self.inner.actions.lock().len()
    }

    /// Run the shutdown sequence to completion. Returns `None` when a
    /// sequence is already running or finished.
    pub async fn shutdown(&self, reason: ShutdownReason) -> Option<ShutdownOutcome> {
        let actions = self.begin(&reason)?;
        Some(self.sequence(reason, actions).await)
    }

    /// Start the shutdown sequence in the background. Safe to call from
    /// synchronous contexts such as a panic hook.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        let Some(actions) = self.begin(&reason) else {
            return false;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let this = self.clone();
                handle.spawn(async move {
                    this.sequence(reason, actions).await;
                });
            }
            Err(_) => {
                warn!(?reason, "No async runtime available, exiting without cleanup");
                self.inner.exit_once(reason.exit_code());
            }
        }
        true
    }

    /// Resolves once the controller has exited.
    pub async fn wait(&self) {
        let mut done = self.inner.done.subscribe();
        let _ = done.wait_for(|exited| *exited).await;
    }

    /// Trigger shutdown on SIGINT or SIGTERM.
    pub fn install_signal_handlers(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let name = shutdown_signal().await;
            info!(signal = name, "Received termination signal");
            this.shutdown(ShutdownReason::Signal(name.to_string())).await;
        })
    }

    /// Turn a panic into a fatal fault with exit code 1. The previously
    /// installed hook still runs first.
    ///
    /// Panics inside [`fault::contain`] belong to a unit of work (a swarm
    /// task or a bridge execution) whose owner records the failure, so they
    /// are not escalated.
    pub fn install_panic_hook(&self) {
        let this = self.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            previous(info);
            if fault::is_contained() {
                debug!("Panic in a contained unit of work, left to its owner");
                return;
            }
            let message = info.to_string();
            error!(%message, "Unrecoverable fault");
            this.request(ShutdownReason::Fault(message));
        }));
    }

    /// Escalate a panicking background task to a fatal fault.
    pub fn watch_task<T: Send + 'static>(&self, handle: JoinHandle<T>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(error = %e, "Background task panicked");
                    this.request(ShutdownReason::Fault(format!("background task panicked: {e}")));
                }
            }
        })
    }

    fn begin(&self, reason: &ShutdownReason) -> Option<Vec<CleanupAction>> {
        let mut state = self.inner.state.lock();
        if *state != ShutdownState::Idle {
            info!(?reason, current = ?*state, "Shutdown already in progress, trigger ignored");
            return None;
        }
        *state = ShutdownState::ShuttingDown;
        Some(std::mem::take(&mut *self.inner.actions.lock()))
    }

    async fn sequence(&self, reason: ShutdownReason, actions: Vec<CleanupAction>) -> ShutdownOutcome {
        let exit_code = reason.exit_code();
        let grace = self.inner.config.grace_period();
        info!(?reason, exit_code, actions = actions.len(), "Shutdown started");
        self.spawn_watchdog(exit_code);

        let started = Instant::now();
        let actions_total = actions.len();
        let settled = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(Mutex::new(Vec::new()));

        let trackers: Vec<JoinHandle<()>> = actions
            .into_iter()
            .map(|action| {
                let settled = Arc::clone(&settled);
                let failed = Arc::clone(&failed);
                let run = action.run;
                let name = action.name;
                // Invoked inside its own task so a panic, even before the
                // future is returned, stays contained.
                let task = tokio::spawn(async move { (run)().await });
                tokio::spawn(async move {
                    match task.await {
                        Ok(Ok(())) => debug!(action = %name, "Cleanup action finished"),
                        Ok(Err(e)) => {
                            warn!(action = %name, error = %e, "Cleanup action failed");
                            failed.lock().push(name);
                        }
                        Err(e) => {
                            warn!(action = %name, error = %e, "Cleanup action panicked");
                            failed.lock().push(name);
                        }
                    }
                    settled.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        let timed_out = tokio::time::timeout(grace, join_all(trackers)).await.is_err();
        let outstanding = actions_total.saturating_sub(settled.load(Ordering::SeqCst));
        if timed_out {
            warn!(
                outstanding,
                grace_period_ms = self.inner.config.grace_period_ms,
                "Cleanup grace period elapsed, exiting anyway"
            );
        }

        let outcome = ShutdownOutcome {
            reason,
            exit_code,
            actions_total,
            actions_failed: failed.lock().clone(),
            outstanding,
            timed_out,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(exit_code, failed = outcome.actions_failed.len(), "Shutdown complete");
        self.inner.exit_once(exit_code);
        outcome
    }

    fn spawn_watchdog(&self, exit_code: i32) {
        let inner = Arc::clone(&self.inner);
        let bound = inner.config.force_kill();
        let spawned = std::thread::Builder::new()
            .name("hivemind-force-kill".into())
            .spawn(move || {
                std::thread::sleep(bound);
                if !inner.exited.load(Ordering::SeqCst) {
                    error!(
                        force_kill_ms = inner.config.force_kill_ms,
                        "Shutdown exceeded the force-kill bound, exiting now"
                    );
                    inner.exit_once(exit_code);
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Could not start force-kill watchdog");
        }
    }
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    }
}
