//! `hivemind` binary.

mod config;

use clap::{Parser, Subcommand, ValueEnum};
use config::HivemindConfig;
use hivemind_core::{EventBusError, EventTopic};
use hivemind_orchestrator::{Strategy, SwarmCoordinator, SwarmOptions};
use hivemind_runtime::{
    ExecutionBridge, ExecutionEnvironment, ExecutionRequest, ShutdownController, ShutdownReason,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hivemind", about = "Hivemind: swarm coordinator for delegated AI work")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "hivemind.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose an objective into a swarm and run it to completion
    Run {
        objective: String,
        /// Decomposition strategy (development, research, auto, ...)
        #[arg(short, long)]
        strategy: Option<String>,
        #[arg(long)]
        max_agents: Option<usize>,
        #[arg(long)]
        max_tasks: Option<usize>,
        /// Allow the simulated path when no credential is configured
        #[arg(long)]
        simulate: bool,
    },
    /// Run a single objective through the execution bridge
    Exec {
        objective: String,
        /// Overrides `bridge.timeout_secs`
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Allow the simulated path when no credential is configured
        #[arg(long)]
        simulate: bool,
    },
    /// List decomposition strategies
    Strategies,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "Loaded .env");
    }

    let config = HivemindConfig::load(&cli.config)?.with_env_credential(|key| std::env::var(key).ok());
    let env = ExecutionEnvironment::detect();
    info!(
        automation = env.is_automation(),
        credential = config.bridge.credential().is_some(),
        "Environment detected"
    );

    let shutdown = ShutdownController::new(config.shutdown.clone().with_overrides(&env));
    shutdown.install_panic_hook();
    shutdown.install_signal_handlers();

    match cli.command {
        Commands::Run {
            objective,
            strategy,
            max_agents,
            max_tasks,
            simulate,
        } => {
            let mut bridge_config = config.bridge.clone();
            bridge_config.allow_simulated_fallback |= simulate;
            let bridge = ExecutionBridge::new(bridge_config, env)?;
            let coordinator =
                SwarmCoordinator::new(config.coordinator_config(), Arc::new(bridge.clone()));
            register_execution_cleanup(&shutdown, &bridge);
            let stopper = coordinator.clone();
            shutdown.register_cleanup("coordinator", move || {
                let coordinator = stopper.clone();
                async move {
                    let stopped = coordinator.shutdown().await;
                    info!(stopped, "Swarms stopped");
                    Ok(())
                }
            });

            let mut options = SwarmOptions::default();
            if let Some(tag) = strategy {
                options = SwarmOptions::strategy(tag);
            }
            if let Some(max) = max_agents {
                options = options.with_max_agents(max);
            }
            if let Some(max) = max_tasks {
                options = options.with_max_tasks(max);
            }

            let swarm_id = coordinator.create_swarm(&objective, options).await?;
            let mut events = coordinator.events().subscribe_swarm(swarm_id);
            let summary = coordinator.start_swarm(swarm_id).await?;
            info!(
                swarm_id = %swarm_id,
                strategy = %summary.strategy,
                tasks = summary.metrics.total_tasks,
                agents = summary.metrics.total_agents,
                "Swarm started"
            );

            loop {
                match events.recv().await {
                    Ok(event) => {
                        info!(topic = %event.topic, payload = %event.payload, "Swarm event");
                        if matches!(
                            event.topic,
                            EventTopic::SwarmCompleted | EventTopic::SwarmStopped
                        ) {
                            break;
                        }
                    }
                    Err(EventBusError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }

            let results = coordinator.get_results(swarm_id).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            finish(&shutdown, results.failed_tasks == 0).await;
        }
        Commands::Exec {
            objective,
            timeout_secs,
            simulate,
        } => {
            let bridge = ExecutionBridge::new(config.bridge.clone(), env)?;
            register_execution_cleanup(&shutdown, &bridge);

            // The binary owns the exit so output is flushed before it happens.
            let mut request = ExecutionRequest::new(objective).without_exit();
            if let Some(secs) = timeout_secs {
                request = request.with_timeout(Duration::from_secs(secs));
            }
            if simulate {
                request = request.with_simulated_fallback(true);
            }

            let success = match bridge.execute(request).await {
                Ok(report) => {
                    if report.origin.is_simulated() {
                        warn!("Result produced by the simulated path");
                    }
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    true
                }
                Err(e) => {
                    error!(error = %e, "Execution failed");
                    false
                }
            };
            finish(&shutdown, success).await;
        }
        Commands::Strategies => {
            for strategy in [
                Strategy::Development,
                Strategy::Research,
                Strategy::from_tag("auto"),
            ] {
                println!("{strategy}");
                for task in strategy.decompose("<objective>") {
                    println!("  task  {} [{}]", task.name, task.task_type);
                }
                for agent in strategy.roster() {
                    println!("  agent {}", agent.agent_type);
                }
            }
        }
    }

    Ok(())
}

fn register_execution_cleanup(shutdown: &ShutdownController, bridge: &ExecutionBridge) {
    let bridge = bridge.clone();
    shutdown.register_cleanup("executions", move || {
        let bridge = bridge.clone();
        async move {
            let aborted = bridge.cancel_all();
            info!(aborted, "In-flight executions cancelled");
            Ok(())
        }
    });
}

/// Exit through the controller so registered cleanup always runs.
async fn finish(shutdown: &ShutdownController, success: bool) {
    if shutdown
        .shutdown(ShutdownReason::Completed { success })
        .await
        .is_none()
    {
        // A signal or fault got there first; its sequence owns the exit.
        shutdown.wait().await;
    }
}
