//! `foreman` — a thin binary wiring config loading, argument parsing, and
//! `tracing` initialization around the `foreman-orchestrator` crate
//! (SPEC_FULL.md §2, "ambient Configuration"). The CLI itself carries no
//! orchestration logic: it builds an `Orchestrator`/`AutonomousLoop` from
//! `foreman.toml` and calls straight through.

mod config_watcher;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use foreman_agent::{LlmOracle, ModelConfig, RetryPolicy};
use foreman_core::ids::SystemClock;
use foreman_core::ForemanError;
use foreman_memory::MemoryStore;
use foreman_orchestrator::{
    AutonomousLoop, Command as OrchestratorCommand, Constraints, ConstraintSafetyLevel,
    FeedbackStore, LocalGitCollaborator, Orchestrator, SafetyConfig, SafetyController,
};
use foreman_security::audit::AuditLog;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "foreman", about = "Foreman — autonomous multi-agent orchestration engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "foreman.toml")]
    config: PathBuf,

    /// Emit JSON-formatted logs instead of plain text.
    #[arg(long)]
    log_format_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single Command through the Orchestrator and print its report.
    Run {
        /// The natural-language command text to decompose and execute.
        text: String,
        /// Proceed past unresolved required clarifications.
        #[arg(long)]
        skip_clarifications: bool,
        /// Cumulative cost ceiling for this run.
        #[arg(long)]
        budget: Option<f64>,
        /// Upper bound on concurrently running Workers within a phase.
        #[arg(long)]
        max_concurrency: Option<usize>,
    },
    /// Manage the unattended Discover/Plan/Execute/Learn loop.
    Autonomous {
        #[command(subcommand)]
        action: AutonomousAction,
    },
    /// Trip the Safety controller's emergency stop.
    EmergencyStop {
        #[arg(long, default_value = "operator request")]
        reason: String,
    },
    /// Clear a previously-activated emergency stop.
    ClearEmergencyStop {
        #[arg(long, default_value = "operator request")]
        reason: String,
    },
}

#[derive(Subcommand)]
enum AutonomousAction {
    /// Run cycles until `--cycles` is reached or a stop request file appears.
    Start {
        /// Number of Discover/Plan/Execute/Learn cycles to run; omit to
        /// run until stopped.
        #[arg(long)]
        cycles: Option<u32>,
        /// How many top-ranked opportunities to act on per cycle.
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Request that a running `start` loop exit after its current cycle.
    Stop,
    /// Print the Safety controller's current health snapshot as JSON.
    Status,
}

#[derive(Deserialize)]
struct ForemanConfig {
    model: ModelConfig,
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    #[serde(default)]
    constraints: Constraints,
    #[serde(default)]
    safety_level: ConstraintSafetyLevel,
    #[serde(default = "default_scan_interval_secs")]
    scan_interval_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_scan_interval_secs() -> u64 {
    300
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_format_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!("failed to read config file '{}': {e}", cli.config.display())
    })?;
    let config: ForemanConfig = toml::from_str(&config_str)?;

    let working_directory = std::env::current_dir()?;
    std::fs::create_dir_all(&config.data_dir)?;

    let exit_code = match cli.command {
        Commands::Run {
            text,
            skip_clarifications,
            budget,
            max_concurrency,
        } => {
            let orchestrator = build_orchestrator(&config, &working_directory)?;
            let mut constraints = config.constraints.clone();
            constraints.skip_clarifications = skip_clarifications || constraints.skip_clarifications;
            if let Some(budget) = budget {
                constraints.budget_limit = Some(budget);
            }
            if let Some(max_concurrency) = max_concurrency {
                constraints.max_concurrency = max_concurrency;
            }

            let command = OrchestratorCommand {
                text,
                constraints,
            };
            run_command(&orchestrator, command).await
        }
        Commands::Autonomous { action } => run_autonomous(action, &config, &working_directory).await?,
        Commands::EmergencyStop { reason } => {
            let safety = SafetyController::new(
                &working_directory,
                SafetyConfig::for_level(config.safety_level),
                Box::new(SystemClock),
            );
            safety.activate_emergency_stop(&reason)?;
            println!("emergency stop activated: {reason}");
            0
        }
        Commands::ClearEmergencyStop { reason } => {
            let safety = SafetyController::new(
                &working_directory,
                SafetyConfig::for_level(config.safety_level),
                Box::new(SystemClock),
            );
            safety.clear_emergency_stop(&reason)?;
            println!("emergency stop cleared: {reason}");
            0
        }
    };

    std::process::exit(exit_code);
}

fn build_orchestrator(config: &ForemanConfig, working_directory: &std::path::Path) -> anyhow::Result<Orchestrator> {
    let profiles = foreman_orchestrator::default_profile_map(&config.model);
    let oracle = LlmOracle::new(config.model.retry_policy.clone().unwrap_or_else(RetryPolicy::default));
    let safety = Arc::new(SafetyController::new(
        working_directory,
        SafetyConfig::for_level(config.safety_level),
        Box::new(SystemClock),
    ));
    let memory = Arc::new(MemoryStore::open(config.data_dir.join("memory.jsonl"), 10_000)?);
    let audit = Arc::new(AuditLog::new(config.data_dir.join("audit")));

    let orchestrator = Orchestrator::new(profiles, oracle, working_directory, safety, memory, audit)
        .with_vcs(Arc::new(LocalGitCollaborator::new(working_directory)));
    Ok(orchestrator)
}

/// Maps an `OrchestrationResult`/error to spec §6.6's exit codes: 0
/// success; 1 partial (some subtasks failed but none critical); 2
/// clarification required; 3 safety violation; 4 emergency stop; 5
/// budget exceeded; ≥10 infrastructure errors.
async fn run_command(orchestrator: &Orchestrator, command: OrchestratorCommand) -> i32 {
    match orchestrator.orchestrate(command).await {
        Ok(result) => {
            println!("{}", result.final_report);
            if result.success {
                0
            } else {
                1
            }
        }
        Err(ForemanError::ClarificationRequired(questions)) => {
            eprintln!("clarification required:");
            for q in questions {
                eprintln!("  - {q}");
            }
            2
        }
        Err(ForemanError::SafetyViolation { level, message }) => {
            eprintln!("safety violation ({level}): {message}");
            3
        }
        Err(ForemanError::EmergencyStopped(reason)) => {
            eprintln!("emergency stop active: {reason}");
            4
        }
        Err(ForemanError::BudgetExceeded { spent, limit }) => {
            eprintln!("budget exceeded: spent {spent:.2} of {limit:.2}");
            5
        }
        Err(e) => {
            eprintln!("infrastructure error: {e}");
            10
        }
    }
}

async fn run_autonomous(
    action: AutonomousAction,
    config: &ForemanConfig,
    working_directory: &std::path::Path,
) -> anyhow::Result<i32> {
    match action {
        AutonomousAction::Status => {
            let safety = SafetyController::new(
                working_directory,
                SafetyConfig::for_level(config.safety_level),
                Box::new(SystemClock),
            );
            let health = safety.health();
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(0)
        }
        AutonomousAction::Stop => {
            let marker = config.data_dir.join(".autonomous_stop_requested");
            std::fs::write(&marker, "stop requested")?;
            println!("stop requested; a running `autonomous start` will exit after its current cycle");
            Ok(0)
        }
        AutonomousAction::Start { cycles, top_k } => {
            let stop_marker = config.data_dir.join(".autonomous_stop_requested");
            let _ = std::fs::remove_file(&stop_marker);

            let orchestrator = build_orchestrator(config, working_directory)?;
            let safety = Arc::new(SafetyController::new(
                working_directory,
                SafetyConfig::for_level(config.safety_level),
                Box::new(SystemClock),
            ));
            let feedback = FeedbackStore::new(Box::new(SystemClock));
            let autonomous = AutonomousLoop::new(working_directory.to_path_buf(), safety.clone(), feedback, top_k);

            let mut completed = 0u32;
            loop {
                if stop_marker.exists() {
                    info!("stop request observed, exiting autonomous loop");
                    let _ = std::fs::remove_file(&stop_marker);
                    break;
                }
                let cancel = foreman_core::cancel::CancelToken::new();
                let orchestrator = &orchestrator;
                let result = autonomous
                    .run_cycle(&cancel, move |opportunities| async move {
                        let mut records = Vec::new();
                        for opportunity in opportunities {
                            let mut command = OrchestratorCommand::new(opportunity.description.clone());
                            command.constraints.skip_clarifications = true;
                            match orchestrator.orchestrate(command).await {
                                Ok(outcome) => records.extend(outcome.results.into_values()),
                                Err(e) => warn!(error = %e, opportunity = %opportunity.id, "autonomous cycle: orchestration failed"),
                            }
                        }
                        Ok(records)
                    })
                    .await?;
                info!(
                    opportunities_found = result.opportunities_found,
                    plans_attempted = result.plans_attempted,
                    plans_successful = result.plans_successful,
                    "autonomous cycle complete"
                );

                completed += 1;
                if let Some(limit) = cycles {
                    if completed >= limit {
                        break;
                    }
                }
                tokio::time::sleep(std::time::Duration::from_secs(config.scan_interval_secs)).await;
            }
            Ok(0)
        }
    }
}
