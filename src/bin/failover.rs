//! # Failover CLI
//!
//! Entry point invoked by the deployment pipeline (or an operator) to run a
//! cross-region failover. The plan comes from the environment; operational
//! settings come from the configuration directory.
//!
//! The run ledger document is printed to stdout as pretty JSON; logs go to
//! stderr. Exit codes: 0 completed, 1 failed, 2 invalid plan or infrastructure
//! error.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use failover_core::adapters::{ControlPlane, HttpControlPlane, HttpRegionProbe};
use failover_core::approval::{ApprovalGate, ConsoleApprovalGate, PipelineApprovalGate};
use failover_core::config::{ConfigManager, FailoverConfig};
use failover_core::constants::exit_codes;
use failover_core::error::FailoverError;
use failover_core::ledger::{InMemoryRunLedger, LedgerBackends, RunLedger};
use failover_core::logging;
use failover_core::models::{FailoverPlan, FailoverRun};
use failover_core::orchestration::{FailoverOrchestrator, InProcessFailoverLock};
use failover_core::state_machine::RunStatus;
use failover_core::test_utils::pre_failover_control_plane;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "failover")]
#[command(about = "Cross-region database and edge failover orchestrator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration directory (default: config)
    #[arg(short, long, global = true, env = "FAILOVER_CONFIG_DIR")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the plan from the environment and execute it
    Execute {
        /// Where the approval decision comes from
        #[arg(long, value_enum, default_value_t = ApprovalMode::Pipeline)]
        approval: ApprovalMode,

        /// Rehearse against an in-memory control plane and ledger
        #[arg(long)]
        simulate: bool,
    },

    /// Continue a run that was interrupted before reaching a terminal status
    Resume {
        run_id: Uuid,

        #[arg(long, value_enum, default_value_t = ApprovalMode::Pipeline)]
        approval: ApprovalMode,
    },

    /// Print a run from the ledger
    Show { run_id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ApprovalMode {
    /// The pipeline's manual approval stage already ran
    Pipeline,
    /// Ask on the terminal
    Console,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_structured_logging();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            exit_codes::ERROR
        }
    };
    process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let manager = ConfigManager::load_from_directory(cli.config.clone())
        .context("failed to load configuration")?;
    let config = manager.config().clone();

    match cli.command {
        Commands::Execute { approval, simulate } => {
            let plan = FailoverPlan::from_env().context("failed to build failover plan")?;

            let (control_plane, backends) = if simulate {
                info!("Simulation mode: in-memory control plane and ledger");
                let backends = LedgerBackends {
                    ledger: Arc::new(InMemoryRunLedger::new()),
                    lock: Arc::new(InProcessFailoverLock::new()),
                };
                let control_plane =
                    ControlPlane::uniform(Arc::new(pre_failover_control_plane(&plan)));
                (control_plane, backends)
            } else {
                (
                    http_control_plane(&config, &plan)?,
                    LedgerBackends::from_config(&config.ledger).await?,
                )
            };

            let orchestrator = build_orchestrator(control_plane, &backends, approval, &config);
            let outcome = orchestrator.execute(plan).await;
            report(outcome, backends.ledger.as_ref()).await
        }
        Commands::Resume { run_id, approval } => {
            let backends = LedgerBackends::from_config(&config.ledger).await?;
            let stored = backends.ledger.load(run_id).await?;
            let control_plane = http_control_plane(&config, &stored.plan)?;

            let orchestrator = build_orchestrator(control_plane, &backends, approval, &config);
            let outcome = orchestrator.resume(run_id).await;
            report(outcome, backends.ledger.as_ref()).await
        }
        Commands::Show { run_id } => {
            let backends = LedgerBackends::from_config(&config.ledger).await?;
            let run = backends.ledger.load(run_id).await?;
            print_run(&run)?;
            Ok(exit_code_for(&run))
        }
    }
}

/// Database and proxy calls go to the destination region; edge calls are global
fn http_control_plane(config: &FailoverConfig, plan: &FailoverPlan) -> anyhow::Result<ControlPlane> {
    let regional = HttpControlPlane::for_region(&config.control_plane, &plan.destination_region)?;
    let edge = HttpControlPlane::for_edge(&config.control_plane)?;
    let probe = HttpRegionProbe::new(&config.control_plane)?;

    Ok(ControlPlane::new(
        Arc::new(regional.clone()),
        Arc::new(regional),
        Arc::new(edge),
        Arc::new(probe),
    ))
}

fn build_orchestrator(
    control_plane: ControlPlane,
    backends: &LedgerBackends,
    approval: ApprovalMode,
    config: &FailoverConfig,
) -> FailoverOrchestrator {
    let gate: Arc<dyn ApprovalGate> = match approval {
        ApprovalMode::Pipeline => Arc::new(PipelineApprovalGate),
        ApprovalMode::Console => Arc::new(ConsoleApprovalGate),
    };

    let orchestrator = FailoverOrchestrator::new(
        control_plane,
        backends.ledger.clone(),
        backends.lock.clone(),
        gate,
        config,
    );

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; the run stops at the next safe point");
            token.cancel();
        }
    });

    orchestrator
}

async fn report(
    outcome: Result<FailoverRun, FailoverError>,
    ledger: &dyn RunLedger,
) -> anyhow::Result<i32> {
    match outcome {
        Ok(run) => {
            print_run(&run)?;
            Ok(exit_code_for(&run))
        }
        Err(e) => {
            // Runs that failed before executing were still persisted
            if let Some(run_id) = e.run_id() {
                if let Ok(run) = ledger.load(run_id).await {
                    print_run(&run)?;
                }
            }

            let code = match e {
                FailoverError::ApprovalDenied { .. }
                | FailoverError::ApprovalTimeout { .. }
                | FailoverError::ConcurrentFailoverInProgress { .. }
                | FailoverError::Cancelled { .. } => exit_codes::FAILED,
                _ => exit_codes::ERROR,
            };
            error!(error = %e, exit_code = code, "Failover did not complete");
            Ok(code)
        }
    }
}

fn exit_code_for(run: &FailoverRun) -> i32 {
    match run.status {
        RunStatus::Completed => exit_codes::COMPLETED,
        RunStatus::Failed => exit_codes::FAILED,
        _ => exit_codes::ERROR,
    }
}

fn print_run(run: &FailoverRun) -> anyhow::Result<()> {
    let document = serde_json::to_string_pretty(run).context("failed to render run")?;
    println!("{document}");
    Ok(())
}
