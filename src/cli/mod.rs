//! WebTest CLI - Headless workflow runner
//!
//! Drives the same workflow as the dashboard from a terminal: scan a site,
//! pick tests from the generated plan, compose, execute and report.
//! Live progress goes to stderr; the final report (or JSON snapshot) to
//! stdout.
//!
//! Exit codes: 0 passed (or paused in review), 1 test failed or cancelled,
//! 2 the workflow stopped on an error.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use webtest_core::ExecutionMode;

use crate::models::settings::OrchestratorConfig;
use crate::models::workflow::{Outcome, WorkflowPhase};
use crate::services::execution::StepStatus;
use crate::services::phase::{PhaseController, WorkflowSnapshot};
use crate::services::plan::CategorySelection;
use crate::services::progress::ProgressUpdate;
use crate::storage::ConfigService;

/// webtest - AI-assisted web testing from the command line
#[derive(Parser, Debug)]
#[command(name = "webtest", version, about = "Scan a site, plan tests and run them")]
pub struct Cli {
    /// Configuration file path (default: ~/.webtest/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the final workflow snapshot as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Do not print live progress
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a site, generate a plan and run the selected tests
    Scan(ScanArgs),
    /// Generate scenarios from a prompt (or let the service choose) and run them
    Run(RunArgs),
    /// Configuration management
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Target site URL
    pub url: String,

    #[arg(long)]
    pub max_pages: Option<u32>,

    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Test id to run; replaces the default selection (repeatable)
    #[arg(long = "select")]
    pub select: Vec<String>,

    /// Category id whose tests should all run (repeatable)
    #[arg(long = "category")]
    pub category: Vec<String>,

    /// Credential value as KEY=VALUE (repeatable)
    #[arg(long = "auth")]
    pub auth: Vec<String>,

    /// Test data value as KEY=VALUE (repeatable)
    #[arg(long = "data")]
    pub data: Vec<String>,

    /// Extra scenario described in plain language, merged into the run
    #[arg(long)]
    pub prompt: Option<String>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Target site URL
    pub url: String,

    /// What to test, in plain language
    #[arg(long)]
    pub prompt: Option<String>,

    /// Without --prompt: stop after generation so the scenarios can be reviewed
    #[arg(long)]
    pub review: bool,

    /// With --review: approve the generated scenarios and run them
    #[arg(long, requires = "review")]
    pub approve: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
    /// Reset configuration to defaults
    Reset,
}

/// Run the parsed command and return the process exit code.
pub async fn run(cli: Cli) -> Result<i32> {
    let mut config_service = match &cli.config {
        Some(path) => ConfigService::load_from(path.clone()),
        None => ConfigService::new(),
    }
    .context("Failed to load configuration")?;

    match &cli.command {
        Commands::Config(args) => run_config(&mut config_service, args),
        Commands::Scan(args) => {
            let config = config_service.get_config_clone();
            let (mut controller, printer) = build_controller(&config, !cli.quiet && !cli.json)?;
            cancel_on_ctrl_c(controller.cancel_token());
            let result = drive_scan(&mut controller, &config, args).await;
            let snapshot = settle(controller, printer).await;
            finish(&snapshot, cli.json, result)
        }
        Commands::Run(args) => {
            let config = config_service.get_config_clone();
            let (mut controller, printer) = build_controller(&config, !cli.quiet && !cli.json)?;
            cancel_on_ctrl_c(controller.cancel_token());
            let result = drive_run(&mut controller, args).await;
            let snapshot = settle(controller, printer).await;
            finish(&snapshot, cli.json, result)
        }
    }
}

const PROGRESS_BUFFER: usize = 256;

/// Controller wired from configuration, with a stderr printer for its
/// progress channel when `live`.
fn build_controller(
    config: &OrchestratorConfig,
    live: bool,
) -> Result<(PhaseController, Option<JoinHandle<()>>)> {
    let controller = PhaseController::from_config(config)?;
    if !live {
        return Ok((controller, None));
    }
    let (event_tx, event_rx) = mpsc::channel(PROGRESS_BUFFER);
    let printer = tokio::spawn(print_progress(event_rx));
    Ok((controller.with_progress(event_tx), Some(printer)))
}

/// Take the final snapshot, then drop the controller so the printer drains
/// and exits before the report is written.
async fn settle(controller: PhaseController, printer: Option<JoinHandle<()>>) -> WorkflowSnapshot {
    let snapshot = controller.snapshot();
    drop(controller);
    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            warn!(error = %e, "progress printer stopped");
        }
    }
    snapshot
}

async fn print_progress(mut event_rx: mpsc::Receiver<ProgressUpdate>) {
    let mut last_line = String::new();
    while let Some(update) = event_rx.recv().await {
        if let Some(line) = progress_line(&update) {
            // polls repeat unchanged views
            if line != last_line {
                eprintln!("{}", line);
                last_line = line;
            }
        }
    }
}

fn progress_line(update: &ProgressUpdate) -> Option<String> {
    let line = match update {
        ProgressUpdate::Phase {
            phase,
            outcome: Some(outcome),
        } => format!("[{}] {}", phase, outcome),
        ProgressUpdate::Phase { phase, outcome: None } => format!("[{}]", phase),
        ProgressUpdate::Scan(scan) => format!(
            "  scan {}: {}, {} pages ({}%)",
            scan.scan_id, scan.status, scan.pages_scanned, scan.progress_percent
        ),
        ProgressUpdate::ScanLog(entry) => format!("  {}: {}", entry.phase, entry.message),
        ProgressUpdate::Execution(execution) => {
            let current = execution.current_step.and_then(|n| {
                execution
                    .steps
                    .iter()
                    .find(|s| s.number == n)
                    .and_then(|s| s.description.clone())
            });
            match current {
                Some(description) => format!(
                    "  execution {}: {} {}/{} ({}%) {}",
                    execution.job_id,
                    execution.phase,
                    execution.steps_completed,
                    execution.steps_total,
                    execution.progress_percent,
                    description
                ),
                None => format!(
                    "  execution {}: {} {}/{} ({}%)",
                    execution.job_id,
                    execution.phase,
                    execution.steps_completed,
                    execution.steps_total,
                    execution.progress_percent
                ),
            }
        }
        ProgressUpdate::Frame { .. } => return None,
    };
    Some(line)
}

fn run_config(service: &mut ConfigService, args: &ConfigArgs) -> Result<i32> {
    match args.command {
        ConfigCommand::Show => {
            let mut shown = service.get_config_clone();
            if shown.api_key.is_some() {
                shown.api_key = Some("********".to_string());
            }
            if shown.access_token.is_some() {
                shown.access_token = Some("********".to_string());
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        ConfigCommand::Path => println!("{}", service.path().display()),
        ConfigCommand::Reset => {
            service.reset()?;
            println!("Configuration reset: {}", service.path().display());
        }
    }
    Ok(0)
}

async fn drive_scan(
    controller: &mut PhaseController,
    config: &OrchestratorConfig,
    args: &ScanArgs,
) -> Result<()> {
    let max_pages = args.max_pages.unwrap_or(config.default_max_pages);
    let max_depth = args.max_depth.unwrap_or(config.default_max_depth);

    if controller.scan(&args.url, max_pages, max_depth).await? != WorkflowPhase::Plan {
        return Ok(());
    }

    let auth = parse_pairs(&args.auth)?;
    let data = parse_pairs(&args.data)?;
    {
        let selector = controller.selector_mut()?;
        if !args.select.is_empty() || !args.category.is_empty() {
            for id in selector.selected_ids() {
                selector.toggle_test(&id)?;
            }
            for category in &args.category {
                if selector.category_selection(category)? != CategorySelection::All {
                    selector.toggle_category(category)?;
                }
            }
            for id in &args.select {
                if !selector.is_selected(id) {
                    selector.toggle_test(id)?;
                }
            }
        }
        for id in selector.selected_ids() {
            for (key, value) in &auth {
                selector.set_auth_field(&id, key, value.clone())?;
            }
            for (key, value) in &data {
                selector.set_test_data_field(&id, key, value.clone())?;
            }
        }
        for missing in selector.missing_required_fields() {
            warn!(test_id = %missing.test_id, field = %missing.key, "required field has no value");
        }
        info!(selected = selector.selected_count(), "test selection ready");
    }

    if let Some(prompt) = &args.prompt {
        controller.convert_prompt(&args.url, prompt).await?;
    }
    controller.compose().await?;
    controller.execute().await?;
    Ok(())
}

async fn drive_run(controller: &mut PhaseController, args: &RunArgs) -> Result<()> {
    match &args.prompt {
        Some(prompt) => {
            controller.convert_prompt(&args.url, prompt).await?;
            controller.compose().await?;
            controller.execute().await?;
        }
        None => {
            let mode = if args.review {
                ExecutionMode::Review
            } else {
                ExecutionMode::Auto
            };
            let phase = controller.start_generation(&args.url, mode).await?;
            if phase == WorkflowPhase::Review {
                if let Some(document) = controller.monitor().and_then(|m| m.document()) {
                    println!("{}", document);
                }
                if args.approve {
                    controller.approve().await?;
                }
            }
        }
    }
    Ok(())
}

fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| anyhow!("Expected KEY=VALUE, got '{}'", pair))
        })
        .collect()
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling");
            token.cancel();
        }
    });
}

fn finish(snapshot: &WorkflowSnapshot, json: bool, result: Result<()>) -> Result<i32> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    } else {
        print_report(snapshot);
    }
    if let Err(e) = &result {
        if snapshot.last_error.is_none() {
            eprintln!("error: {:#}", e);
        }
    }
    Ok(exit_code(snapshot.phase, snapshot.outcome, result.is_err()))
}

fn exit_code(phase: WorkflowPhase, outcome: Option<Outcome>, errored: bool) -> i32 {
    match outcome {
        Some(Outcome::Passed) => 0,
        Some(Outcome::Failed) | Some(Outcome::Cancelled) => 1,
        None if phase == WorkflowPhase::Review && !errored => 0,
        None => 2,
    }
}

fn print_report(snapshot: &WorkflowSnapshot) {
    match snapshot.outcome {
        Some(outcome) => println!("phase: {} ({})", snapshot.phase, outcome),
        None => println!("phase: {}", snapshot.phase),
    }
    if let Some(scan) = &snapshot.scan {
        let features = scan
            .summary
            .as_ref()
            .map(|s| s.detected_features.join(", "))
            .unwrap_or_default();
        println!(
            "scan {}: {}, {} pages, features: [{}]",
            scan.scan_id, scan.status, scan.pages_scanned, features
        );
    }
    if let Some(selection) = &snapshot.selection {
        println!(
            "plan: {} tests in {} categories, {} selected (~{}s)",
            selection.tests, selection.categories, selection.selected, selection.estimated_duration
        );
    }
    if let Some(report) = &snapshot.validation {
        println!(
            "validation: {}/{} verified ({}%, {})",
            report.summary.verified, report.summary.total, report.summary.percent, report.quality
        );
        if let Some(warning) = &report.warning {
            println!("  {}", warning);
        }
        for hint in &report.hints {
            match &hint.closest_match {
                Some(closest) => println!(
                    "  scenario {} step {}: '{}' not found (closest: '{}')",
                    hint.scenario_index + 1,
                    hint.step_number,
                    hint.target_text,
                    closest
                ),
                None => println!(
                    "  scenario {} step {}: '{}' not found",
                    hint.scenario_index + 1,
                    hint.step_number,
                    hint.target_text
                ),
            }
        }
    }
    if let Some(execution) = &snapshot.execution {
        println!(
            "execution {}: {} steps {}/{} ({}%)",
            execution.job_id,
            execution.phase,
            execution.steps_completed,
            execution.steps_total,
            execution.progress_percent
        );
        for step in &execution.steps {
            if step.status == StepStatus::Pending {
                continue;
            }
            let label = step.description.as_deref().unwrap_or("");
            match &step.error {
                Some(error) => println!("  step {} {:?}: {} ({})", step.number, step.status, label, error),
                None => println!("  step {} {:?}: {}", step.number, step.status, label),
            }
        }
    }
    if let Some(error) = &snapshot.last_error {
        println!("error: {}", error);
    }
}
