//! Command handlers for CLI subcommands.
//!
//! Each handler prints its result and returns the process exit code.

use std::time::Duration;

use jarvis_core::{ConfigError, DeploymentConfig, Pid};
use jarvis_persistence::{atomic, PersistenceError, PidStore};
use jarvis_supervisor::{
    control, smoke, InstanceStatus, LaunchSpec, LifecycleError, LifecycleRun, Orchestrator, Pacer,
    PhaseOutcome, RestartReport, RunOptions, StartReport, StatusReport, StopReport, SystemHost,
    UnitSpec,
};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::cli::{Cli, Commands, OutputFormat};

/// `status` exit code when the handle names a dead or foreign process.
pub const STATUS_STALE: i32 = 1;
/// `status` exit code when nothing is tracked.
pub const STATUS_NOT_RUNNING: i32 = 3;

/// Errors surfaced to the operator by `main`.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CommandError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Lifecycle(e) => e.exit_code(),
            _ => 1,
        }
    }
}

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, CommandError>;

/// Everything a command needs about the deployment.
struct Context {
    config: DeploymentConfig,
    host: SystemHost,
    spec: LaunchSpec,
    store: PidStore,
    format: OutputFormat,
}

impl Context {
    fn load(cli: &Cli) -> Result<Self> {
        let config = DeploymentConfig::load(cli.root.as_deref())?;
        info!(
            root = %config.root().display(),
            signature = %config.signature(),
            "Loaded deployment configuration"
        );
        Ok(Self {
            host: SystemHost::new(),
            spec: LaunchSpec::from_config(&config),
            store: PidStore::new(config.pid_file()),
            format: cli.format,
            config,
        })
    }
}

fn pacer() -> Result<Pacer> {
    Pacer::with_signal_handlers().map_err(CommandError::Signals)
}

/// Execute a CLI command, returning the exit code.
pub fn execute(cli: &Cli) -> Result<i32> {
    let ctx = Context::load(cli)?;

    match &cli.command {
        Commands::Start => cmd_start(&ctx),
        Commands::Stop => cmd_stop(&ctx),
        Commands::Restart => cmd_restart(&ctx),
        Commands::Status => cmd_status(&ctx),
        Commands::RestartClean {
            delay,
            force,
            dry_run,
        } => cmd_restart_clean(
            &ctx,
            RunOptions {
                delay_secs: *delay,
                force: *force,
                dry_run: *dry_run,
            },
        ),
        Commands::Unit { output, user } => cmd_unit(&ctx, output.as_deref(), user.clone()),
        Commands::Smoke { window } => cmd_smoke(&ctx, Duration::from_secs(*window)),
    }
}

fn cmd_start(ctx: &Context) -> Result<i32> {
    let timings = ctx.config.timings();
    let report = control::start_instance(&ctx.host, &ctx.spec, &ctx.store, &timings, &pacer()?)?;
    emit(ctx.format, &report, || println!("{}", describe_start(&report)))?;
    Ok(0)
}

fn cmd_stop(ctx: &Context) -> Result<i32> {
    let timings = ctx.config.timings();
    let report = control::stop_instance(&ctx.host, &ctx.store, ctx.spec.signature(), &timings, &pacer()?)?;
    emit(ctx.format, &report, || println!("{}", describe_stop(&report)))?;
    Ok(0)
}

fn cmd_restart(ctx: &Context) -> Result<i32> {
    let timings = ctx.config.timings();
    let report = control::restart_instance(&ctx.host, &ctx.spec, &ctx.store, &timings, &pacer()?)?;
    emit(ctx.format, &report, || print_restart(&report))?;
    Ok(0)
}

fn cmd_status(ctx: &Context) -> Result<i32> {
    let report = control::status(&ctx.host, &ctx.store, ctx.spec.signature());
    emit(ctx.format, &report, || print_status(&report))?;
    Ok(status_exit_code(&report))
}

fn cmd_restart_clean(ctx: &Context, options: RunOptions) -> Result<i32> {
    let pacer = pacer()?;
    let run = Orchestrator::new(&ctx.host, &ctx.spec, &ctx.store, ctx.config.timings(), &pacer).run(options);
    emit(ctx.format, &run, || print_run(&run))?;
    if let Some(err) = run.error() {
        eprintln!("Error: {}", err);
    }
    Ok(run.exit_code())
}

fn cmd_unit(ctx: &Context, output: Option<&std::path::Path>, user: Option<String>) -> Result<i32> {
    let unit = UnitSpec::from_config(&ctx.config, user).map_err(LifecycleError::from)?;
    let rendered = jarvis_supervisor::render_unit(&unit);

    match output {
        Some(path) => {
            atomic::atomic_write(path, rendered.as_bytes())?;
            info!(path = %path.display(), "Wrote systemd unit");
            println!("Wrote {}", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(0)
}

fn cmd_smoke(ctx: &Context, window: Duration) -> Result<i32> {
    let timings = ctx.config.timings();
    let report = smoke::run_smoke(&ctx.host, &ctx.spec, &ctx.store, &timings, window, &pacer()?)?;
    emit(ctx.format, &report, || {
        println!(
            "Smoke test passed: pid {} stayed up for {}s",
            report.pid, report.window_secs
        );
        println!("{}", describe_stop(&report.stop));
    })?;
    Ok(0)
}

/// Print `value` as JSON, or run `text` for the human-readable form.
fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce()) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(),
    }
    Ok(())
}

fn status_exit_code(report: &StatusReport) -> i32 {
    match report.instance {
        InstanceStatus::Running { .. } => 0,
        InstanceStatus::Stale { .. } => STATUS_STALE,
        InstanceStatus::NotRunning => STATUS_NOT_RUNNING,
    }
}

fn describe_start(report: &StartReport) -> String {
    match report {
        StartReport::Started { pid } => format!("Started jarvis (pid {})", pid),
        StartReport::AlreadyRunning { pid } => format!("jarvis is already running (pid {})", pid),
    }
}

fn describe_stop(report: &StopReport) -> String {
    match report {
        StopReport::NotRunning => "jarvis is not running".to_string(),
        StopReport::Stopped { pid } => format!("Stopped jarvis (pid {})", pid),
        StopReport::Killed { pid } => format!("Killed jarvis (pid {}) after the grace period", pid),
    }
}

fn print_restart(report: &RestartReport) {
    println!("{}", describe_stop(&report.stop));
    println!("{}", describe_start(&report.start));
}

fn print_status(report: &StatusReport) {
    match report.instance {
        InstanceStatus::Running { pid } => println!("jarvis is running (pid {})", pid),
        InstanceStatus::Stale { pid } => println!(
            "jarvis is not running (stale pid {} in {})",
            pid,
            report.pid_file.display()
        ),
        InstanceStatus::NotRunning => println!("jarvis is not running"),
    }
    if !report.untracked.is_empty() {
        println!("Untracked instances: {}", join_pids(&report.untracked));
    }
}

fn print_run(run: &LifecycleRun) {
    let prefix = if run.options.dry_run { "[dry-run] " } else { "" };
    for phase in &run.phases {
        let marker = match phase.outcome {
            PhaseOutcome::Ok => "ok",
            PhaseOutcome::Soft => "warn",
            PhaseOutcome::Skipped => "skip",
            PhaseOutcome::Simulated => "would",
            PhaseOutcome::Fatal => "FAIL",
        };
        println!("{}{:<10} {:<5} {}", prefix, format!("{:?}", phase.state), marker, phase.detail);
    }
    if !run.residuals.is_empty() {
        println!("{}Residual processes: {}", prefix, join_pids(&run.residuals));
    }
    match (run.succeeded(), run.final_pid) {
        (true, Some(pid)) => println!("Clean restart complete: jarvis running (pid {})", pid),
        (true, None) => println!("{}Clean restart simulated", prefix),
        (false, _) => println!("Clean restart failed in {:?}", last_state(run)),
    }
}

fn last_state(run: &LifecycleRun) -> jarvis_supervisor::LifecycleState {
    run.phases.last().map_or(run.state, |p| p.state)
}

fn join_pids(pids: &[Pid]) -> String {
    pids.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
