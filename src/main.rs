//! # threatflow - CLI Entry Point
//!
//! Command-line interface for the threatflow daemon.
//!
//! Commands:
//! - `start`       - Start the polling daemon
//! - `tick`        - Run a single poll pass (for external cron)
//! - `status`      - Show pipeline status and statistics
//! - `stop`        - Stop the running daemon
//! - `init-config` - Generate a default configuration file
//! - `schedule`    - Manage recurring agent schedules

use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use threatflow::agents::StubExecutor;
use threatflow::correlation::CorrelationStore;
use threatflow::escalation::ThreatPipeline;
use threatflow::intel::{HttpIntelFeed, StaticIntelFeed, ThreatIntelFeed};
use threatflow::response::alerter::AlertDispatcher;
use threatflow::response::containment::{ContainmentExecutor, FirewallBackend};
use threatflow::schedule::AgentScheduler;
use threatflow::{Frequency, PipelineConfig, PipelineError, PipelineResult};

/// threatflow - threat escalation and correlation pipeline daemon.
///
/// Polls recurring agent schedules, classifies reported threats into
/// escalation tiers, and drives alerting, containment, and correlation.
#[derive(Parser, Debug)]
#[command(name = "threatflow")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "threatflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the threatflow daemon.
    Start,

    /// Run a single poll pass and exit (for an external cron tick).
    Tick,

    /// Show current pipeline status.
    Status,

    /// Stop the running daemon.
    Stop,

    /// Generate a default configuration file.
    InitConfig,

    /// Manage recurring agent schedules.
    Schedule {
        #[command(subcommand)]
        action: ScheduleCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ScheduleCommands {
    /// Create a schedule for an agent.
    Add {
        /// Agent identifier to execute.
        #[arg(long)]
        agent: String,

        /// One of: every_30_minutes, every_4_hours, hourly, daily,
        /// weekly, monthly.
        #[arg(long, default_value = "daily")]
        frequency: String,
    },

    /// List all schedules.
    List,

    /// Re-enable a disabled schedule.
    Enable { id: String },

    /// Disable a schedule without deleting its history.
    Disable { id: String },

    /// Delete a schedule (execution history is retained).
    Remove { id: String },
}

#[tokio::main]
async fn main() -> PipelineResult<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => cmd_start(&cli.config).await,
        Commands::Tick => cmd_tick(&cli.config).await,
        Commands::Status => cmd_status(&cli.config).await,
        Commands::Stop => cmd_stop(&cli.config).await,
        Commands::InitConfig => cmd_init_config(&cli.config),
        Commands::Schedule { action } => cmd_schedule(&cli.config, action),
    }
}

/// Load configuration (file if present, defaults otherwise) and apply
/// environment-variable overrides.
fn load_config(config_path: &Path) -> PipelineResult<PipelineConfig> {
    let mut config = if config_path.exists() {
        info!("Loading configuration from: {}", config_path.display());
        PipelineConfig::from_file(config_path)?
    } else {
        info!("No config file found, using defaults. Run 'init-config' to generate one.");
        PipelineConfig::default()
    };
    config.apply_env_overrides()?;
    Ok(config)
}

/// Assemble the scheduler with its full collaborator chain.
fn build_scheduler(config: &PipelineConfig) -> PipelineResult<AgentScheduler> {
    let store = CorrelationStore::open(&config.general.data_dir)?;
    let alerts = AlertDispatcher::new(&config.alerts, &config.general);
    let containment = ContainmentExecutor::new(Box::new(FirewallBackend));
    let intel: Box<dyn ThreatIntelFeed> = match &config.intel.feed_url {
        Some(url) => Box::new(HttpIntelFeed::new(url, &config.general)),
        None => Box::new(StaticIntelFeed::empty()),
    };
    let pipeline = ThreatPipeline::new(config, store, alerts, containment, intel);

    // The agent execution service is an external collaborator; until one
    // is wired in, schedules cycle against the benign stub.
    AgentScheduler::open(&config.general.data_dir, Box::new(StubExecutor), pipeline)
}

/// Start the threatflow daemon.
///
/// The main loop:
/// 1. Load configuration and apply env overrides
/// 2. Write PID file
/// 3. Install shutdown signal handler
/// 4. Open the scheduler (correlation store, alerts, containment, intel)
/// 5. Poll schedules every interval until shutdown
async fn cmd_start(config_path: &Path) -> PipelineResult<()> {
    info!("threatflow starting...");

    let config = load_config(config_path)?;
    std::fs::create_dir_all(&config.general.data_dir)?;

    let pid_path = config.general.data_dir.join("threatflow.pid");
    write_pid_file(&pid_path)?;
    info!("PID file written to: {}", pid_path.display());

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!("Could not install signal handler: {}. Use kill to stop.", e);
    }

    let mut scheduler = build_scheduler(&config)?;
    info!(
        "Scheduler ready: {} schedules ({} active), integration mode {:?}",
        scheduler.schedules().len(),
        scheduler.schedules().iter().filter(|s| s.is_active).count(),
        config.containment.integration_mode,
    );

    let poll_interval = std::time::Duration::from_secs(config.general.poll_interval_secs);
    let mut passes: u64 = 0;
    let mut total_executed: u64 = 0;

    // -----------------------------------------------------------------------
    // Main loop: poll -> execute -> escalate -> sleep
    // -----------------------------------------------------------------------
    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("Shutdown signal received. Stopping gracefully...");
            break;
        }

        let report = scheduler.poll_once();
        passes += 1;
        total_executed += report.executed as u64;

        for outcome in &report.results {
            match outcome.escalation {
                Some(tier) => info!(
                    "  {} ({}): execution {} -> {:?} escalated to {}",
                    outcome.schedule_id, outcome.agent_id, outcome.execution_id,
                    outcome.status, tier,
                ),
                None => info!(
                    "  {} ({}): execution {} -> {:?}",
                    outcome.schedule_id, outcome.agent_id, outcome.execution_id,
                    outcome.status,
                ),
            }
        }

        std::thread::sleep(poll_interval);
    }

    // -----------------------------------------------------------------------
    // Graceful shutdown
    // -----------------------------------------------------------------------
    if let Err(e) = std::fs::remove_file(&pid_path) {
        warn!("Could not remove PID file: {}", e);
    }

    info!(
        "threatflow stopped. Executed {} scheduled jobs across {} poll passes.",
        total_executed, passes,
    );

    Ok(())
}

/// Run exactly one poll pass, for deployments driven by external cron.
async fn cmd_tick(config_path: &Path) -> PipelineResult<()> {
    let config = load_config(config_path)?;
    std::fs::create_dir_all(&config.general.data_dir)?;

    let mut scheduler = build_scheduler(&config)?;
    let report = scheduler.poll_once();

    println!("Executed {} scheduled jobs", report.executed);
    for outcome in &report.results {
        println!(
            "  {} ({}): execution {} -> {:?}{}",
            outcome.schedule_id,
            outcome.agent_id,
            outcome.execution_id,
            outcome.status,
            outcome
                .escalation
                .map(|t| format!(", escalated to {}", t))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

/// Show the current status of the daemon and the stores.
async fn cmd_status(config_path: &Path) -> PipelineResult<()> {
    let config = load_config(config_path)?;
    let pid_path = config.general.data_dir.join("threatflow.pid");

    match read_pid_file(&pid_path) {
        Some(pid) => {
            if is_process_running(pid) {
                println!("threatflow is RUNNING (PID: {})", pid);
            } else {
                println!("threatflow is NOT RUNNING (stale PID file, PID {} not found)", pid);
                println!("  The daemon may have crashed. Remove {} to clear.", pid_path.display());
            }
        }
        None => {
            println!("threatflow is NOT RUNNING (no PID file)");
        }
    }

    if config.general.data_dir.exists() {
        println!("Data directory: {}", config.general.data_dir.display());

        let scheduler = build_scheduler(&config)?;
        let stats = scheduler.statistics();
        println!("Schedules: {} total, {} active", stats.total_schedules, stats.active_schedules);
        println!(
            "Executions: {} total, {} completed, {} failed ({:.1}% success)",
            stats.total_executions,
            stats.completed_executions,
            stats.failed_executions,
            stats.success_rate,
        );

        let threat_stats = scheduler.pipeline().store().statistics();
        println!(
            "Threats: {} total (critical {}, high {}, medium {}, low {}, info {})",
            threat_stats.total_threats,
            threat_stats.critical,
            threat_stats.high,
            threat_stats.medium,
            threat_stats.low,
            threat_stats.info,
        );
        println!("Average confidence: {:.2}", threat_stats.avg_confidence);
        println!(
            "Correlation records: {}",
            scheduler.pipeline().store().correlation_count()
        );
    } else {
        println!("No data directory found. Run 'threatflow start' first.");
    }

    println!();
    println!("Configuration:");
    println!("  Poll interval: {}s", config.general.poll_interval_secs);
    println!("  Threat threshold: {}", config.escalation.threat_threshold);
    println!("  Auto-correlate: {}", config.escalation.auto_correlate);
    println!("  Integration mode: {:?}", config.containment.integration_mode);
    println!("  Webhook configured: {}", config.alerts.webhook_url.is_some());
    println!("  Alert email configured: {}", config.alerts.alert_email.is_some());
    println!("  Intel feed configured: {}", config.intel.feed_url.is_some());

    Ok(())
}

/// Stop the running daemon.
async fn cmd_stop(config_path: &Path) -> PipelineResult<()> {
    let config = load_config(config_path)?;
    let pid_path = config.general.data_dir.join("threatflow.pid");

    match read_pid_file(&pid_path) {
        Some(pid) => {
            if !is_process_running(pid) {
                println!("Process {} is not running (stale PID file). Cleaning up.", pid);
                let _ = std::fs::remove_file(&pid_path);
                return Ok(());
            }

            println!("Sending stop signal to threatflow (PID: {})...", pid);

            #[cfg(unix)]
            {
                use std::process::Command;
                let status = Command::new("kill").args(["-TERM", &pid.to_string()]).status();
                match status {
                    Ok(s) if s.success() => {
                        println!("Stop signal sent. Daemon should shut down gracefully.");
                    }
                    Ok(s) => {
                        println!("Kill command exited with: {}. You may need to stop it manually.", s);
                    }
                    Err(e) => {
                        println!("Failed to send signal: {}. Try: kill {} manually.", e, pid);
                    }
                }
            }

            #[cfg(windows)]
            {
                use std::process::Command;
                let status = Command::new("taskkill").args(["/PID", &pid.to_string()]).status();
                match status {
                    Ok(s) if s.success() => {
                        println!("Stop signal sent. Daemon should shut down gracefully.");
                    }
                    Ok(s) => {
                        println!("taskkill exited with: {}. You may need to stop it manually.", s);
                    }
                    Err(e) => {
                        println!("Failed to send signal: {}. Try: taskkill /PID {} manually.", e, pid);
                    }
                }
            }
        }
        None => {
            println!("No PID file found at {}. Is the daemon running?", pid_path.display());
        }
    }

    Ok(())
}

/// Generate a default configuration file.
fn cmd_init_config(config_path: &Path) -> PipelineResult<()> {
    if config_path.exists() {
        return Err(PipelineError::Config(format!(
            "Configuration file already exists: {}. Remove it first or use a different path.",
            config_path.display()
        )));
    }

    PipelineConfig::write_default(config_path)?;
    println!("Default configuration written to: {}", config_path.display());
    println!("Key settings to configure:");
    println!("  [escalation]  - threat_threshold (default 3), auto_correlate");
    println!("  [alerts]      - webhook_url and alert_email sinks");
    println!("  [containment] - integration_mode (default passive / log-only)");
    println!("  [intel]       - feed_url for the threat intelligence feed");

    Ok(())
}

/// Manage schedules from the command line.
fn cmd_schedule(config_path: &Path, action: ScheduleCommands) -> PipelineResult<()> {
    let config = load_config(config_path)?;
    std::fs::create_dir_all(&config.general.data_dir)?;
    let mut scheduler = build_scheduler(&config)?;

    match action {
        ScheduleCommands::Add { agent, frequency } => {
            let frequency: Frequency = frequency.parse()?;
            let schedule = scheduler.create_schedule(&agent, frequency)?;
            println!("Schedule created: {} (next execution {})", schedule.id, schedule.next_execution);
        }
        ScheduleCommands::List => {
            if scheduler.schedules().is_empty() {
                println!("No schedules.");
            }
            for s in scheduler.schedules() {
                println!(
                    "{}  agent={}  {:?}  active={}  next={}  last={}",
                    s.id,
                    s.agent_id,
                    s.frequency,
                    s.is_active,
                    s.next_execution,
                    s.last_execution
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string()),
                );
            }
        }
        ScheduleCommands::Enable { id } => {
            scheduler.set_active(&id, true)?;
            println!("Schedule enabled: {}", id);
        }
        ScheduleCommands::Disable { id } => {
            scheduler.set_active(&id, false)?;
            println!("Schedule disabled: {}", id);
        }
        ScheduleCommands::Remove { id } => {
            scheduler.remove_schedule(&id)?;
            println!("Schedule removed: {}", id);
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// PID file management
// ---------------------------------------------------------------------------

/// Write the current process PID to a file.
fn write_pid_file(path: &Path) -> PipelineResult<()> {
    let pid = std::process::id();
    std::fs::write(path, pid.to_string())?;
    Ok(())
}

/// Read a PID from a PID file. Returns None if file doesn't exist or is invalid.
fn read_pid_file(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse::<u32>().ok()
}

/// Check if a process with the given PID is still running.
fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // On Unix, kill -0 checks if the process exists without sending a
        // signal.
        use std::process::Command;
        Command::new("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[cfg(windows)]
    {
        use std::process::Command;
        let output = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid), "/NH"])
            .output();
        match output {
            Ok(out) => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                !stdout.contains("No tasks") && stdout.contains(&pid.to_string())
            }
            Err(_) => false,
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        false
    }
}
