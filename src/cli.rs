use crate::engine::TetherEngine;
use crate::model::{AppEvent, ResolutionOutcome, RunConfig, Status, TetherAction};
use crate::orchestrator::Machine;
use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "adb-tether",
    version,
    about = "Android USB tethering over adb, with a terminal dashboard"
)]
pub struct Cli {
    /// Path or name of the adb executable
    #[arg(long, default_value = "adb")]
    pub adb: String,

    /// Path or name of the ip executable
    #[arg(long, default_value = "ip")]
    pub ip: String,

    /// Device serial to use instead of auto-selecting the only connected device
    #[arg(short, long)]
    pub serial: Option<String>,

    /// Periodic status refresh while idle (0s disables)
    #[arg(long, default_value = "5s")]
    pub interval: humantime::Duration,

    /// Pause after switching USB functions before the next command
    #[arg(long, default_value = "2s")]
    pub settle: humantime::Duration,

    /// Number of entries kept in the on-screen log
    #[arg(long, default_value_t = 20)]
    pub log_lines: usize,

    /// Lifecycle log file (defaults to <data dir>/adb-tether/adb-tether.log)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print a text status summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Print status (or the action result) as JSON and exit (no TUI)
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Run one tethering sequence without the TUI and exit
    #[arg(long, value_enum)]
    pub action: Option<TetherAction>,
}

impl Cli {
    pub fn log_file_path(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(default_log_file)
    }

    pub fn is_interactive(&self) -> bool {
        !(self.text || self.json || self.action.is_some())
    }
}

fn default_log_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("adb-tether")
        .join("adb-tether.log")
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        adb_path: args.adb.clone(),
        ip_path: args.ip.clone(),
        serial: args.serial.clone().filter(|s| !s.trim().is_empty()),
        refresh_interval: Duration::from(args.interval),
        settle_delay: Duration::from(args.settle),
        log_capacity: args.log_lines.max(1),
        startup_warnings: Vec::new(),
    }
}

pub async fn run(args: Cli, startup_warnings: Vec<String>) -> Result<()> {
    let mut cfg = build_config(&args);
    cfg.startup_warnings = startup_warnings;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), ?cfg, "starting adb-tether");

    if let Some(action) = args.action {
        return run_action(&cfg, action, args.json).await;
    }

    if args.is_interactive() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(cfg).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_status(&cfg, false).await;
        }
    }

    run_status(&cfg, args.json).await
}

#[derive(Serialize)]
struct StatusReport<'a> {
    status: &'a Status,
    messages: Vec<String>,
}

/// One resolution and detection pass folded through the state machine.
async fn check_status(cfg: &RunConfig, engine: &TetherEngine) -> Machine {
    let mut machine = Machine::new(cfg.serial.clone(), cfg.log_capacity);
    for warning in &cfg.startup_warnings {
        machine.warn(warning);
    }
    machine.handle(AppEvent::Tick);

    let (report, detection) = tokio::join!(
        engine.resolve(cfg.serial.as_deref(), None),
        engine.detect_interface()
    );
    machine.handle(AppEvent::DeviceResolved(report));
    machine.handle(AppEvent::InterfaceDetected(detection));
    machine
}

async fn run_status(cfg: &RunConfig, json: bool) -> Result<()> {
    let engine = TetherEngine::new(cfg);
    let machine = check_status(cfg, &engine).await;
    let messages: Vec<String> = machine.log().iter().map(|e| e.text.clone()).collect();

    let (out_tx, out_handle) = spawn_output_writer();
    if json {
        let report = StatusReport {
            status: machine.status(),
            messages,
        };
        let out = serde_json::to_string_pretty(&report)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        let summary = crate::text_summary::build_status_summary(machine.status(), machine.log());
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

async fn run_action(cfg: &RunConfig, action: TetherAction, json: bool) -> Result<()> {
    let engine = TetherEngine::new(cfg);
    let (out_tx, out_handle) = spawn_output_writer();
    for warning in &cfg.startup_warnings {
        let _ = out_tx.send(OutputLine::Stderr(format!("[WARN] {warning}")));
    }

    let report = engine.resolve(cfg.serial.as_deref(), None).await;
    let serial = match report.outcome {
        ResolutionOutcome::Ready(serial) => serial,
        other => {
            drop(out_tx);
            let _ = out_handle.await;
            anyhow::bail!(
                "cannot {action}: no device connected or authorized ({})",
                other.connection_state().label()
            );
        }
    };

    let progress = out_tx.clone();
    let result = engine
        .run_action(action, &serial, move |ev| {
            if let Some(line) = crate::text_summary::progress_line(&ev) {
                let _ = progress.send(OutputLine::Stderr(line));
            }
        })
        .await;

    if json {
        let out = serde_json::to_string_pretty(&result)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in crate::text_summary::build_action_summary(&result).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;

    if !result.succeeded {
        let step = result.failed_step.as_deref().unwrap_or("unknown step");
        anyhow::bail!("tethering {action} failed on {serial} at: {step}");
    }
    Ok(())
}
