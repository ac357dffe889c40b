mod cli;
mod engine;
mod model;
mod orchestrator;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directory and file name for the lifecycle log, creating the directory.
fn prepare_log_file(log_file: &Path) -> Result<(PathBuf, OsString)> {
    let log_dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("create log directory {}", log_dir.display()))?;
    let log_filename = log_file
        .file_name()
        .map(OsStr::to_os_string)
        .unwrap_or_else(|| OsString::from("adb-tether.log"));
    Ok((log_dir.to_path_buf(), log_filename))
}

/// File-only tracing; stdout/stderr belong to the TUI or the one-shot output.
/// The returned guard flushes the writer on drop.
fn setup_tracing(args: &cli::Cli) -> Result<WorkerGuard> {
    let log_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("adb_tether={log_level}")));

    let (log_dir, log_filename) = prepare_log_file(&args.log_file_path())?;
    let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .context("install tracing subscriber")?;

    Ok(guard)
}

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = !args.is_interactive();

    // Local time must be read while this is still the only thread.
    orchestrator::init_local_offset();
    // Without a log file the tool still works; the reason shows up in its output.
    let (log_guard, startup_warnings) = match setup_tracing(&args) {
        Ok(guard) => (Some(guard), Vec::new()),
        Err(e) => (None, vec![format!("Lifecycle log disabled: {e:#}")]),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;
    let res = runtime.block_on(cli::run(args, startup_warnings));
    // Child processes still in flight are left to finish on their own.
    runtime.shutdown_background();

    match res {
        Ok(()) => {
            tracing::info!("exiting");
            if is_non_tui {
                drop(log_guard);
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("{e:#}");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_without_a_directory_uses_the_working_directory() {
        let (dir, name) = prepare_log_file(Path::new("tether.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, OsString::from("tether.log"));
    }

    #[test]
    fn unusable_log_directory_is_an_error() {
        let blocker = std::env::temp_dir().join(format!("adb-tether-blocker-{}", std::process::id()));
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = prepare_log_file(&blocker.join("logs").join("adb-tether.log")).unwrap_err();
        assert!(format!("{err:#}").starts_with("create log directory"));

        std::fs::remove_file(&blocker).unwrap();
    }
}
