//! External process invocation.
//!
//! Every command the engine issues goes through [`CommandRunner`] so the
//! resolver, detector and sequencer can be driven by scripted runners in tests.

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Stdout followed by stderr, trimmed.
    pub output: String,
    pub success: bool,
}

#[cfg(test)]
impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("'{program}' not found. Is it installed and in your PATH?")]
    ToolNotFound { program: String },
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` until it exits. A non-zero exit status is
    /// reported through [`CommandOutput::success`], not as an error.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, InvokeError>;
}

/// Runs commands as real child processes.
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, InvokeError> {
        tracing::debug!(program, ?args, "spawning");
        let out = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    InvokeError::ToolNotFound {
                        program: program.to_string(),
                    }
                } else {
                    InvokeError::Spawn {
                        program: program.to_string(),
                        source: e,
                    }
                }
            })?;

        let stdout = String::from_utf8_lossy(&out.stdout);
        let stderr = String::from_utf8_lossy(&out.stderr);
        let combined: Vec<&str> = [stdout.trim(), stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();

        tracing::debug!(program, status = ?out.status.code(), "process exited");
        Ok(CommandOutput {
            output: combined.join("\n"),
            success: out.status.success(),
        })
    }
}

/// Render a command line for log display.
pub fn command_line(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}
