use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::procs::ProcSpec;

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    /// Spawn failure, non-zero exit, or cancellation.
    pub error: Option<String>,
}

impl ExecOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Stderr with the error text appended, as persisted in `proc_results`.
    pub fn stderr_with_error(&self) -> String {
        match &self.error {
            None => self.stderr.clone(),
            Some(error) if self.stderr.is_empty() => error.clone(),
            Some(error) if self.stderr.ends_with('\n') => format!("{}{error}", self.stderr),
            Some(error) => format!("{}\n{error}", self.stderr),
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Run `spec` to completion, capturing both output streams.
///
/// The child is killed if `cancel` fires first; its partial output is lost
/// and the outcome carries a cancellation error.
pub async fn execute(spec: &ProcSpec, cancel: &CancellationToken) -> ExecOutcome {
    debug!(command = %spec.command, args = ?spec.argv, "executing command");

    let child = Command::new(&spec.command)
        .args(&spec.argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(err) => {
            warn!(command = %spec.command, "failed to start command: {}", err);
            return ExecOutcome::failed(format!("failed to start {}: {err}", spec.command));
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            warn!(command = %spec.command, "command cancelled");
            ExecOutcome::failed("cancelled")
        }
        output = child.wait_with_output() => match output {
            Ok(output) => {
                let error = (!output.status.success())
                    .then(|| format!("command exited with {}", output.status));
                ExecOutcome {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    error,
                }
            }
            Err(err) => {
                warn!(command = %spec.command, "error waiting for command: {}", err);
                ExecOutcome::failed(format!("error waiting for command: {err}"))
            }
        }
    }
}
