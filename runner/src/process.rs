//! Non-interactive command execution with stdout redirected to a file

use std::fs::File;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{error, info, warn};

use crate::command::CommandLine;
use crate::error::{Result, SessionError};
use crate::outcome::{ExitOutcome, Failure};

/// Run `command` with its stdout written straight into `stdout`.
///
/// stdin and stderr are inherited. A zero `timeout` waits indefinitely;
/// otherwise the child is killed once it elapses and
/// [`Failure::TimedOut`] is returned.
pub async fn run_redirected(command: &CommandLine, stdout: File, timeout: Duration) -> ExitOutcome {
    match redirect(command, stdout, timeout).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(program = command.program(), "Command execution error: {}", e);
            ExitOutcome::Failed(Failure::Fault(e.to_string()))
        }
    }
}

async fn redirect(command: &CommandLine, stdout: File, timeout: Duration) -> Result<ExitOutcome> {
    let mut cmd = Command::new(command.program());
    cmd.args(command.arguments())
        .stdin(Stdio::inherit())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| SessionError::Spawn {
        program: command.program().to_string(),
        reason: e.to_string(),
    })?;

    info!(program = command.program(), pid = ?child.id(), "Spawned command");

    let status = if timeout.is_zero() {
        child.wait().await?
    } else {
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    program = command.program(),
                    "Command did not finish within {:?}, killing",
                    timeout
                );
                child.kill().await?;
                return Ok(ExitOutcome::Failed(Failure::TimedOut));
            }
        }
    };

    match status.code() {
        Some(code) => {
            if code != 0 {
                warn!(program = command.program(), "Command failed with exit status {}", code);
            }
            Ok(ExitOutcome::Exited(code))
        }
        None => {
            warn!(program = command.program(), "Command terminated by signal");
            Ok(ExitOutcome::Failed(Failure::StatusUnavailable))
        }
    }
}
