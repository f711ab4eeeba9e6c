//! Interactive runner
//!
//! Spawns a command on a PTY, answers the expected prompt with a response and
//! streams everything else into a sink. Faults inside the interaction layer
//! never escape: they are logged and reported as [`Failure::Fault`].

use std::any::Any;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::command::CommandLine;
use crate::error::Result;
use crate::outcome::{ExitOutcome, ExpectedEvent, Failure};
use crate::prompt::Prompt;
use crate::session::{DrainEnd, PtyDimensions, Session};

/// How long a process may linger after closing its output
const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Best-effort writer over an optional sink. The first failure is kept and
/// further writes are skipped.
struct Capture<'a> {
    sink: Option<&'a mut (dyn Write + Send)>,
    written: u64,
    error: Option<String>,
}

impl<'a> Capture<'a> {
    fn new(sink: Option<&'a mut (dyn Write + Send)>) -> Self {
        Self {
            sink,
            written: 0,
            error: None,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        if bytes.is_empty() || self.error.is_some() {
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        match sink.write_all(bytes) {
            Ok(()) => self.written += bytes.len() as u64,
            Err(e) => {
                error!("Failed to write session output to sink: {}", e);
                self.error = Some(e.to_string());
            }
        }
    }

    fn flush(&mut self) {
        if self.error.is_some() {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.flush() {
                error!("Failed to flush sink: {}", e);
                self.error = Some(e.to_string());
            }
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct InteractiveRunner {
    dimensions: PtyDimensions,
    exit_grace: Duration,
    idle_timeout: Option<Duration>,
}

impl Default for InteractiveRunner {
    fn default() -> Self {
        Self {
            dimensions: PtyDimensions::default(),
            exit_grace: DEFAULT_EXIT_GRACE,
            idle_timeout: None,
        }
    }
}

impl InteractiveRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimensions(mut self, dimensions: PtyDimensions) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Time allowed between end-of-output and process exit before the
    /// process is killed
    pub fn with_exit_grace(mut self, exit_grace: Duration) -> Self {
        self.exit_grace = exit_grace;
        self
    }

    /// Longest silence tolerated once the prompt is answered (zero = no
    /// limit). Defaults to the run's `timeout`.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    /// Run `command`, answer `prompt` with `response` and capture output.
    ///
    /// `timeout` bounds the wait for the prompt (or end-of-output); zero
    /// waits indefinitely. On timeout the output seen so far is still written
    /// to the sink and the process group is killed. Once the prompt is
    /// answered, output is drained until end-of-stream. The drain ends early,
    /// killing the process group, if the prompt shows up again
    /// ([`Failure::PromptRepeated`]) or output stalls past the idle limit
    /// ([`Failure::TimedOut`]).
    pub async fn run(
        &self,
        command: &CommandLine,
        prompt: &Prompt,
        response: &[u8],
        sink: Option<&mut (dyn Write + Send)>,
        timeout: Duration,
    ) -> ExitOutcome {
        let mut capture = Capture::new(sink);

        let result = AssertUnwindSafe(self.interact(command, prompt, response, &mut capture, timeout))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(program = command.program(), "Interactive session error: {}", e);
                ExitOutcome::Failed(Failure::Fault(e.to_string()))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(program = command.program(), "Interactive session panicked: {}", reason);
                ExitOutcome::Failed(Failure::Fault(format!("panic: {}", reason)))
            }
        };

        capture.flush();
        debug!(bytes = capture.written, "Session output captured");

        match (capture.error, outcome) {
            (Some(reason), ExitOutcome::Exited(_)) => ExitOutcome::Failed(Failure::Sink(reason)),
            (_, outcome) => outcome,
        }
    }

    async fn interact(
        &self,
        command: &CommandLine,
        prompt: &Prompt,
        response: &[u8],
        capture: &mut Capture<'_>,
        timeout: Duration,
    ) -> Result<ExitOutcome> {
        let mut session = Session::spawn(command, self.dimensions)?;
        info!(
            program = command.program(),
            pid = ?session.process_id(),
            "Spawned interactive session"
        );

        let event = session
            .expect(prompt, timeout, |chunk| capture.write(chunk))
            .await?;
        debug!(event = event.as_str(), "Prompt wait resolved");
        capture.write(event.before());

        match event {
            ExpectedEvent::PromptMatched { .. } => {
                session.send_line(response)?;
                let idle = self.idle_timeout.unwrap_or(timeout);
                match session.drain(prompt, idle, |chunk| capture.write(chunk)).await {
                    DrainEnd::Closed => {}
                    DrainEnd::PromptRepeated => {
                        warn!(
                            program = command.program(),
                            "Prompt repeated after the response was sent, killing session"
                        );
                        session.kill();
                        return Ok(ExitOutcome::Failed(Failure::PromptRepeated));
                    }
                    DrainEnd::Idle => {
                        warn!(
                            program = command.program(),
                            "No output for {:?} after the response was sent, killing session",
                            idle
                        );
                        session.kill();
                        return Ok(ExitOutcome::Failed(Failure::TimedOut));
                    }
                }
            }
            ExpectedEvent::StreamClosed { .. } => {
                info!(program = command.program(), "Output ended without a prompt");
            }
            ExpectedEvent::TimedOut { .. } => {
                warn!(
                    program = command.program(),
                    "No prompt or end of output within {:?}, killing session",
                    timeout
                );
                session.kill();
                return Ok(ExitOutcome::Failed(Failure::TimedOut));
            }
        }

        match session.wait(self.exit_grace).await {
            Ok(code) => {
                if code != 0 {
                    warn!(program = command.program(), "Command failed with exit status {}", code);
                }
                Ok(ExitOutcome::Exited(code))
            }
            Err(e) => {
                warn!(program = command.program(), "{}", e);
                Ok(ExitOutcome::Failed(Failure::StatusUnavailable))
            }
        }
    }
}

/// Run with default settings. See [`InteractiveRunner::run`].
pub async fn run_interactive(
    command: &CommandLine,
    prompt: &Prompt,
    response: &[u8],
    sink: Option<&mut (dyn Write + Send)>,
    timeout: Duration,
) -> ExitOutcome {
    InteractiveRunner::default()
        .run(command, prompt, response, sink, timeout)
        .await
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
