//! Runner result types

use std::fmt;

use bytes::Bytes;

/// Exit code reported when the process could not be observed to exit cleanly
pub const FAILURE_EXIT_CODE: i32 = -1;

/// Terminal event of the prompt wait. Exactly one occurs per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedEvent {
    /// The prompt appeared; `before` holds the output preceding it
    PromptMatched { before: Bytes },
    /// The stream reached end-of-output without a match
    StreamClosed { before: Bytes },
    /// Neither happened before the deadline
    TimedOut { before: Bytes },
}

impl ExpectedEvent {
    /// Output captured before the event
    pub fn before(&self) -> &Bytes {
        match self {
            ExpectedEvent::PromptMatched { before }
            | ExpectedEvent::StreamClosed { before }
            | ExpectedEvent::TimedOut { before } => before,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpectedEvent::PromptMatched { .. } => "prompt_matched",
            ExpectedEvent::StreamClosed { .. } => "stream_closed",
            ExpectedEvent::TimedOut { .. } => "timed_out",
        }
    }
}

/// Why a run produced no usable exit status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Neither the prompt nor end-of-output arrived in time, or output stalled
    /// after the response; the process was killed
    TimedOut,
    /// The prompt came back after the response, e.g. a rejected password;
    /// the process was killed
    PromptRepeated,
    /// The process ended but its status could not be read
    StatusUnavailable,
    /// Writing captured output to the sink failed
    Sink(String),
    /// The interaction layer itself failed
    Fault(String),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::TimedOut => write!(f, "timed out waiting for output"),
            Failure::PromptRepeated => write!(f, "prompt repeated after response"),
            Failure::StatusUnavailable => write!(f, "exit status unavailable"),
            Failure::Sink(reason) => write!(f, "output sink failed: {}", reason),
            Failure::Fault(reason) => write!(f, "session fault: {}", reason),
        }
    }
}

/// Result of one runner invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Failed(Failure),
}

impl ExitOutcome {
    /// Exit status, or [`FAILURE_EXIT_CODE`] for failures
    pub fn code(&self) -> i32 {
        match self {
            ExitOutcome::Exited(code) => *code,
            ExitOutcome::Failed(_) => FAILURE_EXIT_CODE,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exit status {}", code),
            ExitOutcome::Failed(failure) => write!(f, "{}", failure),
        }
    }
}
