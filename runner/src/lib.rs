//! Session runner
//!
//! Spawns an external command attached to a pseudo-terminal, waits for an
//! expected prompt, answers it, and captures the remaining output into a
//! caller-provided sink. Every invocation yields an [`ExitOutcome`].

pub mod command;
pub mod error;
pub mod outcome;
pub mod process;
pub mod prompt;
pub mod runner;
pub mod session;

pub use command::CommandLine;
pub use error::{Result, SessionError};
pub use outcome::{ExitOutcome, ExpectedEvent, Failure, FAILURE_EXIT_CODE};
pub use process::run_redirected;
pub use prompt::{Prompt, PATTERN_WINDOW};
pub use runner::{run_interactive, InteractiveRunner};
pub use session::{DrainEnd, PtyDimensions, Session};
