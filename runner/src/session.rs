//! PTY-backed session
//!
//! A [`Session`] owns one child process attached to a pseudo-terminal. Output
//! is pumped off the PTY by a dedicated reader thread into a channel so that
//! waits can be bounded by a deadline. Dropping the session kills the child
//! (and its process group on Unix) and reaps it.

use std::io::{Read, Write};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, warn};

use crate::command::CommandLine;
use crate::error::{Result, SessionError};
use crate::outcome::ExpectedEvent;
use crate::prompt::Prompt;

const READ_BUFFER_SIZE: usize = 8192;
const OUTPUT_CHANNEL_CAPACITY: usize = 256;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);
const REAP_ATTEMPTS: usize = 10;

/// Terminal size reported to the child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtyDimensions {
    pub cols: u16,
    pub rows: u16,
}

impl Default for PtyDimensions {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Why [`Session::drain`] stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEnd {
    /// End-of-output
    Closed,
    /// The watched prompt appeared again
    PromptRepeated,
    /// No output within the idle limit
    Idle,
}

/// One live child process with its PTY
pub struct Session {
    program: String,
    // Held so the PTY stays open for the whole session
    _master: Box<dyn MasterPty + Send>,
    writer: Option<Box<dyn Write + Send>>,
    child: Box<dyn Child + Send + Sync>,
    output_rx: mpsc::Receiver<Bytes>,
    pending: BytesMut,
    eof: bool,
    exit_code: Option<i32>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("program", &self.program)
            .field("pid", &self.child.process_id())
            .field("pending", &self.pending.len())
            .field("eof", &self.eof)
            .field("exit_code", &self.exit_code)
            .finish()
    }
}

impl Session {
    /// Spawn `command` on a fresh PTY
    pub fn spawn(command: &CommandLine, dimensions: PtyDimensions) -> Result<Self> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: dimensions.rows,
                cols: dimensions.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::PtyOpen(e.to_string()))?;

        #[cfg(unix)]
        if let Some(fd) = pair.master.as_raw_fd() {
            pass_output_through(fd)?;
        }

        let mut cmd = CommandBuilder::new(command.program());
        cmd.args(command.arguments());
        // portable-pty defaults to $HOME otherwise
        cmd.cwd(std::env::current_dir()?);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::Spawn {
                program: command.program().to_string(),
                reason: e.to_string(),
            })?;

        // Our copy of the slave must go, or the reader never sees end-of-output
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::Internal(format!("Failed to clone PTY reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::Internal(format!("Failed to take PTY writer: {}", e)))?;

        let output_rx = start_reader(reader)?;

        debug!(
            program = command.program(),
            pid = ?child.process_id(),
            "PTY session started"
        );

        Ok(Self {
            program: command.program().to_string(),
            _master: pair.master,
            writer: Some(writer),
            child,
            output_rx,
            pending: BytesMut::new(),
            eof: false,
            exit_code: None,
        })
    }

    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }

    pub fn is_alive(&mut self) -> bool {
        if self.exit_code.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.exit_code = Some(status.exit_code() as i32);
                false
            }
            Err(_) => true,
        }
    }

    /// Exit status once observed
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Wait until `prompt` appears, the stream closes, or `timeout` elapses.
    ///
    /// A zero timeout waits indefinitely. Output that can no longer be part of
    /// a match is handed to `on_output` as it arrives; the event's `before`
    /// holds the rest. On a match, output following the prompt stays queued
    /// and is the first thing [`Session::drain`] yields; the prompt bytes are
    /// consumed.
    pub async fn expect<F>(
        &mut self,
        prompt: &Prompt,
        timeout: Duration,
        mut on_output: F,
    ) -> Result<ExpectedEvent>
    where
        F: FnMut(&[u8]),
    {
        let deadline = if timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + timeout)
        };

        loop {
            if let Some(before) = self.scan(prompt, &mut on_output) {
                return Ok(ExpectedEvent::PromptMatched { before });
            }

            if self.eof {
                let before = self.pending.split().freeze();
                return Ok(ExpectedEvent::StreamClosed { before });
            }

            let next = match deadline {
                Some(deadline) => match timeout_at(deadline, self.output_rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let before = self.pending.split().freeze();
                        return Ok(ExpectedEvent::TimedOut { before });
                    }
                },
                None => self.output_rx.recv().await,
            };
            self.accept(next);
        }
    }

    /// Hand remaining output to `on_chunk` until end-of-output, stopping early
    /// if `watch` shows up again or nothing arrives for `idle` (zero = no
    /// limit). Bytes preceding a repeated prompt are still handed over.
    pub async fn drain<F>(&mut self, watch: &Prompt, idle: Duration, mut on_chunk: F) -> DrainEnd
    where
        F: FnMut(&[u8]),
    {
        loop {
            if let Some(before) = self.scan(watch, &mut on_chunk) {
                if !before.is_empty() {
                    on_chunk(&before[..]);
                }
                return DrainEnd::PromptRepeated;
            }

            if self.eof {
                self.flush_pending(&mut on_chunk);
                return DrainEnd::Closed;
            }

            let next = if idle.is_zero() {
                self.output_rx.recv().await
            } else {
                match tokio::time::timeout(idle, self.output_rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        self.flush_pending(&mut on_chunk);
                        return DrainEnd::Idle;
                    }
                }
            };
            self.accept(next);
        }
    }

    fn accept(&mut self, next: Option<Bytes>) {
        match next {
            Some(chunk) => self.pending.extend_from_slice(&chunk),
            None => self.eof = true,
        }
    }

    /// Look for `prompt` in the queued output. On a match the bytes before it
    /// are returned and the prompt consumed. Otherwise everything except the
    /// prompt's window is handed to `on_output`, so the queue stays bounded.
    fn scan<F>(&mut self, prompt: &Prompt, on_output: &mut F) -> Option<Bytes>
    where
        F: FnMut(&[u8]),
    {
        if let Some(range) = prompt.find(&self.pending) {
            let before = self.pending.split_to(range.start).freeze();
            self.pending.advance(range.len());
            return Some(before);
        }

        let keep = prompt.window().min(self.pending.len());
        let settled = self.pending.split_to(self.pending.len() - keep);
        if !settled.is_empty() {
            on_output(&settled[..]);
        }
        None
    }

    fn flush_pending<F>(&mut self, on_output: &mut F)
    where
        F: FnMut(&[u8]),
    {
        if !self.pending.is_empty() {
            let rest = self.pending.split();
            on_output(&rest[..]);
        }
    }

    /// Wait for the child to exit. If it is still running after `grace`, it is
    /// killed and reaped.
    pub async fn wait(&mut self, grace: Duration) -> Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }

        let deadline = Instant::now() + grace;
        loop {
            if let Some(status) = self.child.try_wait()? {
                let code = status.exit_code() as i32;
                self.exit_code = Some(code);
                return Ok(code);
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(EXIT_POLL_INTERVAL).await;
        }

        warn!(
            program = %self.program,
            "Process still running {:?} after end of output, killing",
            grace
        );
        self.kill();

        for _ in 0..REAP_ATTEMPTS {
            if let Some(status) = self.child.try_wait()? {
                let code = status.exit_code() as i32;
                self.exit_code = Some(code);
                return Ok(code);
            }
            sleep(EXIT_POLL_INTERVAL).await;
        }

        Err(SessionError::StatusUnavailable(format!(
            "{} did not exit after kill",
            self.program
        )))
    }

    /// Forcibly terminate the child and everything in its process group
    pub fn kill(&mut self) {
        if self.exit_code.is_some() {
            return;
        }

        // Closing our end first lets a child blocked on input see EOF
        self.writer.take();

        #[cfg(unix)]
        if let Some(pid) = self.child.process_id() {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            // The PTY child is a session leader, so its pid is its process group
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!(pid, "killpg failed: {}", e);
            }
        }

        if let Err(e) = self.child.kill() {
            debug!(program = %self.program, "kill failed: {}", e);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.exit_code.is_some() {
            return;
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.exit_code = Some(status.exit_code() as i32);
            return;
        }

        self.kill();
        for _ in 0..REAP_ATTEMPTS {
            match self.child.try_wait() {
                Ok(Some(_)) | Err(_) => return,
                Ok(None) => std::thread::sleep(EXIT_POLL_INTERVAL),
            }
        }
        warn!(program = %self.program, "Could not reap child process");
    }
}

/// Pump PTY output into a channel from a blocking thread
fn start_reader(mut reader: Box<dyn Read + Send>) -> Result<mpsc::Receiver<Bytes>> {
    let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);

    std::thread::Builder::new()
        .name("pty-reader".to_string())
        .spawn(move || {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    // Linux reports EIO once the slave side is gone
                    Err(_) => break,
                }
            }
        })?;

    Ok(rx)
}

/// Turn off output post-processing and echo so captured bytes are exactly
/// what the child wrote
#[cfg(unix)]
fn pass_output_through(fd: std::os::fd::RawFd) -> Result<()> {
    use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, OutputFlags, SetArg};
    use std::os::fd::BorrowedFd;

    // SAFETY: fd belongs to the master PTY, which outlives this call
    let fd = unsafe { BorrowedFd::borrow_raw(fd) };

    let mut termios =
        tcgetattr(fd).map_err(|e| SessionError::PtyOpen(format!("tcgetattr: {}", e)))?;
    termios.output_flags.remove(OutputFlags::OPOST);
    termios
        .local_flags
        .remove(LocalFlags::ECHO | LocalFlags::ECHONL);
    tcsetattr(fd, SetArg::TCSANOW, &termios)
        .map_err(|e| SessionError::PtyOpen(format!("tcsetattr: {}", e)))?;

    Ok(())
}
