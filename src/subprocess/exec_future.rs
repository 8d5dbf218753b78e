//! A child process presented as a deferred operation
//!
//! The process is spawned lazily on the first readiness check. Every later
//! check writes queued stdin, reads whatever output is available and polls
//! for exit, all without blocking. The future is ready once the child has
//! exited and both stdout and stderr have reached end-of-stream.

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::de::DeserializeOwned;
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::command::ExecCommand;
use super::error::{CommandFailure, ExecError};
use super::status::{signal_name, ExitStatus};
use super::stdin::StdinBuffer;
use crate::config::EngineConfig;
use crate::future::readiness::{self, WaitSet};
use crate::future::{Deferred, FutureCore, FutureState};

/// Longest gap between SIGTERM and SIGKILL for a timed-out command
const MAX_KILL_DELAY: Duration = Duration::from_secs(60);

/// Poll interval while waiting for an abandoned child to exit
const REAP_POLL: Duration = Duration::from_millis(10);

/// Result of a finished command
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl ExecOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Engine tunables an [`ExecFuture`] needs
#[derive(Debug, Clone)]
pub struct ExecSettings {
    pub default_wait: Duration,
    pub kill_grace: Duration,
    pub read_chunk_size: usize,
    pub timeout: Option<Duration>,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ExecSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            default_wait: config.default_wait,
            kill_grace: config.kill_grace,
            read_chunk_size: config.read_chunk_size.max(1),
            timeout: config.default_timeout.filter(|t| !t.is_zero()),
        }
    }
}

/// One of the child's output streams and everything read from it
#[derive(Debug)]
struct OutputPipe<P> {
    pipe: Option<P>,
    buffer: Vec<u8>,
    cursor: usize,
    limit: usize,
}

impl<P: Read + AsFd> OutputPipe<P> {
    fn new() -> Self {
        Self {
            pipe: None,
            buffer: Vec::new(),
            cursor: 0,
            limit: usize::MAX,
        }
    }

    fn is_open(&self) -> bool {
        self.pipe.is_some()
    }

    fn unread_len(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Read what is available without blocking, up to `room` bytes. Bytes
    /// past the size limit are read and discarded.
    fn drain(&mut self, chunk_size: usize, room: Option<usize>) -> std::io::Result<usize> {
        let mut total = 0;
        let mut eof = false;

        if let Some(pipe) = self.pipe.as_mut() {
            let mut chunk = vec![0u8; chunk_size];
            loop {
                let want = match room {
                    Some(room) => room.saturating_sub(total).min(chunk_size),
                    None => chunk_size,
                };
                if want == 0 {
                    break;
                }

                match pipe.read(&mut chunk[..want]) {
                    Ok(0) => {
                        eof = true;
                        break;
                    }
                    Ok(n) => {
                        total += n;
                        let keep = n.min(self.limit.saturating_sub(self.buffer.len()));
                        self.buffer.extend_from_slice(&chunk[..keep]);
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        if eof {
            self.pipe = None;
        }
        Ok(total)
    }

    fn take_unread(&mut self) -> Vec<u8> {
        let unread = self.buffer[self.cursor..].to_vec();
        self.cursor = self.buffer.len();
        unread
    }

    fn discard(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }
}

fn set_nonblocking(fd: impl AsFd) -> std::io::Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(&fd, FcntlArg::F_GETFL)?);
    fcntl(&fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// Signal every process in the child's group
fn signal_group(pid: u32, signal: Signal) {
    let pgid = Pid::from_raw(-(pid as i32));
    if let Err(e) = kill(pgid, signal) {
        trace!("Could not send {} to process group {}: {}", signal, pid, e);
    }
}

/// Does any process remain in the child's group? The group outlives its
/// leader while descendants are alive.
fn group_alive(pid: u32) -> bool {
    match kill(Pid::from_raw(-(pid as i32)), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// A subprocess run as a deferred operation
///
/// ```no_run
/// use pexec::future::Deferred;
/// use pexec::subprocess::{ExecCommand, ExecFuture};
///
/// let mut future = ExecFuture::new(ExecCommand::new("cat").build());
/// future.write(b"hello").unwrap();
/// let output = future.resolve().unwrap();
/// assert_eq!(output.stdout, b"hello");
/// ```
pub struct ExecFuture {
    core: FutureCore<ExecOutput, ExecError>,
    command: ExecCommand,
    command_line: String,
    settings: ExecSettings,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdin_buffer: StdinBuffer,
    keep_stdin_open: bool,
    stdin_closed: bool,
    stdout: OutputPipe<ChildStdout>,
    stderr: OutputPipe<ChildStderr>,
    read_buffer_size: Option<usize>,
    resolve_on_error: bool,
    started_at: Option<Instant>,
    exit_status: Option<ExitStatus>,
    terminated: bool,
    killed_by_timeout: bool,
    abandon_deadline: Option<Instant>,
}

impl ExecFuture {
    pub fn new(command: ExecCommand) -> Self {
        Self::with_settings(command, ExecSettings::default())
    }

    /// Create a future using the engine configuration's defaults
    pub fn with_config(command: ExecCommand, config: &EngineConfig) -> Self {
        Self::with_settings(command, ExecSettings::from(config))
    }

    pub fn with_settings(command: ExecCommand, settings: ExecSettings) -> Self {
        let command_line = command.command_line();
        Self {
            core: FutureCore::new("exec"),
            command,
            command_line,
            settings,
            child: None,
            stdin: None,
            stdin_buffer: StdinBuffer::new(),
            keep_stdin_open: false,
            stdin_closed: false,
            stdout: OutputPipe::new(),
            stderr: OutputPipe::new(),
            read_buffer_size: None,
            resolve_on_error: false,
            started_at: None,
            exit_status: None,
            terminated: false,
            killed_by_timeout: false,
            abandon_deadline: None,
        }
    }

    pub fn command(&self) -> &ExecCommand {
        &self.command
    }

    /// Queue bytes for stdin before the command starts
    pub fn with_stdin(mut self, data: impl AsRef<[u8]>) -> Self {
        self.stdin_buffer.append(data.as_ref());
        self
    }

    /// Terminate the command if it runs longer than `timeout`. Zero means
    /// no timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.set_timeout(Some(timeout));
        self
    }

    /// Queue bytes for stdin. Once everything queued has been written the
    /// pipe is closed so the command sees end-of-file.
    pub fn write(&mut self, data: impl AsRef<[u8]>) -> Result<&mut Self, ExecError> {
        self.queue_stdin(data.as_ref(), false)
    }

    /// Queue bytes for stdin and keep the pipe open for later writes
    pub fn write_keep_open(&mut self, data: impl AsRef<[u8]>) -> Result<&mut Self, ExecError> {
        self.queue_stdin(data.as_ref(), true)
    }

    fn queue_stdin(&mut self, data: &[u8], keep_open: bool) -> Result<&mut Self, ExecError> {
        if self.stdin_closed {
            return Err(ExecError::StdinClosed {
                command: self.command_line.clone(),
            });
        }

        self.stdin_buffer.append(data);
        self.keep_stdin_open = keep_open;

        if self.core.state() == FutureState::Active {
            self.advance();
        }
        Ok(self)
    }

    /// Terminate the command if it runs longer than `timeout`. `None` or
    /// zero means no timeout.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.settings.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Return nonzero exits from `resolve()` as data instead of failing
    pub fn resolve_on_error(&mut self, resolve_on_error: bool) -> &mut Self {
        self.resolve_on_error = resolve_on_error;
        self
    }

    /// Keep at most `limit` bytes of stdout; the rest is read and dropped
    pub fn set_stdout_size_limit(&mut self, limit: usize) -> &mut Self {
        self.stdout.limit = limit;
        self
    }

    /// Keep at most `limit` bytes of stderr; the rest is read and dropped
    pub fn set_stderr_size_limit(&mut self, limit: usize) -> &mut Self {
        self.stderr.limit = limit;
        self
    }

    /// Stop reading a stream while this many bytes sit unread in its buffer.
    ///
    /// The child blocks once its pipe fills, so callers must consume output
    /// with [`read`](Self::read) to make progress. A blocking
    /// [`resolve`](Deferred::resolve) lifts the bound.
    pub fn set_read_buffer_size(&mut self, size: Option<usize>) -> &mut Self {
        self.read_buffer_size = size;
        self
    }

    /// Output produced since the previous call, as `(stdout, stderr)`
    pub fn read(&mut self) -> (Vec<u8>, Vec<u8>) {
        self.advance_if_running();
        (self.stdout.take_unread(), self.stderr.take_unread())
    }

    /// Stdout produced since the previous call
    pub fn read_stdout(&mut self) -> Vec<u8> {
        self.advance_if_running();
        self.stdout.take_unread()
    }

    /// Forget all output read so far
    pub fn discard_buffers(&mut self) {
        self.stdout.discard();
        self.stderr.discard();
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(|child| child.id())
    }

    pub fn was_killed_by_timeout(&self) -> bool {
        self.killed_by_timeout
    }

    /// Resolve and fail on any nonzero exit, whatever
    /// [`resolve_on_error`](Self::resolve_on_error) says
    pub fn resolvex(&mut self) -> Result<(Vec<u8>, Vec<u8>), ExecError> {
        let output = self.resolve()?;
        if !output.status.success() {
            return Err(self.failure(&output).into());
        }
        Ok((output.stdout, output.stderr))
    }

    /// Resolve, then parse stdout as JSON. Any stderr output is a failure.
    pub fn resolve_json<T: DeserializeOwned>(&mut self) -> Result<T, ExecError> {
        let (stdout, stderr) = self.resolvex()?;
        if !stderr.is_empty() {
            return Err(ExecError::UnexpectedStderr {
                command: self.command_line.clone(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }

        serde_json::from_slice(&stdout).map_err(|e| ExecError::Json {
            command: self.command_line.clone(),
            source: std::sync::Arc::new(e),
        })
    }

    /// Kill the command if it is still running and resolve with status
    /// `128 + 9` and whatever output was read. Safe on a future that never
    /// started.
    pub fn resolve_kill(&mut self) -> Result<ExecOutput, ExecError> {
        if !self.core.is_complete() {
            if self.child.is_some() {
                warn!("Killing '{}'", self.command_line);
            }
            self.kill_now();
            self.complete(ExitStatus::Signal(Signal::SIGKILL as i32), false);
        }
        self.resolve()
    }

    fn advance_if_running(&mut self) {
        if self.core.state() == FutureState::Active {
            self.advance();
        }
    }

    fn spawn(&mut self) -> Result<(), ExecError> {
        readiness::watch_children();
        self.command.log_start();

        let mut cmd = self.command.to_std();
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group so termination reaches grandchildren
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::spawn(&self.command_line, e))?;
        self.started_at = Some(Instant::now());

        self.stdin = child.stdin.take();
        self.stdout.pipe = child.stdout.take();
        self.stderr.pipe = child.stderr.take();
        debug!("Spawned '{}' as pid {}", self.command_line, child.id());
        self.child = Some(child);

        let nonblocking = self
            .stdin
            .as_ref()
            .map_or(Ok(()), set_nonblocking)
            .and(self.stdout.pipe.as_ref().map_or(Ok(()), set_nonblocking))
            .and(self.stderr.pipe.as_ref().map_or(Ok(()), set_nonblocking));
        nonblocking.map_err(|e| ExecError::io(&self.command_line, e))
    }

    /// One non-blocking round of I/O and status checks
    fn pump(&mut self) -> Result<(), ExecError> {
        self.flush_stdin()?;
        self.close_drained_stdin();

        // Status before output so bytes written just before exit are read.
        if self.exit_status.is_none() {
            if let Some(child) = self.child.as_mut() {
                let status = child
                    .try_wait()
                    .map_err(|e| ExecError::io(&self.command_line, e))?;
                self.exit_status = status.map(ExitStatus::from_std);
            }
        }

        self.read_output()?;

        if let Some(status) = self.exit_status {
            if !self.stdout.is_open() && !self.stderr.is_open() {
                self.complete(status, true);
                return Ok(());
            }
        }

        self.check_timeout();
        Ok(())
    }

    fn flush_stdin(&mut self) -> Result<(), ExecError> {
        let Some(pipe) = self.stdin.as_mut() else {
            return Ok(());
        };

        let mut written = 0;
        let mut broken = false;
        while !self.stdin_buffer.is_empty() {
            match pipe.write(self.stdin_buffer.front()) {
                Ok(0) => break,
                Ok(n) => {
                    written += n;
                    self.stdin_buffer.consume(n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    broken = true;
                    break;
                }
                Err(e) => return Err(ExecError::io(&self.command_line, e)),
            }
        }

        if written > 0 {
            trace!("Wrote {} bytes to stdin of '{}'", written, self.command_line);
        }

        if broken {
            debug!(
                "'{}' closed stdin with {} bytes unwritten",
                self.command_line,
                self.stdin_buffer.len()
            );
            self.stdin_buffer.clear();
            self.stdin = None;
            self.stdin_closed = true;
        }
        Ok(())
    }

    fn close_drained_stdin(&mut self) {
        if self.stdin.is_some() && self.stdin_buffer.is_empty() && !self.keep_stdin_open {
            self.stdin = None;
            self.stdin_closed = true;
        }
    }

    fn read_output(&mut self) -> Result<(), ExecError> {
        let chunk_size = self.settings.read_chunk_size;

        let room = self
            .read_buffer_size
            .map(|size| size.saturating_sub(self.stdout.unread_len()));
        let read = self
            .stdout
            .drain(chunk_size, room)
            .map_err(|e| ExecError::io(&self.command_line, e))?;
        if read > 0 {
            trace!("Read {} bytes of stdout from '{}'", read, self.command_line);
        }

        let room = self
            .read_buffer_size
            .map(|size| size.saturating_sub(self.stderr.unread_len()));
        let read = self
            .stderr
            .drain(chunk_size, room)
            .map_err(|e| ExecError::io(&self.command_line, e))?;
        if read > 0 {
            trace!("Read {} bytes of stderr from '{}'", read, self.command_line);
        }

        Ok(())
    }

    fn kill_deadline(timeout: Duration) -> Duration {
        timeout + timeout.min(MAX_KILL_DELAY)
    }

    fn check_timeout(&mut self) {
        let (Some(timeout), Some(started_at)) = (self.settings.timeout, self.started_at) else {
            return;
        };
        let elapsed = started_at.elapsed();

        if elapsed >= Self::kill_deadline(timeout) {
            warn!(
                "'{}' ignored SIGTERM after {:?} timeout, killing it",
                self.command_line, timeout
            );
            self.killed_by_timeout = true;
            self.kill_now();
            self.complete(ExitStatus::Signal(Signal::SIGKILL as i32), false);
            return;
        }

        if elapsed >= timeout && !self.terminated {
            warn!(
                "'{}' exceeded its {:?} timeout, sending SIGTERM",
                self.command_line, timeout
            );
            self.killed_by_timeout = true;
            self.terminated = true;
            if let Some(pid) = self.pid() {
                signal_group(pid, Signal::SIGTERM);
            }
        }
    }

    /// Close every pipe. Returns whether stdout or stderr was still open,
    /// which means some process in the group may still be writing.
    fn close_pipes(&mut self) -> bool {
        let output_open = self.stdout.is_open() || self.stderr.is_open();
        self.stdin = None;
        self.stdin_closed = true;
        self.stdout.pipe = None;
        self.stderr.pipe = None;
        output_open
    }

    /// SIGKILL the child's group, reap the leader and close every pipe.
    ///
    /// The group is signalled even when the leader has already been reaped
    /// if a descendant still holds the output pipes.
    fn kill_now(&mut self) {
        let output_open = self.close_pipes();
        let Some(pid) = self.pid() else {
            return;
        };

        if self.exit_status.is_none() || output_open {
            signal_group(pid, Signal::SIGKILL);
        }
        if self.exit_status.is_none() {
            if let Some(child) = self.child.as_mut() {
                let _ = child.kill();
                match child.wait() {
                    Ok(status) => self.exit_status = Some(ExitStatus::from_std(status)),
                    Err(e) => debug!("Could not reap '{}': {}", self.command_line, e),
                }
            }
        }
    }

    /// Reap the leader if it has exited. True once it is gone.
    fn poll_leader(&mut self) -> bool {
        if self.exit_status.is_some() {
            return true;
        }
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(Some(status))) => {
                self.exit_status = Some(ExitStatus::from_std(status));
                true
            }
            Some(Ok(None)) => false,
            _ => true,
        }
    }

    /// SIGTERM the group of an unfinished command and start its grace
    /// period. Does not block. Returns whether there is anything to reap.
    fn begin_termination(&mut self) -> bool {
        if self.core.is_complete() {
            return false;
        }
        let Some(pid) = self.pid() else {
            return false;
        };

        if self.abandon_deadline.is_none() {
            debug!("Terminating abandoned '{}' (pid {})", self.command_line, pid);
            self.close_pipes();
            signal_group(pid, Signal::SIGTERM);
            self.abandon_deadline = Some(Instant::now() + self.settings.kill_grace);
        }
        true
    }

    fn failure(&self, output: &ExecOutput) -> CommandFailure {
        CommandFailure {
            command: self.command_line.clone(),
            status: output.status,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            killed_by_timeout: self.killed_by_timeout,
            timeout: self.settings.timeout.filter(|_| self.killed_by_timeout),
        }
    }

    fn complete(&mut self, status: ExitStatus, annotate_signal: bool) {
        self.stdin = None;
        self.stdin_closed = true;
        self.stdout.pipe = None;
        self.stderr.pipe = None;

        let mut stderr = Vec::new();
        if let (true, Some(signo)) = (annotate_signal, status.signal()) {
            stderr.extend_from_slice(
                format!(
                    "<Process was terminated by signal {} ({}).>\n\n",
                    signal_name(signo),
                    signo
                )
                .as_bytes(),
            );
        }
        stderr.extend_from_slice(&self.stderr.buffer);

        let output = ExecOutput {
            status,
            stdout: self.stdout.buffer.clone(),
            stderr,
            duration: self
                .started_at
                .map(|start| start.elapsed())
                .unwrap_or_default(),
        };

        debug!(
            "'{}' finished with status {} after {:?}",
            self.command_line, status, output.duration
        );

        let outcome = if status.success() || self.resolve_on_error {
            Ok(output)
        } else {
            Err(ExecError::CommandFailed(self.failure(&output)))
        };
        self.core.set_outcome(outcome);
    }
}

impl Deferred for ExecFuture {
    type Output = ExecOutput;
    type Error = ExecError;

    fn core(&self) -> &FutureCore<ExecOutput, ExecError> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FutureCore<ExecOutput, ExecError> {
        &mut self.core
    }

    fn advance(&mut self) {
        if self.core.is_complete() {
            return;
        }

        let result = if self.child.is_none() {
            self.spawn().and_then(|_| self.pump())
        } else {
            self.pump()
        };

        if let Err(err) = result {
            if self.child.is_some() {
                self.kill_now();
            }
            self.core.set_outcome(Err(err));
        }
    }

    fn register<'a>(&'a self, waits: &mut WaitSet<'a>) {
        if self.child.is_none() || self.core.is_complete() {
            return;
        }

        if let Some(pipe) = &self.stdin {
            if !self.stdin_buffer.is_empty() {
                waits.write(pipe.as_fd());
            }
        }

        let has_room = |unread: usize| self.read_buffer_size.map_or(true, |size| unread < size);
        if let Some(pipe) = &self.stdout.pipe {
            if has_room(self.stdout.unread_len()) {
                waits.read(pipe.as_fd());
            }
        }
        if let Some(pipe) = &self.stderr.pipe {
            if has_room(self.stderr.unread_len()) {
                waits.read(pipe.as_fd());
            }
        }

        if self.exit_status.is_none() {
            waits.child_exit();
        }
    }

    fn abandon(&mut self) {
        self.begin_termination();
    }

    fn default_wait(&self) -> Duration {
        let mut wait = self.settings.default_wait;
        if let (Some(timeout), Some(started_at)) = (self.settings.timeout, self.started_at) {
            let deadline = if self.terminated {
                Self::kill_deadline(timeout)
            } else {
                timeout
            };
            wait = wait.min(deadline.saturating_sub(started_at.elapsed()));
        }
        wait
    }

    fn wait(&mut self) {
        if !self.core.is_complete() {
            // A bounded read buffer would stall a blocking wait forever.
            self.read_buffer_size = None;
            crate::future::drive(self);
        }
    }
}

impl Drop for ExecFuture {
    fn drop(&mut self) {
        if !self.begin_termination() {
            return;
        }
        let Some(pid) = self.pid() else {
            return;
        };

        let deadline = self.abandon_deadline.unwrap_or_else(Instant::now);
        while Instant::now() < deadline {
            if self.poll_leader() && !group_alive(pid) {
                return;
            }
            std::thread::sleep(REAP_POLL);
        }

        warn!(
            "'{}' (pid {}) ignored SIGTERM, sending SIGKILL",
            self.command_line, pid
        );
        signal_group(pid, Signal::SIGKILL);
        self.kill_now();
    }
}

impl fmt::Debug for ExecFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecFuture")
            .field("key", self.core.key())
            .field("state", &self.core.state())
            .field("command", &self.command_line)
            .field("pid", &self.pid())
            .field("exit_status", &self.exit_status)
            .finish()
    }
}
