//! The single blocking point of the engine
//!
//! Every active operation contributes the descriptors it is waiting on to a
//! [`WaitSet`]; the scheduler then blocks in one `poll(2)` over all of them.
//! Child exit does not make any descriptor readable when the child has
//! already closed its pipes, so a SIGCHLD self-pipe joins every wait.

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use signal_hook::consts::SIGCHLD;
use std::io::Read;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{trace, warn};

/// Poll granularity when nothing can wake us but a timer
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Cap on a child-exit wait when the SIGCHLD pipe could not be installed
const CHILD_POLL_FALLBACK: Duration = Duration::from_millis(10);

static SIGCHLD_PIPE: OnceLock<Option<UnixStream>> = OnceLock::new();

/// Read end of the process-wide SIGCHLD self-pipe, installed on first use
fn sigchld_pipe() -> Option<&'static UnixStream> {
    SIGCHLD_PIPE
        .get_or_init(|| match install_sigchld_pipe() {
            Ok(reader) => Some(reader),
            Err(e) => {
                warn!(
                    "Could not install SIGCHLD pipe, child exits will be polled: {}",
                    e
                );
                None
            }
        })
        .as_ref()
}

/// Install the SIGCHLD pipe before the first child is spawned so its exit
/// cannot slip past the first wait
pub(crate) fn watch_children() {
    let _ = sigchld_pipe();
}

fn install_sigchld_pipe() -> std::io::Result<UnixStream> {
    let (reader, writer) = UnixStream::pair()?;
    reader.set_nonblocking(true)?;
    writer.set_nonblocking(true)?;
    signal_hook::low_level::pipe::register(SIGCHLD, writer)?;
    Ok(reader)
}

fn drain(mut reader: &UnixStream) {
    let mut buf = [0u8; 64];
    while let Ok(n) = reader.read(&mut buf) {
        if n == 0 {
            break;
        }
    }
}

/// Descriptors and timeout for one readiness wait
#[derive(Debug)]
pub struct WaitSet<'a> {
    reads: Vec<BorrowedFd<'a>>,
    writes: Vec<BorrowedFd<'a>>,
    children: bool,
    timeout: Duration,
}

impl<'a> WaitSet<'a> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            reads: Vec::new(),
            writes: Vec::new(),
            children: false,
            timeout,
        }
    }

    /// Wake when `fd` is readable or hung up
    pub fn read(&mut self, fd: BorrowedFd<'a>) -> &mut Self {
        self.reads.push(fd);
        self
    }

    /// Wake when `fd` can accept a write
    pub fn write(&mut self, fd: BorrowedFd<'a>) -> &mut Self {
        self.writes.push(fd);
        self
    }

    /// Wake when any child process changes state
    pub fn child_exit(&mut self) -> &mut Self {
        self.children = true;
        self
    }

    /// Shorten the wait to at most `limit`
    pub fn cap_timeout(&mut self, limit: Duration) -> &mut Self {
        self.timeout = self.timeout.min(limit);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn descriptor_count(&self) -> usize {
        self.reads.len() + self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptor_count() == 0 && !self.children
    }
}

/// Whole milliseconds for `poll(2)`, rounded up so a sub-millisecond wait
/// still sleeps
fn poll_millis(timeout: Duration) -> u16 {
    timeout
        .as_nanos()
        .div_ceil(1_000_000)
        .min(u16::MAX as u128) as u16
}

/// Block until a registered descriptor is ready, a child exits, or the
/// timeout passes. Returns the number of ready descriptors.
///
/// Interrupted waits count as a wake with nothing ready.
pub fn wait_for_readiness(mut waits: WaitSet<'_>) -> usize {
    if waits.is_empty() {
        std::thread::sleep(waits.timeout.min(IDLE_SLEEP));
        return 0;
    }

    let pipe = if waits.children { sigchld_pipe() } else { None };
    if waits.children && pipe.is_none() {
        waits.cap_timeout(CHILD_POLL_FALLBACK);
    }

    let mut fds: Vec<PollFd<'_>> = Vec::with_capacity(waits.descriptor_count() + 1);
    fds.extend(
        waits
            .reads
            .iter()
            .map(|fd| PollFd::new(*fd, PollFlags::POLLIN)),
    );
    fds.extend(
        waits
            .writes
            .iter()
            .map(|fd| PollFd::new(*fd, PollFlags::POLLOUT)),
    );
    if let Some(reader) = pipe {
        fds.push(PollFd::new(reader.as_fd(), PollFlags::POLLIN));
    }

    let millis = poll_millis(waits.timeout);
    trace!(
        "Waiting on {} descriptors for up to {}ms",
        fds.len(),
        millis
    );

    let ready = match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(n) => n.max(0) as usize,
        Err(Errno::EINTR) => 0,
        Err(e) => {
            warn!("Readiness wait failed: {}", e);
            std::thread::sleep(IDLE_SLEEP);
            0
        }
    };

    if let Some(reader) = pipe {
        drain(reader);
    }

    ready
}
