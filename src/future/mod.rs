//! Deferred operations and the scheduler that advances them
//!
//! A deferred operation ("future") represents work whose single result or
//! failure will exist later. Unlike `std::future::Future` there is no async
//! runtime here: operations are advanced by explicit readiness checks from one
//! control thread, and the only place that thread blocks is the combined
//! readiness wait inside [`FutureIterator`].
//!
//! Failures are captured as values. Neither [`Deferred::is_ready`] nor a
//! [`FutureIterator`] step ever returns an operation's error; only
//! [`Deferred::resolve`] does, and it replays the same outcome on every call.
//!
//! ```no_run
//! use pexec::future::{Deferred, FutureIterator};
//! use pexec::subprocess::{ExecCommand, ExecFuture};
//!
//! let futures = ["a.txt", "b.txt", "c.txt"]
//!     .iter()
//!     .map(|f| ExecFuture::new(ExecCommand::new("wc").arg("-c").arg(f).build()))
//!     .collect::<Vec<_>>();
//!
//! let mut iter = FutureIterator::new(futures).unwrap().limit(2);
//! while let Some(mut future) = iter.next() {
//!     // Futures arrive in the order they finish, not the order they were added.
//!     match future.resolve() {
//!         Ok(output) => println!("{}", output.stdout_lossy()),
//!         Err(err) => eprintln!("{}", err),
//!     }
//! }
//! ```

pub mod iterator;
pub mod method_call;
pub mod proxy;
pub mod readiness;

#[cfg(test)]
mod tests;

pub use iterator::{FutureIterator, Step};
pub use method_call::{CallError, MethodCallFuture};
pub use proxy::FutureProxy;
pub use readiness::WaitSet;

use crate::error::{ErrorCode, PexecError};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Longest a single readiness wait blocks when no operation asks for less
pub const DEFAULT_WAIT: Duration = Duration::from_secs(1);

/// Opaque identity of a deferred operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FutureKey(String);

impl FutureKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Generate a unique key for a future the caller did not name
    pub fn generate() -> Self {
        Self(format!("future/{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FutureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FutureKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for FutureKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Lifecycle of a deferred operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    /// Constructed; no work has started
    Pending,
    /// Work in flight; the operation owns its OS resources
    Active,
    /// Outcome computed but not yet retrieved
    Ready,
    /// Outcome handed to the caller at least once
    Resolved,
}

impl FutureState {
    pub fn is_complete(&self) -> bool {
        matches!(self, FutureState::Ready | FutureState::Resolved)
    }
}

/// State shared by every deferred operation: identity, lifecycle and the
/// captured outcome
#[derive(Debug)]
pub struct FutureCore<T, E> {
    key: FutureKey,
    key_assigned: bool,
    kind: &'static str,
    state: FutureState,
    outcome: Option<Result<T, E>>,
    started_at: Option<Instant>,
}

impl<T, E> FutureCore<T, E> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            key: FutureKey::generate(),
            key_assigned: false,
            kind,
            state: FutureState::Pending,
            outcome: None,
            started_at: None,
        }
    }

    pub fn key(&self) -> &FutureKey {
        &self.key
    }

    /// Assign the caller's key. A key may be assigned once.
    pub fn assign_key(&mut self, key: FutureKey) -> crate::error::Result<()> {
        if self.key_assigned {
            return Err(PexecError::scheduling(
                ErrorCode::SCHED_KEY_ALREADY_SET,
                format!("cannot rename future to '{}'", key),
                Some(self.key.to_string()),
            ));
        }
        self.key = key;
        self.key_assigned = true;
        Ok(())
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn state(&self) -> FutureState {
        self.state
    }

    pub fn has_started(&self) -> bool {
        self.state != FutureState::Pending
    }

    pub fn is_complete(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|start| start.elapsed())
    }

    /// Move from `Pending` to `Active`. Returns false if already started.
    pub fn mark_started(&mut self) -> bool {
        if self.state != FutureState::Pending {
            return false;
        }
        self.state = FutureState::Active;
        self.started_at = Some(Instant::now());
        debug!("Started {} {}", self.kind, self.key);
        true
    }

    /// Capture the outcome. The first outcome wins.
    pub fn set_outcome(&mut self, outcome: Result<T, E>) {
        if self.outcome.is_some() {
            warn!(
                "Ignoring second outcome for {} {}; futures resolve once",
                self.kind, self.key
            );
            return;
        }

        debug!(
            "Finished {} {} ({}) after {:?}",
            self.kind,
            self.key,
            if outcome.is_ok() { "ok" } else { "failed" },
            self.elapsed().unwrap_or_default()
        );

        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        self.outcome = Some(outcome);
        self.state = FutureState::Ready;
    }

    pub fn outcome(&self) -> Option<&Result<T, E>> {
        self.outcome.as_ref()
    }
}

impl<T: Clone, E: Clone> FutureCore<T, E> {
    /// Hand the outcome to the caller, moving to `Resolved`.
    ///
    /// # Panics
    ///
    /// Panics if no outcome has been captured; callers drive the operation to
    /// completion first.
    pub fn resolved(&mut self) -> Result<T, E> {
        match &self.outcome {
            Some(outcome) => {
                self.state = FutureState::Resolved;
                outcome.clone()
            }
            None => panic!(
                "{} {} resolved before it produced an outcome",
                self.kind, self.key
            ),
        }
    }
}

/// A unit of work with a single eventual result or failure
///
/// Implementors provide [`core`](Deferred::core) access and
/// [`advance`](Deferred::advance), which makes as much progress as possible
/// without blocking. Everything else has a default built on those two.
pub trait Deferred {
    type Output: Clone;
    type Error: Clone;

    fn core(&self) -> &FutureCore<Self::Output, Self::Error>;

    fn core_mut(&mut self) -> &mut FutureCore<Self::Output, Self::Error>;

    /// Make progress without blocking. Failures are captured into the core.
    fn advance(&mut self);

    /// Add the descriptors this operation is waiting on
    fn register<'a>(&'a self, _waits: &mut WaitSet<'a>) {}

    /// Longest this operation wants a readiness wait to block
    fn default_wait(&self) -> Duration {
        DEFAULT_WAIT
    }

    /// Start releasing OS resources because the operation is being
    /// discarded unfinished. Must not block; blocking cleanup belongs in
    /// `Drop`.
    fn abandon(&mut self) {}

    fn key(&self) -> &FutureKey {
        self.core().key()
    }

    fn set_key(&mut self, key: FutureKey) -> crate::error::Result<()> {
        self.core_mut().assign_key(key)
    }

    fn state(&self) -> FutureState {
        self.core().state()
    }

    /// Begin work. Never fails; a failure to start is captured as the outcome.
    fn start(&mut self) {
        if self.core_mut().mark_started() {
            self.advance();
        }
    }

    /// Is an outcome available? Advances this operation only and never
    /// returns its failure.
    fn is_ready(&mut self) -> bool {
        if self.core().is_complete() {
            return true;
        }
        self.start();
        if !self.core().is_complete() {
            self.advance();
        }
        self.core().is_complete()
    }

    /// Block until this operation is ready.
    fn wait(&mut self) {
        if !self.core().is_complete() {
            drive(self);
        }
    }

    /// Block until ready, then return the result or raise the captured
    /// failure. Repeated calls replay the same outcome.
    fn resolve(&mut self) -> Result<Self::Output, Self::Error> {
        self.wait();
        self.core_mut().resolved()
    }
}

/// Run one operation to completion through a private iterator
pub(crate) fn drive<D: Deferred + ?Sized>(future: &mut D) {
    let mut iter = FutureIterator::single(future);
    iter.resolve_all();
}

impl<D: Deferred + ?Sized> Deferred for &mut D {
    type Output = D::Output;
    type Error = D::Error;

    fn core(&self) -> &FutureCore<Self::Output, Self::Error> {
        (**self).core()
    }

    fn core_mut(&mut self) -> &mut FutureCore<Self::Output, Self::Error> {
        (**self).core_mut()
    }

    fn advance(&mut self) {
        (**self).advance()
    }

    fn register<'a>(&'a self, waits: &mut WaitSet<'a>) {
        (**self).register(waits)
    }

    fn default_wait(&self) -> Duration {
        (**self).default_wait()
    }

    fn abandon(&mut self) {
        (**self).abandon()
    }

    fn start(&mut self) {
        (**self).start()
    }

    fn is_ready(&mut self) -> bool {
        (**self).is_ready()
    }

    fn wait(&mut self) {
        (**self).wait()
    }

    fn resolve(&mut self) -> Result<Self::Output, Self::Error> {
        (**self).resolve()
    }
}

impl<D: Deferred + ?Sized> Deferred for Box<D> {
    type Output = D::Output;
    type Error = D::Error;

    fn core(&self) -> &FutureCore<Self::Output, Self::Error> {
        (**self).core()
    }

    fn core_mut(&mut self) -> &mut FutureCore<Self::Output, Self::Error> {
        (**self).core_mut()
    }

    fn advance(&mut self) {
        (**self).advance()
    }

    fn register<'a>(&'a self, waits: &mut WaitSet<'a>) {
        (**self).register(waits)
    }

    fn default_wait(&self) -> Duration {
        (**self).default_wait()
    }

    fn abandon(&mut self) {
        (**self).abandon()
    }

    fn start(&mut self) {
        (**self).start()
    }

    fn is_ready(&mut self) -> bool {
        (**self).is_ready()
    }

    fn wait(&mut self) {
        (**self).wait()
    }

    fn resolve(&mut self) -> Result<Self::Output, Self::Error> {
        (**self).resolve()
    }
}
