use super::{Deferred, FutureCore, WaitSet};
use std::time::Duration;

/// Wraps another deferred operation and transforms its outcome
///
/// The inner operation is advanced, registered and waited on exactly as if
/// it were scheduled directly. Once it is ready its outcome is passed
/// through `map`, and the mapped outcome becomes this proxy's own.
///
/// ```no_run
/// use pexec::future::{Deferred, FutureProxy};
/// use pexec::subprocess::{ExecCommand, ExecFuture};
///
/// let future = ExecFuture::new(ExecCommand::new("git").args(["rev-parse", "HEAD"]).build());
/// let mut head = FutureProxy::new(future, |outcome| {
///     outcome.map(|output| output.stdout_lossy().trim().to_string())
/// });
/// println!("{:?}", head.resolve());
/// ```
pub struct FutureProxy<D, F, U, E>
where
    D: Deferred,
{
    core: FutureCore<U, E>,
    inner: D,
    map: Option<F>,
}

impl<D, F, U, E> FutureProxy<D, F, U, E>
where
    D: Deferred,
    F: FnOnce(Result<D::Output, D::Error>) -> Result<U, E>,
    U: Clone,
    E: Clone,
{
    pub fn new(inner: D, map: F) -> Self {
        Self {
            core: FutureCore::new("proxy"),
            inner,
            map: Some(map),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.inner
    }
}

impl<D, F, U, E> Deferred for FutureProxy<D, F, U, E>
where
    D: Deferred,
    F: FnOnce(Result<D::Output, D::Error>) -> Result<U, E>,
    U: Clone,
    E: Clone,
{
    type Output = U;
    type Error = E;

    fn core(&self) -> &FutureCore<U, E> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FutureCore<U, E> {
        &mut self.core
    }

    fn advance(&mut self) {
        if !self.inner.is_ready() {
            return;
        }
        if let Some(map) = self.map.take() {
            let outcome = map(self.inner.resolve());
            self.core.set_outcome(outcome);
        }
    }

    fn register<'a>(&'a self, waits: &mut WaitSet<'a>) {
        self.inner.register(waits);
    }

    fn default_wait(&self) -> Duration {
        self.inner.default_wait()
    }

    fn abandon(&mut self) {
        self.inner.abandon();
    }
}
