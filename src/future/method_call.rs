//! Adapter presenting a synchronous call as a deferred operation
//!
//! The call runs on the first readiness check, registers no descriptors, and
//! is ready immediately afterwards. Mixing these with subprocess futures in
//! one iterator lets in-process work flow through the same completion loop.

use super::{Deferred, FutureCore};
use crate::error::{ErrorCode, PexecError};
use std::fmt;
use thiserror::Error;

/// Failure raised by a wrapped call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CallError {
    pub message: String,
}

impl CallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<CallError> for PexecError {
    fn from(err: CallError) -> Self {
        PexecError::scheduling(ErrorCode::SCHED_CALL_FAILED, err.message, None)
    }
}

type Call<T, E> = Box<dyn FnOnce() -> Result<T, E>>;

/// A deferred wrapper around a call that completes synchronously
pub struct MethodCallFuture<T, E> {
    core: FutureCore<T, E>,
    call: Option<Call<T, E>>,
}

impl<T: Clone + 'static, E: Clone + 'static> MethodCallFuture<T, E> {
    pub fn new(call: impl FnOnce() -> Result<T, E> + 'static) -> Self {
        Self {
            core: FutureCore::new("method call"),
            call: Some(Box::new(call)),
        }
    }

    /// Defer `call(&args)`. Any number of arguments, including none.
    pub fn call<A: 'static>(call: impl Fn(&[A]) -> Result<T, E> + 'static, args: Vec<A>) -> Self {
        Self::new(move || call(&args))
    }
}

impl<T: Clone, E: Clone> Deferred for MethodCallFuture<T, E> {
    type Output = T;
    type Error = E;

    fn core(&self) -> &FutureCore<T, E> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FutureCore<T, E> {
        &mut self.core
    }

    fn advance(&mut self) {
        if let Some(call) = self.call.take() {
            let outcome = call();
            self.core.set_outcome(outcome);
        }
    }
}

impl<T, E> fmt::Debug for MethodCallFuture<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodCallFuture")
            .field("key", self.core.key())
            .field("state", &self.core.state())
            .field("called", &self.call.is_none())
            .finish()
    }
}
