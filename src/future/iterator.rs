//! Completion-order iteration over many deferred operations
//!
//! A [`FutureIterator`] owns a working set of at most `limit` active
//! operations and a FIFO backlog of operations waiting for a slot. Each step
//! advances every active operation, yields the first one that is ready, or
//! blocks in a single readiness wait over all of them.

use super::readiness::{wait_for_readiness, WaitSet};
use super::{Deferred, FutureKey, DEFAULT_WAIT};
use crate::error::{ErrorCode, PexecError, Result};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Result of one scheduler step
#[derive(Debug)]
pub enum Step<D> {
    /// An operation finished and left the working set
    Ready(D),
    /// The update interval elapsed with nothing ready
    Timeout,
    /// No active or queued operations remain
    Exhausted,
}

/// Scheduler yielding deferred operations in the order they complete
///
/// Operations may be added while iterating, including from inside the loop
/// body:
///
/// ```no_run
/// use pexec::future::{Deferred, FutureIterator, MethodCallFuture};
/// use pexec::future::CallError;
///
/// let first = MethodCallFuture::new(|| Ok::<_, CallError>(1));
/// let mut iter = FutureIterator::new(vec![first]).unwrap().limit(2);
/// let mut added = false;
/// while let Some(mut future) = iter.next() {
///     if !added {
///         iter.add_future(MethodCallFuture::new(|| Ok(2))).unwrap();
///         added = true;
///     }
///     println!("{:?}", future.resolve());
/// }
/// ```
///
/// When several operations are ready in the same step the one in the lowest
/// working-set slot is yielded first; the rest follow on later steps.
///
/// Dropping the iterator drops every active and queued operation, which
/// releases their processes and descriptors.
pub struct FutureIterator<D: Deferred> {
    slots: Vec<Option<D>>,
    backlog: VecDeque<D>,
    enrolled: HashSet<FutureKey>,
    limit: Option<usize>,
    update_interval: Option<Duration>,
    last_key: Option<FutureKey>,
}

impl<D: Deferred> FutureIterator<D> {
    /// Create an iterator over `futures`. Nothing starts until the first step.
    pub fn new(futures: impl IntoIterator<Item = D>) -> Result<Self> {
        let mut iter = Self::empty();
        for future in futures {
            iter.add_future(future)?;
        }
        Ok(iter)
    }

    /// Create an iterator that runs at most `limit` operations at once
    pub fn with_limit(futures: impl IntoIterator<Item = D>, limit: usize) -> Result<Self> {
        Ok(Self::new(futures)?.limit(limit))
    }

    pub fn empty() -> Self {
        Self {
            slots: Vec::new(),
            backlog: VecDeque::new(),
            enrolled: HashSet::new(),
            limit: None,
            update_interval: None,
            last_key: None,
        }
    }

    pub(crate) fn single(future: D) -> Self {
        let mut iter = Self::empty();
        iter.enrolled.insert(future.key().clone());
        iter.backlog.push_back(future);
        iter
    }

    /// Bound the number of simultaneously active operations. `0` is unbounded.
    pub fn limit(mut self, limit: usize) -> Self {
        self.set_limit(Some(limit));
        self
    }

    pub fn set_limit(&mut self, limit: Option<usize>) -> &mut Self {
        self.limit = limit.filter(|&n| n > 0);
        self
    }

    pub fn current_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Bound how long one step may block before returning [`Step::Timeout`].
    /// A zero interval is the same as none.
    pub fn set_update_interval(&mut self, interval: Option<Duration>) -> &mut Self {
        self.update_interval = interval.filter(|d| !d.is_zero());
        self
    }

    pub fn update_interval(&self) -> Option<Duration> {
        self.update_interval
    }

    /// Enroll another operation. Legal at any point, including between
    /// steps of an ongoing iteration; it is admitted on the next step that
    /// finds a free slot.
    pub fn add_future(&mut self, future: D) -> Result<&mut Self> {
        let key = future.key().clone();
        if !self.enrolled.insert(key.clone()) {
            return Err(PexecError::scheduling(
                ErrorCode::SCHED_DUPLICATE_KEY,
                "a future with this key is already in the iterator",
                Some(key.to_string()),
            ));
        }
        trace!("Queued {} ({} waiting)", key, self.backlog.len() + 1);
        self.backlog.push_back(future);
        Ok(self)
    }

    /// Number of operations in the working set
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Number of operations waiting for a slot
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.backlog.is_empty() && self.active_count() == 0
    }

    /// Advance until an operation is ready, the update interval elapses, or
    /// nothing is left
    pub fn next_step(&mut self) -> Step<D> {
        if let Some(key) = self.last_key.take() {
            self.enrolled.remove(&key);
        }

        self.admit_backlog();
        if self.active_count() == 0 {
            return Step::Exhausted;
        }

        let started = Instant::now();
        loop {
            let mut ready = None;
            for (index, slot) in self.slots.iter_mut().enumerate() {
                if let Some(future) = slot {
                    if future.is_ready() && ready.is_none() {
                        ready = Some(index);
                    }
                }
            }

            if let Some(future) = ready.and_then(|index| self.slots[index].take()) {
                trace!("Yielding {}", future.key());
                self.last_key = Some(future.key().clone());
                return Step::Ready(future);
            }

            let mut timeout = self
                .slots
                .iter()
                .flatten()
                .map(|future| future.default_wait())
                .min()
                .unwrap_or(DEFAULT_WAIT);

            if let Some(interval) = self.update_interval {
                let elapsed = started.elapsed();
                if elapsed >= interval {
                    return Step::Timeout;
                }
                timeout = timeout.min(interval - elapsed);
            }

            let mut waits = WaitSet::new(timeout);
            for future in self.slots.iter().flatten() {
                future.register(&mut waits);
            }
            wait_for_readiness(waits);
        }
    }

    /// Drive every operation to completion, discarding them as they finish.
    /// Returns how many operations were yielded.
    pub fn resolve_all(&mut self) -> usize {
        let mut count = 0;
        while self.next().is_some() {
            count += 1;
        }
        count
    }

    fn has_capacity(&self) -> bool {
        match self.limit {
            Some(limit) => self.active_count() < limit,
            None => true,
        }
    }

    fn admit_backlog(&mut self) {
        while self.has_capacity() {
            let Some(mut future) = self.backlog.pop_front() else {
                break;
            };
            future.start();
            match self.slots.iter().position(|slot| slot.is_none()) {
                Some(free) => self.slots[free] = Some(future),
                None => self.slots.push(Some(future)),
            }
        }
    }
}

impl<D: Deferred> Iterator for FutureIterator<D> {
    type Item = D;

    fn next(&mut self) -> Option<D> {
        loop {
            match self.next_step() {
                Step::Ready(future) => return Some(future),
                Step::Exhausted => return None,
                Step::Timeout => continue,
            }
        }
    }
}

impl<D: Deferred> Default for FutureIterator<D> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<D: Deferred> Drop for FutureIterator<D> {
    fn drop(&mut self) {
        let active = self.active_count();
        if active > 0 || !self.backlog.is_empty() {
            debug!(
                "Abandoning {} active and {} queued futures",
                active,
                self.backlog.len()
            );
        }
        // Signal everything first so grace periods run concurrently when
        // the slots are dropped.
        for future in self.slots.iter_mut().flatten() {
            future.abandon();
        }
    }
}
