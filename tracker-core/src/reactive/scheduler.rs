//! Flush Scheduler
//!
//! The scheduler is the central coordinator. It owns the queue of
//! invalidated computations, the queue of after-flush callbacks, and the
//! registry of live computations, and it drains both queues to a fixed
//! point when flushed.
//!
//! # How It Works
//!
//! 1. Invalidating a computation pushes it onto the pending queue and asks
//!    the host to run a flush later (once per batch).
//!
//! 2. A flush reruns pending computations front to back. A computation that
//!    invalidated itself during its rerun goes back to the *front* of the
//!    queue, ahead of siblings that were already waiting.
//!
//! 3. Once the pending queue is empty, exactly one after-flush callback
//!    runs. It may invalidate more computations, so the loop starts over
//!    until both queues are empty.
//!
//! # Threading
//!
//! All of this state lives in a thread-local `SchedulerState`. There is one
//! logical thread of control, so nothing is locked; illegal re-entry is
//! caught by guard flags and reported as a usage error.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;

use super::computation::{Computation, ErrorHandler};
use super::context::ReactiveContext;
use super::id::ComputationId;
use crate::config::SchedulerConfig;
use crate::error::{Phase, TrackerError};
use crate::host::{Host, ManualHost, Task};

type AfterFlushCallback = Box<dyn FnOnce() -> anyhow::Result<()>>;

thread_local! {
    static SCHEDULER: SchedulerState = SchedulerState::new();
}

fn with_state<R>(f: impl FnOnce(&SchedulerState) -> R) -> R {
    SCHEDULER.with(f)
}

/// Per-thread scheduler state.
///
/// Starts with empty queues and every flag cleared. No `RefCell` borrow is
/// ever held while user code runs.
pub(crate) struct SchedulerState {
    /// Computations awaiting a rerun.
    pending: RefCell<VecDeque<Computation>>,
    after_flush: RefCell<VecDeque<AfterFlushCallback>>,

    /// Live computations, removed on stop.
    computations: RefCell<IndexMap<ComputationId, Computation>>,

    /// A flush is scheduled or running.
    will_flush: Cell<bool>,
    /// A flush is running.
    in_flush: Cell<bool>,
    /// A computation body is running, even if inside `nonreactive`.
    in_compute: Cell<bool>,
    throw_first_error: Cell<bool>,

    /// A deferred flush task is queued on the host and has not run yet.
    flush_deferred: Cell<bool>,
    /// Bumped by `set_host`; tasks left on a replaced host do nothing.
    host_epoch: Cell<u64>,

    config: RefCell<SchedulerConfig>,
    host: RefCell<Rc<dyn Host>>,
}

#[derive(Debug, Clone, Copy)]
struct RunMode {
    /// Ignore the yield budget and leave nothing behind.
    finish_synchronously: bool,
    throw_first_error: bool,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            pending: RefCell::new(VecDeque::new()),
            after_flush: RefCell::new(VecDeque::new()),
            computations: RefCell::new(IndexMap::new()),
            will_flush: Cell::new(false),
            in_flush: Cell::new(false),
            in_compute: Cell::new(false),
            throw_first_error: Cell::new(false),
            flush_deferred: Cell::new(false),
            host_epoch: Cell::new(0),
            config: RefCell::new(SchedulerConfig::default()),
            host: RefCell::new(Rc::new(ManualHost::new())),
        }
    }

    fn host(&self) -> Rc<dyn Host> {
        self.host.borrow().clone()
    }

    /// Ask the host for an asynchronous flush unless one is already on the way.
    fn require_flush(&self) {
        if self.will_flush.get() {
            return;
        }
        self.will_flush.set(true);
        self.defer_flush(None);
    }

    /// Queue a flush on the host. At most one such task is outstanding, so
    /// a host that is never drained holds a single stale task.
    fn defer_flush(&self, delay: Option<Duration>) {
        if self.flush_deferred.replace(true) {
            return;
        }
        let epoch = self.host_epoch.get();
        let task: Task = Box::new(move || run_deferred_flush(epoch));
        match delay {
            Some(delay) => self.host().defer_after(delay, task),
            None => self.host().defer(task),
        }
    }

    fn run_flush(&self, mode: RunMode) -> Result<(), TrackerError> {
        if self.in_flush.get() {
            return Err(TrackerError::FlushReentered);
        }
        if self.in_compute.get() {
            return Err(TrackerError::FlushInsideComputation);
        }

        let scope = FlushScope::enter(self, mode.throw_first_error);
        tracing::debug!(
            finish_synchronously = mode.finish_synchronously,
            throw_first_error = mode.throw_first_error,
            "flush started"
        );

        let outcome = self.drain(mode.finish_synchronously);

        if outcome.is_err() {
            // Finish the remaining work in logging mode before the first
            // error is handed back.
            self.in_flush.set(false);
            let rest = RunMode {
                finish_synchronously: mode.finish_synchronously,
                throw_first_error: false,
            };
            if let Err(err) = self.run_flush(rest) {
                tracing::error!(error = %err, "flush after first error failed");
            }
        }

        drop(scope);

        let pending = self.pending.borrow().len();
        let after_flush = self.after_flush.borrow().len();
        if pending > 0 || after_flush > 0 {
            if mode.finish_synchronously {
                outcome?;
                return Err(TrackerError::UnfinishedFlush {
                    pending,
                    after_flush,
                });
            }
            let delay = self.config.borrow().retry_delay;
            tracing::debug!(pending, after_flush, ?delay, "flush yielded");
            self.defer_flush(Some(delay));
        }

        tracing::debug!(ok = outcome.is_ok(), "flush finished");
        outcome
    }

    fn drain(&self, finish_synchronously: bool) -> Result<(), TrackerError> {
        let yield_budget = self.config.borrow().yield_budget;
        let mut recomputed = 0usize;

        loop {
            loop {
                let next = self.pending.borrow_mut().pop_front();
                let Some(computation) = next else {
                    break;
                };

                computation.recompute()?;
                if computation.needs_recompute() {
                    self.pending.borrow_mut().push_front(computation);
                }

                if !finish_synchronously {
                    recomputed += 1;
                    if recomputed > yield_budget {
                        return Ok(());
                    }
                }
            }

            // One callback at a time: it may invalidate more computations,
            // which are drained before the next callback runs.
            let next = self.after_flush.borrow_mut().pop_front();
            let Some(callback) = next else {
                return Ok(());
            };
            let mut callback = Some(callback);
            let mut result = Ok(());
            self.host().no_yields(&mut || {
                if let Some(callback) = callback.take() {
                    result = callback();
                }
            });
            if let Err(err) = result {
                report(Phase::AfterFlush, &err);
            }
        }
    }
}

impl fmt::Debug for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerState")
            .field("pending", &self.pending.borrow().len())
            .field("after_flush", &self.after_flush.borrow().len())
            .field("computations", &self.computations.borrow().len())
            .field("will_flush", &self.will_flush.get())
            .field("in_flush", &self.in_flush.get())
            .field("in_compute", &self.in_compute.get())
            .finish()
    }
}

/// Clears the flush flags when a flush ends, including by unwinding.
struct FlushScope<'a> {
    state: &'a SchedulerState,
}

impl<'a> FlushScope<'a> {
    fn enter(state: &'a SchedulerState, throw_first_error: bool) -> Self {
        state.in_flush.set(true);
        state.will_flush.set(true);
        state.throw_first_error.set(throw_first_error);
        Self { state }
    }
}

impl Drop for FlushScope<'_> {
    fn drop(&mut self) {
        self.state.will_flush.set(false);
        self.state.in_flush.set(false);
        self.state.throw_first_error.set(false);
    }
}

fn run_deferred_flush(epoch: u64) {
    let mode = RunMode {
        finish_synchronously: false,
        throw_first_error: false,
    };
    let result = with_state(|state| {
        if state.host_epoch.get() != epoch {
            return Ok(());
        }
        state.flush_deferred.set(false);
        state.run_flush(mode)
    });
    if let Err(err) = result {
        tracing::error!(error = %err, "deferred flush failed");
    }
}

fn report(phase: Phase, err: &anyhow::Error) {
    tracing::error!(phase = %phase, error = ?err, "exception from tracker {} function", phase);
}

// ----------------------------------------------------------------------------
// Crate-internal hooks used by Computation
// ----------------------------------------------------------------------------

pub(crate) fn register(computation: &Computation) {
    with_state(|state| {
        state
            .computations
            .borrow_mut()
            .insert(computation.id(), computation.clone());
    });
}

pub(crate) fn unregister(id: ComputationId) {
    with_state(|state| {
        state.computations.borrow_mut().shift_remove(&id);
    });
}

pub(crate) fn enqueue(computation: Computation) {
    with_state(|state| {
        state.require_flush();
        state.pending.borrow_mut().push_back(computation);
    });
}

pub(crate) fn host() -> Rc<dyn Host> {
    with_state(SchedulerState::host)
}

/// Route an unhandled body error: returned in throw-first-error mode,
/// reported otherwise.
pub(crate) fn throw_or_log(phase: Phase, err: anyhow::Error) -> Result<(), TrackerError> {
    if with_state(|state| state.throw_first_error.get()) {
        return Err(TrackerError::Body { phase, source: err });
    }
    report(phase, &err);
    Ok(())
}

/// Marks a computation body as running; restores the previous flag on drop.
pub(crate) struct ComputeScope {
    previous: bool,
}

impl ComputeScope {
    pub(crate) fn enter() -> Self {
        let previous = with_state(|state| state.in_compute.replace(true));
        Self { previous }
    }
}

impl Drop for ComputeScope {
    fn drop(&mut self) {
        let previous = self.previous;
        with_state(|state| state.in_compute.set(previous));
    }
}

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

/// Options for [`autorun_with`].
#[derive(Default)]
pub struct AutorunOptions {
    on_error: Option<ErrorHandler>,
}

impl AutorunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle errors from reruns instead of reporting them.
    ///
    /// Errors from the first run are always returned from `autorun_with`.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: FnMut(anyhow::Error) + 'static,
    {
        self.on_error = Some(Box::new(handler));
        self
    }
}

impl fmt::Debug for AutorunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutorunOptions")
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Options for [`flush_with`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushOptions {
    /// Return the first unhandled rerun error instead of reporting it.
    /// The remaining work is still flushed before returning.
    pub throw_first_error: bool,
}

/// Run `f` now and again whenever a dependency it read changes.
///
/// See [`autorun_with`].
pub fn autorun<F>(f: F) -> Result<Computation, TrackerError>
where
    F: FnMut(&Computation) -> anyhow::Result<()> + 'static,
{
    autorun_with(f, AutorunOptions::default())
}

/// Create a computation and run it once, synchronously.
///
/// When called from inside another computation, the new computation is
/// stopped as soon as the enclosing one is invalidated.
///
/// If the first run fails, the computation is stopped and the error is
/// returned. A [`TrackerError`] raised inside the body (for example by a
/// nested `autorun` or `flush`) is returned unchanged.
pub fn autorun_with<F>(f: F, options: AutorunOptions) -> Result<Computation, TrackerError>
where
    F: FnMut(&Computation) -> anyhow::Result<()> + 'static,
{
    let parent = ReactiveContext::current();
    let computation = Computation::construct(Box::new(f), parent.as_ref(), options.on_error)?;

    if let Some(parent) = parent {
        let child = computation.clone();
        parent.on_invalidate(move |_| child.stop());
    }

    Ok(computation)
}

/// Rerun all invalidated computations and run after-flush callbacks until
/// nothing is left.
pub fn flush() -> Result<(), TrackerError> {
    flush_with(FlushOptions::default())
}

/// [`flush`] with options.
pub fn flush_with(options: FlushOptions) -> Result<(), TrackerError> {
    let mode = RunMode {
        finish_synchronously: true,
        throw_first_error: options.throw_first_error,
    };
    with_state(|state| state.run_flush(mode))
}

/// Run `f` once, at the end of the next flush, when no computation is
/// waiting to rerun.
pub fn after_flush<F>(f: F)
where
    F: FnOnce() -> anyhow::Result<()> + 'static,
{
    with_state(|state| {
        state.after_flush.borrow_mut().push_back(Box::new(f));
        state.require_flush();
    });
}

/// Register `f` on the current computation's next invalidation.
pub fn on_invalidate<F>(f: F) -> Result<(), TrackerError>
where
    F: FnOnce(&Computation) + 'static,
{
    let current = ReactiveContext::current().ok_or(TrackerError::NoCurrentComputation)?;
    current.on_invalidate(f);
    Ok(())
}

/// True while a flush is running on this thread.
pub fn is_flushing() -> bool {
    with_state(|state| state.in_flush.get())
}

/// Look up a live (not yet stopped) computation.
pub fn computation(id: ComputationId) -> Option<Computation> {
    with_state(|state| state.computations.borrow().get(&id).cloned())
}

/// Number of live computations on this thread.
pub fn live_computation_count() -> usize {
    with_state(|state| state.computations.borrow().len())
}

/// Replace this thread's scheduler configuration.
pub fn configure(config: SchedulerConfig) {
    with_state(|state| *state.config.borrow_mut() = config);
}

/// This thread's scheduler configuration.
pub fn config() -> SchedulerConfig {
    with_state(|state| state.config.borrow().clone())
}

/// Install the deferred-execution host for this thread, returning the
/// previous one.
///
/// A flush still owed from the previous host is requested again from the
/// new one.
pub fn set_host(host: Rc<dyn Host>) -> Rc<dyn Host> {
    with_state(|state| {
        let previous = state.host.replace(host);
        state.host_epoch.set(state.host_epoch.get() + 1);
        state.flush_deferred.set(false);
        if state.will_flush.get() && !state.in_flush.get() {
            state.defer_flush(None);
        }
        previous
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
