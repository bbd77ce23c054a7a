//! Computation Implementation
//!
//! A Computation is a re-runnable unit of reactive work. It runs its body
//! once when created, and again on the next flush after anything it read
//! calls `changed()`.
//!
//! # Lifecycle
//!
//! ```text
//! fresh -> running -> idle <-> invalidated -> running -> idle
//!            \          \          \
//!             `----------`----------`--> stopped (terminal)
//! ```
//!
//! - `invalidated` is false only while the last run's result is current.
//! - Once `stopped` is set, `invalidated` stays true and the body never
//!   runs again.
//! - Invalidation callbacks and stop callbacks are one-shot. Each list is
//!   taken before it is drained, so a callback registered during a drain is
//!   deferred to the next event instead of joining the current one.
//!
//! Computations can only be created through [`super::autorun`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::{nonreactive, ReactiveContext};
use super::id::ComputationId;
use super::scheduler;
use crate::error::{Phase, TrackerError};

/// The body of a computation.
pub(crate) type Body = Box<dyn FnMut(&Computation) -> anyhow::Result<()>>;

/// Receives errors from reruns of a computation.
pub(crate) type ErrorHandler = Box<dyn FnMut(anyhow::Error)>;

/// A one-shot invalidation or stop callback.
type Callback = Box<dyn FnOnce(&Computation)>;

type CallbackList = SmallVec<[Callback; 2]>;

/// A re-runnable unit of reactive work.
///
/// Cloning a `Computation` yields another handle to the same computation.
#[derive(Clone)]
pub struct Computation {
    inner: Rc<Inner>,
}

struct Inner {
    id: ComputationId,

    stopped: Cell<bool>,
    invalidated: Cell<bool>,
    first_run: Cell<bool>,
    /// Set while this computation's own rerun is executing; suppresses
    /// re-enqueueing itself on invalidation.
    recomputing: Cell<bool>,

    /// The computation that was current when this one was created.
    parent: Option<Weak<Inner>>,

    body: RefCell<Body>,
    on_error: RefCell<Option<ErrorHandler>>,

    on_invalidate: RefCell<CallbackList>,
    on_stop: RefCell<CallbackList>,
}

impl Computation {
    /// Create, register, and run a computation for the first time.
    ///
    /// If the first run fails the computation is stopped before the error
    /// is returned.
    pub(crate) fn construct(
        body: Body,
        parent: Option<&Computation>,
        on_error: Option<ErrorHandler>,
    ) -> Result<Self, TrackerError> {
        let computation = Self {
            inner: Rc::new(Inner {
                id: ComputationId::next(),
                stopped: Cell::new(false),
                invalidated: Cell::new(false),
                first_run: Cell::new(true),
                recomputing: Cell::new(false),
                parent: parent.map(|p| Rc::downgrade(&p.inner)),
                body: RefCell::new(body),
                on_error: RefCell::new(on_error),
                on_invalidate: RefCell::new(SmallVec::new()),
                on_stop: RefCell::new(SmallVec::new()),
            }),
        };

        scheduler::register(&computation);

        let result = computation.compute();
        computation.inner.first_run.set(false);

        if let Err(err) = result {
            computation.stop();
            return Err(TrackerError::from_first_run(err));
        }

        Ok(computation)
    }

    /// Get the computation's unique ID.
    pub fn id(&self) -> ComputationId {
        self.inner.id
    }

    /// True once the computation has been stopped.
    pub fn stopped(&self) -> bool {
        self.inner.stopped.get()
    }

    /// True if the computation has been invalidated and not yet rerun, or
    /// if it has been stopped.
    pub fn invalidated(&self) -> bool {
        self.inner.invalidated.get()
    }

    /// True only during the initial run performed by `autorun`.
    pub fn first_run(&self) -> bool {
        self.inner.first_run.get()
    }

    /// The computation that was running when this one was created.
    ///
    /// Informational only: the parent does not affect scheduling.
    pub fn parent(&self) -> Option<Computation> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Computation { inner })
    }

    /// Register `f` to run when this computation is next invalidated.
    ///
    /// If the computation is already invalidated (or stopped), `f` runs
    /// immediately. Either way it runs with no current computation and
    /// receives this computation.
    pub fn on_invalidate<F>(&self, f: F)
    where
        F: FnOnce(&Computation) + 'static,
    {
        if self.invalidated() {
            self.run_callback(Box::new(f));
        } else {
            self.inner.on_invalidate.borrow_mut().push(Box::new(f));
        }
    }

    /// Register `f` to run when this computation is stopped, or run it now
    /// if it already is. Stop callbacks run after the invalidation callbacks
    /// of the same stop.
    pub fn on_stop<F>(&self, f: F)
    where
        F: FnOnce(&Computation) + 'static,
    {
        if self.stopped() {
            self.run_callback(Box::new(f));
        } else {
            self.inner.on_stop.borrow_mut().push(Box::new(f));
        }
    }

    /// Invalidate this computation so that it reruns on the next flush.
    ///
    /// Does nothing if the computation is already invalidated.
    pub fn invalidate(&self) {
        if self.invalidated() {
            return;
        }

        // A computation in the middle of its own rerun is retried by the
        // flush loop directly.
        if !self.inner.recomputing.get() && !self.stopped() {
            scheduler::enqueue(self.clone());
        }

        self.inner.invalidated.set(true);

        let callbacks = std::mem::take(&mut *self.inner.on_invalidate.borrow_mut());
        for callback in callbacks {
            self.run_callback(callback);
        }
    }

    /// Stop this computation permanently.
    ///
    /// Invalidation callbacks fire first, then stop callbacks. Calling
    /// `stop` again has no effect.
    pub fn stop(&self) {
        if self.stopped() {
            return;
        }

        self.inner.stopped.set(true);
        self.invalidate();
        scheduler::unregister(self.id());
        tracing::trace!(id = %self.id(), "computation stopped");

        let callbacks = std::mem::take(&mut *self.inner.on_stop.borrow_mut());
        for callback in callbacks {
            self.run_callback(callback);
        }
    }

    pub(crate) fn needs_recompute(&self) -> bool {
        self.invalidated() && !self.stopped()
    }

    /// Rerun the body if still needed, routing failures to the error
    /// handler or the scheduler's error policy.
    pub(crate) fn recompute(&self) -> Result<(), TrackerError> {
        let _recomputing = Recomputing::enter(&self.inner.recomputing);

        if !self.needs_recompute() {
            return Ok(());
        }

        match self.compute() {
            Ok(()) => Ok(()),
            Err(err) => match self.inner.on_error.borrow_mut().as_mut() {
                Some(handler) => {
                    handler(err);
                    Ok(())
                }
                None => scheduler::throw_or_log(Phase::Recompute, err),
            },
        }
    }

    fn compute(&self) -> anyhow::Result<()> {
        self.inner.invalidated.set(false);

        let _ctx = ReactiveContext::enter(Some(self.clone()));
        let _computing = scheduler::ComputeScope::enter();

        let host = scheduler::host();
        let mut guard = self.inner.body.borrow_mut();
        let body: &mut Body = &mut guard;
        let mut result = Ok(());
        host.no_yields(&mut || {
            result = body(self);
        });
        result
    }

    fn run_callback(&self, callback: Callback) {
        let host = scheduler::host();
        let mut callback = Some(callback);
        nonreactive(|| {
            host.no_yields(&mut || {
                if let Some(callback) = callback.take() {
                    callback(self);
                }
            });
        });
    }
}

impl PartialEq for Computation {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Computation {}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.id())
            .field("stopped", &self.stopped())
            .field("invalidated", &self.invalidated())
            .field("first_run", &self.first_run())
            .finish()
    }
}

/// Clears the recomputing flag on every exit path.
struct Recomputing<'a>(&'a Cell<bool>);

impl<'a> Recomputing<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Recomputing<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{autorun, flush, is_active};

    fn log() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn flags_across_lifecycle() {
        let first_runs = Rc::new(RefCell::new(Vec::new()));
        let first_runs_clone = first_runs.clone();
        let c = autorun(move |c| {
            assert!(!c.invalidated());
            assert!(!c.stopped());
            first_runs_clone.borrow_mut().push(c.first_run());
            Ok(())
        })
        .unwrap();

        assert!(!c.first_run());
        assert!(!c.invalidated());

        c.invalidate();
        assert!(c.invalidated());
        assert!(c.needs_recompute());

        flush().unwrap();
        assert!(!c.invalidated());
        assert_eq!(*first_runs.borrow(), vec![true, false]);

        c.stop();
        assert!(c.stopped());
        assert!(c.invalidated());
        assert!(!c.needs_recompute());
    }

    #[test]
    fn on_invalidate_is_deferred_until_invalidation() {
        let events = log();
        let c = autorun(|_| Ok(())).unwrap();

        let e = events.clone();
        c.on_invalidate(move |_| e.borrow_mut().push("a"));
        let e = events.clone();
        c.on_invalidate(move |_| e.borrow_mut().push("b"));
        assert!(events.borrow().is_empty());

        c.invalidate();
        assert_eq!(*events.borrow(), vec!["a", "b"]);

        // Already invalidated: runs right away.
        let e = events.clone();
        c.on_invalidate(move |_| e.borrow_mut().push("c"));
        assert_eq!(*events.borrow(), vec!["a", "b", "c"]);

        c.stop();
    }

    #[test]
    fn callbacks_run_non_reactively_with_the_computation() {
        let c = autorun(|_| Ok(())).unwrap();
        let seen = Rc::new(Cell::new(false));

        let seen_clone = seen.clone();
        let expected = c.clone();
        c.on_invalidate(move |given| {
            seen_clone.set(!is_active() && *given == expected);
        });
        c.invalidate();

        assert!(seen.get());
        c.stop();
    }

    #[test]
    fn stop_runs_invalidate_callbacks_before_stop_callbacks() {
        let events = log();
        let c = autorun(|_| Ok(())).unwrap();

        let e = events.clone();
        c.on_stop(move |_| e.borrow_mut().push("stop"));
        let e = events.clone();
        c.on_invalidate(move |_| e.borrow_mut().push("invalidate"));

        c.stop();
        c.stop();
        assert_eq!(*events.borrow(), vec!["invalidate", "stop"]);

        // Already stopped: runs right away.
        let e = events.clone();
        c.on_stop(move |_| e.borrow_mut().push("late"));
        assert_eq!(*events.borrow(), vec!["invalidate", "stop", "late"]);
    }

    #[test]
    fn stopped_computation_never_reruns() {
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let c = autorun(move |_| {
            runs_clone.set(runs_clone.get() + 1);
            Ok(())
        })
        .unwrap();

        c.invalidate();
        c.stop();
        flush().unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn parent_is_the_enclosing_computation() {
        let child = Rc::new(RefCell::new(None));
        let child_clone = child.clone();
        let outer = autorun(move |_| {
            *child_clone.borrow_mut() = Some(autorun(|_| Ok(()))?);
            Ok(())
        })
        .unwrap();

        let child = child.borrow_mut().take().unwrap();
        assert_eq!(child.parent(), Some(outer.clone()));
        assert_eq!(outer.parent(), None);

        // Invalidating the parent stops the child.
        outer.invalidate();
        assert!(child.stopped());
        outer.stop();
    }

    #[test]
    fn failed_first_run_stops_the_computation() {
        let stopped_on_first_run = Rc::new(Cell::new(None));
        let flag = stopped_on_first_run.clone();
        let captured = Rc::new(RefCell::new(None));
        let captured_clone = captured.clone();

        let err = autorun(move |c| {
            *captured_clone.borrow_mut() = Some(c.clone());
            let observed = flag.clone();
            c.on_stop(move |c| observed.set(Some(c.first_run())));
            anyhow::bail!("broken")
        })
        .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::FirstRun));
        let c = captured.borrow_mut().take().unwrap();
        assert!(c.stopped());
        assert_eq!(stopped_on_first_run.get(), Some(false));
        assert!(scheduler::computation(c.id()).is_none());
    }
}
