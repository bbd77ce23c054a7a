//! Host Integration
//!
//! The scheduler needs exactly one thing from its environment: a way to run
//! a task once, later, after the current synchronous work unwinds. That is
//! how an invalidation turns into an asynchronous flush without the caller
//! having to call `flush` explicitly.
//!
//! Hosts can also wrap every user callback to forbid cooperative yielding
//! while it runs. The default wrapper is a pass-through.
//!
//! Two hosts ship with the crate:
//!
//! - [`ManualHost`]: a plain queue. The embedder decides when to drain it.
//!   This is the default, and what the tests use.
//! - [`TokioHost`] (feature `tokio`): spawns tasks on the current
//!   `tokio::task::LocalSet`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Deferred-execution capability supplied by the embedding runtime.
pub trait Host {
    /// Run `task` once, asynchronously, after the current synchronous
    /// execution unwinds.
    fn defer(&self, task: Task);

    /// Like [`Host::defer`], but no sooner than `delay` from now.
    fn defer_after(&self, _delay: Duration, task: Task) {
        self.defer(task);
    }

    /// Run `f` with cooperative yielding forbidden.
    fn no_yields(&self, f: &mut dyn FnMut()) {
        f();
    }
}

/// A host that queues deferred tasks until told to run them.
#[derive(Default)]
pub struct ManualHost {
    tasks: RefCell<VecDeque<Task>>,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the oldest queued task. Returns false if the queue was empty.
    pub fn run_next(&self) -> bool {
        // The task may defer more work, so the borrow must end first.
        let next = self.tasks.borrow_mut().pop_front();
        match next {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks until the queue is empty, including tasks queued along the
    /// way. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

impl Host for ManualHost {
    fn defer(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

impl fmt::Debug for ManualHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualHost")
            .field("queued", &self.len())
            .finish()
    }
}

/// A host backed by the tokio runtime.
///
/// Tasks are spawned with `tokio::task::spawn_local`, so every deferral must
/// happen inside a `LocalSet`.
#[cfg(feature = "tokio")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioHost;

#[cfg(feature = "tokio")]
impl Host for TokioHost {
    fn defer(&self, task: Task) {
        tokio::task::spawn_local(async move {
            task();
        });
    }

    fn defer_after(&self, delay: Duration, task: Task) {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}
