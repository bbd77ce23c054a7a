//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This is what lets a `Dependency` subscribe "whoever is reading me"
//! without the caller passing a computation around.
//!
//! # Implementation
//!
//! Each thread holds a single slot for the current computation. Entering a
//! context swaps a new value into the slot and remembers the previous one;
//! the returned guard puts the previous value back when dropped, so the slot
//! is restored on every exit path, including unwinding.
//!
//! Entering with `None` is how non-reactive sections are expressed: reads
//! inside them find no current computation and subscribe nothing.

use std::cell::RefCell;

use super::computation::Computation;

thread_local! {
    static CURRENT: RefCell<Option<Computation>> = const { RefCell::new(None) };
}

/// Guard that restores the previous computation when dropped.
#[must_use = "the previous computation is restored as soon as the guard is dropped"]
pub struct ReactiveContext {
    previous: Option<Computation>,
}

impl ReactiveContext {
    /// Make `computation` current until the returned guard is dropped.
    pub(crate) fn enter(computation: Option<Computation>) -> Self {
        let previous = CURRENT.with(|slot| slot.replace(computation));
        Self { previous }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CURRENT.with(|slot| slot.borrow().is_some())
    }

    /// Get the current computation, if any.
    pub fn current() -> Option<Computation> {
        CURRENT.with(|slot| slot.borrow().clone())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|slot| {
            slot.replace(previous);
        });
    }
}

/// True while a computation body is running and reactive access is possible.
pub fn is_active() -> bool {
    ReactiveContext::is_active()
}

/// The computation whose body is currently running, if any.
pub fn current_computation() -> Option<Computation> {
    ReactiveContext::current()
}

/// Run `f` with no current computation, restoring the previous one afterwards.
///
/// Dependencies read inside `f` do not subscribe anything.
pub fn nonreactive<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter(None);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::autorun;

    #[test]
    fn context_tracks_current_computation() {
        assert!(!is_active());
        assert!(current_computation().is_none());

        let seen = std::rc::Rc::new(std::cell::Cell::new(false));
        let seen_clone = seen.clone();
        let c = autorun(move |c| {
            seen_clone.set(is_active() && current_computation().as_ref() == Some(c));
            Ok(())
        })
        .unwrap();

        assert!(seen.get());
        assert!(!is_active());
        c.stop();
    }

    #[test]
    fn nonreactive_clears_and_restores() {
        let observed = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let observed_clone = observed.clone();
        let c = autorun(move |_| {
            let mut log = observed_clone.borrow_mut();
            log.push(is_active());
            log.push(nonreactive(is_active));
            log.push(is_active());
            Ok(())
        })
        .unwrap();

        assert_eq!(*observed.borrow(), vec![true, false, true]);
        c.stop();
    }

    #[test]
    fn nonreactive_returns_result() {
        assert_eq!(nonreactive(|| 42), 42);
    }

    #[test]
    fn guard_restores_on_unwind() {
        let restored = std::rc::Rc::new(std::cell::Cell::new(false));
        let restored_clone = restored.clone();
        let c = autorun(move |_| {
            let result = std::panic::catch_unwind(|| {
                nonreactive(|| panic!("boom"));
            });
            restored_clone.set(result.is_err() && is_active());
            Ok(())
        })
        .unwrap();

        assert!(restored.get());
        c.stop();
    }
}
