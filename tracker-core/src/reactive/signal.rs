//! Signal Implementation
//!
//! A Signal is a value cell with its own [`Dependency`]. Reading it inside a
//! computation subscribes that computation; writing a different value
//! invalidates every subscriber.
//!
//! # How Signals Work
//!
//! 1. `get` (or `with`) calls `depend()` on the embedded dependency, then
//!    reads the value.
//!
//! 2. `set` stores the new value and calls `changed()`, but only when the
//!    value is actually different, so redundant writes do not schedule
//!    reruns.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::dependency::Dependency;

/// A reactive value of type `T`.
///
/// Cloning a `Signal` yields another handle to the same value.
///
/// # Example
///
/// ```rust
/// use tracker_core::reactive::{autorun, flush, Signal};
///
/// let count = Signal::new(0);
/// let doubled = Signal::new(0);
///
/// let (count_r, doubled_w) = (count.clone(), doubled.clone());
/// let c = autorun(move |_| {
///     doubled_w.set(count_r.get() * 2);
///     Ok(())
/// })
/// .unwrap();
///
/// count.set(5);
/// flush().unwrap();
/// assert_eq!(doubled.get_untracked(), 10);
/// c.stop();
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    value: Rc<RefCell<T>>,
    dependency: Dependency,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            value: Rc::new(RefCell::new(value)),
            dependency: Dependency::new(),
        }
    }

    /// Get the current value, subscribing the current computation.
    pub fn get(&self) -> T {
        self.dependency.depend();
        self.get_untracked()
    }

    /// Get the current value without subscribing anything.
    pub fn get_untracked(&self) -> T {
        self.value.borrow().clone()
    }

    /// Borrow the current value, subscribing the current computation.
    ///
    /// # Panics
    ///
    /// The value stays borrowed while `f` runs, so calling [`Signal::set`] or
    /// [`Signal::update`] on this signal from inside `f` panics. Reading it
    /// again is fine.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.dependency.depend();
        f(&self.value.borrow())
    }

    /// Set a new value, invalidating subscribers if it differs.
    pub fn set(&self, value: T) {
        let changed = {
            let mut guard = self.value.borrow_mut();
            if *guard == value {
                false
            } else {
                *guard = value;
                true
            }
        };

        if changed {
            self.dependency.changed();
        }
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.value.borrow());
        self.set(new_value);
    }

    /// The dependency that tracks this signal's readers.
    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }

    /// Get the number of subscribed computations.
    pub fn subscriber_count(&self) -> usize {
        self.dependency.dependent_count()
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
            dependency: self.dependency.clone(),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("value", &*self.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::reactive::{autorun, flush};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get_untracked(), 15);
    }

    #[test]
    fn signal_reruns_readers_on_change() {
        let signal = Signal::new(1);
        let observed = Rc::new(Cell::new(0));

        let signal_clone = signal.clone();
        let observed_clone = observed.clone();
        let c = autorun(move |_| {
            observed_clone.set(signal_clone.get());
            Ok(())
        })
        .unwrap();

        assert_eq!(observed.get(), 1);
        assert_eq!(signal.subscriber_count(), 1);

        signal.set(7);
        flush().unwrap();
        assert_eq!(observed.get(), 7);

        c.stop();
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn setting_equal_value_does_not_invalidate() {
        let signal = Signal::new(String::from("a"));
        let runs = Rc::new(Cell::new(0));

        let signal_clone = signal.clone();
        let runs_clone = runs.clone();
        let c = autorun(move |_| {
            signal_clone.with(|s| s.len());
            runs_clone.set(runs_clone.get() + 1);
            Ok(())
        })
        .unwrap();

        signal.set(String::from("a"));
        assert!(!c.invalidated());
        flush().unwrap();
        assert_eq!(runs.get(), 1);

        signal.set(String::from("b"));
        assert!(c.invalidated());
        flush().unwrap();
        assert_eq!(runs.get(), 2);
        c.stop();
    }

    #[test]
    fn with_allows_nested_reads() {
        let signal = Signal::new(vec![1, 2, 3]);
        let total = signal.with(|v| v.len() + signal.get_untracked().len());
        assert_eq!(total, 6);
    }

    #[test]
    #[should_panic]
    fn set_inside_with_panics() {
        let signal = Signal::new(1);
        signal.with(|v| signal.set(v + 1));
    }

    #[test]
    fn get_untracked_does_not_subscribe() {
        let signal = Signal::new(0);
        let signal_clone = signal.clone();
        let c = autorun(move |_| {
            signal_clone.get_untracked();
            Ok(())
        })
        .unwrap();

        assert_eq!(signal.subscriber_count(), 0);
        c.stop();
    }
}
