//! Dependency Implementation
//!
//! A Dependency is a change-notification source. Computations subscribe to
//! it by calling [`Dependency::depend`] while they run; [`Dependency::changed`]
//! invalidates every current subscriber.
//!
//! Subscriptions clean themselves up: subscribing registers an invalidation
//! callback on the computation that removes the entry again, so a
//! subscriber is dropped the moment it is invalidated or stopped. A
//! computation that wants to stay subscribed calls `depend` again on its
//! next run.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::computation::Computation;
use super::context::ReactiveContext;
use super::id::ComputationId;

type Subscribers = IndexMap<ComputationId, Computation>;

/// A set of subscribed computations.
///
/// Cloning a `Dependency` yields another handle to the same subscriber set.
#[derive(Clone, Default)]
pub struct Dependency {
    dependents: Rc<RefCell<Subscribers>>,
}

impl Dependency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe the current computation.
    ///
    /// Returns true if a new subscription was recorded; false if there is
    /// no current computation or it is already subscribed.
    pub fn depend(&self) -> bool {
        match ReactiveContext::current() {
            Some(computation) => self.depend_for(&computation),
            None => false,
        }
    }

    /// Subscribe `computation` explicitly.
    pub fn depend_for(&self, computation: &Computation) -> bool {
        let id = computation.id();
        {
            let mut dependents = self.dependents.borrow_mut();
            if dependents.contains_key(&id) {
                return false;
            }
            dependents.insert(id, computation.clone());
        }

        // May fire immediately if the computation is already invalidated.
        let dependents: Weak<RefCell<Subscribers>> = Rc::downgrade(&self.dependents);
        computation.on_invalidate(move |_| {
            if let Some(dependents) = dependents.upgrade() {
                dependents.borrow_mut().shift_remove(&id);
            }
        });
        true
    }

    /// Invalidate every subscribed computation.
    pub fn changed(&self) {
        // Invalidation removes entries as it goes.
        let subscribers: Vec<Computation> = self.dependents.borrow().values().cloned().collect();
        for computation in subscribers {
            computation.invalidate();
        }
    }

    /// True if any computation is subscribed.
    pub fn has_dependents(&self) -> bool {
        !self.dependents.borrow().is_empty()
    }

    /// Number of subscribed computations.
    pub fn dependent_count(&self) -> usize {
        self.dependents.borrow().len()
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("dependents", &self.dependents.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}
