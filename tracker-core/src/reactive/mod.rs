//! Reactive Primitives
//!
//! This module implements the tracker: computations, dependencies, and the
//! flush scheduler that reruns computations when their dependencies change.
//!
//! # Concepts
//!
//! ## Computations
//!
//! A Computation wraps a body that runs once when created with [`autorun`]
//! and again after anything it read has changed. Computations carry
//! one-shot invalidation and stop callbacks for cleanup.
//!
//! ## Dependencies
//!
//! A Dependency is a set of subscribed computations. Calling `depend()`
//! inside a body subscribes the running computation; `changed()`
//! invalidates all subscribers. [`Signal`] bundles a value with a
//! dependency.
//!
//! ## Flushing
//!
//! Invalidated computations do not rerun immediately. They are queued and
//! rerun by [`flush`], or by a flush the host runs later. Each computation
//! reruns at most once per flush no matter how many of its dependencies
//! changed, and after-flush callbacks only run once nothing is left to
//! rerun.
//!
//! # Implementation Notes
//!
//! The current computation lives in a thread-local slot. When a dependency
//! is read, we check the slot and, if it is set, record the subscription.
//! All scheduler state is thread-local too; the engine is single-threaded.

mod computation;
mod context;
mod dependency;
mod id;
mod scheduler;
mod signal;

pub use computation::Computation;
pub use context::{current_computation, is_active, nonreactive, ReactiveContext};
pub use dependency::Dependency;
pub use id::ComputationId;
pub use scheduler::{
    after_flush, autorun, autorun_with, computation, config, configure, flush, flush_with,
    is_flushing, live_computation_count, on_invalidate, set_host, AutorunOptions, FlushOptions,
};
pub use signal::Signal;
