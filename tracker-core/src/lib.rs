//! Tracker Core
//!
//! This crate provides a fine-grained reactive computation engine.
//! It implements:
//!
//! - Computations that rerun when the dependencies they read change
//! - Dependencies with self-cleaning subscriptions
//! - A flush scheduler that drives reruns to a fixed point, glitch-free
//! - Invalidation, stop, and after-flush lifecycle hooks
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: computations, dependencies, the execution context, and the
//!   flush scheduler
//! - `host`: the deferred-execution hook used for asynchronous flushes
//! - `config`: scheduler tunables
//! - `error`: usage and body errors
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use tracker_core::reactive::{autorun, flush, Dependency};
//!
//! let dep = Dependency::new();
//! let runs = Rc::new(Cell::new(0));
//!
//! let (d, r) = (dep.clone(), runs.clone());
//! let computation = autorun(move |_| {
//!     d.depend();
//!     r.set(r.get() + 1);
//!     Ok(())
//! })?;
//! assert_eq!(runs.get(), 1);
//!
//! dep.changed();
//! assert_eq!(runs.get(), 1); // not flushed yet
//! flush()?;
//! assert_eq!(runs.get(), 2);
//!
//! computation.stop();
//! assert!(!dep.has_dependents());
//! # Ok::<(), tracker_core::TrackerError>(())
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod reactive;

pub use config::SchedulerConfig;
pub use error::{Phase, Result, TrackerError};
pub use host::{Host, ManualHost, Task};
#[cfg(feature = "tokio")]
pub use host::TokioHost;
