//! Error types for the tracker.
//!
//! Two categories are kept apart:
//!
//! - Usage errors: calling the scheduler in a way that is never valid
//!   (nested flush, flushing from a computation body, and so on). These are
//!   returned at the call site.
//! - Body errors: a computation body or an after-flush callback failed.
//!   These carry the phase they came from and the user's `anyhow::Error`.

use std::fmt;

use thiserror::Error;

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Where a body error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// The synchronous first run performed by `autorun`.
    FirstRun,
    /// A rerun driven by `flush`.
    Recompute,
    /// An after-flush callback.
    AfterFlush,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::FirstRun => "first run",
            Phase::Recompute => "recompute",
            Phase::AfterFlush => "afterFlush",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// `flush` was called while a flush is already running.
    #[error("can't flush while flushing")]
    FlushReentered,

    /// `flush` was called from inside a computation body.
    #[error("can't flush inside a computation")]
    FlushInsideComputation,

    /// A free-standing `on_invalidate` was called with no active computation.
    #[error("on_invalidate requires a current computation")]
    NoCurrentComputation,

    /// A synchronous flush returned with work still queued.
    #[error("synchronous flush finished with {pending} pending computations and {after_flush} after-flush callbacks")]
    UnfinishedFlush { pending: usize, after_flush: usize },

    /// A computation body or after-flush callback failed.
    #[error("exception from tracker {phase} function: {source:#}")]
    Body {
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },
}

impl TrackerError {
    /// True for the programming-error category.
    pub fn is_usage(&self) -> bool {
        !matches!(self, TrackerError::Body { .. })
    }

    /// The phase a body error came from.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            TrackerError::Body { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Wrap a first-run failure, passing nested tracker errors through as-is.
    pub(crate) fn from_first_run(source: anyhow::Error) -> Self {
        match source.downcast::<TrackerError>() {
            Ok(err) => err,
            Err(source) => TrackerError::Body {
                phase: Phase::FirstRun,
                source,
            },
        }
    }
}
