//! Evaluation limits and cooperative cancellation.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::err::FilterError;

/// Limits and switches for compiling and evaluating filters.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, derive_builder::Builder)]
#[builder(default)]
pub struct EvalSettings {
    /// Maximal nesting depth of scoped sub-filters.
    pub max_scope_depth: usize,
    /// Maximal number of conjunctions of one normalized expression.
    pub max_conjunctions: usize,
    /// Maximal nesting of parentheses and negations in one expression.
    pub max_nesting_depth: usize,
    /// Whether to evaluate the scoped sub-filters of one expression in parallel.
    pub parallel_scopes: bool,
    /// Abort evaluation after this duration, if set.
    #[builder(setter(strip_option))]
    pub timeout: Option<Duration>,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            max_scope_depth: 4,
            max_conjunctions: 1024,
            max_nesting_depth: 64,
            parallel_scopes: true,
            timeout: None,
        }
    }
}

/// Token for cancelling a running evaluation.
///
/// Clones share the cancellation flag.  The token is checked at each
/// gateway call, between conjunctions and periodically while scanning.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Construct token that never times out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Same token with deadline moved to `timeout` from now, unless already earlier.
    ///
    /// A timeout too large to represent as an `Instant` leaves the deadline
    /// unchanged.
    pub fn limited_by(&self, timeout: Option<Duration>) -> Self {
        let limit = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let deadline = match (self.deadline, limit) {
            (Some(deadline), Some(limit)) => Some(deadline.min(limit)),
            (deadline, limit) => deadline.or(limit),
        };
        Self {
            cancelled: self.cancelled.clone(),
            deadline,
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Return an error if cancelled or past the deadline.
    pub fn check(&self) -> Result<(), FilterError> {
        if self.is_cancelled() {
            Err(FilterError::Cancelled)
        } else if self
            .deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
        {
            Err(FilterError::TimedOut)
        } else {
            Ok(())
        }
    }
}
