//! Cancellation and deadlines for long-running searches

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared flag a caller flips to stop a running search
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Limits checked between search steps
#[derive(Debug, Clone, Default)]
pub struct SearchBudget {
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl SearchBudget {
    /// No limit
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Stop once `timeout` has elapsed from now
    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_exhausted(&self) -> bool {
        self.cancel.as_ref().map_or(false, CancellationToken::is_cancelled)
            || self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_never_exhausts() {
        assert!(!SearchBudget::unbounded().is_exhausted());
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let budget = SearchBudget::unbounded().with_cancellation(token.clone());
        assert!(!budget.is_exhausted());
        token.cancel();
        assert!(budget.is_exhausted());
    }

    #[test]
    fn test_zero_deadline_exhausts() {
        let budget = SearchBudget::unbounded().with_deadline(Duration::ZERO);
        assert!(budget.is_exhausted());
    }
}
