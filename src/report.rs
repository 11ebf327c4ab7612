//! Partial-success reports returned by batch operations

use serde::Serialize;

/// One item of a batch that did not make it through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// What failed: a page number, group label or filename
    pub item: String,
    pub reason: String,
}

impl Failure {
    pub fn new(item: impl ToString, error: impl ToString) -> Self {
        Self {
            item: item.to_string(),
            reason: error.to_string(),
        }
    }
}

/// Successes and failures of a batch, in processing order
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<Failure>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn push_ok(&mut self, item: T) {
        self.succeeded.push(item);
    }

    pub fn push_err(&mut self, failure: Failure) {
        tracing::warn!("{}: {}", failure.item, failure.reason);
        self.failed.push(failure);
    }

    /// True when no item failed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
