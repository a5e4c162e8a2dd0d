//! Soft failures.
//!
//! A wait the caller chose not to treat as fatal is recorded here instead of
//! stopping the run. Soft failures appear in the verification result but do
//! not flip it to failed on their own.

use crate::result::{ErrorKind, HarnessError};
use serde::{Deserialize, Serialize};

/// A recorded non-fatal failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftFailure {
    /// Message describing the failure
    pub message: String,
    /// Error classification
    pub kind: ErrorKind,
    /// Index of this failure in the sequence
    pub index: usize,
}

/// Ordered collection of soft failures
#[derive(Debug, Clone, Default)]
pub struct SoftFailures {
    failures: Vec<SoftFailure>,
}

impl SoftFailures {
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error without propagating it
    pub fn record(&mut self, error: &HarnessError) {
        let failure = SoftFailure {
            message: error.to_string(),
            kind: error.kind(),
            index: self.failures.len(),
        };
        tracing::warn!(kind = ?failure.kind, message = %failure.message, "soft failure");
        self.failures.push(failure);
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failures
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Recorded failures in order
    #[must_use]
    pub fn failures(&self) -> &[SoftFailure] {
        &self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_order_and_kind() {
        let mut soft = SoftFailures::new();
        assert!(soft.is_empty());
        soft.record(&HarnessError::WaitTimeout {
            condition: "network idle for 500ms".to_string(),
            ms: 5000,
        });
        soft.record(&HarnessError::assertion("tab count"));
        assert_eq!(soft.len(), 2);
        assert_eq!(soft.failures()[0].kind, ErrorKind::WaitTimeout);
        assert_eq!(soft.failures()[1].index, 1);
        assert!(soft.failures()[1].message.contains("tab count"));
    }
}
