//! Shared types for receipt review.

use serde::{Deserialize, Serialize};

/// Reason attached to every accepted receipt.
pub const ACCEPTED_REASON: &str = "receipt accepted";

/// Outcome of reviewing one receipt.
///
/// `reason` is always populated, for acceptance as well as rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub accepted: bool,
    pub reason: String,
}

impl ValidationResult {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: ACCEPTED_REASON.to_string(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: reason.into(),
        }
    }

    /// Short label for logs and audit entries.
    pub fn label(&self) -> &'static str {
        if self.accepted { "Accepted" } else { "Rejected" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_carries_confirmation_reason() {
        let result = ValidationResult::accepted();
        assert!(result.accepted);
        assert_eq!(result.reason, ACCEPTED_REASON);
        assert_eq!(result.label(), "Accepted");
    }

    #[test]
    fn rejected_keeps_reason() {
        let result = ValidationResult::rejected("missing name");
        assert!(!result.accepted);
        assert_eq!(result.reason, "missing name");
        assert_eq!(result.label(), "Rejected");
    }
}
