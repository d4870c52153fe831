//! Error types for the Tesseract submitter

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Node messages for transactions that fail pool validation
const VALIDATION_FAILURES: &[&str] = &[
    "intrinsic gas too low",
    "exceeds block gas limit",
    "gas limit reached",
    "invalid sender",
    "invalid chain id",
    "only replay-protected",
    "oversized data",
    "exceeds the configured cap",
    "negative value",
];

/// Why the network refused to accept a signed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// Nonce already used by a mined transaction
    StaleNonce,
    /// Same nonce already sitting in the pending pool
    DuplicateNonce,
    /// Replacement for a pending nonce did not raise the fee enough
    Underpriced,
    /// Nonce skips ahead of the account's next expected nonce
    NonceGap,
    /// Balance does not cover value + fee
    InsufficientFunds,
    /// Any other node-side validation failure
    Other,
}

impl RejectionReason {
    /// Classify a node error message
    pub fn classify(message: &str) -> Self {
        Self::recognize(message).unwrap_or(RejectionReason::Other)
    }

    /// Classify a node error message, or `None` if it is not a known
    /// transaction validation failure
    pub fn recognize(message: &str) -> Option<Self> {
        let message = message.to_ascii_lowercase();
        let reason = if message.contains("nonce too low") {
            RejectionReason::StaleNonce
        } else if message.contains("nonce too high") {
            RejectionReason::NonceGap
        } else if message.contains("already known")
            || message.contains("known transaction")
            || message.contains("duplicate nonce")
        {
            RejectionReason::DuplicateNonce
        } else if message.contains("underpriced") {
            RejectionReason::Underpriced
        } else if message.contains("insufficient funds") {
            RejectionReason::InsufficientFunds
        } else if VALIDATION_FAILURES.iter().any(|m| message.contains(m)) {
            RejectionReason::Other
        } else {
            return None;
        };
        Some(reason)
    }

    /// Label used in metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::StaleNonce => "stale_nonce",
            RejectionReason::DuplicateNonce => "duplicate_nonce",
            RejectionReason::NonceGap => "nonce_gap",
            RejectionReason::Underpriced => "underpriced",
            RejectionReason::InsufficientFunds => "insufficient_funds",
            RejectionReason::Other => "other",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the submitter
#[derive(Error, Debug)]
pub enum SubmitterError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Transaction rejected ({reason}): {message}")]
    Rejected {
        reason: RejectionReason,
        message: String,
    },

    #[error("Transaction {tx_hash} reverted in block {block_number}")]
    ExecutionReverted { tx_hash: String, block_number: u64 },

    #[error("No receipt for {tx_hash} after {waited:?}")]
    ConfirmationTimeout { tx_hash: String, waited: Duration },

    #[error("Suggested fee {suggested_gwei} gwei exceeds ceiling {max_gwei} gwei")]
    FeeTooHigh { suggested_gwei: u64, max_gwei: u64 },

    #[error("Confirmation wait for {tx_hash} cancelled")]
    Cancelled { tx_hash: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event decoding error: {0}")]
    EventDecoding(String),
}

impl SubmitterError {
    /// Shorthand for a node-side rejection with a classified reason
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        SubmitterError::Rejected {
            reason: RejectionReason::classify(&message),
            message,
        }
    }

    /// Check if the caller may reasonably try again.
    ///
    /// Nothing is retried automatically; a stale nonce is retryable only after
    /// the caller re-derives the nonce.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmitterError::Network(_)
                | SubmitterError::ConfirmationTimeout { .. }
                | SubmitterError::Rejected {
                    reason: RejectionReason::StaleNonce
                        | RejectionReason::NonceGap
                        | RejectionReason::DuplicateNonce
                        | RejectionReason::Underpriced,
                    ..
                }
        )
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            SubmitterError::Rejected {
                reason: RejectionReason::InsufficientFunds,
                ..
            } | SubmitterError::FeeTooHigh { .. }
        )
    }
}

/// Result type for submitter operations
pub type SubmitterResult<T> = Result<T, SubmitterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_node_messages() {
        assert_eq!(
            RejectionReason::classify("nonce too low: next nonce 6, tx nonce 5"),
            RejectionReason::StaleNonce
        );
        assert_eq!(
            RejectionReason::classify("already known"),
            RejectionReason::DuplicateNonce
        );
        assert_eq!(
            RejectionReason::classify("replacement transaction underpriced"),
            RejectionReason::Underpriced
        );
        assert_eq!(
            RejectionReason::classify(
                "insufficient funds for gas * price + value: balance 0, tx cost 21000"
            ),
            RejectionReason::InsufficientFunds
        );
        assert_eq!(
            RejectionReason::classify("nonce too high: next nonce 0, tx nonce 1"),
            RejectionReason::NonceGap
        );
        assert_eq!(
            RejectionReason::classify("intrinsic gas too low"),
            RejectionReason::Other
        );
    }

    #[test]
    fn test_unknown_messages_are_not_recognized() {
        assert_eq!(
            RejectionReason::recognize("exceeds block gas limit"),
            Some(RejectionReason::Other)
        );
        assert_eq!(
            RejectionReason::recognize("daily request count exceeded, request rate limited"),
            None
        );
        assert_eq!(RejectionReason::recognize("Internal error"), None);
        assert_eq!(
            RejectionReason::classify("Internal error"),
            RejectionReason::Other
        );
    }

    #[test]
    fn test_retry_and_alert_classification() {
        let stale = SubmitterError::rejected("nonce too low");
        assert!(stale.is_retryable());
        assert!(!stale.should_alert());

        let broke = SubmitterError::rejected("insufficient funds");
        assert!(!broke.is_retryable());
        assert!(broke.should_alert());

        assert!(!SubmitterError::InvalidInput("bad key".into()).is_retryable());
        assert!(SubmitterError::Network("connection refused".into()).is_retryable());
    }
}
