use thiserror::Error;

/// Error taxonomy for the ActGuard gateway.
///
/// Needing confirmation is an outcome, not an error, so it has no variant here.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("risk denied: {0}")]
    RiskDenied(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("rate limit exceeded for '{key}': retry after {retry_after_secs}s")]
    RateLimitExceeded { key: String, retry_after_secs: u64 },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("confirmation cancelled: {0}")]
    ConfirmationCancelled(String),

    #[error("internal gate failure: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GateError {
    /// Retry hint carried by rate-limit errors.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            GateError::RateLimitExceeded {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, GateError::RateLimitExceeded { .. })
    }
}

pub type GateResult<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_error_carries_retry_hint() {
        let err = GateError::RateLimitExceeded {
            key: "terminal_commands".into(),
            retry_after_secs: 7,
        };
        assert!(err.is_rate_limit());
        assert_eq!(err.retry_after_secs(), Some(7));
        assert!(err.to_string().contains("retry after 7s"));
    }

    #[test]
    fn other_errors_have_no_retry_hint() {
        let err = GateError::PermissionDenied("outside workspace".into());
        assert!(!err.is_rate_limit());
        assert_eq!(err.retry_after_secs(), None);
    }
}
