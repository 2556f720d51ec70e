//! Unified error handling for the checkout engine.
//!
//! Every fallible engine operation returns `Result<T, CheckoutError>`. The
//! variants follow the failure taxonomy the engine's callers act on: retry,
//! redirect back to the cart, degrade to a default, or give up.

use thiserror::Error;

use crate::api::ApiError;

/// Engine-level error taxonomy.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Network or timeout failure; the operation is safe to retry.
    #[error("transient I/O error: {0}")]
    Transient(String),

    /// Payment session expired or unknown; fatal to this confirmation
    /// attempt, the caller sends the user back to the cart.
    #[error("payment session not found: {0}")]
    SessionNotFound(String),

    /// Empty-result lookup. Callers usually map this to a default (e.g., an
    /// identity with no cart record yet reads as an empty cart).
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed or missing record; fatal, logged.
    #[error("validation error: {0}")]
    Validation(String),

    /// The remote side already holds the record this call tried to create.
    /// The remote side is authoritative, so callers that can treat this as
    /// success do.
    #[error("persistence conflict: {0}")]
    Conflict(String),

    /// The operation was cancelled cooperatively. Never user-visible; the
    /// caller discards the attempt without touching state.
    #[error("operation cancelled")]
    Cancelled,
}

impl CheckoutError {
    /// Whether a caller-initiated retry of the same operation is safe and
    /// likely to succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Actionable message for the user, never raw error detail.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Transient(_) => "We hit a temporary network problem. Please try again.",
            Self::SessionNotFound(_) => {
                "Your checkout session has expired. Return to your cart to try again."
            }
            Self::NotFound(_) | Self::Validation(_) => {
                "We couldn't find anything to check out. Return to your cart to try again."
            }
            Self::Conflict(_) => "This order was already placed.",
            Self::Cancelled => "",
        }
    }
}

impl From<ApiError> for CheckoutError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotFound(message) => Self::NotFound(message),
            ApiError::Conflict(message) => Self::Conflict(message),
            // Client-side input rejections are not retryable
            ApiError::Api { status, message } if status == 400 || status == 422 => {
                Self::Validation(format!("{status}: {message}"))
            }
            other => Self::Transient(other.to_string()),
        }
    }
}

/// Result type alias for `CheckoutError`.
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = CheckoutError::SessionNotFound("sess_1".to_string());
        assert_eq!(err.to_string(), "payment session not found: sess_1");

        let err = CheckoutError::Validation("empty snapshot".to_string());
        assert_eq!(err.to_string(), "validation error: empty snapshot");
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(CheckoutError::Transient("timeout".to_string()).is_retryable());
        assert!(!CheckoutError::SessionNotFound("sess_1".to_string()).is_retryable());
        assert!(!CheckoutError::Cancelled.is_retryable());
    }

    #[test]
    fn test_api_error_mapping() {
        let err: CheckoutError = ApiError::NotFound("no cart".to_string()).into();
        assert!(matches!(err, CheckoutError::NotFound(_)));

        let err: CheckoutError = ApiError::Conflict("order exists".to_string()).into();
        assert!(matches!(err, CheckoutError::Conflict(_)));

        let err: CheckoutError = ApiError::Api {
            status: 422,
            message: "bad draft".to_string(),
        }
        .into();
        assert!(matches!(err, CheckoutError::Validation(_)));

        let err: CheckoutError = ApiError::Api {
            status: 503,
            message: "unavailable".to_string(),
        }
        .into();
        assert!(matches!(err, CheckoutError::Transient(_)));
    }
}
