//! Session identity types.
//!
//! The checkout engine never authenticates anyone; it consumes an
//! [`Identity`] that the identity provider already established. The absence
//! of an identity is the guest session.

use core::fmt;

use serde::{Deserialize, Serialize};

use seagrape_core::{CustomerId, Email};

/// An authenticated customer identity.
///
/// Minimal data the engine needs to address the customer's server cart and
/// attribute orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Customer ID issued by the identity provider.
    pub customer_id: CustomerId,
    /// Customer's email address.
    pub email: Email,
}

/// Which cart lifecycle a session is operating on.
///
/// Persisted state keys are scoped by this, so a guest checkout and an
/// account checkout in the same process never clobber each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Anonymous session; cart lives in local persisted state only.
    Guest,
    /// Authenticated session; cart source of truth lives remotely.
    Account,
}

impl SessionKind {
    /// Derive the session kind from an optional identity.
    #[must_use]
    pub const fn of(identity: Option<&Identity>) -> Self {
        match identity {
            Some(_) => Self::Account,
            None => Self::Guest,
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest => write!(f, "guest"),
            Self::Account => write!(f, "account"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_of_identity() {
        assert_eq!(SessionKind::of(None), SessionKind::Guest);

        let identity = Identity {
            customer_id: CustomerId::new("cust_1"),
            email: Email::parse("buyer@example.com").unwrap(),
        };
        assert_eq!(SessionKind::of(Some(&identity)), SessionKind::Account);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(SessionKind::Guest.to_string(), "guest");
        assert_eq!(SessionKind::Account.to_string(), "account");
    }
}
