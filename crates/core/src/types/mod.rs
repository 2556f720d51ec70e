//! Shared newtype wrappers.

mod email;
mod id;
mod money;

pub use email::{Email, EmailError};
pub use id::{CustomerId, OrderId, PaymentSessionId, ProductId};
pub use money::{Money, MoneyError};
