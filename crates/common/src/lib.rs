//! Shared types for the commerce service.
//!
//! Every entity is addressed through its own identifier type so that a cart
//! item id can never be passed where an order id is expected.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{AddressId, CartId, CartItemId, OrderId, OrderItemId, ProductId, UserId};
