//! Domain error types.

use common::{AddressId, CartItemId, OrderId, ProductId};
use store::StoreError;
use thiserror::Error;

use crate::order::OrderStatus;

/// Errors that can occur during cart, checkout and order operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Checkout was attempted without a cart or with an empty one.
    #[error("Cart is empty")]
    EmptyCart,

    /// The requested quantity exceeds the product's current stock.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The cart line does not exist or is not in the caller's cart.
    #[error("Cart item not found: {0}")]
    CartItemNotFound(CartItemId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The address does not exist or belongs to another user.
    #[error("Address not found: {0}")]
    AddressNotFound(AddressId),

    /// The order does not exist or belongs to another user.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Invalid order status transition from {from} to {to}")]
    InvalidOrderStatusTransition { from: OrderStatus, to: OrderStatus },

    /// A quantity outside the accepted range. This is an input validation
    /// failure rather than a business rule violation.
    #[error("Invalid quantity: {quantity} (must be between 1 and {max})", max = u32::MAX)]
    InvalidQuantity { quantity: i64 },

    /// A line extension or total does not fit the money range.
    #[error("Amount out of range")]
    AmountOutOfRange,

    /// A stored order carries a status name this build does not know.
    #[error("Unknown order status stored for order {order_id}: {status}")]
    CorruptStatus { order_id: OrderId, status: String },

    /// An error occurred in the storage layer.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DomainError {
    /// Returns true if retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Store(e) if e.is_retryable())
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
