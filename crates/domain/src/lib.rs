//! Domain layer for the commerce core.
//!
//! This crate provides:
//! - The cart aggregate and its service
//! - The checkout orchestrator that turns a cart into an order
//! - The order status machine and order read service
//!
//! Every service is generic over a [`store::Store`] and runs each operation
//! in a single unit of work.

pub mod cart;
pub mod checkout;
pub mod error;
pub mod order;

pub use cart::{Cart, CartItem, CartService};
pub use checkout::{CheckoutRequest, CheckoutService};
pub use error::{DomainError, Result};
pub use order::{Order, OrderItem, OrderService, OrderStatus, UnknownStatus, order_number};
