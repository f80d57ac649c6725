//! Row-shaped records exchanged between the store and the domain layer.

use chrono::{DateTime, Utc};
use common::{AddressId, CartId, CartItemId, Money, OrderId, OrderItemId, ProductId, UserId};

/// The slice of a catalog product the core reads and mutates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRecord {
    pub id: ProductId,
    pub price: Money,
    pub stock: u32,
}

/// An address book entry, reduced to what ownership checks need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub id: AddressId,
    pub user_id: UserId,
}

/// A user's cart with its lines, oldest line first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartRecord {
    pub id: CartId,
    pub user_id: UserId,
    pub items: Vec<CartItemRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart line. `unit_price` is the product price at the time the line was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItemRecord {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A placed order with its lines. `status` is the stored status name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: UserId,
    pub number: String,
    pub status: String,
    pub total_amount: Money,
    pub shipping_address_id: Option<AddressId>,
    pub billing_address_id: Option<AddressId>,
    pub items: Vec<OrderItemRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItemRecord {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Order header written at checkout. The total starts at zero and is set
/// once every line has been written.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub number: String,
    pub status: String,
    pub shipping_address_id: Option<AddressId>,
    pub billing_address_id: Option<AddressId>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}
