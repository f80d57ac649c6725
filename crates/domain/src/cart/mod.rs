//! Cart aggregate: one mutable cart per user, one line per product.

mod service;

pub use service::CartService;

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, Money, ProductId, UserId};
use store::{CartItemRecord, CartRecord};

use crate::error::{DomainError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of line extensions at the snapshotted prices.
    pub fn subtotal(&self) -> Result<Money> {
        self.items.iter().try_fold(Money::zero(), |total, item| {
            total
                .checked_add(item.line_total()?)
                .ok_or(DomainError::AmountOutOfRange)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Product price when the line was first added. Never refreshed.
    pub unit_price: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Result<Money> {
        self.unit_price
            .checked_mul(self.quantity)
            .ok_or(DomainError::AmountOutOfRange)
    }
}

impl From<CartItemRecord> for CartItem {
    fn from(record: CartItemRecord) -> Self {
        Self {
            id: record.id,
            product_id: record.product_id,
            quantity: record.quantity,
            unit_price: record.unit_price,
        }
    }
}

impl From<CartRecord> for Cart {
    fn from(record: CartRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            items: record.items.into_iter().map(CartItem::from).collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
