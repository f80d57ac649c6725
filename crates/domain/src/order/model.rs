use chrono::{DateTime, Utc};
use common::{AddressId, Money, OrderId, OrderItemId, ProductId, UserId};
use store::{OrderItemRecord, OrderRecord};

use super::OrderStatus;
use crate::error::{DomainError, Result};

/// Derives the human-facing order number from the order id:
/// `ORD-` followed by the first eight hex digits, uppercased.
pub fn order_number(order_id: OrderId) -> String {
    let simple = order_id.as_uuid().simple().to_string();
    format!("ORD-{}", simple[..8].to_uppercase())
}

/// A placed order. Lines and total are frozen at checkout; only the
/// status (and `updated_at`) changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub number: String,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub shipping_address_id: Option<AddressId>,
    pub billing_address_id: Option<AddressId>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Price per unit copied from the cart line at checkout.
    pub unit_price: Money,
}

impl OrderItem {
    /// Returns `quantity * unit_price`.
    pub fn line_total(&self) -> Result<Money> {
        self.unit_price
            .checked_mul(self.quantity)
            .ok_or(DomainError::AmountOutOfRange)
    }
}

impl From<OrderItemRecord> for OrderItem {
    fn from(record: OrderItemRecord) -> Self {
        Self {
            id: record.id,
            product_id: record.product_id,
            quantity: record.quantity,
            unit_price: record.unit_price,
        }
    }
}

impl TryFrom<OrderRecord> for Order {
    type Error = DomainError;

    fn try_from(record: OrderRecord) -> Result<Self> {
        let status = record
            .status
            .parse::<OrderStatus>()
            .map_err(|_| DomainError::CorruptStatus {
                order_id: record.id,
                status: record.status.clone(),
            })?;

        Ok(Self {
            id: record.id,
            user_id: record.user_id,
            number: record.number,
            status,
            total_amount: record.total_amount,
            shipping_address_id: record.shipping_address_id,
            billing_address_id: record.billing_address_id,
            items: record.items.into_iter().map(OrderItem::from).collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn record(status: &str) -> OrderRecord {
        let now = Utc::now();
        OrderRecord {
            id: OrderId::new(),
            user_id: UserId::new(),
            number: "ORD-ABCDEF12".to_string(),
            status: status.to_string(),
            total_amount: Money::from_cents(2000),
            shipping_address_id: None,
            billing_address_id: None,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_order_number_is_uppercased_uuid_prefix() {
        let id = OrderId::from_uuid(Uuid::parse_str("1a2b3c4d-5e6f-4a1b-8c2d-3e4f5a6b7c8d").unwrap());
        assert_eq!(order_number(id), "ORD-1A2B3C4D");
    }

    #[test]
    fn test_order_number_is_deterministic() {
        let id = OrderId::new();
        assert_eq!(order_number(id), order_number(id));
        assert_eq!(order_number(id).len(), 12);
    }

    #[test]
    fn test_record_with_known_status_converts() {
        let order = Order::try_from(record("shipped")).unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.total_amount.cents(), 2000);
    }

    #[test]
    fn test_record_with_unknown_status_is_rejected() {
        let result = Order::try_from(record("lost"));
        assert!(matches!(result, Err(DomainError::CorruptStatus { .. })));
    }

    #[test]
    fn test_line_total() {
        let item = OrderItem {
            id: OrderItemId::new(),
            product_id: ProductId::new(),
            quantity: 3,
            unit_price: Money::from_cents(250),
        };
        assert_eq!(item.line_total().unwrap(), Money::from_cents(750));
    }
}
