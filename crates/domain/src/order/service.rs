//! Order read and status services.

use common::{OrderId, UserId};
use store::{Store, StoreTx};

use super::{Order, OrderStatus};
use crate::error::{DomainError, Result};

/// Service for reading orders and moving them through their lifecycle.
#[derive(Clone)]
pub struct OrderService<S: Store> {
    store: S,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Lists the user's orders, most recent first.
    #[tracing::instrument(skip(self))]
    pub async fn list_user_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut tx = self.store.begin().await?;
        tx.list_orders_for_user(user_id)
            .await?
            .into_iter()
            .map(Order::try_from)
            .collect()
    }

    /// Loads one of the user's orders.
    ///
    /// Orders belonging to someone else are reported as not found.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let record = tx
            .get_order(order_id)
            .await?
            .filter(|order| order.user_id == user_id)
            .ok_or(DomainError::OrderNotFound(order_id))?;
        Order::try_from(record)
    }

    /// Moves an order to `new_status`.
    ///
    /// Requesting the current status is a no-op. Any other target must be in
    /// the allowed set for the current status. The order row stays locked
    /// between the check and the write.
    #[tracing::instrument(skip(self))]
    pub async fn transition(&self, order_id: OrderId, new_status: OrderStatus) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let record = tx
            .lock_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;
        let order = Order::try_from(record)?;
        let current = order.status;

        if current == new_status {
            return Ok(order);
        }

        if !current.can_transition_to(new_status) {
            tracing::warn!(%order_id, from = %current, to = %new_status, "Rejected order status transition");
            return Err(DomainError::InvalidOrderStatusTransition {
                from: current,
                to: new_status,
            });
        }

        tx.update_order_status(order_id, new_status.as_str())
            .await?;
        let updated = tx
            .get_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;
        tx.commit().await?;

        metrics::counter!(
            "order_status_transitions_total",
            "from" => current.as_str(),
            "to" => new_status.as_str()
        )
        .increment(1);
        tracing::info!(%order_id, from = %current, to = %new_status, "Order status changed");

        Order::try_from(updated)
    }
}
