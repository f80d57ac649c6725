//! Checkout: converts a user's cart into an order in one unit of work.

use std::collections::HashMap;
use std::time::Instant;

use common::{AddressId, OrderId, OrderItemId, ProductId, UserId};
use store::{NewOrder, NewOrderItem, Store, StoreError, StoreTx};

use crate::cart::Cart;
use crate::error::{DomainError, Result};
use crate::order::{Order, OrderStatus, order_number};

/// Optional address references attached to the order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub shipping_address_id: Option<AddressId>,
    pub billing_address_id: Option<AddressId>,
}

impl CheckoutRequest {
    pub fn with_addresses(shipping: AddressId, billing: AddressId) -> Self {
        Self {
            shipping_address_id: Some(shipping),
            billing_address_id: Some(billing),
        }
    }
}

/// Service that places orders from carts.
///
/// A checkout locks the cart, locks the product rows it touches, validates
/// stock and addresses, writes the order and its lines, decrements stock and
/// deletes the cart. Nothing is visible to other units of work until all of
/// it commits; any failure leaves cart, stock and orders exactly as they were.
#[derive(Clone)]
pub struct CheckoutService<S: Store> {
    store: S,
}

impl<S: Store> CheckoutService<S> {
    /// Creates a new checkout service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Places an order from the user's cart.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, user_id: UserId, request: CheckoutRequest) -> Result<Order> {
        let start = Instant::now();
        let result = self.place_order(user_id, request).await;
        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("checkout_total", "outcome" => "success").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    number = %order.number,
                    total = %order.total_amount,
                    lines = order.items.len(),
                    "Order placed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_total", "outcome" => outcome_label(e)).increment(1);
                tracing::warn!(error = %e, "Checkout failed");
            }
        }

        result
    }

    async fn place_order(&self, user_id: UserId, request: CheckoutRequest) -> Result<Order> {
        let mut tx = self.store.begin().await?;

        // Holding the cart row serialises checkouts and cart edits for this user.
        let cart = match tx.lock_cart(user_id).await? {
            Some(cart) if !cart.items.is_empty() => Cart::from(cart),
            _ => return Err(DomainError::EmptyCart),
        };
        let total = cart.subtotal()?;

        let mut product_ids: Vec<ProductId> =
            cart.items.iter().map(|item| item.product_id).collect();
        product_ids.sort();
        product_ids.dedup();

        let products: HashMap<ProductId, u32> = tx
            .lock_products(&product_ids)
            .await?
            .into_iter()
            .map(|product| (product.id, product.stock))
            .collect();

        for item in &cart.items {
            let available = *products
                .get(&item.product_id)
                .ok_or(DomainError::ProductNotFound(item.product_id))?;
            if item.quantity > available {
                return Err(DomainError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available,
                });
            }
        }

        for address_id in [request.shipping_address_id, request.billing_address_id]
            .into_iter()
            .flatten()
        {
            tx.get_address(address_id, user_id)
                .await?
                .ok_or(DomainError::AddressNotFound(address_id))?;
        }

        let order_id = OrderId::new();
        tx.insert_order(NewOrder {
            id: order_id,
            user_id,
            number: order_number(order_id),
            status: OrderStatus::Pending.as_str().to_string(),
            shipping_address_id: request.shipping_address_id,
            billing_address_id: request.billing_address_id,
        })
        .await?;

        for item in &cart.items {
            if tx.decrement_stock(item.product_id, item.quantity).await? == 0 {
                // Rows are locked, so this only happens if stock moved outside the lock.
                return Err(DomainError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: products.get(&item.product_id).copied().unwrap_or(0),
                });
            }

            tx.insert_order_item(NewOrderItem {
                id: OrderItemId::new(),
                order_id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .await?;
        }

        if tx.set_order_total(order_id, total).await? == 0 {
            return Err(StoreError::MissingRow("order").into());
        }
        if tx.delete_cart(cart.id).await? != 1 {
            return Err(StoreError::Conflict("cart was already checked out".to_string()).into());
        }

        let order = tx
            .get_order(order_id)
            .await?
            .ok_or(StoreError::MissingRow("order"))?;
        tx.commit().await?;

        Order::try_from(order)
    }
}

fn outcome_label(error: &DomainError) -> &'static str {
    match error {
        DomainError::EmptyCart => "empty_cart",
        DomainError::InsufficientStock { .. } => "insufficient_stock",
        DomainError::ProductNotFound(_) => "product_not_found",
        DomainError::AddressNotFound(_) => "address_not_found",
        DomainError::AmountOutOfRange => "amount_out_of_range",
        DomainError::Store(StoreError::LockTimeout) => "lock_timeout",
        DomainError::Store(StoreError::Conflict(_)) => "conflict",
        _ => "error",
    }
}
