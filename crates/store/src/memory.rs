use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{AddressId, CartId, CartItemId, Money, OrderId, ProductId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    AddressRecord, CartItemRecord, CartRecord, NewCartItem, NewOrder, NewOrderItem,
    OrderItemRecord, OrderRecord, ProductRecord, Result, StoreError,
    store::{Store, StoreTx},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<ProductId, ProductRecord>,
    addresses: HashMap<AddressId, AddressRecord>,
    carts: Vec<CartRecord>,
    orders: Vec<OrderRecord>,
}

impl MemoryState {
    fn cart_mut(&mut self, cart_id: CartId) -> Option<&mut CartRecord> {
        self.carts.iter_mut().find(|c| c.id == cart_id)
    }

    fn cart_item_mut(&mut self, item_id: CartItemId) -> Option<&mut CartItemRecord> {
        self.carts
            .iter_mut()
            .flat_map(|c| c.items.iter_mut())
            .find(|i| i.id == item_id)
    }

    fn order_mut(&mut self, order_id: OrderId) -> Option<&mut OrderRecord> {
        self.orders.iter_mut().find(|o| o.id == order_id)
    }
}

/// In-memory store implementation for tests and local runs.
///
/// One mutex guards the whole state and is held for the life of a unit of
/// work, so units of work are fully serialised. Writes go to a working copy
/// that replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    lock_timeout: Option<Duration>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store that waits indefinitely for its lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds how long [`Store::begin`] waits for the transaction lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Adds or replaces a catalog product.
    pub async fn insert_product(&self, product: ProductRecord) {
        self.state.lock().await.products.insert(product.id, product);
    }

    /// Overwrites a product's stock, as a catalog update would.
    pub async fn set_product_stock(&self, product_id: ProductId, stock: u32) {
        if let Some(product) = self.state.lock().await.products.get_mut(&product_id) {
            product.stock = stock;
        }
    }

    /// Overwrites a product's price, as a catalog update would.
    pub async fn set_product_price(&self, product_id: ProductId, price: Money) {
        if let Some(product) = self.state.lock().await.products.get_mut(&product_id) {
            product.price = price;
        }
    }

    /// Adds an address book entry.
    pub async fn insert_address(&self, address: AddressRecord) {
        self.state
            .lock()
            .await
            .addresses
            .insert(address.id, address);
    }

    /// Returns the current state of a product.
    pub async fn product(&self, product_id: ProductId) -> Option<ProductRecord> {
        self.state.lock().await.products.get(&product_id).cloned()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Returns the total number of order lines stored.
    pub async fn order_item_count(&self) -> usize {
        self.state
            .lock()
            .await
            .orders
            .iter()
            .map(|o| o.items.len())
            .sum()
    }

    /// Returns the number of carts stored for a user.
    pub async fn cart_count(&self, user_id: UserId) -> usize {
        self.state
            .lock()
            .await
            .carts
            .iter()
            .filter(|c| c.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        let lock = self.state.clone().lock_owned();
        let guard = match self.lock_timeout {
            Some(timeout) => tokio::time::timeout(timeout, lock).await.map_err(|_elapsed| {
                tracing::warn!(?timeout, "Timed out waiting for the in-memory store lock");
                StoreError::LockTimeout
            })?,
            None => lock.await,
        };
        let working = (*guard).clone();
        Ok(InMemoryTx { guard, working })
    }
}

/// Unit of work over an [`InMemoryStore`].
pub struct InMemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn find_cart(&mut self, user_id: UserId) -> Result<Option<CartRecord>> {
        Ok(self
            .working
            .carts
            .iter()
            .find(|c| c.user_id == user_id)
            .cloned())
    }

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<CartRecord>> {
        // The whole state is already held exclusively.
        self.find_cart(user_id).await
    }

    async fn create_cart(&mut self, user_id: UserId) -> Result<CartRecord> {
        if let Some(existing) = self.find_cart(user_id).await? {
            return Ok(existing);
        }
        let now = Utc::now();
        let cart = CartRecord {
            id: CartId::new(),
            user_id,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.working.carts.push(cart.clone());
        Ok(cart)
    }

    async fn delete_cart(&mut self, cart_id: CartId) -> Result<u64> {
        let before = self.working.carts.len();
        self.working.carts.retain(|c| c.id != cart_id);
        Ok((before - self.working.carts.len()) as u64)
    }

    async fn get_cart_item(&mut self, item_id: CartItemId) -> Result<Option<CartItemRecord>> {
        Ok(self.working.cart_item_mut(item_id).map(|i| i.clone()))
    }

    async fn find_cart_item_for_product(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartItemRecord>> {
        Ok(self.working.cart_mut(cart_id).and_then(|c| {
            c.items
                .iter()
                .find(|i| i.product_id == product_id)
                .cloned()
        }))
    }

    async fn insert_cart_item(&mut self, item: NewCartItem) -> Result<CartItemRecord> {
        let cart = self
            .working
            .cart_mut(item.cart_id)
            .ok_or(StoreError::MissingRow("cart"))?;

        if cart.items.iter().any(|i| i.product_id == item.product_id) {
            return Err(StoreError::Conflict(
                "cart_items_cart_id_product_id_key violated".to_string(),
            ));
        }

        let now = Utc::now();
        let record = CartItemRecord {
            id: item.id,
            cart_id: item.cart_id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            created_at: now,
            updated_at: now,
        };
        cart.items.push(record.clone());
        cart.updated_at = now;
        Ok(record)
    }

    async fn update_cart_item_quantity(
        &mut self,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<u64> {
        match self.working.cart_item_mut(item_id) {
            Some(item) => {
                item.quantity = quantity;
                item.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_cart_item(&mut self, item_id: CartItemId) -> Result<u64> {
        for cart in &mut self.working.carts {
            let before = cart.items.len();
            cart.items.retain(|i| i.id != item_id);
            if cart.items.len() != before {
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn get_product(&mut self, product_id: ProductId) -> Result<Option<ProductRecord>> {
        Ok(self.working.products.get(&product_id).cloned())
    }

    async fn lock_products(&mut self, product_ids: &[ProductId]) -> Result<Vec<ProductRecord>> {
        // The whole state is already exclusively held by this unit of work.
        let mut products: Vec<_> = product_ids
            .iter()
            .filter_map(|id| self.working.products.get(id).cloned())
            .collect();
        products.sort_by_key(|p| p.id);
        products.dedup_by_key(|p| p.id);
        Ok(products)
    }

    async fn decrement_stock(&mut self, product_id: ProductId, amount: u32) -> Result<u64> {
        match self.working.products.get_mut(&product_id) {
            Some(product) if product.stock >= amount => {
                product.stock -= amount;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn get_address(
        &mut self,
        address_id: AddressId,
        owner: UserId,
    ) -> Result<Option<AddressRecord>> {
        Ok(self
            .working
            .addresses
            .get(&address_id)
            .filter(|a| a.user_id == owner)
            .cloned())
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord> {
        if self.working.orders.iter().any(|o| o.number == order.number) {
            return Err(StoreError::Conflict("orders_number_key violated".to_string()));
        }

        let now = Utc::now();
        let record = OrderRecord {
            id: order.id,
            user_id: order.user_id,
            number: order.number,
            status: order.status,
            total_amount: Money::zero(),
            shipping_address_id: order.shipping_address_id,
            billing_address_id: order.billing_address_id,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.working.orders.push(record.clone());
        Ok(record)
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItemRecord> {
        let order = self
            .working
            .order_mut(item.order_id)
            .ok_or(StoreError::MissingRow("order"))?;

        let record = OrderItemRecord {
            id: item.id,
            order_id: item.order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
        };
        order.items.push(record.clone());
        Ok(record)
    }

    async fn set_order_total(&mut self, order_id: OrderId, total: Money) -> Result<u64> {
        match self.working.order_mut(order_id) {
            Some(order) => {
                order.total_amount = total;
                order.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn get_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.working.order_mut(order_id).map(|o| o.clone()))
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        self.get_order(order_id).await
    }

    async fn list_orders_for_user(&mut self, user_id: UserId) -> Result<Vec<OrderRecord>> {
        // Reverse insertion order first so equal timestamps still list newest first.
        let mut orders: Vec<_> = self
            .working
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_order_status(&mut self, order_id: OrderId, status: &str) -> Result<u64> {
        match self.working.order_mut(order_id) {
            Some(order) => {
                order.status = status.to_string();
                order.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}
