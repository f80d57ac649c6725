use async_trait::async_trait;
use common::{AddressId, CartId, CartItemId, Money, OrderId, ProductId, UserId};

use crate::{
    AddressRecord, CartItemRecord, CartRecord, NewCartItem, NewOrder, NewOrderItem,
    OrderItemRecord, OrderRecord, ProductRecord, Result,
};

/// Entry point to the storage layer.
///
/// A store hands out units of work. Every read and write of the core happens
/// inside one; there is no other way to reach the data. All implementations
/// must be thread-safe (Send + Sync) and cheap to clone into request handlers.
#[async_trait]
pub trait Store: Send + Sync {
    /// The unit of work type produced by [`Store::begin`].
    type Tx: StoreTx;

    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// A single atomic unit of work.
///
/// Effects become visible to other units of work only after [`StoreTx::commit`].
/// Dropping a unit of work without committing discards every effect, which is
/// how errors (and abandoned requests) roll back.
#[async_trait]
pub trait StoreTx: Send {
    // -- Carts --

    /// Loads the user's cart with its lines, oldest line first.
    async fn find_cart(&mut self, user_id: UserId) -> Result<Option<CartRecord>>;

    /// Like [`StoreTx::find_cart`], but holds a write lock on the cart row
    /// until the unit of work ends. Lines are read after the lock is granted.
    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<CartRecord>>;

    /// Creates the user's cart if absent and returns the (possibly pre-existing)
    /// cart, holding a write lock on its row until the unit of work ends.
    ///
    /// Concurrent calls for the same user converge on one cart.
    async fn create_cart(&mut self, user_id: UserId) -> Result<CartRecord>;

    /// Deletes a cart and, by cascade, its lines. Returns rows affected.
    async fn delete_cart(&mut self, cart_id: CartId) -> Result<u64>;

    async fn get_cart_item(&mut self, item_id: CartItemId) -> Result<Option<CartItemRecord>>;

    async fn find_cart_item_for_product(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartItemRecord>>;

    async fn insert_cart_item(&mut self, item: NewCartItem) -> Result<CartItemRecord>;

    async fn update_cart_item_quantity(&mut self, item_id: CartItemId, quantity: u32)
    -> Result<u64>;

    async fn delete_cart_item(&mut self, item_id: CartItemId) -> Result<u64>;

    // -- Catalog and address book (read-mostly collaborators) --

    async fn get_product(&mut self, product_id: ProductId) -> Result<Option<ProductRecord>>;

    /// Reads the given products and holds a write lock on each row until the
    /// unit of work ends. Rows are locked in ascending id order. Unknown ids
    /// are simply absent from the result.
    async fn lock_products(&mut self, product_ids: &[ProductId]) -> Result<Vec<ProductRecord>>;

    /// Decrements stock by `amount` if at least `amount` is available.
    /// Returns rows affected: 0 means the guard refused the decrement.
    async fn decrement_stock(&mut self, product_id: ProductId, amount: u32) -> Result<u64>;

    /// Returns the address only if it belongs to `owner`.
    async fn get_address(
        &mut self,
        address_id: AddressId,
        owner: UserId,
    ) -> Result<Option<AddressRecord>>;

    // -- Orders --

    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord>;

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItemRecord>;

    async fn set_order_total(&mut self, order_id: OrderId, total: Money) -> Result<u64>;

    async fn get_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>>;

    /// Like [`StoreTx::get_order`], but holds a write lock on the order row
    /// until the unit of work ends.
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>>;

    /// Lists the user's orders, newest first.
    async fn list_orders_for_user(&mut self, user_id: UserId) -> Result<Vec<OrderRecord>>;

    async fn update_order_status(&mut self, order_id: OrderId, status: &str) -> Result<u64>;

    /// Makes every effect of this unit of work durable.
    async fn commit(self) -> Result<()>;
}
