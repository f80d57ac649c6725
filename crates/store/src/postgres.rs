use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    AddressId, CartId, CartItemId, Money, OrderId, OrderItemId, ProductId, UserId,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AddressRecord, CartItemRecord, CartRecord, NewCartItem, NewOrder, NewOrderItem,
    OrderItemRecord, OrderRecord, ProductRecord, Result, StoreError,
    store::{Store, StoreTx},
};

const CART_ITEM_COLUMNS: &str =
    "id, cart_id, product_id, quantity, unit_price_cents, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, number, status, total_cents, shipping_address_id, \
     billing_address_id, created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, unit_price_cents";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store. Every unit of work waits at most
    /// `lock_timeout` for any single row lock.
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Opens a connection pool and wraps it in a store.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool, lock_timeout))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        let mut tx = self.pool.begin().await?;

        // Transaction-local, so it resets when the connection returns to the pool.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(PostgresTx { tx })
    }
}

/// Unit of work backed by a PostgreSQL transaction.
///
/// Dropping it without calling [`StoreTx::commit`] rolls the transaction back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

fn decode_count(column: &'static str, value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Decode {
        column,
        reason: format!("expected a non-negative count, got {value}"),
    })
}

fn encode_count(column: &'static str, value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Decode {
        column,
        reason: format!("{value} does not fit in INTEGER"),
    })
}

fn row_to_product(row: PgRow) -> Result<ProductRecord> {
    Ok(ProductRecord {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: decode_count("stock", row.try_get("stock")?)?,
    })
}

fn row_to_cart_item(row: PgRow) -> Result<CartItemRecord> {
    Ok(CartItemRecord {
        id: CartItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: decode_count("quantity", row.try_get("quantity")?)?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_item(row: PgRow) -> Result<OrderItemRecord> {
    Ok(OrderItemRecord {
        id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: decode_count("quantity", row.try_get("quantity")?)?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

fn row_to_order(row: PgRow) -> Result<OrderRecord> {
    let shipping: Option<Uuid> = row.try_get("shipping_address_id")?;
    let billing: Option<Uuid> = row.try_get("billing_address_id")?;

    Ok(OrderRecord {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        number: row.try_get("number")?,
        status: row.try_get("status")?,
        total_amount: Money::from_cents(row.try_get("total_cents")?),
        shipping_address_id: shipping.map(AddressId::from_uuid),
        billing_address_id: billing.map(AddressId::from_uuid),
        items: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PostgresTx {
    async fn cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItemRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY created_at, id"
        ))
        .bind(cart_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_cart_item).collect()
    }

    async fn attach_items(&mut self, mut order: OrderRecord) -> Result<OrderRecord> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order.id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        order.items = rows
            .into_iter()
            .map(row_to_order_item)
            .collect::<Result<_>>()?;
        Ok(order)
    }

    async fn fetch_cart(&mut self, user_id: UserId, for_update: bool) -> Result<Option<CartRecord>> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let row = sqlx::query(&format!(
            "SELECT id, user_id, created_at, updated_at FROM carts WHERE user_id = $1{lock}"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(self.cart_from_row(row).await?)),
            None => Ok(None),
        }
    }

    async fn cart_from_row(&mut self, row: PgRow) -> Result<CartRecord> {
        let cart_id = CartId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let items = self.cart_items(cart_id).await?;

        Ok(CartRecord {
            id: cart_id,
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn fetch_order(&mut self, order_id: OrderId, for_update: bool) -> Result<Option<OrderRecord>> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{lock}"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => {
                let order = row_to_order(row)?;
                Ok(Some(self.attach_items(order).await?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn find_cart(&mut self, user_id: UserId) -> Result<Option<CartRecord>> {
        self.fetch_cart(user_id, false).await
    }

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<CartRecord>> {
        self.fetch_cart(user_id, true).await
    }

    async fn create_cart(&mut self, user_id: UserId) -> Result<CartRecord> {
        // DO UPDATE (rather than DO NOTHING) locks an existing row, so the cart
        // cannot be checked out from under the caller. If a concurrent checkout
        // deletes it first, the insert is retried and a fresh cart is created.
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (user_id) DO UPDATE SET updated_at = carts.updated_at
            RETURNING id, user_id, created_at, updated_at
            "#,
        )
        .bind(CartId::new().as_uuid())
        .bind(user_id.as_uuid())
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        self.cart_from_row(row).await
    }

    async fn delete_cart(&mut self, cart_id: CartId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_cart_item(&mut self, item_id: CartItemId) -> Result<Option<CartItemRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE id = $1"
        ))
        .bind(item_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_cart_item).transpose()
    }

    async fn find_cart_item_for_product(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartItemRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 AND product_id = $2"
        ))
        .bind(cart_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_cart_item).transpose()
    }

    async fn insert_cart_item(&mut self, item: NewCartItem) -> Result<CartItemRecord> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, quantity, unit_price_cents, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {CART_ITEM_COLUMNS}
            "#
        ))
        .bind(item.id.as_uuid())
        .bind(item.cart_id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(encode_count("quantity", item.quantity)?)
        .bind(item.unit_price.cents())
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        sqlx::query("UPDATE carts SET updated_at = $2 WHERE id = $1")
            .bind(item.cart_id.as_uuid())
            .bind(now)
            .execute(&mut *self.tx)
            .await?;

        row_to_cart_item(row)
    }

    async fn update_cart_item_quantity(
        &mut self,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<u64> {
        let result =
            sqlx::query("UPDATE cart_items SET quantity = $2, updated_at = $3 WHERE id = $1")
                .bind(item_id.as_uuid())
                .bind(encode_count("quantity", quantity)?)
                .bind(Utc::now())
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected())
    }

    async fn delete_cart_item(&mut self, item_id: CartItemId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_product(&mut self, product_id: ProductId) -> Result<Option<ProductRecord>> {
        let row = sqlx::query("SELECT id, price_cents, stock FROM products WHERE id = $1")
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(row_to_product).transpose()
    }

    async fn lock_products(&mut self, product_ids: &[ProductId]) -> Result<Vec<ProductRecord>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = product_ids.iter().map(ProductId::as_uuid).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, price_cents, stock
            FROM products
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_product).collect()
    }

    async fn decrement_stock(&mut self, product_id: ProductId, amount: u32) -> Result<u64> {
        let amount = encode_count("stock", amount)?;
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(amount)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_address(
        &mut self,
        address_id: AddressId,
        owner: UserId,
    ) -> Result<Option<AddressRecord>> {
        let row = sqlx::query("SELECT id, user_id FROM addresses WHERE id = $1 AND user_id = $2")
            .bind(address_id.as_uuid())
            .bind(owner.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(|row| {
            Ok(AddressRecord {
                id: AddressId::from_uuid(row.try_get::<Uuid, _>("id")?),
                user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            })
        })
        .transpose()
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (id, user_id, number, status, total_cents,
                                shipping_address_id, billing_address_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, $6, $7, $7)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(&order.number)
        .bind(&order.status)
        .bind(order.shipping_address_id.map(|id| id.as_uuid()))
        .bind(order.billing_address_id.map(|id| id.as_uuid()))
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_order(row)
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItemRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO order_items (id, order_id, product_id, quantity, unit_price_cents)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ORDER_ITEM_COLUMNS}
            "#
        ))
        .bind(item.id.as_uuid())
        .bind(item.order_id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(encode_count("quantity", item.quantity)?)
        .bind(item.unit_price.cents())
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_order_item(row)
    }

    async fn set_order_total(&mut self, order_id: OrderId, total: Money) -> Result<u64> {
        let result =
            sqlx::query("UPDATE orders SET total_cents = $2, updated_at = $3 WHERE id = $1")
                .bind(order_id.as_uuid())
                .bind(total.cents())
                .bind(Utc::now())
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected())
    }

    async fn get_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        self.fetch_order(order_id, false).await
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        self.fetch_order(order_id, true).await
    }

    async fn list_orders_for_user(&mut self, user_id: UserId) -> Result<Vec<OrderRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        let mut orders = rows
            .into_iter()
            .map(row_to_order)
            .collect::<Result<Vec<_>>>()?;
        if orders.is_empty() {
            return Ok(orders);
        }

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        let item_rows = sqlx::query(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id"
        ))
        .bind(&order_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut items_by_order: HashMap<OrderId, Vec<OrderItemRecord>> = HashMap::new();
        for row in item_rows {
            let item = row_to_order_item(row)?;
            items_by_order.entry(item.order_id).or_default().push(item);
        }
        for order in &mut orders {
            order.items = items_by_order.remove(&order.id).unwrap_or_default();
        }

        Ok(orders)
    }

    async fn update_order_status(&mut self, order_id: OrderId, status: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(status)
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
