//! Cart service.

use common::{CartItemId, ProductId, UserId};
use store::{CartRecord, NewCartItem, Store, StoreError, StoreTx};

use super::Cart;
use crate::error::{DomainError, Result};

/// Checks that a requested line quantity is at least one and fits a `u32`.
pub(crate) fn validate_quantity(quantity: i64) -> Result<u32> {
    if quantity < 1 {
        return Err(DomainError::InvalidQuantity { quantity });
    }
    u32::try_from(quantity).map_err(|_| DomainError::InvalidQuantity { quantity })
}

fn record_mutation(op: &'static str) {
    metrics::counter!("cart_mutations_total", "op" => op).increment(1);
}

/// Service for managing a user's cart.
///
/// Every operation runs in its own unit of work and commits before returning.
/// Mutations hold the cart row lock, so they serialise with checkout.
#[derive(Clone)]
pub struct CartService<S: Store> {
    store: S,
}

impl<S: Store> CartService<S> {
    /// Creates a new cart service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the user's cart, if one exists. Never creates one.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, user_id: UserId) -> Result<Option<Cart>> {
        let mut tx = self.store.begin().await?;
        let cart = tx.find_cart(user_id).await?;
        Ok(cart.map(Cart::from))
    }

    /// Returns the user's cart, creating an empty one on first access.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create(&self, user_id: UserId) -> Result<Cart> {
        let mut tx = self.store.begin().await?;
        let cart = tx.create_cart(user_id).await?;
        tx.commit().await?;
        Ok(cart.into())
    }

    /// Adds `quantity` units of a product to the cart.
    ///
    /// An existing line for the product has its quantity increased; a new
    /// line snapshots the product's current price.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Cart> {
        let quantity = validate_quantity(quantity)?;

        let mut tx = self.store.begin().await?;
        let cart = tx.create_cart(user_id).await?;
        let product = tx
            .get_product(product_id)
            .await?
            .ok_or(DomainError::ProductNotFound(product_id))?;

        let existing = tx.find_cart_item_for_product(cart.id, product_id).await?;
        let current = existing.as_ref().map_or(0, |item| item.quantity);
        let requested = u64::from(current) + u64::from(quantity);

        if requested > u64::from(product.stock) {
            return Err(DomainError::InsufficientStock {
                product_id,
                requested: u32::try_from(requested).unwrap_or(u32::MAX),
                available: product.stock,
            });
        }

        match existing {
            Some(item) => {
                // requested <= stock, so it fits in a u32
                if tx
                    .update_cart_item_quantity(item.id, requested as u32)
                    .await?
                    == 0
                {
                    return Err(StoreError::Conflict("cart line changed concurrently".to_string()).into());
                }
            }
            None => {
                tx.insert_cart_item(NewCartItem {
                    id: CartItemId::new(),
                    cart_id: cart.id,
                    product_id,
                    quantity,
                    unit_price: product.price,
                })
                .await?;
            }
        }

        let cart = reload(&mut tx, user_id).await?;
        // Refuse a cart whose total no longer fits; dropping tx rolls back.
        cart.subtotal()?;
        tx.commit().await?;

        record_mutation("add_item");
        tracing::debug!(%product_id, quantity, "Added item to cart");
        Ok(cart)
    }

    /// Sets the quantity of a cart line.
    ///
    /// `None` leaves the cart untouched, zero or less removes the line, and a
    /// positive quantity is checked against current stock. The line keeps its
    /// original price snapshot.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: Option<i64>,
    ) -> Result<Cart> {
        let mut tx = self.store.begin().await?;
        let cart = tx.create_cart(user_id).await?;

        let item = tx
            .get_cart_item(item_id)
            .await?
            .filter(|item| item.cart_id == cart.id)
            .ok_or(DomainError::CartItemNotFound(item_id))?;

        let Some(quantity) = quantity else {
            tx.commit().await?;
            return Ok(cart.into());
        };

        if quantity <= 0 {
            if tx.delete_cart_item(item.id).await? == 0 {
                return Err(DomainError::CartItemNotFound(item_id));
            }
            record_mutation("remove_item");
        } else {
            let quantity = validate_quantity(quantity)?;
            let product = tx
                .get_product(item.product_id)
                .await?
                .ok_or(DomainError::ProductNotFound(item.product_id))?;

            if quantity > product.stock {
                return Err(DomainError::InsufficientStock {
                    product_id: item.product_id,
                    requested: quantity,
                    available: product.stock,
                });
            }

            if tx.update_cart_item_quantity(item.id, quantity).await? == 0 {
                return Err(DomainError::CartItemNotFound(item_id));
            }
            record_mutation("update_item");
        }

        let cart = reload(&mut tx, user_id).await?;
        // Refuse a cart whose total no longer fits; dropping tx rolls back.
        cart.subtotal()?;
        tx.commit().await?;
        Ok(cart)
    }

    /// Removes a line from the caller's cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, item_id: CartItemId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let cart = tx
            .lock_cart(user_id)
            .await?
            .ok_or(DomainError::CartItemNotFound(item_id))?;

        if !cart.items.iter().any(|item| item.id == item_id)
            || tx.delete_cart_item(item_id).await? == 0
        {
            return Err(DomainError::CartItemNotFound(item_id));
        }
        tx.commit().await?;

        record_mutation("remove_item");
        Ok(())
    }

    /// Deletes the user's cart and all its lines. A missing cart is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        if let Some(cart) = tx.lock_cart(user_id).await? {
            tx.delete_cart(cart.id).await?;
            tx.commit().await?;
            record_mutation("clear");
        }
        Ok(())
    }
}

async fn reload<T: StoreTx>(tx: &mut T, user_id: UserId) -> Result<Cart> {
    let cart: CartRecord = tx
        .find_cart(user_id)
        .await?
        .ok_or(StoreError::MissingRow("cart"))?;
    Ok(cart.into())
}
