//! Cart endpoints for the calling user.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, ProductId, UserId};
use domain::{Cart, CartItem, DomainError};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    #[serde(default)]
    pub quantity: Option<i64>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub id: CartId,
    pub user_id: UserId,
    pub items: Vec<CartItemResponse>,
    pub subtotal_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CartItemResponse {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl TryFrom<CartItem> for CartItemResponse {
    type Error = DomainError;

    fn try_from(item: CartItem) -> Result<Self, DomainError> {
        Ok(Self {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            line_total_cents: item.line_total()?.cents(),
        })
    }
}

impl TryFrom<Cart> for CartResponse {
    type Error = DomainError;

    fn try_from(cart: Cart) -> Result<Self, DomainError> {
        let subtotal_cents = cart.subtotal()?.cents();
        Ok(Self {
            id: cart.id,
            user_id: cart.user_id,
            items: cart
                .items
                .into_iter()
                .map(CartItemResponse::try_from)
                .collect::<Result<_, _>>()?,
            subtotal_cents,
            created_at: cart.created_at,
            updated_at: cart.updated_at,
        })
    }
}

// -- Handlers --

/// GET /cart — the caller's cart, created on first access.
#[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.get_or_create(user.user_id).await?;
    Ok(Json(CartResponse::try_from(cart)?))
}

/// POST /cart/items — add a product to the cart.
#[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn add_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    body: Result<Json<AddItemRequest>, JsonRejection>,
) -> Result<Json<CartResponse>, ApiError> {
    let Json(req) = body?;
    let cart = state
        .carts
        .add_item(user.user_id, req.product_id, req.quantity)
        .await?;
    Ok(Json(CartResponse::try_from(cart)?))
}

/// PATCH or PUT /cart/items/{item_id} — set a line's quantity.
#[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn update_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    item_id: Result<Path<CartItemId>, PathRejection>,
    body: Result<Json<UpdateItemRequest>, JsonRejection>,
) -> Result<Json<CartResponse>, ApiError> {
    let Path(item_id) = item_id?;
    let Json(req) = body?;
    let cart = state
        .carts
        .update_item(user.user_id, item_id, req.quantity)
        .await?;
    Ok(Json(CartResponse::try_from(cart)?))
}

/// DELETE /cart/items/{item_id}
#[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn remove_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    item_id: Result<Path<CartItemId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(item_id) = item_id?;
    state.carts.remove_item(user.user_id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /cart — idempotent.
#[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn clear<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<StatusCode, ApiError> {
    state.carts.clear(user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
