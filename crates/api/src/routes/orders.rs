//! Checkout and order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AddressId, OrderId, OrderItemId, ProductId, UserId};
use domain::{CheckoutRequest, DomainError, Order, OrderItem, OrderStatus};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutBody {
    #[serde(default)]
    pub shipping_address_id: Option<AddressId>,
    #[serde(default)]
    pub billing_address_id: Option<AddressId>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub user_id: UserId,
    pub number: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub total_amount_cents: i64,
    pub shipping_address_id: Option<AddressId>,
    pub billing_address_id: Option<AddressId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl TryFrom<OrderItem> for OrderItemResponse {
    type Error = DomainError;

    fn try_from(item: OrderItem) -> Result<Self, DomainError> {
        Ok(Self {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            line_total_cents: item.line_total()?.cents(),
        })
    }
}

impl TryFrom<Order> for OrderResponse {
    type Error = DomainError;

    fn try_from(order: Order) -> Result<Self, DomainError> {
        Ok(Self {
            id: order.id,
            user_id: order.user_id,
            number: order.number,
            status: order.status,
            items: order
                .items
                .into_iter()
                .map(OrderItemResponse::try_from)
                .collect::<Result<_, _>>()?,
            total_amount_cents: order.total_amount.cents(),
            shipping_address_id: order.shipping_address_id,
            billing_address_id: order.billing_address_id,
            created_at: order.created_at,
            updated_at: order.updated_at,
        })
    }
}

// -- Handlers --

/// POST /orders — check out the caller's cart.
///
/// The body is optional; an empty body places an order without addresses.
#[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn checkout<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    body: Bytes,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let body: CheckoutBody = if body.iter().all(u8::is_ascii_whitespace) {
        CheckoutBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Validation(format!("Invalid checkout body: {e}")))?
    };

    let request = CheckoutRequest {
        shipping_address_id: body.shipping_address_id,
        billing_address_id: body.billing_address_id,
    };
    let order = state.checkout.checkout(user.user_id, request).await?;

    Ok((StatusCode::CREATED, Json(OrderResponse::try_from(order)?)))
}

/// GET /orders — the caller's orders, newest first.
#[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_user_orders(user.user_id).await?;
    let orders = orders
        .into_iter()
        .map(OrderResponse::try_from)
        .collect::<Result<_, _>>()?;
    Ok(Json(orders))
}

/// GET /orders/{id} — one of the caller's orders.
#[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    order_id: Result<Path<OrderId>, PathRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Path(order_id) = order_id?;
    let order = state.orders.get_user_order(user.user_id, order_id).await?;
    Ok(Json(OrderResponse::try_from(order)?))
}

/// PATCH /orders/{id}/status — admin only.
#[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn update_status<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    order_id: Result<Path<OrderId>, PathRejection>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    user.require_admin()?;
    let Path(order_id) = order_id?;
    let Json(req) = body?;

    let status = req
        .status
        .parse::<OrderStatus>()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let order = state.orders.transition(order_id, status).await?;
    Ok(Json(OrderResponse::try_from(order)?))
}
