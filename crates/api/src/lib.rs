//! HTTP API server for the commerce core.
//!
//! Provides cart, checkout and order endpoints over any [`Store`], with
//! structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use domain::{CartService, CheckoutService, OrderService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub carts: CartService<S>,
    pub checkout: CheckoutService<S>,
    pub orders: OrderService<S>,
}

impl<S: Store + Clone> AppState<S> {
    /// Builds every service over one shared store handle.
    pub fn new(store: S) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            checkout: CheckoutService::new(store.clone()),
            orders: OrderService::new(store),
        }
    }
}

/// Registers descriptions for the metrics emitted by the domain services.
/// Call once after installing the recorder.
pub fn describe_metrics() {
    metrics::describe_counter!("checkout_total", "Checkout attempts by outcome");
    metrics::describe_histogram!(
        "checkout_duration_seconds",
        metrics::Unit::Seconds,
        "Time spent placing an order, including failed attempts"
    );
    metrics::describe_counter!(
        "order_status_transitions_total",
        "Applied order status changes by source and target status"
    );
    metrics::describe_counter!("cart_mutations_total", "Cart changes by operation");
}

fn commerce_routes<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route(
            "/cart",
            get(routes::cart::get::<S>).delete(routes::cart::clear::<S>),
        )
        .route("/cart/items", post(routes::cart::add_item::<S>))
        .route(
            "/cart/items/{item_id}",
            patch(routes::cart::update_item::<S>)
                .put(routes::cart::update_item::<S>)
                .delete(routes::cart::remove_item::<S>),
        )
        .route(
            "/orders",
            post(routes::orders::checkout::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{id}/status",
            patch(routes::orders::update_status::<S>),
        )
}

/// Creates the Axum application router with all routes and shared state.
///
/// Commerce routes are served both at the root and under `/api/v1`.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let api: Router = commerce_routes::<S>().with_state(state);

    Router::new()
        .route("/health", get(routes::health::check))
        .merge(api.clone())
        .nest("/api/v1", api)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
