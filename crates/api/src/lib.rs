//! HTTP transport for the restaurant delivery order engine.
//!
//! One route per inbound command (cart, checkout, restaurant, driver,
//! dispatch and gateway webhooks), the restaurant, driver and customer order
//! lists, plus `/health` and Prometheus `/metrics`.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use domain::{CartService, OrderStore, PricingEngine};
use fulfillment::{
    CheckoutOrchestrator, Collaborators, FulfillmentStateMachine, InMemoryCollaborators,
    OrderQueries,
};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::DocumentStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: DocumentStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{checkout, lifecycle, listings, orders};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(orders::create::<S>))
        .route("/orders/draft", get(orders::find_draft::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route("/orders/{id}/items", post(orders::add_item::<S>))
        .route(
            "/orders/{id}/items/{item_id}",
            patch(orders::change_quantity::<S>).delete(orders::remove_item::<S>),
        )
        .route(
            "/orders/{id}/items/{item_id}/increment",
            post(orders::increment::<S>),
        )
        .route(
            "/orders/{id}/items/{item_id}/decrement",
            post(orders::decrement::<S>),
        )
        .route(
            "/orders/{id}/delivery-address",
            put(orders::update_address::<S>),
        )
        .route("/orders/{id}/checkout", post(checkout::checkout::<S>))
        .route("/orders/{id}/approve", post(checkout::approve::<S>))
        .route(
            "/orders/{id}/wallet-status",
            post(checkout::wallet_status::<S>),
        )
        .route(
            "/orders/{id}/wallet-callback",
            post(checkout::wallet_callback::<S>),
        )
        .route("/orders/{id}/confirm", post(lifecycle::confirm::<S>))
        .route("/orders/{id}/ready", post(lifecycle::ready::<S>))
        .route("/orders/{id}/void", post(lifecycle::void::<S>))
        .route("/orders/{id}/pickup", post(lifecycle::pick_up::<S>))
        .route("/orders/{id}/complete", post(lifecycle::complete::<S>))
        .route("/orders/{id}/served", post(lifecycle::served::<S>))
        .route(
            "/restaurants/{id}/orders",
            get(listings::restaurant_orders::<S>),
        )
        .route("/drivers/{id}/orders", get(listings::driver_orders::<S>))
        .route("/customers/{id}/orders/ongoing", get(listings::ongoing::<S>))
        .route("/customers/{id}/orders/history", get(listings::history::<S>))
        .route("/customers/{id}/orders/drafts", get(listings::drafts::<S>))
        .route(
            "/customers/{id}/orders/drafts/last",
            get(listings::last_draft::<S>),
        )
        .route(
            "/dispatch/driver-assigned",
            post(lifecycle::driver_assigned::<S>),
        )
        .route("/webhooks/paypal", post(lifecycle::paypal_webhook::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the services over `store` with the given collaborators.
pub fn create_state<S: DocumentStore + Clone + 'static>(
    store: S,
    config: &Config,
    collaborators: Collaborators,
) -> Arc<AppState<S>> {
    let orders = OrderStore::new(store);
    let pricing = PricingEngine::new(config.pricing);

    Arc::new(AppState {
        cart: CartService::new(orders.clone(), pricing),
        checkout: CheckoutOrchestrator::new(
            orders.clone(),
            pricing,
            config.fulfillment.clone(),
            collaborators.clone(),
        ),
        queries: OrderQueries::new(
            orders.clone(),
            collaborators.feedback.clone(),
            config.fulfillment.feedback_timeout,
        ),
        fulfillment: FulfillmentStateMachine::new(
            orders,
            config.fulfillment.clone(),
            collaborators,
        ),
    })
}

/// Creates the application state backed by the in-memory collaborators,
/// which are returned so callers can steer them.
pub fn create_default_state<S: DocumentStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> (Arc<AppState<S>>, InMemoryCollaborators) {
    let doubles = InMemoryCollaborators::new();
    let state = create_state(store, config, doubles.collaborators());
    (state, doubles)
}
