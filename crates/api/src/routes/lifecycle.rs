//! Restaurant, driver, dispatch and gateway webhook endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::order::{CashierId, DriverId, OrderItemId};
use domain::{Order, OrderId};
use fulfillment::{DriverAssigned, GatewayWebhook, VoidOrder, WebhookOutcome};
use order_store::DocumentStore;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CashierRequest {
    pub cashier_id: CashierId,
}

#[derive(Deserialize)]
pub struct DriverRequest {
    pub driver_id: DriverId,
}

#[derive(Deserialize)]
pub struct VoidRequest {
    pub cashier_id: CashierId,
    #[serde(default)]
    pub out_of_stock_items: Vec<OrderItemId>,
    pub note: Option<String>,
}

/// Driver-accepted event from dispatch.
#[derive(Deserialize)]
pub struct DriverAssignedRequest {
    pub order_id: OrderId,
    pub driver_id: DriverId,
    pub total_delivery_distance: Option<u32>,
}

#[derive(Serialize)]
pub struct DriverAssignedResponse {
    pub applied: bool,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub outcome: WebhookOutcome,
}

/// POST /orders/:id/confirm
#[tracing::instrument(skip(state, req))]
pub async fn confirm<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CashierRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let order = state
        .fulfillment
        .restaurant_confirm_order(order_id, req.cashier_id)
        .await?;
    Ok(Json(order))
}

/// POST /orders/:id/ready
#[tracing::instrument(skip(state, req))]
pub async fn ready<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CashierRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let order = state
        .fulfillment
        .restaurant_mark_ready(order_id, req.cashier_id)
        .await?;
    Ok(Json(order))
}

/// POST /orders/:id/void
#[tracing::instrument(skip(state, req))]
pub async fn void<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<VoidRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let mut cmd = VoidOrder::new(order_id, req.cashier_id).out_of_stock(req.out_of_stock_items);
    cmd.note = req.note;
    Ok(Json(state.fulfillment.restaurant_void_order(cmd).await?))
}

/// POST /orders/:id/pickup
#[tracing::instrument(skip(state, req))]
pub async fn pick_up<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<DriverRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let order = state
        .fulfillment
        .driver_picked_up_order(order_id, req.driver_id)
        .await?;
    Ok(Json(order))
}

/// POST /orders/:id/complete
#[tracing::instrument(skip(state, req))]
pub async fn complete<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<DriverRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let order = state
        .fulfillment
        .driver_complete_order(order_id, req.driver_id)
        .await?;
    Ok(Json(order))
}

/// POST /orders/:id/served: a counter order handed over to the guest.
#[tracing::instrument(skip(state, req))]
pub async fn served<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CashierRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let order = state
        .fulfillment
        .restaurant_complete_order(order_id, req.cashier_id)
        .await?;
    Ok(Json(order))
}

/// POST /dispatch/driver-assigned: accepted even when stale.
#[tracing::instrument(skip(state, req))]
pub async fn driver_assigned<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<DriverAssignedRequest>,
) -> (StatusCode, Json<DriverAssignedResponse>) {
    let applied = state
        .fulfillment
        .handle_driver_assigned(DriverAssigned {
            order_id: req.order_id,
            driver_id: req.driver_id,
            total_delivery_distance: req.total_delivery_distance,
        })
        .await;
    (StatusCode::ACCEPTED, Json(DriverAssignedResponse { applied }))
}

/// POST /webhooks/paypal: always 200 so the gateway stops redelivering.
#[tracing::instrument(skip(state, webhook))]
pub async fn paypal_webhook<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(webhook): Json<GatewayWebhook>,
) -> Json<WebhookResponse> {
    let outcome = state.fulfillment.handle_gateway_webhook(&webhook).await;
    Json(WebhookResponse { outcome })
}
