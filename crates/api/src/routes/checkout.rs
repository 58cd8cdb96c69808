//! Checkout, gateway approval and wallet callback endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::OrderId;
use domain::order::{CustomerId, PaymentMethod};
use fulfillment::services::WalletCallbackReply;
use fulfillment::{ApproveGatewayOrder, CheckoutMethod, CheckoutOutcome, ConfirmCheckout};
use order_store::DocumentStore;
use serde::Deserialize;

use super::{AppState, parse_id};
use crate::error::ApiError;

/// Without `customer_id` the order is checked out at the counter, which
/// only counter orders allow.
#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: Option<CustomerId>,
    pub payment_method: PaymentMethod,
    /// Restaurant's card merchant account; required for `PAYPAL`.
    pub merchant_id: Option<String>,
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct ApproveRequest {
    pub customer_id: CustomerId,
    pub paypal_order_id: String,
}

#[derive(Deserialize)]
pub struct WalletStatusRequest {
    pub customer_id: CustomerId,
}

/// Form the wallet provider posts to the callback URL.
#[derive(Deserialize)]
pub struct WalletCallbackRequest {
    pub data: String,
    pub mac: String,
}

/// POST /orders/:id/checkout
#[tracing::instrument(skip(state, req))]
pub async fn checkout<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutOutcome>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let method = match (req.payment_method, req.merchant_id) {
        (PaymentMethod::Cod, _) => CheckoutMethod::Cod,
        (PaymentMethod::ZaloPay, _) => CheckoutMethod::ZaloPay,
        (PaymentMethod::PayPal, Some(merchant_id)) => CheckoutMethod::PayPal { merchant_id },
        (PaymentMethod::PayPal, None) => {
            return Err(ApiError::BadRequest(
                "merchant_id is required for PAYPAL".to_string(),
            ));
        }
    };

    let mut cmd = match req.customer_id {
        Some(customer_id) => ConfirmCheckout::new(order_id, customer_id, method),
        None => ConfirmCheckout::at_counter(order_id, method),
    };
    cmd.note = req.note;
    Ok(Json(state.checkout.confirm_checkout(cmd).await?))
}

/// POST /orders/:id/approve: the customer approved the card payment.
#[tracing::instrument(skip(state, req))]
pub async fn approve<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<CheckoutOutcome>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let outcome = state
        .checkout
        .approve_gateway_order(ApproveGatewayOrder {
            order_id,
            customer_id: req.customer_id,
            paypal_order_id: req.paypal_order_id,
        })
        .await?;
    Ok(Json(outcome))
}

/// POST /orders/:id/wallet-status: the customer is back from the wallet's
/// payment page.
#[tracing::instrument(skip(state, req))]
pub async fn wallet_status<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<WalletStatusRequest>,
) -> Result<Json<CheckoutOutcome>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let outcome = state
        .checkout
        .refresh_wallet_payment(order_id, req.customer_id)
        .await?;
    Ok(Json(outcome))
}

/// POST /orders/:id/wallet-callback: always 200; the body tells the
/// provider whether to retry.
#[tracing::instrument(skip(state, req))]
pub async fn wallet_callback<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<WalletCallbackRequest>,
) -> Json<WalletCallbackReply> {
    let Ok(order_id) = id.parse::<OrderId>() else {
        tracing::warn!(%id, "Wallet callback for malformed order id");
        return Json(WalletCallbackReply::retry("invalid order id"));
    };
    Json(
        state
            .checkout
            .handle_wallet_callback(order_id, &req.data, &req.mac)
            .await,
    )
}
