//! Checkout orchestration: payment setup, gateway approval and wallet
//! callbacks.
//!
//! Every entry point runs in one unit of work. Gateway calls happen while it
//! is open, so a failure anywhere drops it and nothing is committed.

use std::time::Instant;

use chrono::{DateTime, Utc};
use domain::order::{
    CustomerId, OrderError, OrderStatus, PayPalPayment, Payment, PaymentChannel, PaymentMethod,
    WalletPayment,
};
use domain::{GeoPoint, Order, OrderEvent, OrderId, OrderStore, PricingEngine};
use order_store::DocumentStore;
use serde::Serialize;

use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, GatewayError, Result, call_with_timeout};
use crate::services::exchange::rate_or_fallback;
use crate::services::publisher::publish_committed;
use crate::services::wallet::new_app_trans_id;
use crate::services::{
    AutoConfirmDecision, Collaborators, PayPalOrderRequest, WalletCallbackData,
    WalletCallbackReply, WalletOrderRequest, WalletOrderResponse, WalletSigner, call_gateway,
};

/// How the customer pays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutMethod {
    Cod,
    /// Card payment; the restaurant's merchant account receives the funds.
    PayPal { merchant_id: String },
    ZaloPay,
}

impl CheckoutMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMethod::Cod => "COD",
            CheckoutMethod::PayPal { .. } => "PAYPAL",
            CheckoutMethod::ZaloPay => "ZALOPAY",
        }
    }
}

impl CheckoutMethod {
    pub fn payment_method(&self) -> PaymentMethod {
        match self {
            CheckoutMethod::Cod => PaymentMethod::Cod,
            CheckoutMethod::PayPal { .. } => PaymentMethod::PayPal,
            CheckoutMethod::ZaloPay => PaymentMethod::ZaloPay,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmCheckout {
    pub order_id: OrderId,
    /// `None` when restaurant staff check out a counter order.
    pub customer_id: Option<CustomerId>,
    pub method: CheckoutMethod,
    pub note: Option<String>,
}

impl ConfirmCheckout {
    pub fn new(order_id: OrderId, customer_id: CustomerId, method: CheckoutMethod) -> Self {
        Self {
            order_id,
            customer_id: Some(customer_id),
            method,
            note: None,
        }
    }

    pub fn at_counter(order_id: OrderId, method: CheckoutMethod) -> Self {
        Self {
            order_id,
            customer_id: None,
            method,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApproveGatewayOrder {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub paypal_order_id: String,
}

/// What the caller has to do after a checkout call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NextStep {
    /// Placed; the restaurant has to confirm.
    AwaitRestaurant,
    /// Confirmed; a driver is being assigned.
    Dispatching,
    /// Counter order confirmed; the kitchen prepares it.
    Preparing,
    /// Send the customer to the wallet's payment page.
    RedirectToWallet { order_url: String },
    /// Have the customer approve the gateway order.
    ApproveOnGateway { paypal_order_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub next_step: NextStep,
}

/// Orchestrates checkout of marketplace and counter orders.
pub struct CheckoutOrchestrator<S: DocumentStore> {
    orders: OrderStore<S>,
    pricing: PricingEngine,
    config: FulfillmentConfig,
    collaborators: Collaborators,
}

impl<S: DocumentStore> CheckoutOrchestrator<S> {
    pub fn new(
        orders: OrderStore<S>,
        pricing: PricingEngine,
        config: FulfillmentConfig,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            orders,
            pricing,
            config,
            collaborators,
        }
    }

    /// Checks out a DRAFT order with the chosen payment method.
    ///
    /// Calling it again before the payment settled rewrites the existing
    /// invoice and payment instead of adding new ones. Once the order was
    /// placed with the same method and waits on the restaurant, a repeat
    /// returns it unchanged.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, method = cmd.method.as_str()))]
    pub async fn confirm_checkout(&self, cmd: ConfirmCheckout) -> Result<CheckoutOutcome> {
        let started = Instant::now();
        let method = cmd.method.as_str();
        let result = self.run_checkout(cmd).await;
        observe("confirm_checkout", method, started, &result);
        result
    }

    /// Captures an approved card payment, then places or confirms the order.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn approve_gateway_order(
        &self,
        cmd: ApproveGatewayOrder,
    ) -> Result<CheckoutOutcome> {
        let started = Instant::now();
        let result = self.run_approval(cmd).await;
        observe("approve_gateway_order", "PAYPAL", started, &result);
        result
    }

    /// The customer came back from the wallet's payment page: marks the
    /// wallet payment as processing, then places or confirms the order.
    ///
    /// If the provider's callback already moved the order on, returns it
    /// unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_wallet_payment(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
    ) -> Result<CheckoutOutcome> {
        let started = Instant::now();
        let result = self.run_wallet_refresh(order_id, customer_id).await;
        observe("refresh_wallet_payment", "ZALOPAY", started, &result);
        result
    }

    /// Settles a wallet payment from the provider's callback.
    ///
    /// Never fails: the reply tells the provider whether to retry.
    #[tracing::instrument(skip(self, data, mac))]
    pub async fn handle_wallet_callback(
        &self,
        order_id: OrderId,
        data: &str,
        mac: &str,
    ) -> WalletCallbackReply {
        if !WalletSigner::new(&self.config.wallet).verify_callback(data, mac) {
            metrics::counter!("wallet_callbacks_total", "outcome" => "mac_mismatch").increment(1);
            tracing::warn!("Wallet callback MAC mismatch");
            return WalletCallbackReply::mac_mismatch();
        }

        match self.settle_wallet_payment(order_id, data).await {
            Ok(()) => {
                metrics::counter!("wallet_callbacks_total", "outcome" => "success").increment(1);
                WalletCallbackReply::success()
            }
            Err(error) => {
                metrics::counter!("wallet_callbacks_total", "outcome" => "retry").increment(1);
                tracing::error!(%error, "Wallet callback failed");
                WalletCallbackReply::retry(error.kind().as_str())
            }
        }
    }

    async fn run_checkout(&self, cmd: ConfirmCheckout) -> Result<CheckoutOutcome> {
        let now = Utc::now();
        let mut uow = self.orders.begin().await?;
        let mut order = uow.require(cmd.order_id).await?;

        order.authorize_checkout(cmd.customer_id)?;
        if order.is_checkout_replay(cmd.method.payment_method()) {
            tracing::info!("Checkout repeated on a placed order, nothing to do");
            return Ok(CheckoutOutcome {
                order,
                next_step: NextStep::AwaitRestaurant,
            });
        }
        let geo = order.ensure_checkout_allowed()?;
        order.ensure_payment_restartable()?;

        if let Some(geo) = geo {
            let location = self.resolve_location(geo).await?;
            order.set_location(location);
        }
        order.set_note(cmd.note.as_deref());

        match cmd.method {
            CheckoutMethod::Cod => {
                order.attach_payment(PaymentChannel::Cod, now)?;
                let (event, next_step) = self.advance(&mut order, now).await?;

                let version = uow.save(&mut order).await?;
                uow.commit().await?;
                self.publish(&event, version).await;
                Ok(CheckoutOutcome { order, next_step })
            }
            CheckoutMethod::ZaloPay => {
                // Pending wallet payment staged first; the request is safe to repeat.
                let app_trans_id = new_app_trans_id(now);
                let channel = PaymentChannel::ZaloPay(WalletPayment::new(app_trans_id.clone()));
                order.attach_payment(channel, now)?;

                let request =
                    WalletOrderRequest::for_order(&order, app_trans_id, &self.config.wallet, now);
                let wallet = &self.collaborators.wallet;
                let order_url = call_gateway("zalopay", self.config.collaborator_timeout, async {
                    wallet
                        .create_order(&request)
                        .await
                        .and_then(WalletOrderResponse::into_order_url)
                })
                .await?;
                order.set_wallet_order_url(order_url.clone())?;

                uow.save(&mut order).await?;
                uow.commit().await?;
                tracing::info!(app_trans_id = %request.app_trans_id, "Wallet order created");
                Ok(CheckoutOutcome {
                    order,
                    next_step: NextStep::RedirectToWallet { order_url },
                })
            }
            CheckoutMethod::PayPal { merchant_id } => {
                let rate = rate_or_fallback(
                    self.collaborators.rates.as_ref(),
                    self.config.collaborator_timeout,
                    self.config.fallback_usd_rate,
                )
                .await;
                let request =
                    PayPalOrderRequest::for_order(&order, rate, merchant_id.clone(), &self.config);
                let paypal_order_id = call_gateway(
                    "paypal",
                    self.config.collaborator_timeout,
                    self.collaborators.paypal.create_order(&request),
                )
                .await?;

                let channel = PaymentChannel::PayPal(PayPalPayment::new(
                    paypal_order_id.clone(),
                    Some(merchant_id),
                ));
                order.attach_payment(channel, now)?;

                uow.save(&mut order).await?;
                uow.commit().await?;
                tracing::info!(%paypal_order_id, rate, "Gateway order created");
                Ok(CheckoutOutcome {
                    order,
                    next_step: NextStep::ApproveOnGateway { paypal_order_id },
                })
            }
        }
    }

    async fn run_approval(&self, cmd: ApproveGatewayOrder) -> Result<CheckoutOutcome> {
        let now = Utc::now();
        let mut uow = self.orders.begin().await?;
        let mut order = uow.require(cmd.order_id).await?;

        order.authorize_customer(cmd.customer_id)?;
        order.ensure_capturable(&cmd.paypal_order_id)?;

        // Captured money is hard to give back, so capture before touching
        // local state.
        let capture = call_gateway(
            "paypal",
            self.config.collaborator_timeout,
            self.collaborators.paypal.capture(&cmd.paypal_order_id),
        )
        .await?;
        order.record_capture(&cmd.paypal_order_id, capture.capture_id, now)?;
        let (event, next_step) = self.advance(&mut order, now).await?;

        let version = uow.save(&mut order).await?;
        uow.commit().await?;
        self.publish(&event, version).await;
        Ok(CheckoutOutcome { order, next_step })
    }

    async fn run_wallet_refresh(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
    ) -> Result<CheckoutOutcome> {
        let now = Utc::now();
        let mut uow = self.orders.begin().await?;
        let mut order = uow.require(order_id).await?;
        order.authorize_customer(customer_id)?;

        if order.status() != OrderStatus::Draft {
            let paid_by_wallet = order.payment().map(Payment::method) == Some(PaymentMethod::ZaloPay);
            let next_step = waiting_step(&order).filter(|_| paid_by_wallet).ok_or(
                OrderError::InvalidOrderTransition {
                    current_state: order.status(),
                    action: "refresh wallet payment",
                },
            )?;
            tracing::info!(status = %order.status(), "Wallet payment already applied");
            return Ok(CheckoutOutcome { order, next_step });
        }

        order.mark_wallet_processing(now)?;
        let (event, next_step) = self.advance(&mut order, now).await?;

        let version = uow.save(&mut order).await?;
        uow.commit().await?;
        self.publish(&event, version).await;
        Ok(CheckoutOutcome { order, next_step })
    }

    async fn settle_wallet_payment(&self, order_id: OrderId, data: &str) -> Result<()> {
        let callback: WalletCallbackData = serde_json::from_str(data)?;
        let now = Utc::now();
        let mut uow = self.orders.begin().await?;
        let mut order = uow.require(order_id).await?;

        let app_trans_id = order
            .payment()
            .and_then(Payment::wallet)
            .map(|wallet| wallet.app_trans_id.as_str());
        if app_trans_id != Some(callback.app_trans_id.as_str()) {
            return Err(OrderError::GatewayReferenceMismatch {
                reference: callback.app_trans_id,
            }
            .into());
        }

        order.record_wallet_transaction(
            callback.zp_trans_id,
            callback.server_time,
            callback.merchant_user_id,
            callback.channel,
        )?;
        if !order.mark_paid(now)? {
            tracing::info!("Wallet payment already settled");
            return Ok(());
        }
        if order.status() != OrderStatus::Draft {
            // Placed when the customer returned from the wallet page.
            uow.save(&mut order).await?;
            uow.commit().await?;
            tracing::info!(status = %order.status(), "Wallet payment settled");
            return Ok(());
        }
        let (event, _) = self.advance(&mut order, now).await?;

        let version = uow.save(&mut order).await?;
        uow.commit().await?;
        self.publish(&event, version).await;
        Ok(())
    }

    /// Auto-confirms or places a paid-for DRAFT order, per the restaurant's
    /// policy. Counter orders are taken by the restaurant itself and are
    /// always confirmed.
    async fn advance(
        &self,
        order: &mut Order,
        now: DateTime<Utc>,
    ) -> Result<(OrderEvent, NextStep)> {
        if !order.is_marketplace() {
            order.auto_confirm(&self.pricing, now)?;
            tracing::info!("Counter order confirmed");
            return Ok((OrderEvent::order_confirmed(order), NextStep::Preparing));
        }

        let decision = AutoConfirmDecision::resolve(
            self.collaborators.policy.as_ref(),
            order.restaurant_id(),
            self.config.collaborator_timeout,
        )
        .await;

        if decision.auto_confirms() {
            order.auto_confirm(&self.pricing, now)?;
            tracing::info!(?decision, "Order auto-confirmed");
            Ok((OrderEvent::order_confirmed(order), NextStep::Dispatching))
        } else {
            order.place(&self.pricing, now)?;
            tracing::info!("Order placed, waiting for the restaurant");
            Ok((OrderEvent::order_placed(order), NextStep::AwaitRestaurant))
        }
    }

    async fn resolve_location(&self, geo: GeoPoint) -> Result<domain::order::DeliveryLocation> {
        let lookup = self.collaborators.locations.resolve(geo);
        match call_with_timeout(self.config.collaborator_timeout, lookup).await {
            Ok(Some(location)) => Ok(location),
            Ok(None) => Err(FulfillmentError::LocationResolutionFailed {
                reason: format!(
                    "no city at {:.5},{:.5}",
                    geo.latitude(),
                    geo.longitude()
                ),
            }),
            Err(source @ GatewayError::Timeout { .. }) => {
                Err(FulfillmentError::gateway("location", source))
            }
            Err(error) => Err(FulfillmentError::LocationResolutionFailed {
                reason: error.to_string(),
            }),
        }
    }

    async fn publish(&self, event: &OrderEvent, version: order_store::Version) {
        publish_committed(
            self.collaborators.publisher.as_ref(),
            event,
            version,
            self.config.collaborator_timeout,
        )
        .await;
    }
}

/// What a checked-out order is waiting on, or `None` once it is past
/// checkout's reach.
fn waiting_step(order: &Order) -> Option<NextStep> {
    match order.status() {
        OrderStatus::Ordered => Some(NextStep::AwaitRestaurant),
        OrderStatus::Confirmed if order.is_marketplace() => Some(NextStep::Dispatching),
        OrderStatus::Confirmed => Some(NextStep::Preparing),
        _ => None,
    }
}

fn observe<T>(operation: &'static str, method: &'static str, started: Instant, result: &Result<T>) {
    metrics::histogram!("checkout_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
    match result {
        Ok(_) => {
            metrics::counter!("checkout_total", "method" => method).increment(1);
        }
        Err(error) => {
            metrics::counter!("checkout_failed_total", "reason" => error.kind().as_str())
                .increment(1);
            tracing::warn!(operation, %error, "Checkout step failed");
        }
    }
}
