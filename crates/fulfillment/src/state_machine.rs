//! Restaurant, driver and gateway-driven transitions after checkout.

use chrono::{DateTime, Utc};
use domain::order::{CashierId, DriverId, OrderError, OrderItemId, PaymentChannel};
use domain::{ErrorKind, Order, OrderEvent, OrderId, OrderStore};
use order_store::DocumentStore;

use crate::config::FulfillmentConfig;
use crate::error::Result;
use crate::services::paypal::auth_assertion;
use crate::services::publisher::publish_committed;
use crate::services::{Collaborators, PayPalRefund, RefundRequest, call_gateway};
use crate::webhook::{GatewayWebhook, WebhookEventKind, WebhookOutcome};

/// Dispatch accepted the delivery.
#[derive(Debug, Clone)]
pub struct DriverAssigned {
    pub order_id: OrderId,
    pub driver_id: DriverId,
    pub total_delivery_distance: Option<u32>,
}

/// Restaurant cancels an order it cannot fulfil.
#[derive(Debug, Clone)]
pub struct VoidOrder {
    pub order_id: OrderId,
    pub cashier_id: CashierId,
    pub out_of_stock_items: Vec<OrderItemId>,
    pub note: Option<String>,
}

impl VoidOrder {
    pub fn new(order_id: OrderId, cashier_id: CashierId) -> Self {
        Self {
            order_id,
            cashier_id,
            out_of_stock_items: Vec::new(),
            note: None,
        }
    }

    pub fn out_of_stock(mut self, items: impl IntoIterator<Item = OrderItemId>) -> Self {
        self.out_of_stock_items.extend(items);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Drives orders from confirmation to completion or cancellation.
///
/// Each transition re-checks its precondition on the row it writes, inside
/// one unit of work, so of two racing calls only one can succeed.
pub struct FulfillmentStateMachine<S: DocumentStore> {
    orders: OrderStore<S>,
    config: FulfillmentConfig,
    collaborators: Collaborators,
}

impl<S: DocumentStore> FulfillmentStateMachine<S> {
    pub fn new(orders: OrderStore<S>, config: FulfillmentConfig, collaborators: Collaborators) -> Self {
        Self {
            orders,
            config,
            collaborators,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn restaurant_confirm_order(
        &self,
        order_id: OrderId,
        cashier_id: CashierId,
    ) -> Result<Order> {
        self.transition(order_id, "restaurant_confirm", |order, now| {
            order.confirm_by_restaurant(cashier_id, now)?;
            Ok(OrderEvent::order_confirmed(order))
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn restaurant_mark_ready(
        &self,
        order_id: OrderId,
        cashier_id: CashierId,
    ) -> Result<Order> {
        self.transition(order_id, "mark_ready", |order, now| {
            order.mark_ready(cashier_id, now)?;
            Ok(OrderEvent::order_ready(order))
        })
        .await
    }

    /// Applies a dispatch event. Stale or duplicate events are logged and
    /// dropped; returns whether anything changed.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id, driver_id = %event.driver_id))]
    pub async fn handle_driver_assigned(&self, event: DriverAssigned) -> bool {
        let result = self
            .transition(event.order_id, "driver_assigned", |order, now| {
                order.assign_driver(event.driver_id, event.total_delivery_distance, now)?;
                Ok(OrderEvent::driver_assigned(order))
            })
            .await;

        match result {
            Ok(_) => true,
            Err(error) if matches!(error.kind(), ErrorKind::NotFound | ErrorKind::InvalidState) => {
                tracing::warn!(%error, "Ignoring stale driver assignment");
                false
            }
            Err(error) => {
                tracing::error!(%error, "Driver assignment failed");
                false
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn driver_picked_up_order(
        &self,
        order_id: OrderId,
        driver_id: DriverId,
    ) -> Result<Order> {
        self.transition(order_id, "driver_picked_up", |order, now| {
            order.pick_up(driver_id, now)?;
            Ok(OrderEvent::driver_picked_up(order))
        })
        .await
    }

    /// Delivers the order. A cash payment is settled in the same commit.
    #[tracing::instrument(skip(self))]
    pub async fn driver_complete_order(
        &self,
        order_id: OrderId,
        driver_id: DriverId,
    ) -> Result<Order> {
        self.transition(order_id, "driver_complete", |order, now| {
            order.complete(driver_id, now)?;
            Ok(OrderEvent::order_completed(order))
        })
        .await
    }

    /// Hands a counter order over to the guest.
    #[tracing::instrument(skip(self))]
    pub async fn restaurant_complete_order(
        &self,
        order_id: OrderId,
        cashier_id: CashierId,
    ) -> Result<Order> {
        self.transition(order_id, "restaurant_complete", |order, now| {
            order.complete_at_counter(cashier_id, now)?;
            Ok(OrderEvent::order_completed(order))
        })
        .await
    }

    /// Cancels an order whose delivery has not started. Card payments are
    /// refunded first; if the refund fails nothing is written.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, cashier_id = %cmd.cashier_id))]
    pub async fn restaurant_void_order(&self, cmd: VoidOrder) -> Result<Order> {
        let now = Utc::now();
        let mut uow = self.orders.begin().await?;
        let mut order = uow.require(cmd.order_id).await?;

        let refund_request = self.refund_request(&order)?;
        if let Some(missing) = cmd
            .out_of_stock_items
            .iter()
            .find(|id| order.item(**id).is_none())
        {
            return Err(OrderError::ItemNotFound(*missing).into());
        }

        let refund = match refund_request {
            Some(request) => {
                let paypal = &self.collaborators.paypal;
                let receipt = call_gateway("paypal", self.config.collaborator_timeout, async {
                    paypal
                        .refund(&request)
                        .await
                        .and_then(PayPalRefund::into_receipt)
                })
                .await?;
                tracing::info!(refund_id = %receipt.refund_id, pending = receipt.pending, "Payment refunded");
                Some(receipt)
            }
            None => None,
        };

        order.void(
            &cmd.out_of_stock_items,
            cmd.note,
            &self.config.voidable_methods,
            refund,
            now,
        )?;
        let version = uow.save(&mut order).await?;
        uow.commit().await?;

        metrics::counter!("fulfillment_transitions_total", "transition" => "restaurant_void")
            .increment(1);
        tracing::info!("Order voided");
        self.publish(&OrderEvent::order_cancelled(&order), version)
            .await;
        Ok(order)
    }

    /// Reconciles a gateway notification with the stored payment.
    ///
    /// Never fails: unmatched or unrecognised notifications are logged and
    /// acknowledged, since the gateway redelivers anything it sees rejected.
    #[tracing::instrument(skip(self, webhook), fields(event_type = %webhook.event_type, resource_id = %webhook.resource.id))]
    pub async fn handle_gateway_webhook(&self, webhook: &GatewayWebhook) -> WebhookOutcome {
        let kind = webhook.kind();
        let outcome = match self.reconcile(kind, &webhook.resource.id).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(%error, "Webhook reconciliation failed");
                WebhookOutcome::Failed
            }
        };
        metrics::counter!("webhooks_total", "kind" => kind.as_str()).increment(1);
        outcome
    }

    async fn reconcile(&self, kind: WebhookEventKind, resource_id: &str) -> Result<WebhookOutcome> {
        let Some(order_ref) = kind.lookup(resource_id) else {
            tracing::info!("Ignoring unrecognized webhook");
            return Ok(WebhookOutcome::Unrecognized);
        };

        let now = Utc::now();
        let mut uow = self.orders.begin().await?;
        let Some(mut order) = uow.find_by_ref(order_ref).await? else {
            tracing::warn!("No order matches webhook");
            return Ok(WebhookOutcome::OrderNotFound);
        };

        let changed = match kind {
            WebhookEventKind::CaptureCompleted => order.mark_paid(now)?,
            WebhookEventKind::CaptureRefunded => order.mark_refunded(now)?,
            _ => {
                tracing::info!(order_id = %order.id(), kind = kind.as_str(), "Webhook matched, nothing to apply");
                return Ok(WebhookOutcome::Logged);
            }
        };
        if !changed {
            return Ok(WebhookOutcome::AlreadyApplied);
        }

        uow.save(&mut order).await?;
        uow.commit().await?;
        metrics::counter!("fulfillment_transitions_total", "transition" => kind.as_str())
            .increment(1);
        tracing::info!(order_id = %order.id(), kind = kind.as_str(), "Payment reconciled");
        Ok(WebhookOutcome::Applied)
    }

    /// The refund a void needs, or `None` when nothing was charged.
    fn refund_request(&self, order: &Order) -> Result<Option<RefundRequest>> {
        let payment = order.ensure_voidable(&self.config.voidable_methods)?;
        match &payment.channel {
            PaymentChannel::PayPal(paypal) => {
                let capture_id = paypal.capture_id.clone().ok_or(
                    OrderError::InvalidPaymentTransition {
                        current_state: payment.status,
                        action: "refund",
                    },
                )?;
                let auth_assertion = paypal
                    .paypal_merchant_id
                    .as_deref()
                    .map(|merchant_id| auth_assertion(&self.config.paypal.client_id, merchant_id));
                Ok(Some(RefundRequest {
                    capture_id,
                    auth_assertion,
                }))
            }
            PaymentChannel::Cod | PaymentChannel::ZaloPay(_) => Ok(None),
        }
    }

    async fn transition<F>(
        &self,
        order_id: OrderId,
        transition: &'static str,
        apply: F,
    ) -> Result<Order>
    where
        F: FnOnce(&mut Order, DateTime<Utc>) -> std::result::Result<OrderEvent, OrderError>,
    {
        let mut uow = self.orders.begin().await?;
        let mut order = uow.require(order_id).await?;

        let event = apply(&mut order, Utc::now())?;
        let version = uow.save(&mut order).await?;
        uow.commit().await?;

        metrics::counter!("fulfillment_transitions_total", "transition" => transition)
            .increment(1);
        tracing::info!(
            transition,
            status = %order.status(),
            "Order transitioned"
        );
        self.publish(&event, version).await;
        Ok(order)
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

#[cfg(test)]
mod tests {
    use domain::order::{
        ContactInfo, CustomerId, DeliveryStatus, InvoiceStatus, Money, NewOrderItem, OrderStatus,
        PayPalPayment, PaymentMethod, PaymentStatus, RestaurantId, WalletPayment,
    };
    use domain::{CreateDraftOrder, GeoPoint, PricingEngine};
    use order_store::InMemoryDocumentStore;

    use super::*;
    use crate::services::InMemoryCollaborators;

    fn machine() -> (
        FulfillmentStateMachine<InMemoryDocumentStore>,
        OrderStore<InMemoryDocumentStore>,
        InMemoryCollaborators,
    ) {
        let orders = OrderStore::new(InMemoryDocumentStore::new());
        let doubles = InMemoryCollaborators::new();
        let machine = FulfillmentStateMachine::new(
            orders.clone(),
            FulfillmentConfig::default(),
            doubles.collaborators(),
        );
        (machine, orders, doubles)
    }

    /// A COD order placed and waiting for the restaurant.
    async fn placed(orders: &OrderStore<InMemoryDocumentStore>) -> Order {
        let pricing = PricingEngine::default();
        let cmd = CreateDraftOrder::marketplace(
            RestaurantId::new(),
            CustomerId::new(),
            ContactInfo::new("Lan", "0901000000")
                .located("1 Nguyen Hue", GeoPoint::new(10.7969, 106.7009).unwrap()),
            ContactInfo::new("Pho 24", "0283000000")
                .located("5 Dong Khoi", GeoPoint::new(10.7769, 106.7009).unwrap()),
            NewOrderItem::new("pho-bo", "Pho bo", Money::vnd(45_000), 1),
        );
        let mut order = Order::create_draft(cmd, &pricing, Utc::now()).unwrap();
        order.attach_payment(PaymentChannel::Cod, Utc::now()).unwrap();
        order.place(&pricing, Utc::now()).unwrap();

        let mut uow = orders.begin().await.unwrap();
        uow.save(&mut order).await.unwrap();
        uow.commit().await.unwrap();
        order
    }

    #[tokio::test]
    async fn confirm_then_ready() {
        let (machine, orders, doubles) = machine();
        let order = placed(&orders).await;
        let cashier = CashierId::new();

        let confirmed = machine
            .restaurant_confirm_order(order.id(), cashier)
            .await
            .unwrap();
        assert_eq!(confirmed.status(), OrderStatus::Confirmed);
        assert_eq!(
            confirmed.delivery().unwrap().status,
            DeliveryStatus::AssigningDriver
        );
        assert_eq!(confirmed.cashier_id(), Some(cashier));

        let ready = machine.restaurant_mark_ready(order.id(), cashier).await.unwrap();
        assert_eq!(ready.status(), OrderStatus::Ready);
        assert_eq!(
            doubles.publisher.event_types(),
            vec!["orderConfirmedByRestaurant", "orderReady"]
        );
    }

    #[tokio::test]
    async fn confirming_twice_is_invalid_state() {
        let (machine, orders, _) = machine();
        let order = placed(&orders).await;
        machine
            .restaurant_confirm_order(order.id(), CashierId::new())
            .await
            .unwrap();

        let err = machine
            .restaurant_confirm_order(order.id(), CashierId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn stale_driver_assignment_is_dropped() {
        let (machine, orders, doubles) = machine();
        let order = placed(&orders).await;

        // Still waiting for the restaurant: no dispatch yet.
        let applied = machine
            .handle_driver_assigned(DriverAssigned {
                order_id: order.id(),
                driver_id: DriverId::new(),
                total_delivery_distance: Some(2_400),
            })
            .await;
        assert!(!applied);

        let applied = machine
            .handle_driver_assigned(DriverAssigned {
                order_id: OrderId::new(),
                driver_id: DriverId::new(),
                total_delivery_distance: None,
            })
            .await;
        assert!(!applied);
        assert!(doubles.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn void_of_unknown_item_writes_nothing() {
        let (machine, orders, _) = machine();
        let order = placed(&orders).await;

        let err = machine
            .restaurant_void_order(
                VoidOrder::new(order.id(), CashierId::new()).out_of_stock([OrderItemId::new()]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let stored = orders.begin().await.unwrap().require(order.id()).await.unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn paypal_void_without_capture_is_refused() {
        let (machine, orders, doubles) = machine();
        let pricing = PricingEngine::default();
        let cmd = CreateDraftOrder::marketplace(
            RestaurantId::new(),
            CustomerId::new(),
            ContactInfo::new("Lan", "0901000000")
                .located("1 Nguyen Hue", GeoPoint::new(10.7969, 106.7009).unwrap()),
            ContactInfo::new("Pho 24", "0283000000")
                .located("5 Dong Khoi", GeoPoint::new(10.7769, 106.7009).unwrap()),
            NewOrderItem::new("pho-bo", "Pho bo", Money::vnd(45_000), 1),
        );
        let mut order = Order::create_draft(cmd, &pricing, Utc::now()).unwrap();
        order
            .attach_payment(
                PaymentChannel::PayPal(PayPalPayment::new("PAYPAL-1", None)),
                Utc::now(),
            )
            .unwrap();
        order.place(&pricing, Utc::now()).unwrap();
        let mut uow = orders.begin().await.unwrap();
        uow.save(&mut order).await.unwrap();
        uow.commit().await.unwrap();

        let err = machine
            .restaurant_void_order(VoidOrder::new(order.id(), CashierId::new()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(doubles.paypal.refund_requests().is_empty());
        assert_eq!(order.payment().unwrap().status, PaymentStatus::PendingUserAction);
    }

    #[tokio::test]
    async fn wallet_void_follows_the_configured_methods() {
        let orders = OrderStore::new(InMemoryDocumentStore::new());
        let doubles = InMemoryCollaborators::new();
        let config = FulfillmentConfig {
            voidable_methods: vec![PaymentMethod::Cod, PaymentMethod::ZaloPay],
            ..FulfillmentConfig::default()
        };
        let machine = FulfillmentStateMachine::new(orders.clone(), config, doubles.collaborators());

        let pricing = PricingEngine::default();
        let cmd = CreateDraftOrder::marketplace(
            RestaurantId::new(),
            CustomerId::new(),
            ContactInfo::new("Lan", "0901000000")
                .located("1 Nguyen Hue", GeoPoint::new(10.7969, 106.7009).unwrap()),
            ContactInfo::new("Pho 24", "0283000000")
                .located("5 Dong Khoi", GeoPoint::new(10.7769, 106.7009).unwrap()),
            NewOrderItem::new("pho-bo", "Pho bo", Money::vnd(45_000), 1),
        );
        let mut order = Order::create_draft(cmd, &pricing, Utc::now()).unwrap();
        order
            .attach_payment(
                PaymentChannel::ZaloPay(WalletPayment::new("241019_9")),
                Utc::now(),
            )
            .unwrap();
        order.mark_paid(Utc::now()).unwrap();
        order.place(&pricing, Utc::now()).unwrap();
        let mut uow = orders.begin().await.unwrap();
        uow.save(&mut order).await.unwrap();
        uow.commit().await.unwrap();

        let voided = machine
            .restaurant_void_order(VoidOrder::new(order.id(), CashierId::new()))
            .await
            .unwrap();
        assert_eq!(voided.status(), OrderStatus::Cancelled);
        assert_eq!(voided.payment().unwrap().status, PaymentStatus::PendingRefunded);
        assert_eq!(voided.invoice().unwrap().status, InvoiceStatus::Refunded);
        assert!(doubles.paypal.refund_requests().is_empty());
        assert_eq!(doubles.publisher.event_types(), vec!["orderCancelled"]);
    }

    #[tokio::test]
    async fn counter_order_is_completed_by_the_cashier() {
        let (machine, orders, doubles) = machine();
        let pricing = PricingEngine::default();
        let cashier = CashierId::new();
        let cmd = CreateDraftOrder::point_of_sale(
            RestaurantId::new(),
            cashier,
            NewOrderItem::new("pho-bo", "Pho bo", Money::vnd(45_000), 2),
        );
        let mut order = Order::create_draft(cmd, &pricing, Utc::now()).unwrap();
        order.attach_payment(PaymentChannel::Cod, Utc::now()).unwrap();
        order.auto_confirm(&pricing, Utc::now()).unwrap();
        let mut uow = orders.begin().await.unwrap();
        uow.save(&mut order).await.unwrap();
        uow.commit().await.unwrap();

        machine.restaurant_mark_ready(order.id(), cashier).await.unwrap();
        let completed = machine
            .restaurant_complete_order(order.id(), cashier)
            .await
            .unwrap();
        assert_eq!(completed.status(), OrderStatus::Completed);
        assert_eq!(completed.invoice().unwrap().status, InvoiceStatus::Paid);
        assert_eq!(
            doubles.publisher.event_types(),
            vec!["orderReady", "orderCompleted"]
        );

        let err = machine
            .restaurant_complete_order(placed(&orders).await.id(), cashier)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn unrecognized_webhook_is_acknowledged() {
        let (machine, _, _) = machine();
        let outcome = machine
            .handle_gateway_webhook(&GatewayWebhook::new("BILLING.PLAN.CREATED", "P-1"))
            .await;
        assert_eq!(outcome, WebhookOutcome::Unrecognized);

        let outcome = machine
            .handle_gateway_webhook(&GatewayWebhook::new("PAYMENT.CAPTURE.COMPLETED", "nope"))
            .await;
        assert_eq!(outcome, WebhookOutcome::OrderNotFound);
    }
}
