//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use order_store::Version;
use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, haversine_meters};
use crate::pricing::PricingEngine;
use crate::repository::{OrderIndex, OrderRef};

use super::{
    CashierId, CreateDraftOrder, CustomerId, Delivery, DeliveryIssue, DeliveryLocation,
    DeliveryStatus, DraftChannel, DriverId, Invoice, InvoiceStatus, ItemState, Money,
    NewOrderItem, OrderError, OrderItem, OrderItemId, OrderStatus, Payment, PaymentChannel,
    PaymentId, PaymentMethod, PaymentStatus, QuantityChange, RestaurantId,
};

/// An order's id is the id of the document that stores its whole cluster.
pub type OrderId = AggregateId;

/// Result of a cart change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartOutcome {
    Updated,
    /// The last line was removed; the order must be deleted.
    Emptied,
}

/// What the card gateway reported for a refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundReceipt {
    pub refund_id: String,
    /// Accepted but not settled yet.
    pub pending: bool,
}

/// Order aggregate root.
///
/// Owns its lines, the delivery of a marketplace order and the invoice with
/// its payment. Every change to any of them goes through a method here, so
/// the cross-ledger rules hold whenever the order is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,

    /// Revision of the stored document this copy was loaded from.
    #[serde(skip)]
    version: Version,

    restaurant_id: RestaurantId,
    cashier_id: Option<CashierId>,
    items: Vec<OrderItem>,
    item_discount: Money,
    discount: Money,
    sub_total: Money,
    grand_total: Money,
    note: Option<String>,
    status: OrderStatus,
    delivery: Option<Delivery>,
    invoice: Option<Invoice>,
    location: Option<DeliveryLocation>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn restaurant_id(&self) -> RestaurantId {
        self.restaurant_id
    }

    pub fn cashier_id(&self) -> Option<CashierId> {
        self.cashier_id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.delivery.as_ref().map(|d| d.customer_id)
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn item(&self, id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    pub fn item_discount(&self) -> Money {
        self.item_discount
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn sub_total(&self) -> Money {
        self.sub_total
    }

    pub fn grand_total(&self) -> Money {
        self.grand_total
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn delivery(&self) -> Option<&Delivery> {
        self.delivery.as_ref()
    }

    pub fn invoice(&self) -> Option<&Invoice> {
        self.invoice.as_ref()
    }

    pub fn payment(&self) -> Option<&Payment> {
        self.invoice.as_ref().map(|invoice| &invoice.payment)
    }

    pub fn location(&self) -> Option<&DeliveryLocation> {
        self.location.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Customer-facing order with a delivery leg.
    pub fn is_marketplace(&self) -> bool {
        self.delivery.is_some()
    }

    pub fn customer_geo(&self) -> Option<GeoPoint> {
        self.delivery.as_ref().and_then(|d| d.customer.geo)
    }

    /// Keys the stored document can be found by.
    pub fn lookup_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let (OrderStatus::Draft, Some(delivery)) = (self.status, &self.delivery) {
            keys.push(
                OrderRef::Draft {
                    customer_id: delivery.customer_id,
                    restaurant_id: self.restaurant_id,
                }
                .key(),
            );
        }
        match self.payment().map(|p| &p.channel) {
            Some(PaymentChannel::PayPal(paypal)) => {
                keys.push(OrderRef::PayPalOrder(&paypal.paypal_order_id).key());
                if let Some(capture_id) = &paypal.capture_id {
                    keys.push(OrderRef::Capture(capture_id).key());
                }
                if let Some(refund_id) = &paypal.refund_id {
                    keys.push(OrderRef::Refund(refund_id).key());
                }
            }
            Some(PaymentChannel::ZaloPay(wallet)) => {
                keys.push(OrderRef::WalletTransaction(&wallet.app_trans_id).key());
            }
            Some(PaymentChannel::Cod) | None => {}
        }
        keys
    }

    /// Listings the stored document appears in.
    pub fn index_keys(&self) -> Vec<String> {
        let mut keys = vec![OrderIndex::Restaurant(self.restaurant_id).key()];
        if let Some(delivery) = &self.delivery {
            keys.push(OrderIndex::Customer(delivery.customer_id).key());
            if let Some(driver_id) = delivery.driver_id {
                keys.push(OrderIndex::Driver(driver_id).key());
            }
        }
        keys
    }
}

// Cart commands
impl Order {
    /// Opens a DRAFT order holding its first line.
    pub fn create_draft(
        cmd: CreateDraftOrder,
        pricing: &PricingEngine,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        validate_new_item(&cmd.item)?;

        let (cashier_id, delivery) = match cmd.channel {
            DraftChannel::Marketplace {
                customer_id,
                customer,
                restaurant,
            } => {
                for geo in customer.geo.iter().chain(restaurant.geo.iter()) {
                    geo.validate()?;
                }
                (None, Some(Delivery::new(customer_id, customer, restaurant)))
            }
            DraftChannel::PointOfSale { cashier_id } => (Some(cashier_id), None),
        };

        let mut order = Self {
            id: OrderId::new(),
            version: Version::initial(),
            restaurant_id: cmd.restaurant_id,
            cashier_id,
            items: vec![cmd.item.into_line()],
            item_discount: Money::zero(),
            discount: Money::zero(),
            sub_total: Money::zero(),
            grand_total: Money::zero(),
            note: None,
            status: OrderStatus::Draft,
            delivery,
            invoice: None,
            location: None,
            created_at: now,
            updated_at: now,
        };
        order.reprice(pricing, now);
        Ok(order)
    }

    /// Adds a line, merging it into an equal line when there is one.
    pub fn add_item(
        &mut self,
        item: NewOrderItem,
        pricing: &PricingEngine,
        now: DateTime<Utc>,
    ) -> Result<OrderItemId, OrderError> {
        self.ensure_items_modifiable("add item")?;
        validate_new_item(&item)?;

        let id = match self.items.iter_mut().find(|line| line.is_same_line(&item)) {
            Some(line) => {
                line.quantity += item.quantity;
                line.refresh_sub_total();
                line.id
            }
            None => {
                let line = item.into_line();
                let id = line.id;
                self.items.push(line);
                id
            }
        };

        self.reprice(pricing, now);
        Ok(id)
    }

    /// Applies a quantity change; a result below 1 removes the line.
    pub fn change_item_quantity(
        &mut self,
        item_id: OrderItemId,
        change: QuantityChange,
        pricing: &PricingEngine,
        now: DateTime<Utc>,
    ) -> Result<CartOutcome, OrderError> {
        self.ensure_items_modifiable("change item quantity")?;
        let position = self.position_of(item_id)?;

        let current = i64::from(self.items[position].quantity);
        let quantity = match change {
            QuantityChange::SetTo(quantity) => quantity,
            QuantityChange::Increment => current + 1,
            QuantityChange::Decrement => current - 1,
        };

        if quantity < 1 {
            self.items.remove(position);
        } else {
            let line = &mut self.items[position];
            line.quantity =
                u32::try_from(quantity).map_err(|_| OrderError::InvalidQuantity { quantity })?;
            line.refresh_sub_total();
        }

        Ok(self.after_cart_change(pricing, now))
    }

    pub fn remove_item(
        &mut self,
        item_id: OrderItemId,
        pricing: &PricingEngine,
        now: DateTime<Utc>,
    ) -> Result<CartOutcome, OrderError> {
        self.ensure_items_modifiable("remove item")?;
        let position = self.position_of(item_id)?;
        self.items.remove(position);
        Ok(self.after_cart_change(pricing, now))
    }

    /// Moves the drop-off point and re-prices shipping and the ETA.
    pub fn update_delivery_address(
        &mut self,
        address: String,
        geo: GeoPoint,
        pricing: &PricingEngine,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        let geo = geo.validate()?;
        self.ensure_items_modifiable("update delivery address")?;
        let delivery = self.delivery.as_mut().ok_or(OrderError::NoDelivery {
            action: "update delivery address",
        })?;
        delivery.customer.address = Some(address);
        delivery.customer.geo = Some(geo);
        self.reprice(pricing, now);
        Ok(())
    }

    fn ensure_items_modifiable(&self, action: &'static str) -> Result<(), OrderError> {
        if !self.status.can_modify_items() {
            return Err(OrderError::InvalidOrderTransition {
                current_state: self.status,
                action,
            });
        }
        Ok(())
    }

    fn position_of(&self, item_id: OrderItemId) -> Result<usize, OrderError> {
        self.items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or(OrderError::ItemNotFound(item_id))
    }

    fn after_cart_change(&mut self, pricing: &PricingEngine, now: DateTime<Utc>) -> CartOutcome {
        if self.items.is_empty() {
            return CartOutcome::Emptied;
        }
        self.reprice(pricing, now);
        CartOutcome::Updated
    }

    fn reprice(&mut self, pricing: &PricingEngine, now: DateTime<Utc>) {
        self.sub_total = pricing.sub_total(&self.items) - self.item_discount;

        if let Some(delivery) = self.delivery.as_mut()
            && let Some(customer_geo) = delivery.customer.geo
        {
            delivery.distance = delivery
                .restaurant
                .geo
                .map(|restaurant_geo| haversine_meters(restaurant_geo, customer_geo))
                .unwrap_or(0);
            delivery.shipping_fee = pricing.shipping_fee(delivery.distance);
            delivery.expected_delivery_time = Some(pricing.expected_delivery_time(
                delivery.order_time.unwrap_or(now),
                delivery.distance,
            ));
        }

        self.grand_total = pricing.grand_total(self.sub_total, self.delivery.as_ref()) - self.discount;
        self.updated_at = now;
    }
}

// Checkout commands
impl Order {
    /// Marketplace orders may only be acted on by their own customer.
    pub fn authorize_customer(&self, customer_id: CustomerId) -> Result<(), OrderError> {
        match &self.delivery {
            Some(delivery) if delivery.customer_id != customer_id => {
                Err(OrderError::CustomerMismatch)
            }
            _ => Ok(()),
        }
    }

    /// Marketplace checkout needs the order's own customer. A counter order
    /// is checked out by restaurant staff without one.
    pub fn authorize_checkout(&self, customer_id: Option<CustomerId>) -> Result<(), OrderError> {
        match customer_id {
            Some(customer_id) => self.authorize_customer(customer_id),
            None if self.is_marketplace() => Err(OrderError::CustomerMismatch),
            None => Ok(()),
        }
    }

    /// A DRAFT order that can be checked out. Returns the drop-off point of
    /// a marketplace order, which must be resolved; counter orders have
    /// none.
    pub fn ensure_checkout_allowed(&self) -> Result<Option<GeoPoint>, OrderError> {
        if !self.status.can_checkout() {
            return Err(OrderError::InvalidOrderTransition {
                current_state: self.status,
                action: "check out",
            });
        }
        let Some(delivery) = &self.delivery else {
            return Ok(None);
        };
        match (delivery.has_resolved_address(), delivery.customer.geo) {
            (true, Some(geo)) => Ok(Some(geo.validate()?)),
            _ => Err(OrderError::MissingCustomerLocation {
                action: "check out",
            }),
        }
    }

    /// Checkout was already accepted with this method and the order is
    /// still waiting on the restaurant, so a repeated request changes
    /// nothing.
    pub fn is_checkout_replay(&self, method: PaymentMethod) -> bool {
        self.status == OrderStatus::Ordered && self.payment().map(Payment::method) == Some(method)
    }

    /// Stores the trimmed note; a blank note clears it.
    pub fn set_note(&mut self, note: Option<&str>) {
        self.note = note
            .map(str::trim)
            .filter(|note| !note.is_empty())
            .map(str::to_string);
    }

    pub fn set_location(&mut self, location: DeliveryLocation) {
        self.location = Some(location);
    }

    /// Creates the invoice and payment on first checkout, or rewrites the
    /// existing payment in place when checkout is re-entered.
    ///
    /// Switching channel drops the previous gateway sub-payment.
    pub fn attach_payment(
        &mut self,
        channel: PaymentChannel,
        now: DateTime<Utc>,
    ) -> Result<PaymentId, OrderError> {
        self.ensure_payment_restartable()?;
        let amount = self.grand_total;
        let status = channel.initial_status();

        match self.invoice.as_mut() {
            Some(invoice) => {
                let payment = &mut invoice.payment;
                payment.amount = amount;
                payment.status = status;
                payment.channel = channel;
                invoice.status = InvoiceStatus::Unpaid;
                self.updated_at = now;
                Ok(payment.id)
            }
            None => {
                let payment = Payment {
                    id: PaymentId::new(),
                    amount,
                    status,
                    channel,
                };
                let id = payment.id;
                self.invoice = Some(Invoice::issue(payment, now));
                self.updated_at = now;
                Ok(id)
            }
        }
    }

    /// Checkout may run (again): the order is checkout-ready and any earlier
    /// payment has not progressed past the point where its amount is fixed.
    pub fn ensure_payment_restartable(&self) -> Result<(), OrderError> {
        self.ensure_checkout_allowed()?;
        match self.payment() {
            Some(payment) if !payment.status.is_amount_mutable() => {
                Err(OrderError::InvalidPaymentTransition {
                    current_state: payment.status,
                    action: "restart checkout for",
                })
            }
            _ => Ok(()),
        }
    }

    pub fn set_wallet_order_url(&mut self, order_url: String) -> Result<(), OrderError> {
        match self.payment_mut("record wallet order")?.channel {
            PaymentChannel::ZaloPay(ref mut wallet) => {
                wallet.order_url = Some(order_url);
                Ok(())
            }
            ref other => Err(OrderError::UnsupportedPaymentMethod {
                method: other.method(),
                action: "wallet order",
            }),
        }
    }

    /// Checks that `paypal_order_id` is this order's pending PayPal order,
    /// before anything is captured.
    pub fn ensure_capturable(&self, paypal_order_id: &str) -> Result<(), OrderError> {
        if !self.status.can_checkout() {
            return Err(OrderError::InvalidOrderTransition {
                current_state: self.status,
                action: "approve payment for",
            });
        }
        let payment = self.payment().ok_or(OrderError::NoPayment { action: "capture" })?;
        let paypal = payment
            .paypal()
            .ok_or(OrderError::UnsupportedPaymentMethod {
                method: payment.method(),
                action: "capture",
            })?;
        if paypal.paypal_order_id != paypal_order_id {
            return Err(OrderError::GatewayReferenceMismatch {
                reference: paypal_order_id.to_string(),
            });
        }
        if payment.status != PaymentStatus::PendingUserAction {
            return Err(OrderError::InvalidPaymentTransition {
                current_state: payment.status,
                action: "capture",
            });
        }
        Ok(())
    }

    /// Records a completed capture: the payment is now PROCESSING.
    pub fn record_capture(
        &mut self,
        paypal_order_id: &str,
        capture_id: String,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.ensure_capturable(paypal_order_id)?;
        let payment = self.payment_mut("capture")?;
        if let PaymentChannel::PayPal(paypal) = &mut payment.channel {
            paypal.capture_id = Some(capture_id);
        }
        payment.status = PaymentStatus::Processing;
        self.updated_at = now;
        Ok(())
    }

    /// Stores the wallet-side transaction details from a payment callback.
    pub fn record_wallet_transaction(
        &mut self,
        zp_trans_id: Option<i64>,
        server_time: Option<i64>,
        merchant_user_id: Option<String>,
        channel: Option<i32>,
    ) -> Result<(), OrderError> {
        match self.payment_mut("record wallet transaction")?.channel {
            PaymentChannel::ZaloPay(ref mut wallet) => {
                wallet.zp_trans_id = zp_trans_id;
                wallet.server_time = server_time;
                wallet.merchant_user_id = merchant_user_id;
                wallet.channel = channel;
                Ok(())
            }
            ref other => Err(OrderError::UnsupportedPaymentMethod {
                method: other.method(),
                action: "wallet callback",
            }),
        }
    }

    /// The customer reports a finished wallet payment. The payment moves to
    /// PROCESSING until the provider's callback settles it.
    ///
    /// Returns `false` when the payment was already processing or settled.
    pub fn mark_wallet_processing(&mut self, now: DateTime<Utc>) -> Result<bool, OrderError> {
        let payment = self.payment_mut("refresh wallet payment")?;
        if payment.method() != PaymentMethod::ZaloPay {
            return Err(OrderError::UnsupportedPaymentMethod {
                method: payment.method(),
                action: "refresh wallet payment",
            });
        }
        match payment.status {
            PaymentStatus::PendingUserAction => {
                payment.status = PaymentStatus::Processing;
                self.updated_at = now;
                Ok(true)
            }
            PaymentStatus::Processing | PaymentStatus::Success => Ok(false),
            current_state => Err(OrderError::InvalidPaymentTransition {
                current_state,
                action: "refresh wallet payment",
            }),
        }
    }

    /// Funds settled: Invoice PAID, Payment SUCCESS.
    ///
    /// Returns `false` when the payment was already settled.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<bool, OrderError> {
        let invoice = self
            .invoice
            .as_mut()
            .ok_or(OrderError::NoPayment { action: "settle" })?;
        match invoice.payment.status {
            PaymentStatus::Success => Ok(false),
            PaymentStatus::PendingUserAction | PaymentStatus::Processing => {
                invoice.payment.status = PaymentStatus::Success;
                invoice.status = InvoiceStatus::Paid;
                self.updated_at = now;
                Ok(true)
            }
            current_state => Err(OrderError::InvalidPaymentTransition {
                current_state,
                action: "settle",
            }),
        }
    }

    /// Refund settled: Invoice and Payment REFUNDED.
    ///
    /// Returns `false` when the payment was already refunded.
    pub fn mark_refunded(&mut self, now: DateTime<Utc>) -> Result<bool, OrderError> {
        let invoice = self
            .invoice
            .as_mut()
            .ok_or(OrderError::NoPayment { action: "refund" })?;
        match invoice.payment.status {
            PaymentStatus::Refunded => Ok(false),
            PaymentStatus::PendingRefunded | PaymentStatus::Success | PaymentStatus::Processing => {
                invoice.payment.status = PaymentStatus::Refunded;
                invoice.status = InvoiceStatus::Refunded;
                self.updated_at = now;
                Ok(true)
            }
            current_state => Err(OrderError::InvalidPaymentTransition {
                current_state,
                action: "refund",
            }),
        }
    }

    fn payment_mut(&mut self, action: &'static str) -> Result<&mut Payment, OrderError> {
        self.invoice
            .as_mut()
            .map(|invoice| &mut invoice.payment)
            .ok_or(OrderError::NoPayment { action })
    }

    /// Online payments must be at least authorized before the restaurant
    /// starts cooking.
    fn ensure_payment_authorized(&self, action: &'static str) -> Result<(), OrderError> {
        match self.payment() {
            Some(payment)
                if payment.method().is_online() && !payment.status.is_at_least_processing() =>
            {
                Err(OrderError::InvalidPaymentTransition {
                    current_state: payment.status,
                    action,
                })
            }
            _ => Ok(()),
        }
    }
}

// Fulfillment transitions
impl Order {
    /// DRAFT → ORDERED; the restaurant still has to confirm.
    pub fn place(&mut self, pricing: &PricingEngine, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_checkout() {
            return Err(OrderError::InvalidOrderTransition {
                current_state: self.status,
                action: "place",
            });
        }
        self.payment().ok_or(OrderError::NoPayment { action: "place" })?;

        self.status = OrderStatus::Ordered;
        self.start_clock(pricing, now);
        Ok(())
    }

    /// DRAFT → CONFIRMED. A marketplace delivery is sent to dispatch.
    pub fn auto_confirm(
        &mut self,
        pricing: &PricingEngine,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.can_checkout() {
            return Err(OrderError::InvalidOrderTransition {
                current_state: self.status,
                action: "auto-confirm",
            });
        }
        self.payment().ok_or(OrderError::NoPayment {
            action: "auto-confirm",
        })?;
        self.ensure_payment_authorized("auto-confirm")?;
        if self.delivery.is_some() {
            self.start_dispatch("auto-confirm")?;
        }

        self.status = OrderStatus::Confirmed;
        self.start_clock(pricing, now);
        Ok(())
    }

    /// ORDERED → CONFIRMED, accepted by restaurant staff.
    pub fn confirm_by_restaurant(
        &mut self,
        cashier_id: CashierId,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.can_restaurant_confirm() {
            return Err(OrderError::InvalidOrderTransition {
                current_state: self.status,
                action: "confirm",
            });
        }
        self.ensure_payment_authorized("confirm")?;
        if self.delivery.is_some() {
            self.start_dispatch("confirm")?;
        }

        self.cashier_id = Some(cashier_id);
        self.status = OrderStatus::Confirmed;
        self.updated_at = now;
        Ok(())
    }

    /// CONFIRMED → READY, the food is waiting for the driver.
    pub fn mark_ready(&mut self, cashier_id: CashierId, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_mark_ready() {
            return Err(OrderError::InvalidOrderTransition {
                current_state: self.status,
                action: "mark ready",
            });
        }
        self.cashier_id = Some(cashier_id);
        self.status = OrderStatus::Ready;
        self.updated_at = now;
        Ok(())
    }

    /// ASSIGNING_DRIVER → ON_GOING.
    pub fn assign_driver(
        &mut self,
        driver_id: DriverId,
        total_delivery_distance: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        let delivery = self.delivery_in(DeliveryStatus::can_assign_driver, "assign driver")?;
        delivery.driver_id = Some(driver_id);
        delivery.total_delivery_distance = total_delivery_distance;
        delivery.status = DeliveryStatus::OnGoing;
        self.updated_at = now;
        Ok(())
    }

    /// ON_GOING → PICKED_UP by the assigned driver.
    pub fn pick_up(&mut self, driver_id: DriverId, now: DateTime<Utc>) -> Result<(), OrderError> {
        let delivery = self.delivery_in(DeliveryStatus::can_pick_up, "pick up")?;
        if delivery.driver_id != Some(driver_id) {
            return Err(OrderError::DriverMismatch);
        }
        delivery.status = DeliveryStatus::PickedUp;
        self.updated_at = now;
        Ok(())
    }

    /// PICKED_UP → COMPLETED. Cash is collected at the door, so a COD
    /// payment settles here.
    pub fn complete(&mut self, driver_id: DriverId, now: DateTime<Utc>) -> Result<(), OrderError> {
        let status = self.status;
        let delivery = self.delivery_in(DeliveryStatus::can_complete, "complete")?;
        if delivery.driver_id != Some(driver_id) {
            return Err(OrderError::DriverMismatch);
        }
        if !status.can_complete() {
            return Err(OrderError::InvalidOrderTransition {
                current_state: status,
                action: "complete",
            });
        }
        let invoice = self
            .invoice
            .as_mut()
            .ok_or(OrderError::NoPayment { action: "complete" })?;

        if invoice.payment.method() == PaymentMethod::Cod {
            invoice.payment.status = PaymentStatus::Success;
            invoice.status = InvoiceStatus::Paid;
        }
        if let Some(delivery) = self.delivery.as_mut() {
            delivery.status = DeliveryStatus::Completed;
            delivery.delivered_at = Some(now);
        }
        self.status = OrderStatus::Completed;
        self.updated_at = now;
        Ok(())
    }

    /// CONFIRMED or READY → COMPLETED for a counter order handed over to
    /// the guest. Cash is taken at the counter, so a COD payment settles.
    pub fn complete_at_counter(
        &mut self,
        cashier_id: CashierId,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if self.delivery.is_some() {
            return Err(OrderError::InvalidOrderTransition {
                current_state: self.status,
                action: "complete at the counter",
            });
        }
        if !self.status.can_complete() {
            return Err(OrderError::InvalidOrderTransition {
                current_state: self.status,
                action: "complete at the counter",
            });
        }
        let invoice = self.invoice.as_mut().ok_or(OrderError::NoPayment {
            action: "complete at the counter",
        })?;

        if invoice.payment.method() == PaymentMethod::Cod {
            invoice.payment.status = PaymentStatus::Success;
            invoice.status = InvoiceStatus::Paid;
        }
        self.cashier_id = Some(cashier_id);
        self.status = OrderStatus::Completed;
        self.updated_at = now;
        Ok(())
    }

    /// Checks every void precondition without changing anything.
    pub fn ensure_voidable(&self, voidable: &[PaymentMethod]) -> Result<&Payment, OrderError> {
        let delivery = self
            .delivery
            .as_ref()
            .ok_or(OrderError::NoDelivery { action: "void" })?;
        if !delivery.status.can_void() {
            return Err(OrderError::InvalidDeliveryTransition {
                current_state: delivery.status,
                action: "void",
            });
        }
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidOrderTransition {
                current_state: self.status,
                action: "void",
            });
        }
        let payment = self.payment().ok_or(OrderError::NoPayment { action: "void" })?;
        if !voidable.contains(&payment.method()) {
            return Err(OrderError::UnsupportedPaymentMethod {
                method: payment.method(),
                action: "void",
            });
        }
        Ok(payment)
    }

    /// Restaurant cancels the order. COD payments are cancelled outright;
    /// PayPal payments need the gateway's refund receipt. A wallet payment
    /// has no refund call: one the customer never finished is cancelled,
    /// a collected one is left pending refund for the merchant to settle.
    pub fn void(
        &mut self,
        out_of_stock: &[OrderItemId],
        note: Option<String>,
        voidable: &[PaymentMethod],
        refund: Option<RefundReceipt>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.ensure_voidable(voidable)?;
        if let Some(missing) = out_of_stock.iter().find(|id| self.item(**id).is_none()) {
            return Err(OrderError::ItemNotFound(*missing));
        }

        let invoice = self
            .invoice
            .as_mut()
            .ok_or(OrderError::NoPayment { action: "void" })?;
        match (&mut invoice.payment.channel, refund) {
            (PaymentChannel::Cod, None) => {
                invoice.payment.status = PaymentStatus::Cancelled;
                invoice.status = InvoiceStatus::Cancelled;
            }
            (PaymentChannel::PayPal(paypal), Some(receipt)) => {
                paypal.refund_id = Some(receipt.refund_id);
                invoice.payment.status = if receipt.pending {
                    PaymentStatus::PendingRefunded
                } else {
                    PaymentStatus::Refunded
                };
                invoice.status = InvoiceStatus::Refunded;
            }
            (PaymentChannel::ZaloPay(_), None) => {
                if invoice.payment.status == PaymentStatus::PendingUserAction {
                    invoice.payment.status = PaymentStatus::Cancelled;
                    invoice.status = InvoiceStatus::Cancelled;
                } else {
                    invoice.payment.status = PaymentStatus::PendingRefunded;
                    invoice.status = InvoiceStatus::Refunded;
                }
            }
            (channel, _) => {
                return Err(OrderError::UnsupportedPaymentMethod {
                    method: channel.method(),
                    action: "void settlement",
                });
            }
        }

        for item in self.items.iter_mut().filter(|i| out_of_stock.contains(&i.id)) {
            item.state = ItemState::OutOfStock;
        }
        if let Some(delivery) = self.delivery.as_mut() {
            delivery.status = DeliveryStatus::Cancelled;
            delivery.issue_type = Some(if out_of_stock.is_empty() {
                DeliveryIssue::Other
            } else {
                DeliveryIssue::OutOfStock
            });
            delivery.issue_note = note;
        }
        self.status = OrderStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    fn delivery_in(
        &mut self,
        allowed: fn(&DeliveryStatus) -> bool,
        action: &'static str,
    ) -> Result<&mut Delivery, OrderError> {
        let delivery = self
            .delivery
            .as_mut()
            .ok_or(OrderError::NoDelivery { action })?;
        if !allowed(&delivery.status) {
            return Err(OrderError::InvalidDeliveryTransition {
                current_state: delivery.status,
                action,
            });
        }
        Ok(delivery)
    }

    fn start_dispatch(&mut self, action: &'static str) -> Result<(), OrderError> {
        let delivery = self.delivery_in(DeliveryStatus::can_start_assigning, action)?;
        delivery.status = DeliveryStatus::AssigningDriver;
        Ok(())
    }

    fn start_clock(&mut self, pricing: &PricingEngine, now: DateTime<Utc>) {
        if let Some(delivery) = self.delivery.as_mut() {
            delivery.order_time = Some(now);
            delivery.expected_delivery_time =
                Some(pricing.expected_delivery_time(now, delivery.distance));
        }
        self.updated_at = now;
    }
}

fn validate_new_item(item: &NewOrderItem) -> Result<(), OrderError> {
    if item.quantity == 0 {
        return Err(OrderError::InvalidQuantity { quantity: 0 });
    }
    if item.price.is_negative() {
        return Err(OrderError::InvalidPrice {
            price: item.price.amount(),
        });
    }
    for topping in &item.toppings {
        if topping.quantity == 0 {
            return Err(OrderError::InvalidQuantity { quantity: 0 });
        }
        if topping.price.is_negative() {
            return Err(OrderError::InvalidPrice {
                price: topping.price.amount(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::order::{ContactInfo, PayPalPayment, WalletPayment};

    fn pricing() -> PricingEngine {
        PricingEngine::default()
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn restaurant_geo() -> GeoPoint {
        GeoPoint::new(10.7769, 106.7009).unwrap()
    }

    /// About 2.2 km north of the restaurant.
    fn customer_geo() -> GeoPoint {
        GeoPoint::new(10.7969, 106.7009).unwrap()
    }

    fn pho(quantity: u32) -> NewOrderItem {
        NewOrderItem::new("pho-bo", "Pho bo", Money::vnd(45_000), quantity)
    }

    fn marketplace_order(customer_id: CustomerId) -> Order {
        let cmd = CreateDraftOrder::marketplace(
            RestaurantId::new(),
            customer_id,
            ContactInfo::new("Lan", "0901000000").located("12 Nguyen Hue", customer_geo()),
            ContactInfo::new("Pho 24", "0283000000").located("5 Dong Khoi", restaurant_geo()),
            pho(1),
        );
        Order::create_draft(cmd, &pricing(), now()).unwrap()
    }

    fn cod_order() -> Order {
        let mut order = marketplace_order(CustomerId::new());
        order.attach_payment(PaymentChannel::Cod, now()).unwrap();
        order
    }

    fn confirmed_with_driver(driver_id: DriverId) -> Order {
        let mut order = cod_order();
        order.auto_confirm(&pricing(), now()).unwrap();
        order.assign_driver(driver_id, Some(2_300), now()).unwrap();
        order
    }

    #[test]
    fn marketplace_draft_is_priced_immediately() {
        let order = marketplace_order(CustomerId::new());
        let delivery = order.delivery().unwrap();

        assert_eq!(order.status(), OrderStatus::Draft);
        assert_eq!(delivery.status, DeliveryStatus::Draft);
        assert_eq!(delivery.distance, 2_200);
        assert_eq!(delivery.shipping_fee, Money::vnd(15_000));
        assert!(delivery.expected_delivery_time.is_some());
        assert_eq!(order.sub_total(), Money::vnd(45_000));
        assert_eq!(order.grand_total(), Money::vnd(60_000));
    }

    #[test]
    fn pos_draft_has_no_delivery_and_no_shipping() {
        let cashier = CashierId::new();
        let cmd = CreateDraftOrder::point_of_sale(RestaurantId::new(), cashier, pho(2));
        let order = Order::create_draft(cmd, &pricing(), now()).unwrap();

        assert!(!order.is_marketplace());
        assert_eq!(order.cashier_id(), Some(cashier));
        assert_eq!(order.grand_total(), Money::vnd(90_000));
        assert!(order.lookup_keys().is_empty());
    }

    #[test]
    fn draft_rejects_zero_quantity() {
        let cmd = CreateDraftOrder::point_of_sale(RestaurantId::new(), CashierId::new(), pho(0));
        assert!(matches!(
            Order::create_draft(cmd, &pricing(), now()),
            Err(OrderError::InvalidQuantity { quantity: 0 })
        ));
    }

    #[test]
    fn adding_an_equal_line_merges_quantities() {
        let mut order = marketplace_order(CustomerId::new());
        let first = order.items()[0].id;

        let merged = order.add_item(pho(2), &pricing(), now()).unwrap();
        assert_eq!(merged, first);
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].quantity, 3);
        assert_eq!(order.sub_total(), Money::vnd(135_000));

        let with_egg = pho(1).with_topping("egg", "Egg", Money::vnd(5_000), 1);
        let other = order.add_item(with_egg, &pricing(), now()).unwrap();
        assert_ne!(other, first);
        assert_eq!(order.items().len(), 2);
        assert_eq!(order.sub_total(), Money::vnd(185_000));
        assert_eq!(order.grand_total(), Money::vnd(200_000));
    }

    #[test]
    fn quantity_below_one_removes_the_line() {
        let mut order = marketplace_order(CustomerId::new());
        let extra = order
            .add_item(
                NewOrderItem::new("tea", "Tea", Money::vnd(10_000), 1),
                &pricing(),
                now(),
            )
            .unwrap();

        let outcome = order
            .change_item_quantity(extra, QuantityChange::Decrement, &pricing(), now())
            .unwrap();
        assert_eq!(outcome, CartOutcome::Updated);
        assert!(order.item(extra).is_none());
        assert_eq!(order.sub_total(), Money::vnd(45_000));

        let last = order.items()[0].id;
        let outcome = order
            .change_item_quantity(last, QuantityChange::SetTo(-3), &pricing(), now())
            .unwrap();
        assert_eq!(outcome, CartOutcome::Emptied);
    }

    #[test]
    fn increment_and_set_update_sub_total() {
        let mut order = marketplace_order(CustomerId::new());
        let line = order.items()[0].id;

        order
            .change_item_quantity(line, QuantityChange::Increment, &pricing(), now())
            .unwrap();
        assert_eq!(order.item(line).unwrap().quantity, 2);
        assert_eq!(order.item(line).unwrap().sub_total, Money::vnd(90_000));

        order
            .change_item_quantity(line, QuantityChange::SetTo(4), &pricing(), now())
            .unwrap();
        assert_eq!(order.sub_total(), Money::vnd(180_000));
    }

    #[test]
    fn removing_unknown_item_is_not_found() {
        let mut order = marketplace_order(CustomerId::new());
        let missing = OrderItemId::new();
        assert!(matches!(
            order.remove_item(missing, &pricing(), now()),
            Err(OrderError::ItemNotFound(id)) if id == missing
        ));
    }

    #[test]
    fn cart_is_frozen_after_checkout() {
        let mut order = cod_order();
        order.place(&pricing(), now()).unwrap();

        let result = order.add_item(pho(1), &pricing(), now());
        assert!(matches!(
            result,
            Err(OrderError::InvalidOrderTransition {
                current_state: OrderStatus::Ordered,
                ..
            })
        ));
    }

    #[test]
    fn moving_the_address_reprices_shipping() {
        let mut order = marketplace_order(CustomerId::new());
        // About 5.6 km north of the restaurant.
        let far = GeoPoint::new(10.8269, 106.7009).unwrap();
        order
            .update_delivery_address("99 Xo Viet Nghe Tinh".into(), far, &pricing(), now())
            .unwrap();

        let delivery = order.delivery().unwrap();
        assert_eq!(delivery.distance, 5_600);
        assert_eq!(delivery.shipping_fee, Money::vnd(30_000));
        assert_eq!(order.grand_total(), Money::vnd(75_000));
    }

    #[test]
    fn unresolved_address_charges_no_shipping() {
        let cmd = CreateDraftOrder::marketplace(
            RestaurantId::new(),
            CustomerId::new(),
            ContactInfo::new("Lan", "0901000000"),
            ContactInfo::new("Pho 24", "0283000000").located("5 Dong Khoi", restaurant_geo()),
            pho(1),
        );
        let order = Order::create_draft(cmd, &pricing(), now()).unwrap();
        assert_eq!(order.grand_total(), order.sub_total());
        assert!(matches!(
            order.ensure_checkout_allowed(),
            Err(OrderError::MissingCustomerLocation { .. })
        ));
    }

    #[test]
    fn other_customers_are_forbidden() {
        let owner = CustomerId::new();
        let order = marketplace_order(owner);
        assert!(order.authorize_customer(owner).is_ok());
        assert!(matches!(
            order.authorize_customer(CustomerId::new()),
            Err(OrderError::CustomerMismatch)
        ));
    }

    #[test]
    fn checkout_without_a_customer_is_for_counter_orders_only() {
        let order = marketplace_order(CustomerId::new());
        assert!(matches!(
            order.authorize_checkout(None),
            Err(OrderError::CustomerMismatch)
        ));

        let cmd = CreateDraftOrder::point_of_sale(RestaurantId::new(), CashierId::new(), pho(1));
        let counter = Order::create_draft(cmd, &pricing(), now()).unwrap();
        assert!(counter.authorize_checkout(None).is_ok());
        assert_eq!(counter.ensure_checkout_allowed().unwrap(), None);
    }

    #[test]
    fn counter_order_confirms_and_completes_without_delivery() {
        let cashier = CashierId::new();
        let cmd = CreateDraftOrder::point_of_sale(RestaurantId::new(), cashier, pho(2));
        let mut order = Order::create_draft(cmd, &pricing(), now()).unwrap();

        order.attach_payment(PaymentChannel::Cod, now()).unwrap();
        order.auto_confirm(&pricing(), now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert!(order.delivery().is_none());

        order.mark_ready(cashier, now()).unwrap();
        order.complete_at_counter(cashier, now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Completed);
        assert_eq!(order.payment().unwrap().status, PaymentStatus::Success);
        assert_eq!(order.invoice().unwrap().status, InvoiceStatus::Paid);
    }

    #[test]
    fn marketplace_orders_are_not_completed_at_the_counter() {
        let driver = DriverId::new();
        let mut order = confirmed_with_driver(driver);
        assert!(matches!(
            order.complete_at_counter(CashierId::new(), now()),
            Err(OrderError::InvalidOrderTransition { .. })
        ));
    }

    #[test]
    fn repeated_checkout_is_a_replay_only_while_ordered() {
        let mut order = cod_order();
        assert!(!order.is_checkout_replay(PaymentMethod::Cod));

        order.place(&pricing(), now()).unwrap();
        assert!(order.is_checkout_replay(PaymentMethod::Cod));
        assert!(!order.is_checkout_replay(PaymentMethod::PayPal));

        order.confirm_by_restaurant(CashierId::new(), now()).unwrap();
        assert!(!order.is_checkout_replay(PaymentMethod::Cod));
    }

    #[test]
    fn index_keys_follow_customer_and_driver() {
        let driver = DriverId::new();
        let order = confirmed_with_driver(driver);
        let keys = order.index_keys();
        assert!(keys.contains(&format!("restaurant:{}", order.restaurant_id())));
        assert!(keys.contains(&format!("customer:{}", order.customer_id().unwrap())));
        assert!(keys.contains(&format!("driver:{driver}")));

        let cmd = CreateDraftOrder::point_of_sale(RestaurantId::new(), CashierId::new(), pho(1));
        let counter = Order::create_draft(cmd, &pricing(), now()).unwrap();
        assert_eq!(counter.index_keys().len(), 1);
    }

    #[test]
    fn note_is_trimmed() {
        let mut order = marketplace_order(CustomerId::new());
        order.set_note(Some("  no chili  "));
        assert_eq!(order.note(), Some("no chili"));
        order.set_note(Some("   "));
        assert_eq!(order.note(), None);
    }

    #[test]
    fn reentering_checkout_reuses_invoice_and_payment() {
        let mut order = marketplace_order(CustomerId::new());
        let channel = PaymentChannel::PayPal(PayPalPayment::new("PO-1", None));
        let first = order.attach_payment(channel, now()).unwrap();
        let invoice_number = order.invoice().unwrap().invoice_number.clone();

        order.add_item(pho(1), &pricing(), now()).unwrap();
        let second = order.attach_payment(PaymentChannel::Cod, now()).unwrap();

        assert_eq!(first, second);
        assert_eq!(order.invoice().unwrap().invoice_number, invoice_number);
        let payment = order.payment().unwrap();
        assert_eq!(payment.method(), PaymentMethod::Cod);
        assert_eq!(payment.status, PaymentStatus::Processing);
        assert_eq!(payment.amount, Money::vnd(105_000));
        assert!(payment.paypal().is_none());
    }

    #[test]
    fn auto_confirm_requires_authorized_online_payment() {
        let mut order = marketplace_order(CustomerId::new());
        order
            .attach_payment(
                PaymentChannel::PayPal(PayPalPayment::new("PO-1", None)),
                now(),
            )
            .unwrap();

        assert!(matches!(
            order.auto_confirm(&pricing(), now()),
            Err(OrderError::InvalidPaymentTransition {
                current_state: PaymentStatus::PendingUserAction,
                ..
            })
        ));

        order.record_capture("PO-1", "CAP-1".into(), now()).unwrap();
        order.auto_confirm(&pricing(), now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(
            order.delivery().unwrap().status,
            DeliveryStatus::AssigningDriver
        );
    }

    #[test]
    fn capture_checks_the_gateway_order_id() {
        let mut order = marketplace_order(CustomerId::new());
        order
            .attach_payment(
                PaymentChannel::PayPal(PayPalPayment::new("PO-1", None)),
                now(),
            )
            .unwrap();

        assert!(matches!(
            order.ensure_capturable("PO-2"),
            Err(OrderError::GatewayReferenceMismatch { .. })
        ));
        order.record_capture("PO-1", "CAP-1".into(), now()).unwrap();
        assert!(matches!(
            order.ensure_capturable("PO-1"),
            Err(OrderError::InvalidPaymentTransition { .. })
        ));
        assert!(order.lookup_keys().contains(&"capture:CAP-1".to_string()));
    }

    #[test]
    fn place_starts_the_delivery_clock() {
        let mut order = cod_order();
        let at = now();
        order.place(&pricing(), at).unwrap();

        let delivery = order.delivery().unwrap();
        assert_eq!(order.status(), OrderStatus::Ordered);
        assert_eq!(delivery.status, DeliveryStatus::Draft);
        assert_eq!(delivery.order_time, Some(at));
        assert_eq!(delivery.expected_delivery_time, Some(at + Duration::minutes(37)));
    }

    #[test]
    fn restaurant_confirm_requires_ordered() {
        let mut order = cod_order();
        let cashier = CashierId::new();
        assert!(order.confirm_by_restaurant(cashier, now()).is_err());

        order.place(&pricing(), now()).unwrap();
        order.confirm_by_restaurant(cashier, now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(order.cashier_id(), Some(cashier));
        assert_eq!(
            order.delivery().unwrap().status,
            DeliveryStatus::AssigningDriver
        );

        order.mark_ready(cashier, now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Ready);
    }

    #[test]
    fn pick_up_checks_status_before_driver() {
        let mut order = cod_order();
        let result = order.pick_up(DriverId::new(), now());
        assert!(matches!(
            result,
            Err(OrderError::InvalidDeliveryTransition {
                current_state: DeliveryStatus::Draft,
                ..
            })
        ));

        let driver = DriverId::new();
        let mut order = confirmed_with_driver(driver);
        assert!(matches!(
            order.pick_up(DriverId::new(), now()),
            Err(OrderError::DriverMismatch)
        ));
        order.pick_up(driver, now()).unwrap();
        assert_eq!(order.delivery().unwrap().status, DeliveryStatus::PickedUp);
    }

    #[test]
    fn completing_cod_settles_the_payment() {
        let driver = DriverId::new();
        let mut order = confirmed_with_driver(driver);
        order.pick_up(driver, now()).unwrap();
        order.complete(driver, now()).unwrap();

        assert_eq!(order.status(), OrderStatus::Completed);
        let delivery = order.delivery().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Completed);
        assert!(delivery.delivered_at.is_some());
        assert_eq!(order.payment().unwrap().status, PaymentStatus::Success);
        assert_eq!(order.invoice().unwrap().status, InvoiceStatus::Paid);
    }

    #[test]
    fn void_cod_cancels_and_flags_out_of_stock_items() {
        let mut order = cod_order();
        order.place(&pricing(), now()).unwrap();
        let line = order.items()[0].id;
        let voidable = [PaymentMethod::Cod, PaymentMethod::PayPal];

        order
            .void(&[line], Some("sold out".into()), &voidable, None, now())
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Cancelled);
        let delivery = order.delivery().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Cancelled);
        assert_eq!(delivery.issue_type, Some(DeliveryIssue::OutOfStock));
        assert_eq!(delivery.issue_note.as_deref(), Some("sold out"));
        assert_eq!(order.item(line).unwrap().state, ItemState::OutOfStock);
        assert_eq!(order.payment().unwrap().status, PaymentStatus::Cancelled);
        assert_eq!(order.invoice().unwrap().status, InvoiceStatus::Cancelled);
    }

    #[test]
    fn void_respects_the_method_allow_list() {
        let mut order = cod_order();
        order.place(&pricing(), now()).unwrap();
        assert!(matches!(
            order.ensure_voidable(&[PaymentMethod::PayPal]),
            Err(OrderError::UnsupportedPaymentMethod {
                method: PaymentMethod::Cod,
                ..
            })
        ));
    }

    #[test]
    fn pending_refund_leaves_payment_pending_refunded() {
        let mut order = marketplace_order(CustomerId::new());
        order
            .attach_payment(
                PaymentChannel::PayPal(PayPalPayment::new("PO-1", None)),
                now(),
            )
            .unwrap();
        order.record_capture("PO-1", "CAP-1".into(), now()).unwrap();
        order.place(&pricing(), now()).unwrap();

        let receipt = RefundReceipt {
            refund_id: "RF-1".into(),
            pending: true,
        };
        order
            .void(&[], None, &[PaymentMethod::PayPal], Some(receipt), now())
            .unwrap();

        assert_eq!(
            order.payment().unwrap().status,
            PaymentStatus::PendingRefunded
        );
        assert_eq!(order.invoice().unwrap().status, InvoiceStatus::Refunded);
        assert_eq!(
            order.delivery().unwrap().issue_type,
            Some(DeliveryIssue::Other)
        );
        assert!(order.lookup_keys().contains(&"refund:RF-1".to_string()));

        assert!(order.mark_refunded(now()).unwrap());
        assert!(!order.mark_refunded(now()).unwrap());
    }

    #[test]
    fn wallet_payment_settles_once() {
        let mut order = marketplace_order(CustomerId::new());
        order
            .attach_payment(
                PaymentChannel::ZaloPay(WalletPayment::new("241019_42")),
                now(),
            )
            .unwrap();
        order
            .set_wallet_order_url("https://qr.example/241019_42".into())
            .unwrap();
        assert!(
            order
                .lookup_keys()
                .contains(&"wallet-trans:241019_42".to_string())
        );

        assert!(order.mark_paid(now()).unwrap());
        assert!(!order.mark_paid(now()).unwrap());
        assert_eq!(order.invoice().unwrap().status, InvoiceStatus::Paid);
    }

    #[test]
    fn void_of_a_collected_wallet_payment_waits_for_the_merchant_refund() {
        let mut order = marketplace_order(CustomerId::new());
        order
            .attach_payment(
                PaymentChannel::ZaloPay(WalletPayment::new("241019_43")),
                now(),
            )
            .unwrap();
        order.mark_paid(now()).unwrap();
        order.place(&pricing(), now()).unwrap();

        assert!(matches!(
            order.ensure_voidable(&[PaymentMethod::Cod, PaymentMethod::PayPal]),
            Err(OrderError::UnsupportedPaymentMethod {
                method: PaymentMethod::ZaloPay,
                ..
            })
        ));

        order
            .void(&[], None, &[PaymentMethod::ZaloPay], None, now())
            .unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(
            order.payment().unwrap().status,
            PaymentStatus::PendingRefunded
        );
        assert_eq!(order.invoice().unwrap().status, InvoiceStatus::Refunded);
    }

    #[test]
    fn wallet_refresh_moves_pending_payment_to_processing_once() {
        let mut order = marketplace_order(CustomerId::new());
        order
            .attach_payment(
                PaymentChannel::ZaloPay(WalletPayment::new("241019_44")),
                now(),
            )
            .unwrap();

        assert!(order.mark_wallet_processing(now()).unwrap());
        assert!(!order.mark_wallet_processing(now()).unwrap());
        assert_eq!(order.payment().unwrap().status, PaymentStatus::Processing);
        assert_eq!(order.invoice().unwrap().status, InvoiceStatus::Unpaid);

        // The provider's callback still settles it afterwards.
        assert!(order.mark_paid(now()).unwrap());

        let mut cod = cod_order();
        assert!(matches!(
            cod.mark_wallet_processing(now()),
            Err(OrderError::UnsupportedPaymentMethod {
                method: PaymentMethod::Cod,
                ..
            })
        ));
    }

    #[test]
    fn draft_key_disappears_after_checkout() {
        let mut order = cod_order();
        assert!(order.lookup_keys().iter().any(|k| k.starts_with("draft:")));
        order.place(&pricing(), now()).unwrap();
        assert!(!order.lookup_keys().iter().any(|k| k.starts_with("draft:")));
    }
}
