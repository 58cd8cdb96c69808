//! Outbound order events.
//!
//! Events are published after the transaction that produced them has
//! committed. Each carries a small projection of the cluster, never the
//! whole aggregate.

use chrono::{DateTime, Utc};
use order_store::{EventEnvelope, Version};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

use super::{
    CashierId, CustomerId, DeliveryIssue, DeliveryStatus, DriverId, Money, Order, OrderId,
    OrderItemId, OrderStatus, PaymentMethod, PaymentStatus, RestaurantId,
};

/// Aggregate type stored on documents and envelopes.
pub const ORDER_AGGREGATE_TYPE: &str = "Order";

/// Trait for domain events.
pub trait DomainEvent: Serialize + Send + Sync + Clone {
    /// Name consumers route on.
    fn event_type(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Checked out, waiting for the restaurant.
    OrderPlaced(OrderEventPayload),

    /// Accepted by the restaurant, manually or by auto-confirm.
    OrderConfirmedByRestaurant(OrderEventPayload),

    OrderReady(OrderEventPayload),

    OrderCancelled(OrderCancelledData),

    DriverAssigned(OrderEventPayload),

    DriverPickedUp(OrderEventPayload),

    OrderCompleted(OrderCompletedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orderPlaced",
            OrderEvent::OrderConfirmedByRestaurant(_) => "orderConfirmedByRestaurant",
            OrderEvent::OrderReady(_) => "orderReady",
            OrderEvent::OrderCancelled(_) => "orderCancelled",
            OrderEvent::DriverAssigned(_) => "driverAssigned",
            OrderEvent::DriverPickedUp(_) => "driverPickedUp",
            OrderEvent::OrderCompleted(_) => "orderCompleted",
        }
    }
}

/// The fields every order event carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEventPayload {
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
    pub status: OrderStatus,
    pub delivery_status: Option<DeliveryStatus>,
    pub customer_id: Option<CustomerId>,
    pub driver_id: Option<DriverId>,
    pub cashier_id: Option<CashierId>,
    pub sub_total: Money,
    pub shipping_fee: Money,
    pub grand_total: Money,
    pub distance: u32,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
}

impl From<&Order> for OrderEventPayload {
    fn from(order: &Order) -> Self {
        let delivery = order.delivery();
        let payment = order.payment();
        Self {
            order_id: order.id(),
            restaurant_id: order.restaurant_id(),
            status: order.status(),
            delivery_status: delivery.map(|d| d.status),
            customer_id: order.customer_id(),
            driver_id: delivery.and_then(|d| d.driver_id),
            cashier_id: order.cashier_id(),
            sub_total: order.sub_total(),
            shipping_fee: delivery.map(|d| d.shipping_fee).unwrap_or_default(),
            grand_total: order.grand_total(),
            distance: delivery.map(|d| d.distance).unwrap_or(0),
            payment_method: payment.map(|p| p.method()),
            payment_status: payment.map(|p| p.status),
        }
    }
}

/// Settlement data for a delivered order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCompletedData {
    #[serde(flatten)]
    pub order: OrderEventPayload,
    pub total_delivery_distance: Option<u32>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelledData {
    #[serde(flatten)]
    pub order: OrderEventPayload,
    pub issue_type: Option<DeliveryIssue>,
    pub issue_note: Option<String>,
    pub out_of_stock_items: Vec<OrderItemId>,
}

// Constructors
impl OrderEvent {
    pub fn order_placed(order: &Order) -> Self {
        OrderEvent::OrderPlaced(order.into())
    }

    pub fn order_confirmed(order: &Order) -> Self {
        OrderEvent::OrderConfirmedByRestaurant(order.into())
    }

    pub fn order_ready(order: &Order) -> Self {
        OrderEvent::OrderReady(order.into())
    }

    pub fn driver_assigned(order: &Order) -> Self {
        OrderEvent::DriverAssigned(order.into())
    }

    pub fn driver_picked_up(order: &Order) -> Self {
        OrderEvent::DriverPickedUp(order.into())
    }

    pub fn order_completed(order: &Order) -> Self {
        let delivery = order.delivery();
        OrderEvent::OrderCompleted(OrderCompletedData {
            order: order.into(),
            total_delivery_distance: delivery.and_then(|d| d.total_delivery_distance),
            delivered_at: delivery.and_then(|d| d.delivered_at),
        })
    }

    pub fn order_cancelled(order: &Order) -> Self {
        let delivery = order.delivery();
        OrderEvent::OrderCancelled(OrderCancelledData {
            order: order.into(),
            issue_type: delivery.and_then(|d| d.issue_type),
            issue_note: delivery.and_then(|d| d.issue_note.clone()),
            out_of_stock_items: order
                .items()
                .iter()
                .filter(|item| item.state == super::ItemState::OutOfStock)
                .map(|item| item.id)
                .collect(),
        })
    }

    pub fn payload(&self) -> &OrderEventPayload {
        match self {
            OrderEvent::OrderPlaced(payload)
            | OrderEvent::OrderConfirmedByRestaurant(payload)
            | OrderEvent::OrderReady(payload)
            | OrderEvent::DriverAssigned(payload)
            | OrderEvent::DriverPickedUp(payload) => payload,
            OrderEvent::OrderCancelled(data) => &data.order,
            OrderEvent::OrderCompleted(data) => &data.order,
        }
    }

    /// Wraps the event for publishing; `version` is the committed document
    /// version that produced it.
    pub fn to_envelope(&self, version: Version) -> Result<EventEnvelope, DomainError> {
        let envelope = EventEnvelope::builder()
            .event_type(self.event_type())
            .aggregate_id(self.payload().order_id)
            .aggregate_type(ORDER_AGGREGATE_TYPE)
            .version(version)
            .payload(self)?
            .build()?;
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::order::{CashierId, CreateDraftOrder, NewOrderItem};
    use crate::pricing::PricingEngine;

    fn pos_order() -> Order {
        let cmd = CreateDraftOrder::point_of_sale(
            RestaurantId::new(),
            CashierId::new(),
            NewOrderItem::new("com-tam", "Com tam", Money::vnd(40_000), 2),
        );
        Order::create_draft(cmd, &PricingEngine::default(), Utc::now()).unwrap()
    }

    #[test]
    fn event_types_are_camel_case() {
        let order = pos_order();
        assert_eq!(OrderEvent::order_placed(&order).event_type(), "orderPlaced");
        assert_eq!(
            OrderEvent::order_confirmed(&order).event_type(),
            "orderConfirmedByRestaurant"
        );
        assert_eq!(OrderEvent::order_ready(&order).event_type(), "orderReady");
        assert_eq!(
            OrderEvent::driver_picked_up(&order).event_type(),
            "driverPickedUp"
        );
        assert_eq!(
            OrderEvent::order_completed(&order).event_type(),
            "orderCompleted"
        );
    }

    #[test]
    fn payload_projects_the_order() {
        let order = pos_order();
        let event = OrderEvent::order_placed(&order);
        let payload = event.payload();

        assert_eq!(payload.order_id, order.id());
        assert_eq!(payload.grand_total, Money::vnd(80_000));
        assert_eq!(payload.delivery_status, None);
        assert_eq!(payload.shipping_fee, Money::zero());
        assert_eq!(payload.payment_method, None);
    }

    #[test]
    fn cancellation_serializes_flat() {
        let order = pos_order();
        let event = OrderEvent::order_cancelled(&order);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OrderCancelled");
        assert_eq!(json["data"]["orderId"], order.id().to_string());
        assert!(json["data"]["outOfStockItems"].as_array().unwrap().is_empty());

        let back: OrderEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn envelope_carries_type_and_version() {
        let order = pos_order();
        let envelope = OrderEvent::order_ready(&order)
            .to_envelope(Version::new(4))
            .unwrap();

        assert_eq!(envelope.event_type, "orderReady");
        assert_eq!(envelope.aggregate_id, order.id());
        assert_eq!(envelope.aggregate_type, ORDER_AGGREGATE_TYPE);
        assert_eq!(envelope.version, Version::new(4));
    }
}
