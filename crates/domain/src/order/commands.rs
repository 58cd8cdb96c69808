//! Cart commands.

use super::{
    CashierId, ContactInfo, CustomerId, NewOrderItem, OrderId, OrderItemId, RestaurantId,
};
use crate::geo::GeoPoint;

/// Who the draft is for.
#[derive(Debug, Clone)]
pub enum DraftChannel {
    /// Customer order with delivery.
    Marketplace {
        customer_id: CustomerId,
        customer: ContactInfo,
        restaurant: ContactInfo,
    },
    /// Order keyed in at the counter, no delivery.
    PointOfSale { cashier_id: CashierId },
}

/// Command to open a draft order with its first line.
#[derive(Debug, Clone)]
pub struct CreateDraftOrder {
    pub restaurant_id: RestaurantId,
    pub channel: DraftChannel,
    pub item: NewOrderItem,
}

impl CreateDraftOrder {
    pub fn marketplace(
        restaurant_id: RestaurantId,
        customer_id: CustomerId,
        customer: ContactInfo,
        restaurant: ContactInfo,
        item: NewOrderItem,
    ) -> Self {
        Self {
            restaurant_id,
            channel: DraftChannel::Marketplace {
                customer_id,
                customer,
                restaurant,
            },
            item,
        }
    }

    pub fn point_of_sale(
        restaurant_id: RestaurantId,
        cashier_id: CashierId,
        item: NewOrderItem,
    ) -> Self {
        Self {
            restaurant_id,
            channel: DraftChannel::PointOfSale { cashier_id },
            item,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AddItem {
    pub order_id: OrderId,
    pub item: NewOrderItem,
}

impl AddItem {
    pub fn new(order_id: OrderId, item: NewOrderItem) -> Self {
        Self { order_id, item }
    }
}

/// How a line's quantity should change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// Values below 1 remove the line.
    SetTo(i64),
    Increment,
    Decrement,
}

#[derive(Debug, Clone)]
pub struct ChangeItemQuantity {
    pub order_id: OrderId,
    pub order_item_id: OrderItemId,
    pub change: QuantityChange,
}

impl ChangeItemQuantity {
    pub fn set(order_id: OrderId, order_item_id: OrderItemId, quantity: i64) -> Self {
        Self {
            order_id,
            order_item_id,
            change: QuantityChange::SetTo(quantity),
        }
    }

    pub fn increment(order_id: OrderId, order_item_id: OrderItemId) -> Self {
        Self {
            order_id,
            order_item_id,
            change: QuantityChange::Increment,
        }
    }

    pub fn decrement(order_id: OrderId, order_item_id: OrderItemId) -> Self {
        Self {
            order_id,
            order_item_id,
            change: QuantityChange::Decrement,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoveItem {
    pub order_id: OrderId,
    pub order_item_id: OrderItemId,
}

impl RemoveItem {
    pub fn new(order_id: OrderId, order_item_id: OrderItemId) -> Self {
        Self {
            order_id,
            order_item_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateDeliveryAddress {
    pub order_id: OrderId,
    pub address: String,
    pub geo: GeoPoint,
}

impl UpdateDeliveryAddress {
    pub fn new(order_id: OrderId, address: impl Into<String>, geo: GeoPoint) -> Self {
        Self {
            order_id,
            address: address.into(),
            geo,
        }
    }
}
