//! The order cluster: order, lines, delivery, invoice and payment.

mod aggregate;
mod commands;
mod events;
mod item;
mod ledger;
mod service;
mod state;
mod value_objects;

pub use aggregate::{CartOutcome, Order, OrderId, RefundReceipt};
pub use commands::*;
pub use events::{
    DomainEvent, ORDER_AGGREGATE_TYPE, OrderCancelledData, OrderCompletedData, OrderEvent,
    OrderEventPayload,
};
pub use item::{NewOrderItem, NewTopping, OrderItem, OrderItemTopping};
pub use ledger::{Delivery, Invoice, PayPalPayment, Payment, PaymentChannel, WalletPayment};
pub use service::CartService;
pub use state::{
    DeliveryIssue, DeliveryStatus, InvoiceStatus, ItemState, OrderStatus, PaymentMethod,
    PaymentStatus,
};
pub use value_objects::{
    CashierId, ContactInfo, CustomerId, DeliveryLocation, DriverId, InvoiceId, MenuItemId, Money,
    OrderItemId, OrderItemToppingId, PaymentId, RestaurantId, ToppingItemId,
};

use thiserror::Error;

use crate::error::ErrorKind;
use crate::geo::InvalidLocation;

/// Rule violations raised by the order aggregate.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Invalid state transition: cannot {action} an order in {current_state} state")]
    InvalidOrderTransition {
        current_state: OrderStatus,
        action: &'static str,
    },

    #[error("Invalid state transition: cannot {action} a delivery in {current_state} state")]
    InvalidDeliveryTransition {
        current_state: DeliveryStatus,
        action: &'static str,
    },

    #[error("Invalid payment state: cannot {action} a payment in {current_state} state")]
    InvalidPaymentTransition {
        current_state: PaymentStatus,
        action: &'static str,
    },

    /// Point-of-sale orders have no delivery.
    #[error("Order has no delivery, cannot {action}")]
    NoDelivery { action: &'static str },

    #[error("Order has no payment, cannot {action}")]
    NoPayment { action: &'static str },

    #[error("Payment method {method} does not support {action}")]
    UnsupportedPaymentMethod {
        method: PaymentMethod,
        action: &'static str,
    },

    #[error("Gateway reference {reference} does not belong to this order")]
    GatewayReferenceMismatch { reference: String },

    #[error("Order belongs to another customer")]
    CustomerMismatch,

    #[error("Delivery is assigned to another driver")]
    DriverMismatch,

    #[error("Item not found: {0}")]
    ItemNotFound(OrderItemId),

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    #[error("Invalid price: {price} (must not be negative)")]
    InvalidPrice { price: i64 },

    #[error(transparent)]
    InvalidLocation(#[from] InvalidLocation),

    #[error("Customer location is required to {action}")]
    MissingCustomerLocation { action: &'static str },
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::InvalidOrderTransition { .. }
            | OrderError::InvalidDeliveryTransition { .. }
            | OrderError::InvalidPaymentTransition { .. }
            | OrderError::NoDelivery { .. }
            | OrderError::NoPayment { .. }
            | OrderError::UnsupportedPaymentMethod { .. } => ErrorKind::InvalidState,
            OrderError::GatewayReferenceMismatch { .. } | OrderError::ItemNotFound(_) => {
                ErrorKind::NotFound
            }
            OrderError::CustomerMismatch | OrderError::DriverMismatch => ErrorKind::Forbidden,
            OrderError::InvalidQuantity { .. } | OrderError::InvalidPrice { .. } => {
                ErrorKind::InvalidInput
            }
            OrderError::InvalidLocation(_) | OrderError::MissingCustomerLocation { .. } => {
                ErrorKind::InvalidLocation
            }
        }
    }
}
