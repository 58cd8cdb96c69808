//! Status enums for the four ledgers of an order.

use serde::{Deserialize, Serialize};

/// Lifecycle of an order.
///
/// ```text
/// Draft ──► Ordered ──► Confirmed ──► Ready ──► Completed
///   │                      ▲  │          │
///   └──── (auto-confirm) ──┘  │          │
///              Ordered ───────┴──────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Cart being assembled; items can be changed.
    #[default]
    Draft,
    /// Checked out, waiting for the restaurant.
    Ordered,
    Confirmed,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn can_modify_items(&self) -> bool {
        matches!(self, OrderStatus::Draft)
    }

    pub fn can_checkout(&self) -> bool {
        matches!(self, OrderStatus::Draft)
    }

    /// Waiting on the restaurant to accept.
    pub fn can_restaurant_confirm(&self) -> bool {
        matches!(self, OrderStatus::Ordered)
    }

    pub fn can_mark_ready(&self) -> bool {
        matches!(self, OrderStatus::Confirmed)
    }

    pub fn can_complete(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Ready)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Ordered | OrderStatus::Confirmed | OrderStatus::Ready
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Ordered => "ORDERED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Ready => "READY",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of the delivery attached to a marketplace order.
///
/// ```text
/// Draft ──► AssigningDriver ──► OnGoing ──► PickedUp ──► Completed
///   │
///   └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    #[default]
    Draft,
    AssigningDriver,
    /// A driver accepted and is heading to the restaurant.
    OnGoing,
    PickedUp,
    Completed,
    Cancelled,
}

impl DeliveryStatus {
    pub fn can_start_assigning(&self) -> bool {
        matches!(self, DeliveryStatus::Draft)
    }

    pub fn can_assign_driver(&self) -> bool {
        matches!(self, DeliveryStatus::AssigningDriver)
    }

    pub fn can_pick_up(&self) -> bool {
        matches!(self, DeliveryStatus::OnGoing)
    }

    pub fn can_complete(&self) -> bool {
        matches!(self, DeliveryStatus::PickedUp)
    }

    /// Only a delivery that has not been sent to dispatch can be voided.
    pub fn can_void(&self) -> bool {
        matches!(self, DeliveryStatus::Draft)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Completed | DeliveryStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Draft => "DRAFT",
            DeliveryStatus::AssigningDriver => "ASSIGNING_DRIVER",
            DeliveryStatus::OnGoing => "ON_GOING",
            DeliveryStatus::PickedUp => "PICKED_UP",
            DeliveryStatus::Completed => "COMPLETED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    #[default]
    Unpaid,
    Paid,
    Cancelled,
    Refunded,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "UNPAID",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Cancelled => "CANCELLED",
            InvoiceStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Waiting for the customer to approve with the gateway.
    PendingUserAction,
    Processing,
    Success,
    Cancelled,
    Refunded,
    /// Refund accepted by the gateway but not settled yet.
    PendingRefunded,
}

impl PaymentStatus {
    /// The frozen amount may still follow the order total.
    pub fn is_amount_mutable(&self) -> bool {
        matches!(
            self,
            PaymentStatus::PendingUserAction | PaymentStatus::Processing
        )
    }

    /// Funds are at least authorized.
    pub fn is_at_least_processing(&self) -> bool {
        matches!(self, PaymentStatus::Processing | PaymentStatus::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::PendingUserAction => "PENDING_USER_ACTION",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PendingRefunded => "PENDING_REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cod,
    #[serde(rename = "PAYPAL")]
    PayPal,
    #[serde(rename = "ZALOPAY")]
    ZaloPay,
}

impl PaymentMethod {
    /// Settled with an online gateway rather than cash on delivery.
    pub fn is_online(&self) -> bool {
        !matches!(self, PaymentMethod::Cod)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "COD",
            PaymentMethod::PayPal => "PAYPAL",
            PaymentMethod::ZaloPay => "ZALOPAY",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "COD" => Ok(PaymentMethod::Cod),
            "PAYPAL" => Ok(PaymentMethod::PayPal),
            "ZALOPAY" => Ok(PaymentMethod::ZaloPay),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

/// Stock state of a line or topping, set when a restaurant voids an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    #[default]
    InStock,
    OutOfStock,
}

/// Why a restaurant voided an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryIssue {
    OutOfStock,
    Other,
}
