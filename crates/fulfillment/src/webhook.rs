//! Card gateway webhook classification.
//!
//! The gateway names its notifications `FAMILY.RESOURCE.OUTCOME`. They are
//! classified once here; the state machine only sees [`WebhookEventKind`].

use std::sync::LazyLock;

use domain::OrderRef;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PAYMENT_COMPLETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PAYMENT\.([A-Z_]+)\.COMPLETED$").expect("valid regex"));
static PAYMENT_REFUNDED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PAYMENT\.([A-Z_]+)\.REFUNDED$").expect("valid regex"));
static CHECKOUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CHECKOUT\.[A-Z_.]+$").expect("valid regex"));

/// A notification as posted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayWebhook {
    pub event_type: String,
    pub resource: WebhookResource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResource {
    /// Capture, refund or gateway order id depending on the event family.
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl GatewayWebhook {
    pub fn new(event_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            resource: WebhookResource {
                id: resource_id.into(),
                status: None,
            },
        }
    }

    pub fn kind(&self) -> WebhookEventKind {
        WebhookEventKind::classify(&self.event_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    /// `PAYMENT.CAPTURE.COMPLETED`: funds settled.
    CaptureCompleted,
    /// Any other `PAYMENT.*.COMPLETED`; matched by capture id, logged only.
    PaymentCompleted,
    /// `PAYMENT.CAPTURE.REFUNDED`: refund settled.
    CaptureRefunded,
    /// Any other `PAYMENT.*.REFUNDED`; matched by refund id, logged only.
    PaymentRefunded,
    /// `CHECKOUT.*`; matched by gateway order id, logged only.
    Checkout,
    Unrecognized,
}

impl WebhookEventKind {
    pub fn classify(event_type: &str) -> Self {
        if let Some(caps) = PAYMENT_COMPLETED.captures(event_type) {
            return match &caps[1] {
                "CAPTURE" => WebhookEventKind::CaptureCompleted,
                _ => WebhookEventKind::PaymentCompleted,
            };
        }
        if let Some(caps) = PAYMENT_REFUNDED.captures(event_type) {
            return match &caps[1] {
                "CAPTURE" => WebhookEventKind::CaptureRefunded,
                _ => WebhookEventKind::PaymentRefunded,
            };
        }
        if CHECKOUT.is_match(event_type) {
            return WebhookEventKind::Checkout;
        }
        WebhookEventKind::Unrecognized
    }

    /// Which stored gateway id the resource id is matched against.
    pub fn lookup<'a>(&self, resource_id: &'a str) -> Option<OrderRef<'a>> {
        match self {
            WebhookEventKind::CaptureCompleted | WebhookEventKind::PaymentCompleted => {
                Some(OrderRef::Capture(resource_id))
            }
            WebhookEventKind::CaptureRefunded | WebhookEventKind::PaymentRefunded => {
                Some(OrderRef::Refund(resource_id))
            }
            WebhookEventKind::Checkout => Some(OrderRef::PayPalOrder(resource_id)),
            WebhookEventKind::Unrecognized => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventKind::CaptureCompleted => "capture_completed",
            WebhookEventKind::PaymentCompleted => "payment_completed",
            WebhookEventKind::CaptureRefunded => "capture_refunded",
            WebhookEventKind::PaymentRefunded => "payment_refunded",
            WebhookEventKind::Checkout => "checkout",
            WebhookEventKind::Unrecognized => "unrecognized",
        }
    }
}

/// What handling a webhook did. Handling never fails outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied,
    /// A replay of something already recorded.
    AlreadyApplied,
    /// Matched an order, nothing to change.
    Logged,
    OrderNotFound,
    Unrecognized,
    /// Logged at error level; the gateway will redeliver.
    Failed,
}
