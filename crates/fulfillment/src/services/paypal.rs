//! Card gateway (PayPal) trait, request building and in-memory implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use domain::order::{Money, RefundReceipt};
use domain::{Order, OrderId};
use serde::{Serialize, Serializer};

use crate::config::FulfillmentConfig;
use crate::error::GatewayError;

/// A USD amount in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct UsdAmount(i64);

impl UsdAmount {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn from_vnd(amount: Money, rate: f64) -> Self {
        Self((amount.amount() as f64 * rate * 100.0).round() as i64)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UsdAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}{}.{:02}", self.0.abs() / 100, self.0.abs() % 100)
    }
}

// The gateway takes decimal strings.
impl Serialize for UsdAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayPalItem {
    pub name: String,
    pub unit_amount: UsdAmount,
    pub quantity: u32,
}

/// Order-create request with the marketplace fee split.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayPalOrderRequest {
    pub intent: &'static str,
    pub reference_id: OrderId,
    /// Restaurant's merchant account.
    pub payee_merchant_id: String,
    pub items: Vec<PayPalItem>,
    pub item_total: UsdAmount,
    pub shipping: UsdAmount,
    pub amount: UsdAmount,
    pub platform_fee: UsdAmount,
    pub platform_merchant_id: String,
}

impl PayPalOrderRequest {
    /// Converts the order's VND amounts at `rate`. Each unit price is
    /// rounded before being multiplied, so the item total always equals the
    /// sum of what the buyer sees per line.
    pub fn for_order(
        order: &Order,
        rate: f64,
        payee_merchant_id: impl Into<String>,
        config: &FulfillmentConfig,
    ) -> Self {
        let items: Vec<PayPalItem> = order
            .items()
            .iter()
            .map(|item| PayPalItem {
                name: item.name.clone(),
                unit_amount: UsdAmount::from_vnd(item.unit_total(), rate),
                quantity: item.quantity,
            })
            .collect();
        let item_total = UsdAmount(
            items
                .iter()
                .map(|item| item.unit_amount.0 * i64::from(item.quantity))
                .sum(),
        );
        let shipping_fee = order.delivery().map(|d| d.shipping_fee).unwrap_or_default();
        let shipping = UsdAmount::from_vnd(shipping_fee, rate);
        let fee = (item_total.0 as f64 * config.platform_fee_percent).round() as i64;

        Self {
            intent: "CAPTURE",
            reference_id: order.id(),
            payee_merchant_id: payee_merchant_id.into(),
            items,
            item_total,
            shipping,
            amount: UsdAmount(item_total.0 + shipping.0),
            platform_fee: UsdAmount(fee + shipping.0),
            platform_merchant_id: config.paypal.partner_merchant_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayPalCapture {
    pub capture_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundStatus {
    Completed,
    Pending,
    Cancelled,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Completed => "COMPLETED",
            RefundStatus::Pending => "PENDING",
            RefundStatus::Cancelled => "CANCELLED",
            RefundStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayPalRefund {
    pub refund_id: String,
    pub status: RefundStatus,
}

impl PayPalRefund {
    /// A cancelled or failed refund leaves the money with the merchant.
    pub fn into_receipt(self) -> Result<RefundReceipt, GatewayError> {
        match self.status {
            RefundStatus::Completed => Ok(RefundReceipt {
                refund_id: self.refund_id,
                pending: false,
            }),
            RefundStatus::Pending => Ok(RefundReceipt {
                refund_id: self.refund_id,
                pending: true,
            }),
            status => Err(GatewayError::rejected(format!(
                "refund {} is {}",
                self.refund_id,
                status.as_str()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRequest {
    pub capture_id: String,
    /// Set when the capture went to a restaurant's merchant account.
    pub auth_assertion: Option<String>,
}

/// Unsigned JWT identifying the merchant a platform acts for.
pub fn auth_assertion(client_id: &str, merchant_id: &str) -> String {
    let header = serde_json::json!({ "alg": "none" });
    let claims = serde_json::json!({ "iss": client_id, "payer_id": merchant_id });
    format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// Trait for card gateway operations.
#[async_trait]
pub trait PayPalGateway: Send + Sync {
    /// Creates a gateway order and returns its id.
    async fn create_order(&self, request: &PayPalOrderRequest) -> Result<String, GatewayError>;

    /// Captures an order the buyer approved.
    async fn capture(&self, paypal_order_id: &str) -> Result<PayPalCapture, GatewayError>;

    async fn refund(&self, request: &RefundRequest) -> Result<PayPalRefund, GatewayError>;
}

#[derive(Debug)]
struct InMemoryPayPalState {
    orders: HashMap<String, PayPalOrderRequest>,
    captured: HashMap<String, String>,
    refunds: Vec<RefundRequest>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_capture: bool,
    fail_on_refund: bool,
    refund_outcome: RefundStatus,
    delay: Option<Duration>,
}

impl Default for InMemoryPayPalState {
    fn default() -> Self {
        Self {
            orders: HashMap::new(),
            captured: HashMap::new(),
            refunds: Vec::new(),
            next_id: 0,
            fail_on_create: false,
            fail_on_capture: false,
            fail_on_refund: false,
            refund_outcome: RefundStatus::Completed,
            delay: None,
        }
    }
}

/// In-memory card gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPayPalGateway {
    state: Arc<RwLock<InMemoryPayPalState>>,
}

impl InMemoryPayPalGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        self.write().fail_on_create = fail;
    }

    pub fn set_fail_on_capture(&self, fail: bool) {
        self.write().fail_on_capture = fail;
    }

    pub fn set_fail_on_refund(&self, fail: bool) {
        self.write().fail_on_refund = fail;
    }

    /// Status reported for subsequent refunds.
    pub fn set_refund_outcome(&self, status: RefundStatus) {
        self.write().refund_outcome = status;
    }

    /// Makes every call wait this long before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    pub fn order_count(&self) -> usize {
        self.read().orders.len()
    }

    pub fn order_request(&self, paypal_order_id: &str) -> Option<PayPalOrderRequest> {
        self.read().orders.get(paypal_order_id).cloned()
    }

    pub fn is_captured(&self, paypal_order_id: &str) -> bool {
        self.read().captured.contains_key(paypal_order_id)
    }

    pub fn refund_requests(&self) -> Vec<RefundRequest> {
        self.read().refunds.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryPayPalState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryPayPalState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn wait(&self) {
        let delay = self.read().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PayPalGateway for InMemoryPayPalGateway {
    async fn create_order(&self, request: &PayPalOrderRequest) -> Result<String, GatewayError> {
        self.wait().await;
        let mut state = self.write();
        if state.fail_on_create {
            return Err(GatewayError::rejected("UNPROCESSABLE_ENTITY"));
        }
        state.next_id += 1;
        let id = format!("PAYPAL-{:04}", state.next_id);
        state.orders.insert(id.clone(), request.clone());
        Ok(id)
    }

    async fn capture(&self, paypal_order_id: &str) -> Result<PayPalCapture, GatewayError> {
        self.wait().await;
        let mut state = self.write();
        if state.fail_on_capture {
            return Err(GatewayError::rejected("INSTRUMENT_DECLINED"));
        }
        if !state.orders.contains_key(paypal_order_id) {
            return Err(GatewayError::rejected("RESOURCE_NOT_FOUND"));
        }
        if state.captured.contains_key(paypal_order_id) {
            return Err(GatewayError::rejected("ORDER_ALREADY_CAPTURED"));
        }
        state.next_id += 1;
        let capture_id = format!("CAPTURE-{:04}", state.next_id);
        state
            .captured
            .insert(paypal_order_id.to_string(), capture_id.clone());
        Ok(PayPalCapture {
            capture_id,
            status: "COMPLETED".to_string(),
        })
    }

    async fn refund(&self, request: &RefundRequest) -> Result<PayPalRefund, GatewayError> {
        self.wait().await;
        let mut state = self.write();
        if state.fail_on_refund {
            return Err(GatewayError::unavailable("refund service unavailable"));
        }
        state.next_id += 1;
        let refund_id = format!("REFUND-{:04}", state.next_id);
        state.refunds.push(request.clone());
        Ok(PayPalRefund {
            refund_id,
            status: state.refund_outcome,
        })
    }
}
