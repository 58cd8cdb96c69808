//! Delivery, invoice and payment records owned by an order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    ContactInfo, CustomerId, DeliveryIssue, DeliveryStatus, DriverId, InvoiceId, InvoiceStatus,
    Money, PaymentId, PaymentMethod, PaymentStatus,
};

/// Delivery leg of a marketplace order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub customer_id: CustomerId,
    pub driver_id: Option<DriverId>,
    pub customer: ContactInfo,
    pub restaurant: ContactInfo,
    /// Restaurant to customer, in meters.
    pub distance: u32,
    /// Distance reported by dispatch once a driver accepted.
    pub total_delivery_distance: Option<u32>,
    pub shipping_fee: Money,
    pub status: DeliveryStatus,
    pub order_time: Option<DateTime<Utc>>,
    pub expected_delivery_time: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub issue_type: Option<DeliveryIssue>,
    pub issue_note: Option<String>,
}

impl Delivery {
    pub(crate) fn new(
        customer_id: CustomerId,
        customer: ContactInfo,
        restaurant: ContactInfo,
    ) -> Self {
        Self {
            customer_id,
            driver_id: None,
            customer,
            restaurant,
            distance: 0,
            total_delivery_distance: None,
            shipping_fee: Money::zero(),
            status: DeliveryStatus::Draft,
            order_time: None,
            expected_delivery_time: None,
            delivered_at: None,
            issue_type: None,
            issue_note: None,
        }
    }

    /// The customer address is known well enough to charge shipping.
    pub fn has_resolved_address(&self) -> bool {
        self.customer.is_resolved()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub invoice_date: DateTime<Utc>,
    pub status: InvoiceStatus,
    pub payment: Payment,
}

impl Invoice {
    pub(crate) fn issue(payment: Payment, now: DateTime<Utc>) -> Self {
        let id = InvoiceId::new();
        Self {
            id,
            invoice_number: format!("invoice-{}", id.as_uuid().simple()),
            invoice_date: now,
            status: InvoiceStatus::Unpaid,
            payment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub channel: PaymentChannel,
}

impl Payment {
    pub fn method(&self) -> PaymentMethod {
        self.channel.method()
    }

    pub fn paypal(&self) -> Option<&PayPalPayment> {
        match &self.channel {
            PaymentChannel::PayPal(paypal) => Some(paypal),
            _ => None,
        }
    }

    pub fn wallet(&self) -> Option<&WalletPayment> {
        match &self.channel {
            PaymentChannel::ZaloPay(wallet) => Some(wallet),
            _ => None,
        }
    }
}

/// Gateway-specific part of a payment, keyed by payment method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum PaymentChannel {
    #[serde(rename = "COD")]
    Cod,
    #[serde(rename = "PAYPAL")]
    PayPal(PayPalPayment),
    #[serde(rename = "ZALOPAY")]
    ZaloPay(WalletPayment),
}

impl PaymentChannel {
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentChannel::Cod => PaymentMethod::Cod,
            PaymentChannel::PayPal(_) => PaymentMethod::PayPal,
            PaymentChannel::ZaloPay(_) => PaymentMethod::ZaloPay,
        }
    }

    /// Status a fresh payment starts in for this channel.
    pub fn initial_status(&self) -> PaymentStatus {
        match self {
            PaymentChannel::Cod => PaymentStatus::Processing,
            PaymentChannel::PayPal(_) | PaymentChannel::ZaloPay(_) => {
                PaymentStatus::PendingUserAction
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayPalPayment {
    pub paypal_order_id: String,
    pub capture_id: Option<String>,
    pub refund_id: Option<String>,
    /// Merchant account of the restaurant receiving the funds.
    pub paypal_merchant_id: Option<String>,
}

impl PayPalPayment {
    pub fn new(paypal_order_id: impl Into<String>, paypal_merchant_id: Option<String>) -> Self {
        Self {
            paypal_order_id: paypal_order_id.into(),
            capture_id: None,
            refund_id: None,
            paypal_merchant_id,
        }
    }
}

/// QR wallet payment (ZaloPay).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletPayment {
    /// Merchant-side transaction id, `YYMMDD_<suffix>`.
    pub app_trans_id: String,
    pub order_url: Option<String>,
    /// Wallet-side transaction id from the payment callback.
    pub zp_trans_id: Option<i64>,
    pub refund_id: Option<String>,
    pub merchant_user_id: Option<String>,
    pub channel: Option<i32>,
    pub server_time: Option<i64>,
}

impl WalletPayment {
    pub fn new(app_trans_id: impl Into<String>) -> Self {
        Self {
            app_trans_id: app_trans_id.into(),
            order_url: None,
            zp_trans_id: None,
            refund_id: None,
            merchant_user_id: None,
            channel: None,
            server_time: None,
        }
    }
}
