//! QR wallet (ZaloPay) trait, request signing and in-memory implementation.
//!
//! Outgoing order requests are signed with `key1`; the provider signs its
//! payment callbacks with `key2`. Both MACs are hex HMAC-SHA256.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::Order;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::WalletConfig;
use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

/// `YYMMDD_<6 digits>`, unique enough per merchant per day.
pub fn new_app_trans_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().as_u128() % 1_000_000;
    format!("{}_{suffix:06}", now.format("%y%m%d"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletOrderRequest {
    pub app_id: i64,
    pub app_user: String,
    pub app_trans_id: String,
    /// Milliseconds since the epoch.
    pub app_time: i64,
    pub amount: i64,
    pub item: String,
    pub embed_data: String,
    pub description: String,
    pub bank_code: String,
    pub callback_url: String,
    pub mac: String,
}

impl WalletOrderRequest {
    /// Builds and signs the request for the order's grand total.
    pub fn for_order(
        order: &Order,
        app_trans_id: String,
        config: &WalletConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let items: Vec<serde_json::Value> = order
            .items()
            .iter()
            .map(|item| {
                serde_json::json!({
                    "itemid": item.menu_item_id.as_str(),
                    "itemname": item.name,
                    "itemprice": item.unit_total().amount(),
                    "itemquantity": item.quantity,
                })
            })
            .collect();
        let embed_data = serde_json::json!({
            "redirecturl": config.redirect_url(order.id()),
            "orderid": order.id(),
        });
        let app_user = order
            .customer_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| order.restaurant_id().to_string());

        let mut request = Self {
            app_id: config.app_id,
            app_user,
            app_trans_id,
            app_time: now.timestamp_millis(),
            amount: order.grand_total().amount(),
            item: serde_json::Value::Array(items).to_string(),
            embed_data: embed_data.to_string(),
            description: format!("Payment for order #{}", order.id()),
            bank_code: String::new(),
            callback_url: config.callback_url(order.id()),
            mac: String::new(),
        };
        request.mac = WalletSigner::new(config).sign_request(&request);
        request
    }

    /// The fields covered by the request MAC, in the provider's order.
    pub fn mac_input(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.app_id,
            self.app_trans_id,
            self.app_user,
            self.amount,
            self.app_time,
            self.embed_data,
            self.item
        )
    }
}

pub struct WalletSigner<'a> {
    key1: &'a str,
    key2: &'a str,
}

impl<'a> WalletSigner<'a> {
    pub fn new(config: &'a WalletConfig) -> Self {
        Self {
            key1: &config.key1,
            key2: &config.key2,
        }
    }

    pub fn sign_request(&self, request: &WalletOrderRequest) -> String {
        hex::encode(keyed(self.key1, request.mac_input().as_bytes()).finalize().into_bytes())
    }

    pub fn sign_callback(&self, data: &str) -> String {
        hex::encode(keyed(self.key2, data.as_bytes()).finalize().into_bytes())
    }

    /// Constant-time check of a callback MAC.
    pub fn verify_callback(&self, data: &str, mac: &str) -> bool {
        let Ok(expected) = hex::decode(mac.trim()) else {
            return false;
        };
        keyed(self.key2, data.as_bytes())
            .verify_slice(&expected)
            .is_ok()
    }
}

fn keyed(key: &str, message: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC takes keys of any length"));
    mac.update(message);
    mac
}

/// What the provider answers to an order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletOrderResponse {
    pub return_code: i32,
    pub return_message: String,
    pub order_url: Option<String>,
    pub zp_trans_token: Option<String>,
}

impl WalletOrderResponse {
    /// Return code 2 is the provider's hard failure.
    pub fn into_order_url(self) -> Result<String, GatewayError> {
        if self.return_code == 2 {
            return Err(GatewayError::rejected(self.return_message));
        }
        self.order_url
            .ok_or_else(|| GatewayError::rejected("response carried no order url"))
    }
}

/// Payment result the provider posts back, carried as a JSON string in
/// the callback's `data` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCallbackData {
    pub app_id: i64,
    pub app_trans_id: String,
    pub app_time: i64,
    pub app_user: String,
    pub amount: i64,
    pub embed_data: String,
    pub item: String,
    pub zp_trans_id: Option<i64>,
    pub server_time: Option<i64>,
    pub channel: Option<i32>,
    pub merchant_user_id: Option<String>,
}

/// Answer to a payment callback. The provider retries on code 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCallbackReply {
    pub return_code: i32,
    pub return_message: String,
}

impl WalletCallbackReply {
    pub fn success() -> Self {
        Self {
            return_code: 1,
            return_message: "success".to_string(),
        }
    }

    pub fn mac_mismatch() -> Self {
        Self {
            return_code: -1,
            return_message: "mac not equal".to_string(),
        }
    }

    pub fn retry(message: impl Into<String>) -> Self {
        Self {
            return_code: 0,
            return_message: message.into(),
        }
    }
}

/// Trait for wallet gateway operations.
#[async_trait]
pub trait WalletGateway: Send + Sync {
    async fn create_order(
        &self,
        request: &WalletOrderRequest,
    ) -> Result<WalletOrderResponse, GatewayError>;
}

#[derive(Debug)]
struct InMemoryWalletState {
    requests: Vec<WalletOrderRequest>,
    return_code: i32,
    unavailable: bool,
    delay: Option<Duration>,
}

impl Default for InMemoryWalletState {
    fn default() -> Self {
        Self {
            requests: Vec::new(),
            return_code: 1,
            unavailable: false,
            delay: None,
        }
    }
}

/// In-memory wallet gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWalletGateway {
    state: Arc<RwLock<InMemoryWalletState>>,
}

impl InMemoryWalletGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return code for subsequent order requests; 2 is a rejection.
    pub fn set_return_code(&self, code: i32) {
        self.write().return_code = code;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    pub fn requests(&self) -> Vec<WalletOrderRequest> {
        self.read().requests.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryWalletState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryWalletState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl WalletGateway for InMemoryWalletGateway {
    async fn create_order(
        &self,
        request: &WalletOrderRequest,
    ) -> Result<WalletOrderResponse, GatewayError> {
        let delay = self.read().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.write();
        if state.unavailable {
            return Err(GatewayError::unavailable("wallet provider unreachable"));
        }
        state.requests.push(request.clone());
        let return_code = state.return_code;
        Ok(WalletOrderResponse {
            return_code,
            return_message: if return_code == 2 { "failed" } else { "success" }.to_string(),
            order_url: (return_code != 2)
                .then(|| format!("https://wallet.test/pay/{}", request.app_trans_id)),
            zp_trans_token: None,
        })
    }
}
