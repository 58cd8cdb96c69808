//! Checkout and fulfillment settings.

use std::time::Duration;

use domain::order::PaymentMethod;

/// Settings shared by the checkout orchestrator and the state machine.
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    /// Payment methods a restaurant may void. Wallet payments are left out
    /// while the provider holds the funds.
    pub voidable_methods: Vec<PaymentMethod>,
    /// VND → USD rate used when the live lookup fails.
    pub fallback_usd_rate: f64,
    /// Marketplace cut of the item total, as a fraction.
    pub platform_fee_percent: f64,
    /// Bound on every gateway, policy and location call.
    pub collaborator_timeout: Duration,
    pub feedback_timeout: Duration,
    pub paypal: PayPalConfig,
    pub wallet: WalletConfig,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            voidable_methods: vec![PaymentMethod::Cod, PaymentMethod::PayPal],
            fallback_usd_rate: 0.000043,
            platform_fee_percent: 0.1,
            collaborator_timeout: Duration::from_secs(5),
            feedback_timeout: Duration::from_secs(3),
            paypal: PayPalConfig::default(),
            wallet: WalletConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PayPalConfig {
    /// The marketplace's own merchant account; receives the platform fee.
    pub partner_merchant_id: String,
    /// REST client id, the issuer of the auth assertion on refunds.
    pub client_id: String,
}

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub app_id: i64,
    /// Signs outgoing order requests.
    pub key1: String,
    /// Verifies incoming payment callbacks.
    pub key2: String,
    /// The order id is appended to build the per-order callback URL.
    pub callback_url_base: String,
    pub redirect_url_base: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            app_id: 2553,
            key1: String::new(),
            key2: String::new(),
            callback_url_base: "http://localhost:3000/orders".to_string(),
            redirect_url_base: "http://localhost:8080/orders".to_string(),
        }
    }
}

impl WalletConfig {
    pub fn callback_url(&self, order_id: impl std::fmt::Display) -> String {
        format!(
            "{}/{order_id}/wallet-callback",
            self.callback_url_base.trim_end_matches('/')
        )
    }

    pub fn redirect_url(&self, order_id: impl std::fmt::Display) -> String {
        format!("{}/{order_id}", self.redirect_url_base.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = FulfillmentConfig::default();
        assert_eq!(
            config.voidable_methods,
            vec![PaymentMethod::Cod, PaymentMethod::PayPal]
        );
        assert_eq!(config.collaborator_timeout, Duration::from_secs(5));
        assert_eq!(config.feedback_timeout, Duration::from_secs(3));
        assert!((config.fallback_usd_rate - 0.000043).abs() < f64::EPSILON);
    }

    #[test]
    fn wallet_urls_ignore_trailing_slash() {
        let wallet = WalletConfig {
            callback_url_base: "https://api.example.vn/orders/".to_string(),
            ..WalletConfig::default()
        };
        assert_eq!(
            wallet.callback_url("abc"),
            "https://api.example.vn/orders/abc/wallet-callback"
        );
        assert_eq!(wallet.redirect_url("abc"), "http://localhost:8080/orders/abc");
    }
}
