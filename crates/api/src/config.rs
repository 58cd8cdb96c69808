//! Application configuration loaded from environment variables.

use std::time::Duration;

use domain::PricingConfig;
use domain::order::Money;
use fulfillment::FulfillmentConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection; the in-memory store is used when unset
/// - `BASE_SHIPPING_FEE`, `FIRST_TIER_METERS`, `EXTRA_FEE_PER_KM`: shipping tiers
/// - `COLLABORATOR_TIMEOUT_MS`, `FEEDBACK_TIMEOUT_MS`: outbound call bounds
/// - `PAYPAL_PARTNER_MERCHANT_ID`, `PAYPAL_CLIENT_ID`
/// - `WALLET_APP_ID`, `WALLET_KEY1`, `WALLET_KEY2`, `WALLET_CALLBACK_URL`,
///   `WALLET_REDIRECT_URL`
///
/// Unset or unparsable values fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub pricing: PricingConfig,
    pub fulfillment: FulfillmentConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| var(key).and_then(|v| v.trim().parse::<i64>().ok());
        let mut config = Self::default();

        if let Some(host) = var("HOST") {
            config.host = host;
        }
        if let Some(port) = var("PORT").and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Some(level) = var("RUST_LOG") {
            config.log_level = level;
        }
        config.database_url = var("DATABASE_URL").filter(|url| !url.is_empty());

        let pricing = &mut config.pricing;
        if let Some(fee) = parsed("BASE_SHIPPING_FEE") {
            pricing.base_shipping_fee = Money::vnd(fee);
        }
        if let Some(meters) = parsed("FIRST_TIER_METERS").and_then(|m| u32::try_from(m).ok()) {
            pricing.first_tier_meters = meters;
        }
        if let Some(fee) = parsed("EXTRA_FEE_PER_KM") {
            pricing.extra_fee_per_km = Money::vnd(fee);
        }

        let fulfillment = &mut config.fulfillment;
        if let Some(ms) = parsed("COLLABORATOR_TIMEOUT_MS").and_then(|ms| u64::try_from(ms).ok()) {
            fulfillment.collaborator_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed("FEEDBACK_TIMEOUT_MS").and_then(|ms| u64::try_from(ms).ok()) {
            fulfillment.feedback_timeout = Duration::from_millis(ms);
        }
        if let Some(id) = var("PAYPAL_PARTNER_MERCHANT_ID") {
            fulfillment.paypal.partner_merchant_id = id;
        }
        if let Some(id) = var("PAYPAL_CLIENT_ID") {
            fulfillment.paypal.client_id = id;
        }

        let wallet = &mut fulfillment.wallet;
        if let Some(app_id) = parsed("WALLET_APP_ID") {
            wallet.app_id = app_id;
        }
        if let Some(key) = var("WALLET_KEY1") {
            wallet.key1 = key;
        }
        if let Some(key) = var("WALLET_KEY2") {
            wallet.key2 = key;
        }
        if let Some(url) = var("WALLET_CALLBACK_URL") {
            wallet.callback_url_base = url;
        }
        if let Some(url) = var("WALLET_REDIRECT_URL") {
            wallet.redirect_url_base = url;
        }

        config
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            pricing: PricingConfig::default(),
            fulfillment: FulfillmentConfig::default(),
        }
    }
}
