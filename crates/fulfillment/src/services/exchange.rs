//! VND → USD exchange rate lookup.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{GatewayError, call_with_timeout};

#[async_trait]
pub trait ExchangeRates: Send + Sync {
    /// USD per VND.
    async fn vnd_to_usd(&self) -> Result<f64, GatewayError>;
}

/// Live rate, or `fallback` when the lookup fails, times out or returns
/// something that is not a positive number.
pub async fn rate_or_fallback(rates: &dyn ExchangeRates, timeout: Duration, fallback: f64) -> f64 {
    match call_with_timeout(timeout, rates.vnd_to_usd()).await {
        Ok(rate) if rate.is_finite() && rate > 0.0 => rate,
        Ok(rate) => {
            tracing::warn!(rate, fallback, "Unusable exchange rate, using fallback");
            fallback
        }
        Err(error) => {
            tracing::warn!(%error, fallback, "Exchange rate lookup failed, using fallback");
            fallback
        }
    }
}

/// In-memory rate source for testing. Unavailable until a rate is set.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExchangeRates {
    rate: Arc<RwLock<Option<f64>>>,
}

impl InMemoryExchangeRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate(&self, rate: Option<f64>) {
        *self.rate.write().unwrap_or_else(PoisonError::into_inner) = rate;
    }
}

#[async_trait]
impl ExchangeRates for InMemoryExchangeRates {
    async fn vnd_to_usd(&self) -> Result<f64, GatewayError> {
        let rate = *self.rate.read().unwrap_or_else(PoisonError::into_inner);
        rate.ok_or_else(|| GatewayError::unavailable("exchange rate service unreachable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn live_rate_wins() {
        let rates = InMemoryExchangeRates::new();
        rates.set_rate(Some(0.00004));
        assert_eq!(rate_or_fallback(&rates, TIMEOUT, 0.000043).await, 0.00004);
    }

    #[tokio::test]
    async fn falls_back_when_missing_or_nonsense() {
        let rates = InMemoryExchangeRates::new();
        assert_eq!(rate_or_fallback(&rates, TIMEOUT, 0.000043).await, 0.000043);

        rates.set_rate(Some(0.0));
        assert_eq!(rate_or_fallback(&rates, TIMEOUT, 0.000043).await, 0.000043);
    }
}
