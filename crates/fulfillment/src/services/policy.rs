//! Per-restaurant auto-confirm policy lookup.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::order::RestaurantId;

use crate::error::{GatewayError, call_with_timeout};

/// Trait for the auto-confirm policy service.
#[async_trait]
pub trait AutoConfirmPolicy: Send + Sync {
    /// `None` when the service has no setting for the restaurant.
    async fn is_auto_confirm(
        &self,
        restaurant_id: RestaurantId,
    ) -> Result<Option<bool>, GatewayError>;
}

/// How a checkout advances once payment is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoConfirmDecision {
    Enabled,
    Disabled,
    /// The policy service failed or had no answer. Orders are auto-confirmed
    /// rather than left waiting on a degraded dependency.
    PolicyUnavailable,
}

impl AutoConfirmDecision {
    /// Asks the policy service within `timeout`, failing open.
    pub async fn resolve(
        policy: &dyn AutoConfirmPolicy,
        restaurant_id: RestaurantId,
        timeout: Duration,
    ) -> Self {
        match call_with_timeout(timeout, policy.is_auto_confirm(restaurant_id)).await {
            Ok(Some(true)) => AutoConfirmDecision::Enabled,
            Ok(Some(false)) => AutoConfirmDecision::Disabled,
            Ok(None) => {
                tracing::warn!(%restaurant_id, "No auto-confirm setting, assuming auto-confirm");
                AutoConfirmDecision::PolicyUnavailable
            }
            Err(error) => {
                tracing::warn!(%restaurant_id, %error, "Policy lookup failed, assuming auto-confirm");
                AutoConfirmDecision::PolicyUnavailable
            }
        }
    }

    pub fn auto_confirms(&self) -> bool {
        !matches!(self, AutoConfirmDecision::Disabled)
    }
}

#[derive(Debug, Default)]
struct InMemoryPolicyState {
    settings: HashMap<RestaurantId, bool>,
    unavailable: bool,
    delay: Option<Duration>,
}

/// In-memory policy service for testing. Restaurants without a setting
/// get no answer.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAutoConfirmPolicy {
    state: Arc<RwLock<InMemoryPolicyState>>,
}

impl InMemoryAutoConfirmPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, restaurant_id: RestaurantId, auto_confirm: bool) {
        self.write().settings.insert(restaurant_id, auto_confirm);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryPolicyState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AutoConfirmPolicy for InMemoryAutoConfirmPolicy {
    async fn is_auto_confirm(
        &self,
        restaurant_id: RestaurantId,
    ) -> Result<Option<bool>, GatewayError> {
        let (delay, unavailable, setting) = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            (
                state.delay,
                state.unavailable,
                state.settings.get(&restaurant_id).copied(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if unavailable {
            return Err(GatewayError::unavailable("policy service unreachable"));
        }
        Ok(setting)
    }
}
