//! City and area classification of a delivery address.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::GeoPoint;
use domain::order::DeliveryLocation;

use crate::error::GatewayError;

/// Trait for the location lookup service.
#[async_trait]
pub trait LocationLookup: Send + Sync {
    /// `None` when the point is outside every served city.
    async fn resolve(&self, geo: GeoPoint) -> Result<Option<DeliveryLocation>, GatewayError>;
}

#[derive(Debug)]
struct InMemoryLocationState {
    location: Option<DeliveryLocation>,
    unavailable: bool,
    delay: Option<Duration>,
}

/// In-memory location lookup for testing; every point resolves to the same
/// city and area.
#[derive(Debug, Clone)]
pub struct InMemoryLocationLookup {
    state: Arc<RwLock<InMemoryLocationState>>,
}

impl Default for InMemoryLocationLookup {
    fn default() -> Self {
        Self::resolving_to(DeliveryLocation {
            city_id: 79,
            city_name: "Ho Chi Minh".to_string(),
            area_id: 760,
            area_name: "District 1".to_string(),
        })
    }
}

impl InMemoryLocationLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolving_to(location: DeliveryLocation) -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryLocationState {
                location: Some(location),
                unavailable: false,
                delay: None,
            })),
        }
    }

    /// Makes every point resolve to no city.
    pub fn set_unknown(&self) {
        self.write().location = None;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryLocationState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LocationLookup for InMemoryLocationLookup {
    async fn resolve(&self, _geo: GeoPoint) -> Result<Option<DeliveryLocation>, GatewayError> {
        let (delay, unavailable, location) = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            (state.delay, state.unavailable, state.location.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if unavailable {
            return Err(GatewayError::unavailable("geocoder unreachable"));
        }
        Ok(location)
    }
}
