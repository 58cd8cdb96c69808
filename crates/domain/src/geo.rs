//! Great-circle distance and distance-tiered shipping fees.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::Money;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Coordinates outside the valid latitude/longitude range.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("invalid location: latitude {latitude}, longitude {longitude}")]
pub struct InvalidLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// A validated WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Fails unless |latitude| <= 90 and |longitude| <= 180.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidLocation> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && latitude.abs() <= 90.0
            && longitude.abs() <= 180.0;
        if !valid {
            return Err(InvalidLocation {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Re-checks a point that may have bypassed `new` (e.g. deserialized).
    pub fn validate(&self) -> Result<Self, InvalidLocation> {
        Self::new(self.latitude, self.longitude)
    }
}

/// Haversine distance in meters, unrounded.
pub fn haversine_raw_meters(from: GeoPoint, to: GeoPoint) -> f64 {
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.latitude.to_radians().cos()
            * to.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Haversine distance rounded to the nearest 100 m, which absorbs GPS
/// jitter between otherwise identical addresses.
pub fn haversine_meters(from: GeoPoint, to: GeoPoint) -> u32 {
    let raw = haversine_raw_meters(from, to);
    ((raw / 100.0).round() * 100.0) as u32
}

/// Shipping fee schedule: a flat fee for the first tier, then a per-km
/// surcharge for every started kilometre beyond it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingTiers {
    pub base_fee: Money,
    pub first_tier_meters: u32,
    pub extra_fee_per_km: Money,
}

impl ShippingTiers {
    pub fn fee_for(&self, distance_meters: u32) -> Money {
        if distance_meters <= self.first_tier_meters {
            return self.base_fee;
        }
        let extra_km = (distance_meters - self.first_tier_meters).div_ceil(1000);
        self.base_fee + self.extra_fee_per_km.multiply(extra_km)
    }
}
