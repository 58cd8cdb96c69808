//! Pure pricing formulas: subtotals, shipping, grand total and delivery ETA.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::ShippingTiers;
use crate::order::{Delivery, Money, OrderItem};

/// Tunable pricing constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub base_shipping_fee: Money,
    pub first_tier_meters: u32,
    pub extra_fee_per_km: Money,
    pub avg_minutes_per_km: u32,
    pub minimum_delivery_minutes: u32,
    /// Kitchen time assumed before a driver can leave.
    pub preparation_minutes: u32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_shipping_fee: Money::vnd(15_000),
            first_tier_meters: 3_000,
            extra_fee_per_km: Money::vnd(5_000),
            avg_minutes_per_km: 10,
            minimum_delivery_minutes: 30,
            preparation_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn shipping_tiers(&self) -> ShippingTiers {
        ShippingTiers {
            base_fee: self.config.base_shipping_fee,
            first_tier_meters: self.config.first_tier_meters,
            extra_fee_per_km: self.config.extra_fee_per_km,
        }
    }

    /// Σ `(unit price + Σ topping price × topping qty) × qty` over all lines.
    pub fn sub_total(&self, items: &[OrderItem]) -> Money {
        items
            .iter()
            .map(|item| item.unit_total().multiply(item.quantity))
            .sum()
    }

    pub fn shipping_fee(&self, distance_meters: u32) -> Money {
        self.shipping_tiers().fee_for(distance_meters)
    }

    /// Shipping is charged only once the customer address is resolved.
    pub fn grand_total(&self, sub_total: Money, delivery: Option<&Delivery>) -> Money {
        match delivery {
            Some(delivery) if delivery.has_resolved_address() => {
                sub_total + delivery.shipping_fee
            }
            _ => sub_total,
        }
    }

    pub fn expected_delivery_time(
        &self,
        order_time: DateTime<Utc>,
        distance_meters: u32,
    ) -> DateTime<Utc> {
        let travel_minutes =
            f64::from(distance_meters) / 1000.0 * f64::from(self.config.avg_minutes_per_km);
        let minutes = (f64::from(self.config.preparation_minutes) + travel_minutes)
            .max(f64::from(self.config.minimum_delivery_minutes));
        order_time + Duration::seconds((minutes * 60.0).round() as i64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::geo::GeoPoint;
    use crate::order::{ContactInfo, CustomerId, NewOrderItem};

    fn engine() -> PricingEngine {
        PricingEngine::default()
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 19, 12, 0, 0).unwrap()
    }

    fn delivery(resolved: bool, fee: i64) -> Delivery {
        let mut customer = ContactInfo::new("Lan", "0901000000");
        if resolved {
            customer = customer.located("1 Le Loi", GeoPoint::new(10.77, 106.70).unwrap());
        }
        let mut delivery =
            Delivery::new(CustomerId::new(), customer, ContactInfo::new("Pho 24", "0283"));
        delivery.shipping_fee = Money::vnd(fee);
        delivery
    }

    #[test]
    fn sub_total_sums_lines_with_toppings() {
        let items = vec![
            NewOrderItem::new("pho", "Pho", Money::vnd(45_000), 2)
                .with_topping("egg", "Egg", Money::vnd(5_000), 2)
                .into_line(),
            NewOrderItem::new("tea", "Iced tea", Money::vnd(10_000), 1).into_line(),
        ];
        // (45000 + 2 × 5000) × 2 + 10000
        assert_eq!(engine().sub_total(&items), Money::vnd(120_000));
        assert_eq!(engine().sub_total(&[]), Money::zero());
    }

    #[test]
    fn grand_total_adds_shipping_only_for_resolved_address() {
        let sub = Money::vnd(100_000);
        assert_eq!(
            engine().grand_total(sub, Some(&delivery(true, 20_000))),
            Money::vnd(120_000)
        );
        assert_eq!(
            engine().grand_total(sub, Some(&delivery(false, 20_000))),
            sub
        );
        assert_eq!(engine().grand_total(sub, None), sub);
    }

    #[test]
    fn shipping_uses_configured_tiers() {
        assert_eq!(engine().shipping_fee(2_500), Money::vnd(15_000));
        assert_eq!(engine().shipping_fee(4_000), Money::vnd(20_000));

        let custom = PricingEngine::new(PricingConfig {
            base_shipping_fee: Money::vnd(10_000),
            first_tier_meters: 2_000,
            extra_fee_per_km: Money::vnd(3_000),
            ..PricingConfig::default()
        });
        assert_eq!(custom.shipping_fee(2_000), Money::vnd(10_000));
        assert_eq!(custom.shipping_fee(3_500), Money::vnd(16_000));
    }

    #[test]
    fn short_trips_get_the_minimum_delivery_window() {
        // 15 min prep + 1 km × 10 min = 25 min, below the 30 min floor.
        let eta = engine().expected_delivery_time(noon(), 1_000);
        assert_eq!(eta, noon() + Duration::minutes(30));
    }

    #[test]
    fn long_trips_scale_with_distance() {
        // 15 min prep + 4.5 km × 10 min = 60 min.
        let eta = engine().expected_delivery_time(noon(), 4_500);
        assert_eq!(eta, noon() + Duration::minutes(60));
    }
}
