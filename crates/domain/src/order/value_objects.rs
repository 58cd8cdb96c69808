//! Value objects for the order domain.

use common::uuid_id;
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

uuid_id!(
    /// Customer placing a marketplace order.
    CustomerId
);
uuid_id!(
    /// Driver carrying a delivery.
    DriverId
);
uuid_id!(RestaurantId);
uuid_id!(
    /// Restaurant staff member acting on an order.
    CashierId
);
uuid_id!(OrderItemId);
uuid_id!(OrderItemToppingId);
uuid_id!(InvoiceId);
uuid_id!(PaymentId);

/// Catalog identifier of a menu item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MenuItemId(String);

impl MenuItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MenuItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MenuItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Catalog identifier of a topping option.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToppingItemId(String);

impl ToppingItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ToppingItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Amount in whole Vietnamese dong. VND has no minor unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub fn vnd(amount: i64) -> Self {
        Self(amount)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn amount(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0 * i64::from(quantity))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} VND", self.0)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Name, phone and address of one end of a delivery.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    pub phone: String,
    pub address: Option<String>,
    pub geo: Option<GeoPoint>,
}

impl ContactInfo {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            address: None,
            geo: None,
        }
    }

    pub fn located(mut self, address: impl Into<String>, geo: GeoPoint) -> Self {
        self.address = Some(address.into());
        self.geo = Some(geo);
        self
    }

    /// Both a street address and coordinates are known.
    pub fn is_resolved(&self) -> bool {
        self.address.is_some() && self.geo.is_some()
    }
}

/// City and area a delivery address was classified into at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLocation {
    pub city_id: i64,
    pub city_name: String,
    pub area_id: i64,
    pub area_name: String,
}
