//! Order lines and their toppings.

use serde::{Deserialize, Serialize};

use super::{ItemState, MenuItemId, Money, OrderItemId, OrderItemToppingId, ToppingItemId};

/// A topping chosen on a line, priced at the time it was ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemTopping {
    pub id: OrderItemToppingId,
    pub topping_item_id: ToppingItemId,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
    pub state: ItemState,
}

impl OrderItemTopping {
    pub fn total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub menu_item_id: MenuItemId,
    pub name: String,
    /// Unit price at the time of ordering, toppings excluded.
    pub price: Money,
    pub quantity: u32,
    /// `(price + toppings) × quantity`, kept in sync by the aggregate.
    pub sub_total: Money,
    pub discount: Money,
    pub state: ItemState,
    pub toppings: Vec<OrderItemTopping>,
}

impl OrderItem {
    /// Price of one unit including its toppings.
    pub fn unit_total(&self) -> Money {
        self.price + self.toppings.iter().map(OrderItemTopping::total).sum::<Money>()
    }

    pub(crate) fn refresh_sub_total(&mut self) {
        self.sub_total = self.unit_total().multiply(self.quantity);
    }

    /// Whether `item` describes the same line: same menu item and the same
    /// multiset of (topping, quantity) pairs, in any order.
    pub fn is_same_line(&self, item: &NewOrderItem) -> bool {
        self.menu_item_id == item.menu_item_id
            && topping_signature(self.toppings.iter().map(|t| (&t.topping_item_id, t.quantity)))
                == topping_signature(item.toppings.iter().map(|t| (&t.topping_item_id, t.quantity)))
    }
}

fn topping_signature<'a>(
    toppings: impl Iterator<Item = (&'a ToppingItemId, u32)>,
) -> Vec<(&'a ToppingItemId, u32)> {
    let mut signature: Vec<_> = toppings.collect();
    signature.sort();
    signature
}

/// A topping as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTopping {
    pub topping_item_id: ToppingItemId,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
}

/// A line as submitted by the caller, before it gets ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub menu_item_id: MenuItemId,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
    #[serde(default)]
    pub toppings: Vec<NewTopping>,
}

impl NewOrderItem {
    pub fn new(
        menu_item_id: impl Into<MenuItemId>,
        name: impl Into<String>,
        price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            menu_item_id: menu_item_id.into(),
            name: name.into(),
            price,
            quantity,
            toppings: Vec::new(),
        }
    }

    pub fn with_topping(
        mut self,
        topping_item_id: impl Into<ToppingItemId>,
        name: impl Into<String>,
        price: Money,
        quantity: u32,
    ) -> Self {
        self.toppings.push(NewTopping {
            topping_item_id: topping_item_id.into(),
            name: name.into(),
            price,
            quantity,
        });
        self
    }

    pub(crate) fn into_line(self) -> OrderItem {
        let mut line = OrderItem {
            id: OrderItemId::new(),
            menu_item_id: self.menu_item_id,
            name: self.name,
            price: self.price,
            quantity: self.quantity,
            sub_total: Money::zero(),
            discount: Money::zero(),
            state: ItemState::InStock,
            toppings: self
                .toppings
                .into_iter()
                .map(|t| OrderItemTopping {
                    id: OrderItemToppingId::new(),
                    topping_item_id: t.topping_item_id,
                    name: t.name,
                    price: t.price,
                    quantity: t.quantity,
                    state: ItemState::InStock,
                })
                .collect(),
        };
        line.refresh_sub_total();
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pho() -> NewOrderItem {
        NewOrderItem::new("pho-bo", "Pho bo", Money::vnd(45_000), 2)
            .with_topping("egg", "Egg", Money::vnd(5_000), 1)
            .with_topping("beef", "Extra beef", Money::vnd(20_000), 2)
    }

    #[test]
    fn sub_total_includes_toppings_times_quantity() {
        let line = pho().into_line();
        // (45000 + 5000 + 2 × 20000) × 2
        assert_eq!(line.unit_total(), Money::vnd(90_000));
        assert_eq!(line.sub_total, Money::vnd(180_000));
    }

    #[test]
    fn topping_order_does_not_matter() {
        let line = pho().into_line();
        let reordered = NewOrderItem::new("pho-bo", "Pho bo", Money::vnd(45_000), 1)
            .with_topping("beef", "Extra beef", Money::vnd(20_000), 2)
            .with_topping("egg", "Egg", Money::vnd(5_000), 1);
        assert!(line.is_same_line(&reordered));
    }

    #[test]
    fn topping_quantity_matters() {
        let line = pho().into_line();
        let different = NewOrderItem::new("pho-bo", "Pho bo", Money::vnd(45_000), 1)
            .with_topping("egg", "Egg", Money::vnd(5_000), 1)
            .with_topping("beef", "Extra beef", Money::vnd(20_000), 1);
        assert!(!line.is_same_line(&different));
    }

    #[test]
    fn no_toppings_matches_only_no_toppings() {
        let plain = NewOrderItem::new("pho-bo", "Pho bo", Money::vnd(45_000), 1);
        let line = plain.clone().into_line();
        assert!(line.is_same_line(&plain));
        assert!(!line.is_same_line(&pho()));
        assert!(!pho().into_line().is_same_line(&plain));
    }

    #[test]
    fn different_menu_item_is_a_different_line() {
        let line = pho().into_line();
        let mut other = pho();
        other.menu_item_id = MenuItemId::new("bun-bo");
        assert!(!line.is_same_line(&other));
    }
}
