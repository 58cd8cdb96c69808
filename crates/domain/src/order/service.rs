//! Cart mutations on DRAFT orders.

use chrono::Utc;
use order_store::DocumentStore;

use crate::error::DomainError;
use crate::pricing::PricingEngine;
use crate::repository::{OrderRef, OrderStore, UnitOfWork};

use super::{
    AddItem, CartOutcome, ChangeItemQuantity, CreateDraftOrder, CustomerId, DraftChannel, Order,
    OrderId, RemoveItem, RestaurantId, UpdateDeliveryAddress,
};

/// Each call runs in its own unit of work; a failure anywhere leaves the
/// stored order untouched.
pub struct CartService<S: DocumentStore> {
    orders: OrderStore<S>,
    pricing: PricingEngine,
}

impl<S: DocumentStore> CartService<S> {
    pub fn new(orders: OrderStore<S>, pricing: PricingEngine) -> Self {
        Self { orders, pricing }
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    /// Opens a cart with its first line.
    ///
    /// A customer has at most one open cart per restaurant: when one exists
    /// the line is added to it and that cart is returned.
    #[tracing::instrument(skip(self, cmd), fields(restaurant_id = %cmd.restaurant_id))]
    pub async fn create_draft_order(&self, cmd: CreateDraftOrder) -> Result<Order, DomainError> {
        let now = Utc::now();
        let mut uow = self.orders.begin().await?;

        if let DraftChannel::Marketplace { customer_id, .. } = &cmd.channel {
            let open = uow
                .find_by_ref(OrderRef::Draft {
                    customer_id: *customer_id,
                    restaurant_id: cmd.restaurant_id,
                })
                .await?;
            if let Some(mut order) = open {
                let item_id = order.add_item(cmd.item, &self.pricing, now)?;
                uow.save(&mut order).await?;
                uow.commit().await?;

                metrics::counter!("cart_mutations_total", "operation" => "add_item").increment(1);
                tracing::info!(order_id = %order.id(), %item_id, "Item added to the open draft order");
                return Ok(order);
            }
        }

        let mut order = Order::create_draft(cmd, &self.pricing, now)?;
        uow.save(&mut order).await?;
        uow.commit().await?;

        metrics::counter!("cart_mutations_total", "operation" => "create_draft").increment(1);
        tracing::info!(order_id = %order.id(), "Draft order created");
        Ok(order)
    }

    /// The customer's open cart at a restaurant, if any.
    #[tracing::instrument(skip(self))]
    pub async fn find_draft_order(
        &self,
        customer_id: CustomerId,
        restaurant_id: RestaurantId,
    ) -> Result<Option<Order>, DomainError> {
        let mut uow = self.orders.begin().await?;
        uow.find_by_ref(OrderRef::Draft {
            customer_id,
            restaurant_id,
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, DomainError> {
        let mut uow = self.orders.begin().await?;
        uow.load(order_id).await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn add_item(&self, cmd: AddItem) -> Result<Order, DomainError> {
        let mut uow = self.orders.begin().await?;
        let mut order = uow.require(cmd.order_id).await?;

        let item_id = order.add_item(cmd.item, &self.pricing, Utc::now())?;
        uow.save(&mut order).await?;
        uow.commit().await?;

        metrics::counter!("cart_mutations_total", "operation" => "add_item").increment(1);
        tracing::debug!(%item_id, "Item added");
        Ok(order)
    }

    /// Returns `None` when the change emptied the cart and the order was
    /// deleted.
    #[tracing::instrument(skip(self))]
    pub async fn change_item_quantity(
        &self,
        cmd: ChangeItemQuantity,
    ) -> Result<Option<Order>, DomainError> {
        let mut uow = self.orders.begin().await?;
        let mut order = uow.require(cmd.order_id).await?;

        let outcome =
            order.change_item_quantity(cmd.order_item_id, cmd.change, &self.pricing, Utc::now())?;
        let order = self.finish(uow, order, outcome).await?;

        metrics::counter!("cart_mutations_total", "operation" => "change_quantity").increment(1);
        Ok(order)
    }

    /// Returns `None` when the last line was removed and the order deleted.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, cmd: RemoveItem) -> Result<Option<Order>, DomainError> {
        let mut uow = self.orders.begin().await?;
        let mut order = uow.require(cmd.order_id).await?;

        let outcome = order.remove_item(cmd.order_item_id, &self.pricing, Utc::now())?;
        let order = self.finish(uow, order, outcome).await?;

        metrics::counter!("cart_mutations_total", "operation" => "remove_item").increment(1);
        Ok(order)
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn update_delivery_address(
        &self,
        cmd: UpdateDeliveryAddress,
    ) -> Result<Order, DomainError> {
        let mut uow = self.orders.begin().await?;
        let mut order = uow.require(cmd.order_id).await?;

        order.update_delivery_address(cmd.address, cmd.geo, &self.pricing, Utc::now())?;
        uow.save(&mut order).await?;
        uow.commit().await?;

        metrics::counter!("cart_mutations_total", "operation" => "update_address").increment(1);
        Ok(order)
    }

    async fn finish(
        &self,
        mut uow: UnitOfWork<S::Tx>,
        mut order: Order,
        outcome: CartOutcome,
    ) -> Result<Option<Order>, DomainError> {
        match outcome {
            CartOutcome::Updated => {
                uow.save(&mut order).await?;
                uow.commit().await?;
                Ok(Some(order))
            }
            CartOutcome::Emptied => {
                uow.delete(order.id()).await?;
                uow.commit().await?;
                tracing::info!(order_id = %order.id(), "Last item removed, draft order deleted");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use order_store::InMemoryDocumentStore;

    use super::*;
    use crate::geo::GeoPoint;
    use crate::order::{CashierId, ContactInfo, Money, NewOrderItem, OrderError, OrderItemId};

    fn service() -> (CartService<InMemoryDocumentStore>, InMemoryDocumentStore) {
        let store = InMemoryDocumentStore::new();
        let service = CartService::new(OrderStore::new(store.clone()), PricingEngine::default());
        (service, store)
    }

    fn draft_cmd(customer_id: CustomerId, restaurant_id: RestaurantId) -> CreateDraftOrder {
        CreateDraftOrder::marketplace(
            restaurant_id,
            customer_id,
            ContactInfo::new("Lan", "0901000000"),
            ContactInfo::new("Pho 24", "0283000000")
                .located("5 Dong Khoi", GeoPoint::new(10.7769, 106.7009).unwrap()),
            NewOrderItem::new("pho-bo", "Pho bo", Money::vnd(45_000), 1),
        )
    }

    #[tokio::test]
    async fn create_then_find_draft() {
        let (service, _) = service();
        let customer_id = CustomerId::new();
        let restaurant_id = RestaurantId::new();

        let order = service
            .create_draft_order(draft_cmd(customer_id, restaurant_id))
            .await
            .unwrap();

        let found = service
            .find_draft_order(customer_id, restaurant_id)
            .await
            .unwrap();
        assert_eq!(found.map(|o| o.id()), Some(order.id()));

        let other = service
            .find_draft_order(CustomerId::new(), restaurant_id)
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn second_draft_for_the_same_restaurant_joins_the_open_cart() {
        let (service, store) = service();
        let customer_id = CustomerId::new();
        let restaurant_id = RestaurantId::new();

        let first = service
            .create_draft_order(draft_cmd(customer_id, restaurant_id))
            .await
            .unwrap();
        let mut cmd = draft_cmd(customer_id, restaurant_id);
        cmd.item = NewOrderItem::new("tea", "Iced tea", Money::vnd(10_000), 2);
        let second = service.create_draft_order(cmd).await.unwrap();

        assert_eq!(second.id(), first.id());
        assert_eq!(second.items().len(), 2);
        assert_eq!(second.sub_total(), Money::vnd(65_000));
        assert_eq!(store.document_count().await, 1);

        let found = service
            .find_draft_order(customer_id, restaurant_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, second);
    }

    #[tokio::test]
    async fn counter_drafts_are_always_new() {
        let (service, store) = service();
        let restaurant_id = RestaurantId::new();
        let cashier_id = CashierId::new();
        let item = || NewOrderItem::new("pho-bo", "Pho bo", Money::vnd(45_000), 1);

        let first = service
            .create_draft_order(CreateDraftOrder::point_of_sale(restaurant_id, cashier_id, item()))
            .await
            .unwrap();
        let second = service
            .create_draft_order(CreateDraftOrder::point_of_sale(restaurant_id, cashier_id, item()))
            .await
            .unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(store.document_count().await, 2);
    }

    #[tokio::test]
    async fn add_item_persists() {
        let (service, _) = service();
        let order = service
            .create_draft_order(draft_cmd(CustomerId::new(), RestaurantId::new()))
            .await
            .unwrap();

        let tea = NewOrderItem::new("tea", "Iced tea", Money::vnd(10_000), 2);
        service.add_item(AddItem::new(order.id(), tea)).await.unwrap();

        let stored = service.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.items().len(), 2);
        assert_eq!(stored.sub_total(), Money::vnd(65_000));
    }

    #[tokio::test]
    async fn emptying_the_cart_deletes_the_order() {
        let (service, store) = service();
        let order = service
            .create_draft_order(draft_cmd(CustomerId::new(), RestaurantId::new()))
            .await
            .unwrap();
        let line = order.items()[0].id;

        let result = service
            .change_item_quantity(ChangeItemQuantity::decrement(order.id(), line))
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(store.document_count().await, 0);
    }

    #[tokio::test]
    async fn failed_mutation_leaves_store_untouched() {
        let (service, _) = service();
        let order = service
            .create_draft_order(draft_cmd(CustomerId::new(), RestaurantId::new()))
            .await
            .unwrap();

        let err = service
            .remove_item(RemoveItem::new(order.id(), OrderItemId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Order(OrderError::ItemNotFound(_))));

        let stored = service.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn address_update_on_missing_order_is_not_found() {
        let (service, _) = service();
        let geo = GeoPoint::new(10.8, 106.7).unwrap();
        let err = service
            .update_delivery_address(UpdateDeliveryAddress::new(OrderId::new(), "1 Le Loi", geo))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::OrderNotFound(_)));
    }
}
