//! Transactional persistence of the order cluster.
//!
//! The order, its lines, delivery, invoice, payment and gateway sub-payment
//! live in one document, so loading or saving any of them loads or saves
//! all of them. A [`UnitOfWork`] wraps one store transaction: dropping it
//! without calling [`UnitOfWork::commit`] rolls everything back.

use order_store::{Document, DocumentStore, Transaction, Version};

use crate::error::DomainError;
use crate::order::{CustomerId, DriverId, ORDER_AGGREGATE_TYPE, Order, OrderId, RestaurantId};

/// Secondary references an order can be found by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRef<'a> {
    /// The customer's open cart at a restaurant.
    Draft {
        customer_id: CustomerId,
        restaurant_id: RestaurantId,
    },
    PayPalOrder(&'a str),
    Capture(&'a str),
    Refund(&'a str),
    WalletTransaction(&'a str),
}

impl OrderRef<'_> {
    pub fn key(&self) -> String {
        match self {
            OrderRef::Draft {
                customer_id,
                restaurant_id,
            } => format!("draft:{customer_id}:{restaurant_id}"),
            OrderRef::PayPalOrder(id) => format!("paypal-order:{id}"),
            OrderRef::Capture(id) => format!("capture:{id}"),
            OrderRef::Refund(id) => format!("refund:{id}"),
            OrderRef::WalletTransaction(id) => format!("wallet-trans:{id}"),
        }
    }
}

/// Listings an order appears in. Unlike an [`OrderRef`], many orders share
/// one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderIndex {
    Restaurant(RestaurantId),
    Customer(CustomerId),
    Driver(DriverId),
}

impl OrderIndex {
    pub fn key(&self) -> String {
        match self {
            OrderIndex::Restaurant(id) => format!("restaurant:{id}"),
            OrderIndex::Customer(id) => format!("customer:{id}"),
            OrderIndex::Driver(id) => format!("driver:{id}"),
        }
    }
}

/// Entry point for order persistence.
#[derive(Debug, Clone)]
pub struct OrderStore<S> {
    store: S,
}

impl<S: DocumentStore> OrderStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Opens a unit of work. Only one should be open per task at a time.
    pub async fn begin(&self) -> Result<UnitOfWork<S::Tx>, DomainError> {
        Ok(UnitOfWork {
            tx: self.store.begin().await?,
        })
    }
}

/// One transaction over the order documents.
pub struct UnitOfWork<T> {
    tx: T,
}

impl<T: Transaction> UnitOfWork<T> {
    pub async fn load(&mut self, id: OrderId) -> Result<Option<Order>, DomainError> {
        match self.tx.load(id).await? {
            Some(document) => Ok(Some(hydrate(document)?)),
            None => Ok(None),
        }
    }

    /// Like [`load`](Self::load), but a missing order is an error.
    pub async fn require(&mut self, id: OrderId) -> Result<Order, DomainError> {
        self.load(id).await?.ok_or(DomainError::OrderNotFound(id))
    }

    pub async fn find_by_ref(
        &mut self,
        order_ref: OrderRef<'_>,
    ) -> Result<Option<Order>, DomainError> {
        match self.tx.find_by_key(&order_ref.key()).await? {
            Some(document) => Ok(Some(hydrate(document)?)),
            None => Ok(None),
        }
    }

    /// Every order listed under `index`, in no particular order.
    pub async fn list(&mut self, index: OrderIndex) -> Result<Vec<Order>, DomainError> {
        self.tx
            .find_all_by_index(&index.key())
            .await?
            .into_iter()
            .map(hydrate)
            .collect()
    }

    /// Stages the whole cluster. On success the order carries its new
    /// version, so it can be saved again in the same unit of work.
    pub async fn save(&mut self, order: &mut Order) -> Result<Version, DomainError> {
        let document =
            Document::from_state(order.id(), ORDER_AGGREGATE_TYPE, order.version(), &*order)?
                .with_lookup_keys(order.lookup_keys())
                .with_index_keys(order.index_keys());
        let version = self.tx.put(document).await?;
        order.set_version(version);
        Ok(version)
    }

    pub async fn delete(&mut self, id: OrderId) -> Result<(), DomainError> {
        self.tx.delete(id).await?;
        Ok(())
    }

    pub async fn commit(self) -> Result<(), DomainError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn hydrate(document: Document) -> Result<Order, DomainError> {
    let version = document.version;
    let mut order: Order = document.into_state()?;
    order.set_version(version);
    Ok(order)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use order_store::{InMemoryDocumentStore, StoreError};

    use super::*;
    use crate::order::{ContactInfo, CreateDraftOrder, Money, NewOrderItem};
    use crate::pricing::PricingEngine;

    fn draft(customer_id: CustomerId, restaurant_id: RestaurantId) -> Order {
        let cmd = CreateDraftOrder::marketplace(
            restaurant_id,
            customer_id,
            ContactInfo::new("Lan", "0901000000"),
            ContactInfo::new("Pho 24", "0283000000"),
            NewOrderItem::new("pho-bo", "Pho bo", Money::vnd(45_000), 1),
        );
        Order::create_draft(cmd, &PricingEngine::default(), Utc::now()).unwrap()
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(OrderRef::Capture("C1").key(), "capture:C1");
        assert_eq!(
            OrderRef::WalletTransaction("241019_7").key(),
            "wallet-trans:241019_7"
        );
        let restaurant_id = RestaurantId::new();
        assert_eq!(
            OrderIndex::Restaurant(restaurant_id).key(),
            format!("restaurant:{restaurant_id}")
        );
    }

    #[tokio::test]
    async fn saved_order_round_trips_with_version() {
        let store = OrderStore::new(InMemoryDocumentStore::new());
        let mut order = draft(CustomerId::new(), RestaurantId::new());

        let mut uow = store.begin().await.unwrap();
        let version = uow.save(&mut order).await.unwrap();
        uow.commit().await.unwrap();
        assert_eq!(version, Version::new(1));
        assert_eq!(order.version(), version);

        let mut uow = store.begin().await.unwrap();
        let loaded = uow.require(order.id()).await.unwrap();
        assert_eq!(loaded, order);
    }

    #[tokio::test]
    async fn draft_is_found_by_customer_and_restaurant() {
        let store = OrderStore::new(InMemoryDocumentStore::new());
        let customer_id = CustomerId::new();
        let restaurant_id = RestaurantId::new();
        let mut order = draft(customer_id, restaurant_id);

        let mut uow = store.begin().await.unwrap();
        uow.save(&mut order).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let found = uow
            .find_by_ref(OrderRef::Draft {
                customer_id,
                restaurant_id,
            })
            .await
            .unwrap();
        assert_eq!(found.map(|o| o.id()), Some(order.id()));
    }

    #[tokio::test]
    async fn orders_are_listed_per_restaurant_and_customer() {
        let store = OrderStore::new(InMemoryDocumentStore::new());
        let customer_id = CustomerId::new();
        let restaurant_id = RestaurantId::new();
        let mut first = draft(customer_id, restaurant_id);
        let mut second = draft(customer_id, RestaurantId::new());

        let mut uow = store.begin().await.unwrap();
        uow.save(&mut first).await.unwrap();
        uow.save(&mut second).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let at_restaurant = uow.list(OrderIndex::Restaurant(restaurant_id)).await.unwrap();
        assert_eq!(at_restaurant.len(), 1);
        assert_eq!(at_restaurant[0].id(), first.id());
        assert_eq!(at_restaurant[0].version(), Version::new(1));

        let of_customer = uow.list(OrderIndex::Customer(customer_id)).await.unwrap();
        assert_eq!(of_customer.len(), 2);
        assert!(
            uow.list(OrderIndex::Driver(DriverId::new()))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn stale_copy_conflicts() {
        let store = OrderStore::new(InMemoryDocumentStore::new());
        let mut order = draft(CustomerId::new(), RestaurantId::new());
        let mut uow = store.begin().await.unwrap();
        uow.save(&mut order).await.unwrap();
        uow.commit().await.unwrap();

        let mut stale = order.clone();
        let mut uow = store.begin().await.unwrap();
        uow.save(&mut order).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let err = uow.save(&mut stale).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Store(StoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn missing_order_is_reported() {
        let store = OrderStore::new(InMemoryDocumentStore::new());
        let mut uow = store.begin().await.unwrap();
        let id = OrderId::new();
        assert!(matches!(
            uow.require(id).await,
            Err(DomainError::OrderNotFound(missing)) if missing == id
        ));
    }
}
