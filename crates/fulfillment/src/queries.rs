//! Read side: order detail with the customer's feedback, and the order
//! listings of restaurants, drivers and customers.

use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::order::{CustomerId, DeliveryStatus, DriverId, OrderError, OrderStatus, RestaurantId};
use domain::{Order, OrderId, OrderIndex, OrderStore};
use order_store::DocumentStore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, call_with_timeout};
use crate::services::{Feedback, FeedbackService};

/// Restaurant listings come in fixed pages.
pub const RESTAURANT_PAGE_SIZE: usize = 25;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    /// Only looked up for completed orders.
    pub feedback: Option<Feedback>,
}

/// Inclusive time range; a missing end is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    fn contains(&self, at: Option<DateTime<Utc>>) -> bool {
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        let Some(at) = at else {
            return false;
        };
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

/// Which of a restaurant's orders to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleChannel {
    #[default]
    All,
    /// Counter orders, without delivery.
    Pos,
    /// Marketplace orders.
    Sale,
}

#[derive(Debug, Clone, Default)]
pub struct RestaurantOrderFilter {
    pub channel: SaleChannel,
    pub status: Option<OrderStatus>,
    /// Applied to the creation time.
    pub window: TimeWindow,
    /// 1-based.
    pub page: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverOrderKind {
    /// Heading to the restaurant or carrying the food.
    Active,
    #[default]
    Completed,
}

impl DriverOrderKind {
    fn matches(&self, status: DeliveryStatus) -> bool {
        match self {
            DriverOrderKind::Active => {
                matches!(status, DeliveryStatus::OnGoing | DeliveryStatus::PickedUp)
            }
            DriverOrderKind::Completed => status == DeliveryStatus::Completed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriverOrderFilter {
    pub kind: DriverOrderKind,
    /// Applied to the creation time.
    pub window: TimeWindow,
    /// 1-based.
    pub page: usize,
    pub size: usize,
}

impl Default for DriverOrderFilter {
    fn default() -> Self {
        Self {
            kind: DriverOrderKind::default(),
            window: TimeWindow::default(),
            page: 1,
            size: 10,
        }
    }
}

/// Terminal states a customer's history can be narrowed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryFilter {
    Completed,
    Cancelled,
}

impl From<HistoryFilter> for OrderStatus {
    fn from(filter: HistoryFilter) -> Self {
        match filter {
            HistoryFilter::Completed => OrderStatus::Completed,
            HistoryFilter::Cancelled => OrderStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CustomerOrderFilter {
    /// Applied to the time the order was placed.
    pub window: TimeWindow,
    pub offset: usize,
    pub limit: usize,
}

impl Default for CustomerOrderFilter {
    fn default() -> Self {
        Self {
            window: TimeWindow::default(),
            offset: 0,
            limit: 10,
        }
    }
}

pub struct OrderQueries<S: DocumentStore> {
    orders: OrderStore<S>,
    feedback: Arc<dyn FeedbackService>,
    timeout: Duration,
}

impl<S: DocumentStore> OrderQueries<S> {
    pub fn new(orders: OrderStore<S>, feedback: Arc<dyn FeedbackService>, timeout: Duration) -> Self {
        Self {
            orders,
            feedback,
            timeout,
        }
    }

    /// Loads an order. Feedback is best-effort: an unavailable feedback
    /// service leaves it empty instead of failing the read.
    #[tracing::instrument(skip(self))]
    pub async fn order_detail(&self, order_id: OrderId) -> Result<OrderDetail> {
        let order = {
            let mut uow = self.orders.begin().await?;
            uow.require(order_id).await?
        };

        let feedback = if order.status() == OrderStatus::Completed {
            self.feedback_for(&[order_id]).await.pop()
        } else {
            None
        };
        Ok(OrderDetail { order, feedback })
    }

    /// A restaurant's orders, newest first, in pages of
    /// [`RESTAURANT_PAGE_SIZE`].
    #[tracing::instrument(skip(self, filter))]
    pub async fn orders_of_restaurant(
        &self,
        restaurant_id: RestaurantId,
        filter: &RestaurantOrderFilter,
    ) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .list(OrderIndex::Restaurant(restaurant_id))
            .await?
            .into_iter()
            .filter(|order| match filter.channel {
                SaleChannel::All => true,
                SaleChannel::Pos => !order.is_marketplace(),
                SaleChannel::Sale => order.is_marketplace(),
            })
            .filter(|order| filter.status.is_none_or(|status| order.status() == status))
            .filter(|order| filter.window.contains(Some(order.created_at())))
            .collect();
        orders.sort_by_key(|order| Reverse(order.created_at()));

        let skip = filter.page.saturating_sub(1) * RESTAURANT_PAGE_SIZE;
        Ok(orders.into_iter().skip(skip).take(RESTAURANT_PAGE_SIZE).collect())
    }

    /// Deliveries of a driver, newest first. Drivers only see their own.
    #[tracing::instrument(skip(self, filter))]
    pub async fn orders_of_driver(
        &self,
        caller_id: DriverId,
        driver_id: DriverId,
        filter: &DriverOrderFilter,
    ) -> Result<Vec<Order>> {
        if caller_id != driver_id {
            return Err(OrderError::DriverMismatch.into());
        }

        let mut orders: Vec<Order> = self
            .list(OrderIndex::Driver(driver_id))
            .await?
            .into_iter()
            .filter(|order| {
                order.delivery().is_some_and(|delivery| {
                    delivery.driver_id == Some(driver_id) && filter.kind.matches(delivery.status)
                })
            })
            .filter(|order| filter.window.contains(Some(order.created_at())))
            .collect();
        orders.sort_by_key(|order| Reverse(order.created_at()));

        let skip = filter.page.saturating_sub(1) * filter.size;
        Ok(orders.into_iter().skip(skip).take(filter.size).collect())
    }

    /// Orders waiting on the restaurant or on their way.
    pub async fn ongoing_orders_of_customer(
        &self,
        customer_id: CustomerId,
        filter: &CustomerOrderFilter,
    ) -> Result<Vec<OrderDetail>> {
        let statuses = [OrderStatus::Ordered, OrderStatus::Confirmed, OrderStatus::Ready];
        self.orders_of_customer(customer_id, &statuses, filter).await
    }

    /// Completed and cancelled orders, optionally only one of the two.
    pub async fn order_history_of_customer(
        &self,
        customer_id: CustomerId,
        only: Option<HistoryFilter>,
        filter: &CustomerOrderFilter,
    ) -> Result<Vec<OrderDetail>> {
        let statuses = match only {
            Some(only) => vec![only.into()],
            None => vec![OrderStatus::Completed, OrderStatus::Cancelled],
        };
        self.orders_of_customer(customer_id, &statuses, filter).await
    }

    /// Open carts, one per restaurant at most.
    pub async fn draft_orders_of_customer(
        &self,
        customer_id: CustomerId,
        filter: &CustomerOrderFilter,
    ) -> Result<Vec<OrderDetail>> {
        self.orders_of_customer(customer_id, &[OrderStatus::Draft], filter)
            .await
    }

    /// The cart the customer touched last.
    pub async fn last_draft_order_of_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<Order>> {
        let filter = CustomerOrderFilter {
            limit: 1,
            ..CustomerOrderFilter::default()
        };
        let mut drafts = self.draft_orders_of_customer(customer_id, &filter).await?;
        Ok(drafts.pop().map(|detail| detail.order))
    }

    /// Most recently updated first. Completed orders carry their feedback
    /// when the feedback service answers.
    #[tracing::instrument(skip(self, filter))]
    async fn orders_of_customer(
        &self,
        customer_id: CustomerId,
        statuses: &[OrderStatus],
        filter: &CustomerOrderFilter,
    ) -> Result<Vec<OrderDetail>> {
        let mut orders: Vec<Order> = self
            .list(OrderIndex::Customer(customer_id))
            .await?
            .into_iter()
            .filter(|order| order.customer_id() == Some(customer_id))
            .filter(|order| statuses.contains(&order.status()))
            .filter(|order| {
                filter
                    .window
                    .contains(order.delivery().and_then(|delivery| delivery.order_time))
            })
            .collect();
        orders.sort_by_key(|order| Reverse(order.updated_at()));
        let orders: Vec<Order> = orders
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect();

        let completed: Vec<OrderId> = orders
            .iter()
            .filter(|order| order.status() == OrderStatus::Completed)
            .map(Order::id)
            .collect();
        let mut feedback = if completed.is_empty() {
            Vec::new()
        } else {
            self.feedback_for(&completed).await
        };

        Ok(orders
            .into_iter()
            .map(|order| {
                let found = feedback
                    .iter()
                    .position(|f| f.order_id == order.id())
                    .map(|at| feedback.swap_remove(at));
                OrderDetail {
                    order,
                    feedback: found,
                }
            })
            .collect())
    }

    async fn list(&self, index: OrderIndex) -> Result<Vec<Order>> {
        let mut uow = self.orders.begin().await?;
        let orders = uow.list(index).await?;
        tracing::debug!(index = %index.key(), count = orders.len(), "Orders listed");
        Ok(orders)
    }

    /// Best-effort: a failing feedback service yields no feedback.
    async fn feedback_for(&self, order_ids: &[OrderId]) -> Vec<Feedback> {
        match call_with_timeout(self.timeout, self.feedback.feedback_for(order_ids)).await {
            Ok(found) => found
                .into_iter()
                .filter(|f| order_ids.contains(&f.order_id))
                .collect(),
            Err(error) => {
                tracing::warn!(%error, "Feedback lookup failed, returning orders without it");
                Vec::new()
            }
        }
    }
}
