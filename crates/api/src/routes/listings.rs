//! Order listings for restaurants, drivers and customers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use domain::Order;
use domain::order::{CustomerId, DriverId, OrderStatus, RestaurantId};
use fulfillment::{
    CustomerOrderFilter, DriverOrderFilter, DriverOrderKind, HistoryFilter, OrderDetail,
    RestaurantOrderFilter, SaleChannel, TimeWindow,
};
use order_store::DocumentStore;
use serde::Deserialize;

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct RestaurantOrdersQuery {
    #[serde(default)]
    pub query: SaleChannel,
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<usize>,
}

#[derive(Deserialize)]
pub struct DriverOrdersQuery {
    pub caller_id: DriverId,
    #[serde(default)]
    pub query: DriverOrderKind,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Deserialize)]
pub struct CustomerOrdersQuery {
    pub filter: Option<HistoryFilter>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl CustomerOrdersQuery {
    fn filter(&self) -> CustomerOrderFilter {
        let defaults = CustomerOrderFilter::default();
        CustomerOrderFilter {
            window: TimeWindow {
                from: self.from,
                to: self.to,
            },
            offset: self.offset.unwrap_or(defaults.offset),
            limit: self.limit.unwrap_or(defaults.limit),
        }
    }
}

/// GET /restaurants/:id/orders: newest first, 25 per page.
#[tracing::instrument(skip(state, query))]
pub async fn restaurant_orders<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(query): Query<RestaurantOrdersQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let restaurant_id: RestaurantId = parse_id(&id, "restaurant")?;
    let filter = RestaurantOrderFilter {
        channel: query.query,
        status: query.status,
        window: TimeWindow {
            from: query.from,
            to: query.to,
        },
        page: query.page.unwrap_or(1),
    };
    let orders = state
        .queries
        .orders_of_restaurant(restaurant_id, &filter)
        .await?;
    Ok(Json(orders))
}

/// GET /drivers/:id/orders: only for the driver themself.
#[tracing::instrument(skip(state, query))]
pub async fn driver_orders<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(query): Query<DriverOrdersQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let driver_id: DriverId = parse_id(&id, "driver")?;
    let defaults = DriverOrderFilter::default();
    let filter = DriverOrderFilter {
        kind: query.query,
        window: TimeWindow {
            from: query.from,
            to: query.to,
        },
        page: query.page.unwrap_or(defaults.page),
        size: query.size.unwrap_or(defaults.size),
    };
    let orders = state
        .queries
        .orders_of_driver(query.caller_id, driver_id, &filter)
        .await?;
    Ok(Json(orders))
}

/// GET /customers/:id/orders/ongoing
#[tracing::instrument(skip(state, query))]
pub async fn ongoing<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(query): Query<CustomerOrdersQuery>,
) -> Result<Json<Vec<OrderDetail>>, ApiError> {
    let customer_id: CustomerId = parse_id(&id, "customer")?;
    let orders = state
        .queries
        .ongoing_orders_of_customer(customer_id, &query.filter())
        .await?;
    Ok(Json(orders))
}

/// GET /customers/:id/orders/history: `filter` narrows to COMPLETED or
/// CANCELLED.
#[tracing::instrument(skip(state, query))]
pub async fn history<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(query): Query<CustomerOrdersQuery>,
) -> Result<Json<Vec<OrderDetail>>, ApiError> {
    let customer_id: CustomerId = parse_id(&id, "customer")?;
    let orders = state
        .queries
        .order_history_of_customer(customer_id, query.filter, &query.filter())
        .await?;
    Ok(Json(orders))
}

/// GET /customers/:id/orders/drafts
#[tracing::instrument(skip(state, query))]
pub async fn drafts<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(query): Query<CustomerOrdersQuery>,
) -> Result<Json<Vec<OrderDetail>>, ApiError> {
    let customer_id: CustomerId = parse_id(&id, "customer")?;
    let orders = state
        .queries
        .draft_orders_of_customer(customer_id, &query.filter())
        .await?;
    Ok(Json(orders))
}

/// GET /customers/:id/orders/drafts/last: the cart touched last, or `null`.
#[tracing::instrument(skip(state))]
pub async fn last_draft<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Option<Order>>, ApiError> {
    let customer_id: CustomerId = parse_id(&id, "customer")?;
    let order = state
        .queries
        .last_draft_order_of_customer(customer_id)
        .await?;
    Ok(Json(order))
}
