//! Cart endpoints and the order detail read.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::order::{CashierId, ContactInfo, CustomerId, NewOrderItem, OrderItemId, RestaurantId};
use domain::{
    AddItem, ChangeItemQuantity, CreateDraftOrder, DomainError, GeoPoint, Order, OrderError,
    OrderId, RemoveItem, UpdateDeliveryAddress,
};
use fulfillment::OrderDetail;
use order_store::DocumentStore;
use serde::Deserialize;

use super::{AppState, parse_id};
use crate::error::ApiError;

// -- Request types --

/// Opens a cart. With `customer_id` it is a marketplace order and both
/// contacts are required; otherwise `cashier_id` makes it a point-of-sale
/// order.
#[derive(Deserialize)]
pub struct CreateDraftRequest {
    pub restaurant_id: RestaurantId,
    pub customer_id: Option<CustomerId>,
    pub cashier_id: Option<CashierId>,
    pub customer: Option<ContactInfo>,
    pub restaurant: Option<ContactInfo>,
    pub item: NewOrderItem,
}

#[derive(Deserialize)]
pub struct DraftQuery {
    pub customer_id: CustomerId,
    pub restaurant_id: RestaurantId,
}

#[derive(Deserialize)]
pub struct QuantityRequest {
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct AddressRequest {
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

// -- Handlers --

/// POST /orders: open a DRAFT order with its first line.
#[tracing::instrument(skip(state, req), fields(restaurant_id = %req.restaurant_id))]
pub async fn create<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateDraftRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let cmd = match (req.customer_id, req.cashier_id) {
        (Some(customer_id), _) => {
            let (Some(customer), Some(restaurant)) = (req.customer, req.restaurant) else {
                return Err(ApiError::BadRequest(
                    "customer and restaurant contacts are required".to_string(),
                ));
            };
            CreateDraftOrder::marketplace(
                req.restaurant_id,
                customer_id,
                customer,
                restaurant,
                req.item,
            )
        }
        (None, Some(cashier_id)) => {
            CreateDraftOrder::point_of_sale(req.restaurant_id, cashier_id, req.item)
        }
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either customer_id or cashier_id is required".to_string(),
            ));
        }
    };

    let order = state.cart.create_draft_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/draft: the customer's open cart at a restaurant, or `null`.
#[tracing::instrument(skip(state, query))]
pub async fn find_draft<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<DraftQuery>,
) -> Result<Json<Option<Order>>, ApiError> {
    let order = state
        .cart
        .find_draft_order(query.customer_id, query.restaurant_id)
        .await?;
    Ok(Json(order))
}

/// GET /orders/:id: the order, with feedback once completed.
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetail>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    Ok(Json(state.queries.order_detail(order_id).await?))
}

/// POST /orders/:id/items
#[tracing::instrument(skip(state, item))]
pub async fn add_item<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(item): Json<NewOrderItem>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let order = state.cart.add_item(AddItem::new(order_id, item)).await?;
    Ok(Json(order))
}

/// PATCH /orders/:id/items/:item_id: set a line's quantity.
#[tracing::instrument(skip(state, req))]
pub async fn change_quantity<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, item_id)): Path<(String, String)>,
    Json(req): Json<QuantityRequest>,
) -> Result<Response, ApiError> {
    let (order_id, item_id) = parse_line(&id, &item_id)?;
    let order = state
        .cart
        .change_item_quantity(ChangeItemQuantity::set(order_id, item_id, req.quantity))
        .await?;
    Ok(cart_response(order))
}

/// POST /orders/:id/items/:item_id/increment
#[tracing::instrument(skip(state))]
pub async fn increment<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, item_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (order_id, item_id) = parse_line(&id, &item_id)?;
    let order = state
        .cart
        .change_item_quantity(ChangeItemQuantity::increment(order_id, item_id))
        .await?;
    Ok(cart_response(order))
}

/// POST /orders/:id/items/:item_id/decrement
#[tracing::instrument(skip(state))]
pub async fn decrement<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, item_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (order_id, item_id) = parse_line(&id, &item_id)?;
    let order = state
        .cart
        .change_item_quantity(ChangeItemQuantity::decrement(order_id, item_id))
        .await?;
    Ok(cart_response(order))
}

/// DELETE /orders/:id/items/:item_id
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, item_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (order_id, item_id) = parse_line(&id, &item_id)?;
    let order = state
        .cart
        .remove_item(RemoveItem::new(order_id, item_id))
        .await?;
    Ok(cart_response(order))
}

/// PUT /orders/:id/delivery-address
#[tracing::instrument(skip(state, req))]
pub async fn update_address<S: DocumentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<AddressRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let geo = GeoPoint::new(req.latitude, req.longitude)
        .map_err(|e| DomainError::from(OrderError::from(e)))?;
    let order = state
        .cart
        .update_delivery_address(UpdateDeliveryAddress::new(order_id, req.address, geo))
        .await?;
    Ok(Json(order))
}

fn parse_line(id: &str, item_id: &str) -> Result<(OrderId, OrderItemId), ApiError> {
    Ok((parse_id(id, "order")?, parse_id(item_id, "order item")?))
}

/// 200 with the cart, or 204 when the last line went and the cart with it.
fn cart_response(order: Option<Order>) -> Response {
    match order {
        Some(order) => Json(order).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
