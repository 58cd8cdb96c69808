//! HTTP handlers, one per inbound command.

pub mod checkout;
pub mod health;
pub mod lifecycle;
pub mod listings;
pub mod metrics;
pub mod orders;

use std::fmt::Display;
use std::str::FromStr;

use domain::CartService;
use fulfillment::{CheckoutOrchestrator, FulfillmentStateMachine, OrderQueries};
use order_store::DocumentStore;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: DocumentStore> {
    pub cart: CartService<S>,
    pub checkout: CheckoutOrchestrator<S>,
    pub fulfillment: FulfillmentStateMachine<S>,
    pub queries: OrderQueries<S>,
}

/// Parses an id taken from the URL path.
pub(crate) fn parse_id<T>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} id: {e}")))
}
