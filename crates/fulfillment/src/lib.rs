//! Checkout and fulfillment of delivery orders.
//!
//! - `checkout`: payment setup, gateway approval and wallet callbacks
//! - `state_machine`: restaurant, driver and webhook transitions after checkout
//! - `queries`: order detail with feedback and the restaurant, driver and
//!   customer order listings
//! - `services`: outbound collaborators and their in-memory doubles
//! - `webhook`: card gateway notification classification

pub mod checkout;
pub mod config;
pub mod error;
pub mod queries;
pub mod services;
pub mod state_machine;
pub mod webhook;

pub use checkout::{
    ApproveGatewayOrder, CheckoutMethod, CheckoutOrchestrator, CheckoutOutcome, ConfirmCheckout,
    NextStep,
};
pub use config::{FulfillmentConfig, PayPalConfig, WalletConfig};
pub use error::{FulfillmentError, GatewayError, Result};
pub use queries::{
    CustomerOrderFilter, DriverOrderFilter, DriverOrderKind, HistoryFilter, OrderDetail,
    OrderQueries, RESTAURANT_PAGE_SIZE, RestaurantOrderFilter, SaleChannel, TimeWindow,
};
pub use services::{Collaborators, InMemoryCollaborators};
pub use state_machine::{DriverAssigned, FulfillmentStateMachine, VoidOrder};
pub use webhook::{GatewayWebhook, WebhookEventKind, WebhookOutcome, WebhookResource};
