//! Domain layer for restaurant delivery orders.
//!
//! - `order`: the order cluster (order, lines, delivery, invoice, payment)
//!   with its state machines, commands, events and the cart service
//! - `pricing` and `geo`: pure price, shipping and ETA formulas
//! - `repository`: loads and saves the whole cluster in one transaction

pub mod error;
pub mod geo;
pub mod order;
pub mod pricing;
pub mod repository;

pub use error::{DomainError, ErrorKind};
pub use geo::{GeoPoint, InvalidLocation, ShippingTiers, haversine_meters};
pub use order::{
    AddItem, CartOutcome, CartService, ChangeItemQuantity, CreateDraftOrder, DomainEvent,
    Order, OrderError, OrderEvent, OrderEventPayload, OrderId, QuantityChange, RemoveItem,
    UpdateDeliveryAddress,
};
pub use pricing::{PricingConfig, PricingEngine};
pub use repository::{OrderIndex, OrderRef, OrderStore, UnitOfWork};
