//! Domain error types.

use order_store::{MissingField, StoreError};
use thiserror::Error;

use crate::order::{OrderError, OrderId};

/// Caller-facing classification of every failure in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    /// A transition precondition was not met.
    InvalidState,
    InvalidLocation,
    /// Malformed command input (quantity, price).
    InvalidInput,
    GatewayRejected,
    /// Outcome unknown; re-check before retrying.
    GatewayTimeout,
    LocationResolutionFailed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::InvalidLocation => "invalid_location",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::GatewayRejected => "gateway_rejected",
            ErrorKind::GatewayTimeout => "gateway_timeout",
            ErrorKind::LocationResolutionFailed => "location_resolution_failed",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event envelope error: {0}")]
    Envelope(#[from] MissingField),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Order(e) => e.kind(),
            DomainError::OrderNotFound(_) | DomainError::Store(StoreError::NotFound(_)) => {
                ErrorKind::NotFound
            }
            // Another writer won the race for the same order.
            DomainError::Store(StoreError::ConcurrencyConflict { .. }) => ErrorKind::InvalidState,
            DomainError::Store(_) | DomainError::Serialization(_) | DomainError::Envelope(_) => {
                ErrorKind::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderItemId, OrderStatus};

    #[test]
    fn order_errors_map_onto_taxonomy() {
        let err: DomainError = OrderError::InvalidOrderTransition {
            current_state: OrderStatus::Completed,
            action: "pick up",
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let err: DomainError = OrderError::DriverMismatch.into();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err: DomainError = OrderError::ItemNotFound(OrderItemId::new()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn missing_order_is_not_found() {
        let err = DomainError::OrderNotFound(OrderId::new());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().starts_with("Order not found"));
    }
}
