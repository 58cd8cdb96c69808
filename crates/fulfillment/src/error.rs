//! Fulfillment error types.

use std::future::Future;
use std::time::Duration;

use domain::order::OrderError;
use domain::{DomainError, ErrorKind};
use thiserror::Error;

/// Typed failure of an outbound synchronous call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The collaborator answered and said no. Safe to retry another way.
    #[error("rejected: {reason}")]
    Rejected { reason: String },

    /// No answer in time; the outcome is unknown.
    #[error("timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("unavailable: {reason}")]
    Unavailable { reason: String },
}

impl GatewayError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        GatewayError::Rejected {
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        GatewayError::Unavailable {
            reason: reason.into(),
        }
    }

    /// Label used on the `gateway_calls_total` metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::Rejected { .. } => "rejected",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::Unavailable { .. } => "unavailable",
        }
    }
}

/// Errors that can occur during checkout and fulfillment.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("{gateway} call failed: {source}")]
    Gateway {
        gateway: &'static str,
        #[source]
        source: GatewayError,
    },

    #[error("Could not resolve a city for the delivery address: {reason}")]
    LocationResolutionFailed { reason: String },

    #[error("Malformed gateway payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

impl From<OrderError> for FulfillmentError {
    fn from(err: OrderError) -> Self {
        FulfillmentError::Domain(err.into())
    }
}

impl FulfillmentError {
    pub fn gateway(gateway: &'static str, source: GatewayError) -> Self {
        FulfillmentError::Gateway { gateway, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FulfillmentError::Domain(e) => e.kind(),
            FulfillmentError::Gateway {
                source: GatewayError::Timeout { .. },
                ..
            } => ErrorKind::GatewayTimeout,
            FulfillmentError::Gateway { .. } => ErrorKind::GatewayRejected,
            FulfillmentError::LocationResolutionFailed { .. } => {
                ErrorKind::LocationResolutionFailed
            }
            FulfillmentError::MalformedPayload(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Bounds an outbound call. Elapsing turns into [`GatewayError::Timeout`].
pub async fn call_with_timeout<T, F>(
    after: Duration,
    call: F,
) -> std::result::Result<T, GatewayError>
where
    F: Future<Output = std::result::Result<T, GatewayError>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout { after }),
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
