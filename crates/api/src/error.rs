//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, ErrorKind};
use fulfillment::FulfillmentError;
use serde::Serialize;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request could not be understood (malformed id, bad body).
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ApiError::BadRequest(_) => None,
            ApiError::Domain(err) => Some(err.kind()),
            ApiError::Fulfillment(err) => Some(err.kind()),
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::InvalidState => StatusCode::CONFLICT,
        ErrorKind::InvalidLocation
        | ErrorKind::InvalidInput
        | ErrorKind::LocationResolutionFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::GatewayRejected => StatusCode::BAD_GATEWAY,
        ErrorKind::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = kind.map_or(StatusCode::BAD_REQUEST, status_for);

        let message = match kind {
            Some(ErrorKind::Internal) => {
                tracing::error!(error = %self, "internal server error");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };
        metrics::counter!(
            "http_errors_total",
            "kind" => kind.map_or("bad_request", |k| k.as_str())
        )
        .increment(1);

        let body = ErrorBody {
            status: status.as_u16(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
