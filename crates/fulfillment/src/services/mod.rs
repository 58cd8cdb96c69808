//! Outbound collaborator traits and in-memory implementations.

pub mod exchange;
pub mod feedback;
pub mod location;
pub mod paypal;
pub mod policy;
pub mod publisher;
pub mod wallet;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FulfillmentError, GatewayError, call_with_timeout};

pub use exchange::{ExchangeRates, InMemoryExchangeRates};
pub use feedback::{Feedback, FeedbackService, InMemoryFeedbackService};
pub use location::{InMemoryLocationLookup, LocationLookup};
pub use paypal::{
    InMemoryPayPalGateway, PayPalCapture, PayPalGateway, PayPalOrderRequest, PayPalRefund,
    RefundRequest, RefundStatus, UsdAmount,
};
pub use policy::{AutoConfirmDecision, AutoConfirmPolicy, InMemoryAutoConfirmPolicy};
pub use publisher::{EventPublisher, RecordingPublisher};
pub use wallet::{
    InMemoryWalletGateway, WalletCallbackData, WalletCallbackReply, WalletGateway,
    WalletOrderRequest, WalletOrderResponse, WalletSigner,
};

/// Every outbound dependency of checkout and fulfillment.
#[derive(Clone)]
pub struct Collaborators {
    pub paypal: Arc<dyn PayPalGateway>,
    pub wallet: Arc<dyn WalletGateway>,
    pub policy: Arc<dyn AutoConfirmPolicy>,
    pub locations: Arc<dyn LocationLookup>,
    pub rates: Arc<dyn ExchangeRates>,
    pub feedback: Arc<dyn FeedbackService>,
    pub publisher: Arc<dyn EventPublisher>,
}

/// The in-memory doubles, kept by concrete type so tests can flip their
/// failure switches after handing them out.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCollaborators {
    pub paypal: InMemoryPayPalGateway,
    pub wallet: InMemoryWalletGateway,
    pub policy: InMemoryAutoConfirmPolicy,
    pub locations: InMemoryLocationLookup,
    pub rates: InMemoryExchangeRates,
    pub feedback: InMemoryFeedbackService,
    pub publisher: RecordingPublisher,
}

impl InMemoryCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            paypal: Arc::new(self.paypal.clone()),
            wallet: Arc::new(self.wallet.clone()),
            policy: Arc::new(self.policy.clone()),
            locations: Arc::new(self.locations.clone()),
            rates: Arc::new(self.rates.clone()),
            feedback: Arc::new(self.feedback.clone()),
            publisher: Arc::new(self.publisher.clone()),
        }
    }
}

/// Runs a bounded payment gateway call, counting and logging its outcome.
pub(crate) async fn call_gateway<T>(
    gateway: &'static str,
    timeout: Duration,
    call: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, FulfillmentError> {
    match call_with_timeout(timeout, call).await {
        Ok(value) => {
            metrics::counter!("gateway_calls_total", "gateway" => gateway, "outcome" => "ok")
                .increment(1);
            Ok(value)
        }
        Err(error) => {
            metrics::counter!("gateway_calls_total", "gateway" => gateway, "outcome" => error.outcome())
                .increment(1);
            tracing::error!(gateway, %error, "Gateway call failed");
            Err(FulfillmentError::gateway(gateway, error))
        }
    }
}
