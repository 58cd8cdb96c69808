//! Outbound event publishing.
//!
//! Events go out after the transaction that produced them committed. A
//! failed publish is logged and dropped; the committed state stands.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::{DomainEvent, OrderEvent};
use order_store::{EventEnvelope, Version};

use crate::error::{GatewayError, call_with_timeout};

/// Trait for the notification / analytics event sink.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), GatewayError>;
}

/// Publishes `event` as produced by the commit that wrote `version`.
/// Never fails.
pub async fn publish_committed(
    publisher: &dyn EventPublisher,
    event: &OrderEvent,
    version: Version,
    timeout: Duration,
) {
    let envelope = match event.to_envelope(version) {
        Ok(envelope) => envelope,
        Err(error) => {
            tracing::error!(event_type = event.event_type(), %error, "Could not build event envelope");
            return;
        }
    };
    let event_id = envelope.event_id;
    match call_with_timeout(timeout, publisher.publish(envelope)).await {
        Ok(()) => {
            metrics::counter!("events_published_total", "event_type" => event.event_type())
                .increment(1);
            tracing::debug!(event_type = event.event_type(), %event_id, "Event published");
        }
        Err(error) => {
            metrics::counter!("events_publish_failed_total", "event_type" => event.event_type())
                .increment(1);
            tracing::warn!(event_type = event.event_type(), %event_id, %error, "Event publish failed");
        }
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    published: Vec<EventEnvelope>,
    fail: bool,
}

/// In-memory publisher for testing; keeps every envelope it was handed.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    state: Arc<RwLock<RecordingState>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).fail = fail;
    }

    pub fn published(&self) -> Vec<EventEnvelope> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .published
            .clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.published()
            .into_iter()
            .map(|envelope| envelope.event_type)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), GatewayError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail {
            return Err(GatewayError::unavailable("broker unreachable"));
        }
        state.published.push(envelope);
        Ok(())
    }
}
