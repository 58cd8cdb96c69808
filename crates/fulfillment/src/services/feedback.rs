//! Customer feedback on completed orders.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use domain::OrderId;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub order_id: OrderId,
    /// 1 to 5 stars.
    pub rating: u8,
    pub comment: Option<String>,
}

/// Trait for the feedback service.
#[async_trait]
pub trait FeedbackService: Send + Sync {
    /// Feedback for whichever of `order_ids` have any.
    async fn feedback_for(&self, order_ids: &[OrderId]) -> Result<Vec<Feedback>, GatewayError>;
}

#[derive(Debug, Default)]
struct InMemoryFeedbackState {
    feedback: HashMap<OrderId, Feedback>,
    unavailable: bool,
}

/// In-memory feedback service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeedbackService {
    state: Arc<RwLock<InMemoryFeedbackState>>,
}

impl InMemoryFeedbackService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, feedback: Feedback) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .feedback
            .insert(feedback.order_id, feedback);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }
}

#[async_trait]
impl FeedbackService for InMemoryFeedbackService {
    async fn feedback_for(&self, order_ids: &[OrderId]) -> Result<Vec<Feedback>, GatewayError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.unavailable {
            return Err(GatewayError::unavailable("feedback service unreachable"));
        }
        Ok(order_ids
            .iter()
            .filter_map(|id| state.feedback.get(id).cloned())
            .collect())
    }
}
