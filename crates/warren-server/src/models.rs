//! API request and response models
//!
//! TigerStyle: Wire names are fixed here, nowhere else.

use serde::{Deserialize, Serialize};

/// Order posted to `/orders`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: String,
    pub order_value: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Actors currently holding an activation
    pub active_actors: usize,
    pub actor_types: Vec<String>,
}

/// Error body returned with every non-2xx status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Whether the same request may succeed later
    pub retriable: bool,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retriable: false,
        }
    }

    pub fn retriable(mut self, retriable: bool) -> Self {
        self.retriable = retriable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_summary_wire_names() {
        let order: OrderSummary =
            serde_json::from_str(r#"{"orderId":"order-1","orderValue":"42"}"#).unwrap();
        assert_eq!(order.order_id, "order-1");
        assert_eq!(order.order_value, "42");

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["orderId"], "order-1");
    }

    #[test]
    fn test_order_summary_requires_both_fields() {
        assert!(serde_json::from_str::<OrderSummary>(r#"{"orderId":"order-1"}"#).is_err());
    }
}
