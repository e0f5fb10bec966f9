//! HTTP payloads. Events themselves travel in the shape defined by
//! [`crewcast_events::Event`]'s serde implementation:
//! `{"type", "content", "timestamp", "metadata"}`.

use serde::{Deserialize, Serialize};

/// Reply to `POST /events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub accepted: bool,
    /// Asynchronous subscribers the event was queued for.
    pub dispatched: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub subscribers: usize,
    pub published: u64,
    pub evicted: u64,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_publish_response() {
        let resp = PublishResponse {
            accepted: true,
            dispatched: 3,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"accepted\":true"));
        assert!(json.contains("\"dispatched\":3"));
    }

    #[test]
    fn test_serialize_error() {
        let resp = ErrorResponse {
            error: "bad request".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"error":"bad request"}"#);
    }
}
