use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("Event kind must not be empty")]
    EmptyKind,
}

/// Why a single delivery to a single subscriber failed.
///
/// The engine does not distinguish between variants: every failure evicts the
/// subscriber. They exist so logs say what happened.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Subscriber connection closed")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to serialize event: {0}")]
    Serialization(String),

    #[error("Subscriber rejected event: {0}")]
    Rejected(String),

    #[error("Delivery timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Subscriber mailbox full")]
    Overflow,

    #[error("Subscriber panicked: {0}")]
    Panicked(String),
}

impl DeliveryError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_panic_payloads() {
        let err = DeliveryError::from_panic(Box::new("static"));
        assert_eq!(err, DeliveryError::Panicked("static".to_string()));

        let err = DeliveryError::from_panic(Box::new(String::from("owned")));
        assert_eq!(err, DeliveryError::Panicked("owned".to_string()));

        let err = DeliveryError::from_panic(Box::new(42_u32));
        assert_eq!(err, DeliveryError::Panicked("unknown panic".to_string()));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DeliveryError::transport("broken pipe").to_string(),
            "Transport error: broken pipe"
        );
        assert_eq!(
            DeliveryError::TimedOut(Duration::from_millis(50)).to_string(),
            "Delivery timed out after 50ms"
        );
    }
}
