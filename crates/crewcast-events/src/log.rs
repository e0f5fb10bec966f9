//! Synchronous subscriber that mirrors every event into `tracing`.
//!
//! ```text
//! INFO crewcast::events: task_update: Starting crew execution kind="task_update"
//! WARN crewcast::events: error: division by zero kind="error"
//! ```

use crate::error::DeliveryError;
use crate::event::{kinds, Event};
use crate::subscriber::SyncSubscriber;

/// Logs events as they are published, on the producer's thread.
///
/// `error` events are logged at `warn`, everything else at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSubscriber;

impl SyncSubscriber for LogSubscriber {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver(&self, event: &Event) -> Result<(), DeliveryError> {
        let metadata = event
            .metadata()
            .map(|m| serde_json::Value::Object(m.clone()).to_string());
        if event.kind() == kinds::ERROR {
            tracing::warn!(
                target: "crewcast::events",
                kind = event.kind(),
                metadata = metadata.as_deref(),
                "{}: {}",
                event.kind(),
                event.content()
            );
        } else {
            tracing::info!(
                target: "crewcast::events",
                kind = event.kind(),
                metadata = metadata.as_deref(),
                "{}: {}",
                event.kind(),
                event.content()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_subscriber_never_fails() {
        let event = Event::builder(kinds::ERROR, "boom")
            .meta("error_type", "ValueError")
            .build()
            .unwrap();
        assert!(LogSubscriber.deliver(&event).is_ok());
        assert!(LogSubscriber
            .deliver(&Event::new(kinds::AGENT_THOUGHT, "hmm").unwrap())
            .is_ok());
        assert_eq!(LogSubscriber.name(), "log");
    }
}
