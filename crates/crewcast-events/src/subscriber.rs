use std::fmt;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::event::Event;

/// Opaque handle for one registered subscriber.
///
/// Issued by the engine from a monotonic counter, so a handle is never handed
/// out twice within the lifetime of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Asynchronous recipient, typically a network connection.
///
/// Each subscriber gets its own delivery worker, so `deliver` may await (for
/// example on a socket write) without holding up other subscribers or the
/// producer. Any `Err` evicts the subscriber.
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &Event) -> Result<(), DeliveryError>;
}

/// Synchronous recipient invoked inline by `publish`.
///
/// Unlike [`Subscriber`], a slow implementation blocks the producer for as
/// long as `deliver` takes. Use it only for cheap in-process work that must
/// observe events in the producer's own call order, such as logging.
pub trait SyncSubscriber: Send + Sync {
    fn name(&self) -> &str;

    fn deliver(&self, event: &Event) -> Result<(), DeliveryError>;
}

/// Adapts a closure into a [`SyncSubscriber`].
pub struct FnSubscriber<F> {
    name: String,
    callback: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&Event) -> Result<(), DeliveryError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl<F> SyncSubscriber for FnSubscriber<F>
where
    F: Fn(&Event) -> Result<(), DeliveryError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&self, event: &Event) -> Result<(), DeliveryError> {
        (self.callback)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_subscriber_id_display() {
        assert_eq!(SubscriberId::from_raw(7).to_string(), "sub-7");
        assert_eq!(SubscriberId::from_raw(7).as_u64(), 7);
    }

    #[test]
    fn test_fn_subscriber() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let sub = FnSubscriber::new("counter", move |_event: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let event = Event::new("task_update", "x").unwrap();
        assert_eq!(sub.name(), "counter");
        sub.deliver(&event).unwrap();
        sub.deliver(&event).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
