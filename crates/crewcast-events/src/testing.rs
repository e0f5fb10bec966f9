use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::DeliveryError;
use crate::event::Event;
use crate::subscriber::Subscriber;

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    Delay(Duration),
}

pub struct RecordingSubscriber {
    name: String,
    behavior: Behavior,
    attempts: AtomicUsize,
    received: Mutex<Vec<Event>>,
}

impl RecordingSubscriber {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_behavior(name, Behavior::Succeed)
    }

    pub fn with_behavior(name: impl Into<String>, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            behavior,
            attempts: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn count(&self) -> usize {
        self.received.lock().len()
    }

    pub fn events(&self) -> Vec<Event> {
        self.received.lock().clone()
    }

    pub fn contents(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .map(|e| e.content().to_string())
            .collect()
    }
}

#[async_trait]
impl Subscriber for RecordingSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, event: &Event) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => {}
            Behavior::Fail => return Err(DeliveryError::transport("connection reset")),
            Behavior::Panic => panic!("subscriber {} exploded", self.name),
            Behavior::Delay(delay) => tokio::time::sleep(delay).await,
        }
        self.received.lock().push(event.clone());
        Ok(())
    }
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
