use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::{oneshot, Mutex};

use crewcast_events::{DeliveryError, Event, Subscriber};

type Sink = SplitSink<WebSocket, Message>;

/// Delivers events to one WebSocket client as JSON text frames.
///
/// Holds only the write half of the socket; the connection handler keeps
/// the read half to notice when the client goes away. When the engine lets
/// go of the subscriber (eviction, unregister or shutdown) the write half is
/// handed back through the [`Released`] receiver so the handler can close
/// the connection.
pub struct WebSocketSubscriber {
    name: String,
    sink: Mutex<Option<Sink>>,
    released: Option<oneshot::Sender<Sink>>,
}

/// Resolves with the socket's write half once the engine drops the subscriber.
pub type Released = oneshot::Receiver<Sink>;

impl WebSocketSubscriber {
    pub fn new(name: impl Into<String>, sink: Sink) -> (Self, Released) {
        let (tx, rx) = oneshot::channel();
        let subscriber = Self {
            name: name.into(),
            sink: Mutex::new(Some(sink)),
            released: Some(tx),
        };
        (subscriber, rx)
    }
}

impl Drop for WebSocketSubscriber {
    fn drop(&mut self) {
        if let (Some(tx), Some(sink)) = (self.released.take(), self.sink.get_mut().take()) {
            // The handler may already be gone; nothing to close then.
            let _ = tx.send(sink);
        }
    }
}

#[async_trait]
impl Subscriber for WebSocketSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, event: &Event) -> Result<(), DeliveryError> {
        let payload = event
            .to_json()
            .map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(DeliveryError::Closed)?;
        sink.send(Message::text(payload))
            .await
            .map_err(DeliveryError::transport)
    }
}
