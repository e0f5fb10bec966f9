//! Fan-out of events to every registered subscriber.
//!
//! ```text
//!  publish(event)
//!      │
//!      ├──► sync subscriber 1 ─► deliver()      (inline, registration order)
//!      ├──► sync subscriber N ─► deliver()
//!      │
//!      │    Arc<Event> per mailbox (try_send)
//!      ├──► [mailbox A] ─► worker A ─► deliver() ─► Err ─► evict A
//!      ├──► [mailbox B] ─► worker B ─► deliver()
//!      └──► [mailbox C] ─► worker C ─► deliver()
//! ```
//!
//! - `publish` never awaits an asynchronous subscriber. Its cost is one
//!   snapshot plus one `try_send` per subscriber.
//! - Each asynchronous subscriber sees events in publish order; there is no
//!   ordering across subscribers.
//! - A failed, timed-out, panicking or backed-up subscriber is evicted. There is
//!   no retry and nothing is reported to the producer.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::error::DeliveryError;
use crate::event::Event;
use crate::registry::Registry;
use crate::subscriber::{FnSubscriber, Subscriber, SubscriberId, SyncSubscriber};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Events buffered per asynchronous subscriber before it counts as stalled.
    pub queue_capacity: usize,
    /// Upper bound for a single `deliver` call.
    pub deliver_timeout: Duration,
    /// How long `shutdown` waits for queued deliveries before aborting them.
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            deliver_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Outcome of one `publish` call, for callers that care.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub sync_delivered: usize,
    pub dispatched: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub aborted: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub published: u64,
    pub dispatched: u64,
    pub evicted: u64,
    pub subscribers: usize,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    dispatched: AtomicU64,
    evicted: AtomicU64,
}

/// Registry entry for an asynchronous subscriber: the sending half of its
/// mailbox plus a flag telling the worker to stop.
#[derive(Clone)]
struct Mailbox {
    name: Arc<str>,
    sender: mpsc::Sender<Arc<Event>>,
    closed: Arc<AtomicBool>,
}

/// The broadcast hub.
///
/// Construct one per service and hand the `Arc` to both producers and the
/// transport layer. Registering asynchronous subscribers spawns Tokio tasks, so
/// `subscribe` must run inside a Tokio runtime; `publish` does not.
pub struct BroadcastEngine {
    config: EngineConfig,
    mailboxes: Registry<Mailbox>,
    sync_subscribers: Registry<Arc<dyn SyncSubscriber>>,
    workers: Mutex<JoinSet<()>>,
    counters: Arc<Counters>,
    closing: AtomicBool,
}

impl BroadcastEngine {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        let mailboxes = Registry::new();
        let sync_subscribers = Registry::sharing_ids(&mailboxes);
        Arc::new(Self {
            config,
            mailboxes,
            sync_subscribers,
            workers: Mutex::new(JoinSet::new()),
            counters: Arc::new(Counters::default()),
            closing: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers an asynchronous subscriber and starts its delivery worker.
    ///
    /// The subscriber receives events published after this call returns. Once
    /// `shutdown` has begun the subscriber is dropped instead; the returned id
    /// is then never registered (see [`is_registered`](Self::is_registered)).
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let (sender, receiver) = mpsc::channel(self.config.queue_capacity.max(1));
        let closed = Arc::new(AtomicBool::new(false));
        let name: Arc<str> = Arc::from(subscriber.name());

        // `shutdown` flips `closing` under this lock, so a worker is either
        // spawned into the set it drains or not spawned at all.
        let mut workers = self.workers.lock();
        let id = self.mailboxes.register(Mailbox {
            name: Arc::clone(&name),
            sender,
            closed: Arc::clone(&closed),
        });

        if self.closing.load(Ordering::Acquire) {
            self.mailboxes.unregister(id);
            drop(workers);
            tracing::warn!(subscriber = %name, %id, "Engine is shutting down, subscriber not registered");
            return id;
        }

        let worker = Worker {
            id,
            name: Arc::clone(&name),
            subscriber,
            closed,
            mailboxes: self.mailboxes.clone(),
            counters: Arc::clone(&self.counters),
            deliver_timeout: self.config.deliver_timeout,
        };

        while workers.try_join_next().is_some() {}
        workers.spawn(worker.run(receiver));
        drop(workers);

        tracing::debug!(subscriber = %name, %id, "Subscriber registered");
        id
    }

    /// Registers a synchronous subscriber, called inline by every `publish`.
    ///
    /// A slow synchronous subscriber delays the producer; see [`SyncSubscriber`].
    pub fn subscribe_sync(&self, subscriber: Arc<dyn SyncSubscriber>) -> SubscriberId {
        let name = subscriber.name().to_string();
        let id = self.sync_subscribers.register(subscriber);
        if self.closing.load(Ordering::Acquire) {
            self.sync_subscribers.unregister(id);
            tracing::warn!(subscriber = %name, %id, "Engine is shutting down, subscriber not registered");
            return id;
        }
        tracing::debug!(subscriber = %name, %id, "Synchronous subscriber registered");
        id
    }

    pub fn subscribe_fn<F>(&self, name: impl Into<String>, callback: F) -> SubscriberId
    where
        F: Fn(&Event) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        self.subscribe_sync(Arc::new(FnSubscriber::new(name, callback)))
    }

    /// Removes a subscriber of either kind. Unknown ids are ignored.
    ///
    /// A delivery already in progress for this subscriber is allowed to finish;
    /// nothing further is delivered to it.
    pub fn unregister(&self, id: SubscriberId) {
        if let Some(mailbox) = self.mailboxes.unregister(id) {
            mailbox.closed.store(true, Ordering::Release);
            tracing::debug!(subscriber = %mailbox.name, %id, "Subscriber unregistered");
        } else if let Some(subscriber) = self.sync_subscribers.unregister(id) {
            tracing::debug!(subscriber = %subscriber.name(), %id, "Synchronous subscriber unregistered");
        }
    }

    /// Broadcasts `event` to every subscriber registered at call time.
    ///
    /// Synchronous subscribers run first, on the caller's thread. Asynchronous
    /// subscribers only have the event queued; their workers deliver it after
    /// this returns. Subscriber failures never surface here.
    pub fn publish(&self, event: Event) -> PublishReport {
        let mut report = PublishReport::default();
        if self.closing.load(Ordering::Acquire) {
            tracing::debug!(kind = event.kind(), "Engine is shutting down, dropping event");
            return report;
        }
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        for (id, subscriber) in self.sync_subscribers.snapshot().iter() {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| subscriber.deliver(&event)))
                .unwrap_or_else(|panic| Err(DeliveryError::from_panic(panic)));
            match outcome {
                Ok(()) => report.sync_delivered += 1,
                Err(error) => {
                    if self.sync_subscribers.unregister(id).is_some() {
                        self.counters.evicted.fetch_add(1, Ordering::Relaxed);
                        report.evicted += 1;
                        tracing::warn!(subscriber = %subscriber.name(), %id, %error, "Evicting synchronous subscriber");
                    }
                }
            }
        }

        let snapshot = self.mailboxes.snapshot();
        if snapshot.is_empty() {
            return report;
        }

        let event = Arc::new(event);
        for (id, mailbox) in snapshot.iter() {
            let error = match mailbox.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {
                    report.dispatched += 1;
                    continue;
                }
                Err(mpsc::error::TrySendError::Full(_)) => DeliveryError::Overflow,
                Err(mpsc::error::TrySendError::Closed(_)) => DeliveryError::Closed,
            };
            if evict(&self.mailboxes, &self.counters, id, &error) {
                report.evicted += 1;
            }
        }

        self.counters
            .dispatched
            .fetch_add(report.dispatched as u64, Ordering::Relaxed);
        report
    }

    /// Stops accepting events and waits for queued deliveries to finish.
    ///
    /// Every subscriber is released. Workers get `shutdown_grace` to flush
    /// what is already in their mailboxes; whatever is still running after
    /// that is aborted. Calling this twice is harmless.
    pub async fn shutdown(&self) -> DrainReport {
        let mut report = DrainReport::default();
        let mut workers = {
            let mut guard = self.workers.lock();
            if self.closing.swap(true, Ordering::AcqRel) {
                return report;
            }
            std::mem::take(&mut *guard)
        };

        let released_sync = self.sync_subscribers.drain().len();
        // Dropping the senders lets each worker finish its queue and exit.
        let released = self.mailboxes.drain().len();

        tracing::info!(
            subscribers = released,
            sync_subscribers = released_sync,
            "Draining event subscribers"
        );

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        loop {
            match tokio::time::timeout_at(deadline, workers.join_next()).await {
                Ok(Some(_)) => report.completed += 1,
                Ok(None) => break,
                Err(_) => {
                    report.aborted = workers.len();
                    tracing::warn!(
                        aborted = report.aborted,
                        "Shutdown grace period elapsed, aborting deliveries"
                    );
                    workers.shutdown().await;
                    break;
                }
            }
        }

        report
    }

    pub fn is_shutting_down(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub fn is_registered(&self, id: SubscriberId) -> bool {
        self.mailboxes.contains(id) || self.sync_subscribers.contains(id)
    }

    /// Number of asynchronous subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.mailboxes.len()
    }

    pub fn sync_subscriber_count(&self) -> usize {
        self.sync_subscribers.len()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            published: self.counters.published.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            subscribers: self.subscriber_count() + self.sync_subscriber_count(),
        }
    }
}

/// Removes a failed asynchronous subscriber. Returns `false` if someone else
/// already removed it.
fn evict(
    mailboxes: &Registry<Mailbox>,
    counters: &Counters,
    id: SubscriberId,
    error: &DeliveryError,
) -> bool {
    let Some(mailbox) = mailboxes.unregister(id) else {
        return false;
    };
    mailbox.closed.store(true, Ordering::Release);
    counters.evicted.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(subscriber = %mailbox.name, %id, %error, "Evicting subscriber");
    true
}

struct Worker {
    id: SubscriberId,
    name: Arc<str>,
    subscriber: Arc<dyn Subscriber>,
    closed: Arc<AtomicBool>,
    mailboxes: Registry<Mailbox>,
    counters: Arc<Counters>,
    deliver_timeout: Duration,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::Receiver<Arc<Event>>) {
        while let Some(event) = receiver.recv().await {
            if self.closed.load(Ordering::Acquire) {
                break;
            }

            if let Err(error) = self.deliver(&event).await {
                evict(&self.mailboxes, &self.counters, self.id, &error);
                break;
            }
        }
        tracing::trace!(subscriber = %self.name, id = %self.id, "Delivery worker stopped");
    }

    async fn deliver(&self, event: &Event) -> Result<(), DeliveryError> {
        let delivery = tokio::time::timeout(self.deliver_timeout, self.subscriber.deliver(event));
        match AssertUnwindSafe(delivery).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => Err(DeliveryError::TimedOut(self.deliver_timeout)),
            Err(panic) => Err(DeliveryError::from_panic(panic)),
        }
    }
}
