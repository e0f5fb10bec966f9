//! Real-time event fan-out for crewcast.
//!
//! A producer calls [`BroadcastEngine::publish`]; every registered
//! [`Subscriber`] receives the event through its own delivery worker, in
//! publish order, and is dropped from the registry the first time a delivery
//! fails.

mod engine;
mod error;
mod event;
mod log;
mod registry;
mod subscriber;

#[cfg(test)]
mod testing;

pub use engine::{BroadcastEngine, DrainReport, EngineConfig, EngineStats, PublishReport};
pub use error::{DeliveryError, EventError};
pub use event::{kinds, Event, EventBuilder, Metadata};
pub use log::LogSubscriber;
pub use registry::{Registry, Snapshot};
pub use subscriber::{FnSubscriber, Subscriber, SubscriberId, SyncSubscriber};
