//! WebSocket gateway for the crewcast broadcast hub.
//!
//! Streams every published event to connected WebSocket clients and accepts
//! events from producers over HTTP.

mod adapter;
mod error;
pub mod protocol;
mod server;
mod signal;

pub use adapter::{Released, WebSocketSubscriber};
pub use error::GatewayError;
pub use server::{GatewayServer, PUBLISH_PATH, STREAM_PATH};
pub use signal::wait_for_shutdown_signal;
