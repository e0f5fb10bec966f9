use std::time::Duration;

use crewcast_events::EngineConfig;
use crewcast_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};

/// Main crewcast configuration
///
/// Configuration is loaded from (in priority order):
/// 1. `crewcast.jsonc` - JSON with comments
/// 2. `crewcast.json` - Standard JSON
/// 3. `crewcast.yml` / `crewcast.yaml` - YAML format
///
/// Also checks hidden variants (`.crewcast.*`) and `~/.config/crewcast/`.
///
/// # Example
///
/// ```yaml
/// engine:
///   queue_capacity: 512
///   deliver_timeout_ms: 2000
/// gateway:
///   host: 0.0.0.0
///   port: 8000
///   auth_token: ${CREWCAST_TOKEN}
/// telemetry:
///   level: debug
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrewcastConfig {
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub gateway: GatewaySettings,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Broadcast engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Events buffered per subscriber before it is considered stalled and evicted
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound for delivering one event to one subscriber
    #[serde(default = "default_deliver_timeout_ms")]
    pub deliver_timeout_ms: u64,

    /// Time given to in-flight deliveries on shutdown
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            deliver_timeout_ms: default_deliver_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl EngineSettings {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            queue_capacity: self.queue_capacity.max(1),
            deliver_timeout: Duration::from_millis(self.deliver_timeout_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_deliver_timeout_ms() -> u64 {
    5_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

/// HTTP/WebSocket server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Host to bind the gateway server
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind the gateway server
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token required on the stream and publish routes
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            auth_token: None,
            cors_origins: Vec::new(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8000
}
