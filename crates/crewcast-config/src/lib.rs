pub mod loader;
pub mod schema;

pub use loader::{
    load_config_from_file, load_config_or_default, resolve_config, ConfigFormat, ResolvedConfig,
};
pub use schema::{CrewcastConfig, EngineSettings, GatewaySettings};
