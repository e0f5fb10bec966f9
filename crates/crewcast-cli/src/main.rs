//! Crewcast - real-time event broadcast hub

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use colored::Colorize;

use crewcast_config::{load_config_or_default, resolve_config, CrewcastConfig};
use crewcast_events::{BroadcastEngine, Event, LogSubscriber};
use crewcast_gateway::protocol::{ErrorResponse, PublishResponse};
use crewcast_gateway::{GatewayServer, PUBLISH_PATH};

mod commands;

use commands::{Cli, Commands, ConfigCommands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Serve {
            host,
            port,
            log_level,
            json_logs,
            log_events,
        } => {
            run_serve(
                cli.config.as_deref(),
                ServeOverrides {
                    host: host.clone(),
                    port: *port,
                    log_level: log_level.clone(),
                    json_logs: *json_logs,
                    log_events: *log_events,
                },
            )
            .await
        }
        Commands::Emit {
            url,
            kind,
            content,
            metadata,
            token,
        } => run_emit(url, kind, content, metadata.as_deref(), token.as_deref()).await,
        Commands::Config { command } => run_config(command, cli.config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

struct ServeOverrides {
    host: Option<String>,
    port: Option<u16>,
    log_level: Option<String>,
    json_logs: bool,
    log_events: bool,
}

fn apply_overrides(config: &mut CrewcastConfig, overrides: &ServeOverrides) {
    if let Some(host) = &overrides.host {
        config.gateway.host = host.clone();
    }
    if let Some(port) = overrides.port {
        config.gateway.port = port;
    }
    if let Some(level) = &overrides.log_level {
        config.telemetry.level = level.clone();
    }
    if overrides.json_logs {
        config.telemetry.json_output = true;
    }
}

async fn run_serve(config_path: Option<&Path>, overrides: ServeOverrides) -> Result<()> {
    let mut config = load_config_or_default(config_path)?;
    apply_overrides(&mut config, &overrides);

    crewcast_telemetry::init_subscriber(&config.telemetry);

    let engine = BroadcastEngine::new(config.engine.to_engine_config());
    if overrides.log_events {
        engine.subscribe_sync(Arc::new(LogSubscriber));
    }

    tracing::debug!(
        queue_capacity = config.engine.queue_capacity,
        deliver_timeout_ms = config.engine.deliver_timeout_ms,
        auth = config.gateway.auth_token.is_some(),
        "Engine configured"
    );

    let server = GatewayServer::from_settings(engine, &config.gateway);
    server
        .start(&config.gateway.host, config.gateway.port)
        .await?;

    println!("{}", "Hub stopped".dimmed());
    Ok(())
}

async fn run_emit(
    url: &str,
    kind: &str,
    content: &str,
    metadata: Option<&str>,
    token: Option<&str>,
) -> Result<()> {
    let event = build_event(kind, content, metadata)?;

    let endpoint = format!("{}{}", url.trim_end_matches('/'), PUBLISH_PATH);
    let mut request = reqwest::Client::new().post(&endpoint).json(&event);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", endpoint))?;

    let status = response.status();
    if !status.is_success() {
        let reason = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error)
            .unwrap_or_else(|_| status.to_string());
        bail!("Hub rejected event ({}): {}", status.as_u16(), reason);
    }

    let reply: PublishResponse = response
        .json()
        .await
        .context("Unexpected response from hub")?;

    println!(
        "{} {} {}",
        "Published".green().bold(),
        event.kind().cyan(),
        format!("(queued for {} stream subscribers)", reply.dispatched).dimmed()
    );
    Ok(())
}

fn build_event(kind: &str, content: &str, metadata: Option<&str>) -> Result<Event> {
    let mut builder = Event::builder(kind, content);
    if let Some(raw) = metadata {
        let value: serde_json::Value =
            serde_json::from_str(raw).context("--metadata is not valid JSON")?;
        let serde_json::Value::Object(map) = value else {
            return Err(anyhow!("--metadata must be a JSON object"));
        };
        builder = builder.metadata(map);
    }
    Ok(builder.build()?)
}

fn run_config(command: &ConfigCommands, config_path: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = match resolve_config(config_path)? {
                Some(resolved) => {
                    eprintln!(
                        "{} {} ({:?})",
                        "Loaded".green().bold(),
                        resolved.path.display(),
                        resolved.format
                    );
                    resolved.config
                }
                None => {
                    eprintln!("{}", "No config file found, showing defaults".dimmed());
                    CrewcastConfig::default()
                }
            };
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_event_with_metadata() {
        let event = build_event("tool_usage", "search", Some(r#"{"tool":"grep"}"#)).unwrap();
        assert_eq!(event.kind(), "tool_usage");
        assert_eq!(event.metadata().unwrap()["tool"], "grep");
    }

    #[test]
    fn test_build_event_rejects_non_object_metadata() {
        let err = build_event("tool_usage", "search", Some("[1,2]")).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
        assert!(build_event("tool_usage", "search", Some("{oops")).is_err());
    }

    #[test]
    fn test_build_event_rejects_empty_kind() {
        assert!(build_event("  ", "content", None).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = CrewcastConfig::default();
        apply_overrides(
            &mut config,
            &ServeOverrides {
                host: Some("0.0.0.0".to_string()),
                port: None,
                log_level: Some("debug".to_string()),
                json_logs: true,
                log_events: false,
            },
        );
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.telemetry.level, "debug");
        assert!(config.telemetry.json_output);
    }
}
