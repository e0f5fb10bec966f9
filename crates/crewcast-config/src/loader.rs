use crate::schema::CrewcastConfig;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Jsonc,
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;

        match ext {
            "jsonc" => Some(Self::Jsonc),
            "json" => Some(Self::Json),
            "yml" | "yaml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: CrewcastConfig,
    pub path: PathBuf,
    pub format: ConfigFormat,
}

/// Loads the configuration, falling back to defaults when no file is found.
/// An explicitly given path must exist.
pub fn load_config_or_default(config_path: Option<&Path>) -> Result<CrewcastConfig> {
    Ok(resolve_config(config_path)?
        .map(|resolved| resolved.config)
        .unwrap_or_default())
}

/// Locates and parses the configuration file. `None` means no path was given
/// and no candidate file exists.
pub fn resolve_config(config_path: Option<&Path>) -> Result<Option<ResolvedConfig>> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => match find_config_file() {
            Some(path) => path,
            None => return Ok(None),
        },
    };

    load_config_from_file(&path).map(Some)
}

pub fn load_config_from_file(path: &Path) -> Result<ResolvedConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let format = ConfigFormat::from_path(path)
        .ok_or_else(|| anyhow!("Unknown config format for: {}", path.display()))?;

    let config = parse_config_content(&content, format)?;

    Ok(ResolvedConfig {
        config: expand_env_vars(config),
        path: path.to_path_buf(),
        format,
    })
}

fn parse_config_content(content: &str, format: ConfigFormat) -> Result<CrewcastConfig> {
    match format {
        ConfigFormat::Jsonc => json5::from_str(content).context("Failed to parse JSONC"),
        ConfigFormat::Json => serde_json::from_str(content).context("Failed to parse JSON"),
        ConfigFormat::Yaml => serde_yaml_ng::from_str(content).context("Failed to parse YAML"),
    }
}

const CONFIG_CANDIDATES: &[&str] = &[
    "crewcast.jsonc",
    "crewcast.json",
    "crewcast.yml",
    "crewcast.yaml",
    ".crewcast.jsonc",
    ".crewcast.json",
    ".crewcast.yml",
    ".crewcast.yaml",
];

fn find_config_file() -> Option<PathBuf> {
    for candidate in CONFIG_CANDIDATES {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Some(path);
        }
    }

    let global_dir = dirs::home_dir()?.join(".config").join("crewcast");
    CONFIG_CANDIDATES
        .iter()
        .map(|candidate| global_dir.join(candidate))
        .find(|path| path.exists())
}

fn expand_env_vars(mut config: CrewcastConfig) -> CrewcastConfig {
    config.gateway.host = expand_env_string(&config.gateway.host);
    config.gateway.auth_token = config
        .gateway
        .auth_token
        .as_deref()
        .map(expand_env_string)
        .filter(|token| !token.is_empty());
    config
}

fn expand_env_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        if chars.peek() == Some(&'{') {
            chars.next();
            let var_name: String = chars.by_ref().take_while(|&c| c != '}').collect();
            match env::var(&var_name) {
                Ok(value) => result.push_str(&value),
                Err(_) => {
                    result.push_str("${");
                    result.push_str(&var_name);
                    result.push('}');
                }
            }
        } else {
            let mut var_name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    var_name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            if var_name.is_empty() {
                result.push('$');
            } else if let Ok(value) = env::var(&var_name) {
                result.push_str(&value);
            } else {
                result.push('$');
                result.push_str(&var_name);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expand_env_string_with_braces() {
        env::set_var("CREWCAST_TEST_VAR", "test_value");
        let result = expand_env_string("prefix_${CREWCAST_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");
    }

    #[test]
    fn test_expand_env_string_without_braces() {
        env::set_var("CREWCAST_TEST_VAR2", "value");
        let result = expand_env_string("hello $CREWCAST_TEST_VAR2 world");
        assert_eq!(result, "hello value world");
    }

    #[test]
    fn test_expand_env_string_missing_var() {
        let result = expand_env_string("prefix_${CREWCAST_NONEXISTENT}_suffix");
        assert_eq!(result, "prefix_${CREWCAST_NONEXISTENT}_suffix");
    }

    #[test]
    fn test_expand_env_string_lone_dollar() {
        assert_eq!(expand_env_string("cost: $ 5"), "cost: $ 5");
        assert_eq!(expand_env_string("no_variables_here"), "no_variables_here");
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("crewcast.jsonc")),
            Some(ConfigFormat::Jsonc)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("crewcast.json")),
            Some(ConfigFormat::Json)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("crewcast.yml")),
            Some(ConfigFormat::Yaml)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("crewcast.yaml")),
            Some(ConfigFormat::Yaml)
        );
        assert_eq!(ConfigFormat::from_path(Path::new("crewcast.toml")), None);
    }

    #[test]
    fn test_load_jsonc_with_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crewcast.jsonc");
        fs::write(
            &path,
            r#"{
  // stream settings
  "gateway": { "port": 9000 }, /* trailing */
  "engine": { "queue_capacity": 8 }
}"#,
        )
        .unwrap();

        let resolved = load_config_from_file(&path).unwrap();
        assert_eq!(resolved.format, ConfigFormat::Jsonc);
        assert_eq!(resolved.config.gateway.port, 9000);
        assert_eq!(resolved.config.engine.queue_capacity, 8);
    }

    #[test]
    fn test_load_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crewcast.json");
        fs::write(&path, r#"{"gateway": {"port": 6000}}"#).unwrap();

        let resolved = load_config_from_file(&path).unwrap();
        assert_eq!(resolved.format, ConfigFormat::Json);
        assert_eq!(resolved.config.gateway.port, 6000);
    }

    #[test]
    fn test_load_yaml_file_expands_env() {
        env::set_var("CREWCAST_TEST_TOKEN", "s3cret");
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crewcast.yml");
        fs::write(
            &path,
            r#"
gateway:
  host: 0.0.0.0
  port: 7000
  auth_token: ${CREWCAST_TEST_TOKEN}
telemetry:
  level: debug
  json_output: true
"#,
        )
        .unwrap();

        let resolved = load_config_from_file(&path).unwrap();
        assert_eq!(resolved.format, ConfigFormat::Yaml);
        assert_eq!(resolved.config.gateway.host, "0.0.0.0");
        assert_eq!(resolved.config.gateway.auth_token.as_deref(), Some("s3cret"));
        assert_eq!(resolved.config.telemetry.level, "debug");
        assert!(resolved.config.telemetry.json_output);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crewcast.toml");
        fs::write(&path, "port = 1").unwrap();
        let err = load_config_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Unknown config format"));
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        assert!(load_config_or_default(Some(&path)).is_err());
    }

    #[test]
    fn test_resolve_explicit_path_reports_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hub.yaml");
        fs::write(&path, "engine:\n  queue_capacity: 4\n").unwrap();

        let resolved = resolve_config(Some(&path)).unwrap().unwrap();
        assert_eq!(resolved.path, path);
        assert_eq!(resolved.format, ConfigFormat::Yaml);
        assert_eq!(resolved.config.engine.queue_capacity, 4);
        assert_eq!(
            load_config_or_default(Some(&path)).unwrap(),
            resolved.config
        );
    }

    #[test]
    fn test_invalid_content_reports_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crewcast.json");
        fs::write(&path, "{ not json").unwrap();
        let err = load_config_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
