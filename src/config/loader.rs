//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable holding extra credentials (comma separated).
pub const API_KEYS_ENV: &str = "KEY_RELAY_API_KEYS";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration.
///
/// With no path the built-in defaults are used. Credentials from
/// [`API_KEYS_ENV`] are appended after the ones in the file.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            parse_config(&content)?
        }
        None => RelayConfig::default(),
    };

    if let Ok(raw) = std::env::var(API_KEYS_ENV) {
        config.upstream.api_keys.extend(split_keys(&raw));
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML document without validating it.
pub fn parse_config(content: &str) -> Result<RelayConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}

fn split_keys(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keys_ignores_blanks() {
        let keys: Vec<String> = split_keys(" a, ,b ,,c").collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("key-relay-{}.toml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            r#"
            [upstream]
            base_url = "http://127.0.0.1:9999/v1"
            api_keys = ["first"]
            "#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.upstream.api_keys[0], "first");
        assert_eq!(config.upstream.base_url, "http://127.0.0.1:9999/v1");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_parse_error_reported() {
        let err = parse_config("[upstream\nbase_url = 1").unwrap_err();
        assert!(err.to_string().starts_with("Parse error"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/key-relay.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
