use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    /// Base URL of the session gateway process.
    gateway_url: String,
    /// Gemini API key for the AI fallback. May be empty; the fallback then
    /// replies with a configuration-error message instead of calling out.
    #[serde(default)]
    gemini_api_key: String,
    /// Directory for state files (logs, conversation store). Defaults to
    /// the current directory.
    data_dir: Option<String>,
    /// How many stored messages to hand the AI as conversation history.
    #[serde(default = "default_history_limit")]
    history_limit: usize,
}

fn default_history_limit() -> usize {
    10
}

pub struct Config {
    pub gateway_url: String,
    pub gemini_api_key: String,
    pub data_dir: PathBuf,
    pub history_limit: usize,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.gateway_url.is_empty() {
            return Err(ConfigError::Validation("gateway_url is required".into()));
        }
        if !file.gateway_url.starts_with("http://") && !file.gateway_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "gateway_url must be an http(s) URL (e.g. http://127.0.0.1:3000)".into(),
            ));
        }
        if file.history_limit == 0 {
            return Err(ConfigError::Validation("history_limit must be at least 1".into()));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            gateway_url: file.gateway_url,
            gemini_api_key: file.gemini_api_key,
            data_dir,
            history_limit: file.history_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config() {
        let file = write_config(
            r#"{
            "gateway_url": "http://127.0.0.1:3000",
            "gemini_api_key": "key-123",
            "data_dir": "/tmp/wakil"
        }"#,
        );
        let config = Config::load(file.path()).expect("should load valid config");
        assert_eq!(config.gateway_url, "http://127.0.0.1:3000");
        assert_eq!(config.gemini_api_key, "key-123");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/wakil"));
        assert_eq!(config.history_limit, 10);
    }

    #[test]
    fn test_defaults() {
        let file = write_config(r#"{ "gateway_url": "http://localhost:3000" }"#);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.gemini_api_key, "");
        assert_eq!(config.data_dir, PathBuf::from("."));
        assert_eq!(config.history_limit, 10);
    }

    #[test]
    fn test_missing_gateway_url() {
        let file = write_config(r#"{ "gateway_url": "" }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("gateway_url"));
    }

    #[test]
    fn test_gateway_url_must_be_http() {
        let file = write_config(r#"{ "gateway_url": "ws://localhost:3000" }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_zero_history_limit_rejected() {
        let file = write_config(
            r#"{ "gateway_url": "http://localhost:3000", "history_limit": 0 }"#,
        );
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("history_limit"));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
