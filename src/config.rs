//! TOML configuration and environment credentials.
//!
//! Every section is optional; a missing config file is equivalent to an
//! empty one. API keys are never read from the file, only from the
//! environment (`RAGIE_API_KEY`, `OPENAI_API_KEY`).
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [retrieval]
//! base_url = "https://api.ragie.ai"
//! rerank = true
//! upload_mode = "fast"
//!
//! [generation]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o"
//! query_model = "gpt-4"
//! ```

use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{RelayError, Result};

pub const RAGIE_API_KEY_VAR: &str = "RAGIE_API_KEY";
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Largest accepted request body, in megabytes (uploads included).
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
    /// Directory for buffered uploads. Defaults to the system temp dir.
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_mb: default_max_upload_mb(),
            upload_dir: None,
        }
    }
}

impl ServerConfig {
    /// `max_upload_mb` in bytes, saturating instead of overflowing.
    pub fn max_body_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_upload_mb() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_url")]
    pub base_url: String,
    /// Rerank flag used when a request leaves `rerank` unset.
    #[serde(default = "default_rerank")]
    pub rerank: bool,
    /// Processing mode used when an upload leaves `mode` unset.
    #[serde(default = "default_upload_mode")]
    pub upload_mode: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: default_retrieval_url(),
            rerank: default_rerank(),
            upload_mode: default_upload_mode(),
        }
    }
}

fn default_retrieval_url() -> String {
    "https://api.ragie.ai".to_string()
}
fn default_rerank() -> bool {
    true
}
fn default_upload_mode() -> String {
    "fast".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_url")]
    pub base_url: String,
    /// Model used by `/api/generate` when the request names none.
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used by the plain `/api/query` flow.
    #[serde(default = "default_query_model")]
    pub query_model: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_url(),
            model: default_model(),
            query_model: default_query_model(),
        }
    }
}

fn default_generation_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_query_model() -> String {
    "gpt-4".to_string()
}

impl Config {
    /// Checks values that serde cannot: URLs, model names, bind address.
    pub fn validate(&self) -> Result<()> {
        for (key, url) in [
            ("retrieval.base_url", &self.retrieval.base_url),
            ("generation.base_url", &self.generation.base_url),
        ] {
            reqwest::Url::parse(url).map_err(|e| {
                RelayError::Configuration(format!("{} is not a valid URL ({}): {}", key, url, e))
            })?;
        }

        if self.generation.model.trim().is_empty() {
            return Err(RelayError::Configuration(
                "generation.model must not be empty".into(),
            ));
        }
        if self.generation.query_model.trim().is_empty() {
            return Err(RelayError::Configuration(
                "generation.query_model must not be empty".into(),
            ));
        }
        if self.retrieval.upload_mode.trim().is_empty() {
            return Err(RelayError::Configuration(
                "retrieval.upload_mode must not be empty".into(),
            ));
        }
        if self.server.max_upload_mb == 0 {
            return Err(RelayError::Configuration(
                "server.max_upload_mb must be > 0".into(),
            ));
        }
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| RelayError::Configuration(format!("server.bind is invalid: {}", e)))?;

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RelayError::Configuration(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| RelayError::Configuration(format!("Failed to parse config file: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// API keys for both upstream services.
#[derive(Clone)]
pub struct Credentials {
    pub ragie_api_key: String,
    pub openai_api_key: String,
}

impl Credentials {
    pub fn new(ragie_api_key: impl Into<String>, openai_api_key: impl Into<String>) -> Self {
        Self {
            ragie_api_key: ragie_api_key.into(),
            openai_api_key: openai_api_key.into(),
        }
    }

    /// Reads both keys from the process environment.
    ///
    /// Either key missing or blank is a [`RelayError::Configuration`];
    /// the binary refuses to start in that case.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    RelayError::Configuration(format!("{} environment variable is not set", key))
                })
        };

        Ok(Self {
            ragie_api_key: read(RAGIE_API_KEY_VAR)?,
            openai_api_key: read(OPENAI_API_KEY_VAR)?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ragie_api_key", &"<redacted>")
            .field("openai_api_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.retrieval.base_url, "https://api.ragie.ai");
        assert!(config.retrieval.rerank);
        assert_eq!(config.retrieval.upload_mode, "fast");
        assert_eq!(config.generation.model, "gpt-4o");
        assert_eq!(config.generation.query_model, "gpt-4");
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_config(
            r#"
[server]
bind = "0.0.0.0:9000"

[retrieval]
base_url = "http://localhost:4000"
rerank = false

[generation]
model = "gpt-4o-mini"
"#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.retrieval.base_url, "http://localhost:4000");
        assert!(!config.retrieval.rerank);
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert_eq!(config.generation.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn rejects_bad_url() {
        let err = parse_config("[retrieval]\nbase_url = \"not a url\"\n").unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
        assert!(err.to_string().contains("retrieval.base_url"));
    }

    #[test]
    fn rejects_blank_model() {
        let err = parse_config("[generation]\nmodel = \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("generation.model"));
    }

    #[test]
    fn rejects_bad_bind() {
        let err = parse_config("[server]\nbind = \"localhost\"\n").unwrap_err();
        assert!(err.to_string().contains("server.bind"));
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = load_config(Path::new("/nonexistent/relay.toml")).unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn credentials_require_both_keys() {
        let mut env = HashMap::new();
        env.insert(RAGIE_API_KEY_VAR, "rk".to_string());
        let err = Credentials::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains(OPENAI_API_KEY_VAR));

        env.insert(OPENAI_API_KEY_VAR, "   ".to_string());
        assert!(Credentials::from_lookup(|k| env.get(k).cloned()).is_err());

        env.insert(OPENAI_API_KEY_VAR, " ok ".to_string());
        let creds = Credentials::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(creds.ragie_api_key, "rk");
        assert_eq!(creds.openai_api_key, "ok");
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new("secret-a", "secret-b");
        let shown = format!("{:?}", creds);
        assert!(!shown.contains("secret-a"));
        assert!(!shown.contains("secret-b"));
    }

    #[test]
    fn huge_upload_limit_saturates() {
        let server = ServerConfig {
            max_upload_mb: usize::MAX / 2,
            ..Default::default()
        };
        assert_eq!(server.max_body_bytes(), usize::MAX);
        assert_eq!(ServerConfig::default().max_body_bytes(), 50 * 1024 * 1024);
    }
}
