//! Configuration from environment variables and an optional YAML file.
//!
//! The YAML file (pointed to by `RELAY_CONFIG`) overlays the environment:
//!
//! ```yaml
//! port: 3000
//! upstream_base_url: "https://integrate.api.nvidia.com/v1"
//! features:
//!   strip_content: true
//!   show_reasoning: false
//!   thinking_mode: false
//! models:
//!   gpt-4o: "deepseek-ai/deepseek-v3.1"
//!   my-alias: "meta/llama-3.3-70b-instruct"
//! ```
//!
//! **Environment variables:**
//! - `PORT`: server port (default: 3000)
//! - `UPSTREAM_BASE_URL`: OpenAI-compatible base URL, including `/v1`
//! - `UPSTREAM_API_KEY` (or `NIM_API_KEY`): bearer token sent upstream
//! - `REQUEST_TIMEOUT_SECS`: upstream request timeout (default: 120)
//! - `STRIP_REASONING_CONTENT`: apply the content filter to visible text
//! - `SHOW_REASONING`: fold reasoning into `<think>` blocks instead of dropping it
//! - `ENABLE_THINKING_MODE`: ask the upstream chat template to think
//! - `RELAY_CONFIG`: path to the YAML file above

use crate::models::ModelMap;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub upstream_base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub strip_content: bool,
    pub show_reasoning: bool,
    pub thinking_mode: bool,
    pub models: ModelMap,
}

#[derive(Debug, Default, Deserialize)]
struct RelayYamlConfig {
    port: Option<u16>,
    upstream_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    features: FeaturesConfig,
    #[serde(default)]
    models: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct FeaturesConfig {
    strip_content: Option<bool>,
    show_reasoning: Option<bool>,
    thinking_mode: Option<bool>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            api_key: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            strip_content: false,
            show_reasoning: false,
            thinking_mode: false,
            models: ModelMap::default(),
        }
    }
}

impl RelayConfig {
    /// Build the process configuration: environment first, then the YAML file
    /// named by `RELAY_CONFIG` if there is one.
    pub fn load() -> Result<Self> {
        let base = Self::from_env();
        let config = match env::var("RELAY_CONFIG") {
            Ok(path) if !path.trim().is_empty() => base.with_yaml_file(path)?,
            _ => base,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`RelayConfig::from_env`] but reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            upstream_base_url: lookup("UPSTREAM_BASE_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.upstream_base_url),
            api_key: lookup("UPSTREAM_API_KEY")
                .or_else(|| lookup("NIM_API_KEY"))
                .filter(|s| !s.trim().is_empty()),
            request_timeout_secs: lookup("REQUEST_TIMEOUT_SECS")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
            strip_content: lookup("STRIP_REASONING_CONTENT")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.strip_content),
            show_reasoning: lookup("SHOW_REASONING")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.show_reasoning),
            thinking_mode: lookup("ENABLE_THINKING_MODE")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.thinking_mode),
            models: defaults.models,
        }
    }

    /// Overlay settings from a YAML file on top of `self`.
    pub fn with_yaml_file(self, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read relay config from {:?}", path))?;
        self.with_yaml_str(&content)
            .with_context(|| format!("Failed to parse relay config {:?}", path))
    }

    pub fn with_yaml_str(mut self, content: &str) -> Result<Self> {
        let yaml: RelayYamlConfig = if content.trim().is_empty() {
            RelayYamlConfig::default()
        } else {
            serde_yaml_ng::from_str(content)?
        };

        if let Some(port) = yaml.port {
            self.port = port;
        }
        if let Some(url) = yaml.upstream_base_url {
            self.upstream_base_url = url;
        }
        if let Some(secs) = yaml.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(v) = yaml.features.strip_content {
            self.strip_content = v;
        }
        if let Some(v) = yaml.features.show_reasoning {
            self.show_reasoning = v;
        }
        if let Some(v) = yaml.features.thinking_mode {
            self.thinking_mode = v;
        }
        for (external, upstream) in yaml.models {
            self.models.insert(external, upstream);
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.upstream_base_url.trim();
        if url.is_empty() {
            bail!("upstream base URL must not be empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("upstream base URL must be http(s): {}", url);
        }
        if self.request_timeout_secs == 0 {
            bail!("request timeout must be greater than zero");
        }
        if self.strip_content && self.show_reasoning {
            warn!("show_reasoning is ignored while strip_content is enabled; reasoning is dropped");
        }
        Ok(())
    }

    pub fn upstream_base_url_trimmed(&self) -> String {
        self.upstream_base_url.trim_end_matches('/').to_string()
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.upstream_base_url_trimmed())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = RelayConfig::from_lookup(|_| None);
        assert_eq!(config.port, 3000);
        assert_eq!(config.upstream_base_url, DEFAULT_UPSTREAM_BASE_URL);
        assert_eq!(config.api_key, None);
        assert_eq!(config.request_timeout_secs, 120);
        assert!(!config.strip_content);
        assert!(!config.show_reasoning);
        assert!(!config.thinking_mode);
        assert_eq!(config.models, ModelMap::default());
    }

    #[test]
    fn test_env_values() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("UPSTREAM_BASE_URL", "http://localhost:9000/v1/"),
            ("NIM_API_KEY", "nvapi-secret"),
            ("REQUEST_TIMEOUT_SECS", "30"),
            ("STRIP_REASONING_CONTENT", "TRUE"),
            ("SHOW_REASONING", "no"),
            ("ENABLE_THINKING_MODE", "1"),
        ]));

        assert_eq!(config.port, 8080);
        assert_eq!(config.api_key.as_deref(), Some("nvapi-secret"));
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.strip_content);
        assert!(!config.show_reasoning);
        assert!(config.thinking_mode);
        assert_eq!(
            config.chat_completions_url(),
            "http://localhost:9000/v1/chat/completions"
        );
    }

    #[test]
    fn test_primary_api_key_wins() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("UPSTREAM_API_KEY", "primary"),
            ("NIM_API_KEY", "secondary"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("PORT", "not-a-port"),
            ("REQUEST_TIMEOUT_SECS", "-1"),
        ]));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_yaml_overlay() {
        let config = RelayConfig::default()
            .with_yaml_str(
                r#"
port: 9000
features:
  strip_content: true
models:
  gpt-4o: "custom/gpt-4o-replacement"
  my-alias: "meta/llama-3.3-70b-instruct"
"#,
            )
            .unwrap();

        assert_eq!(config.port, 9000);
        assert!(config.strip_content);
        assert!(!config.thinking_mode);
        assert_eq!(config.models.resolve("gpt-4o"), "custom/gpt-4o-replacement");
        assert_eq!(
            config.models.resolve("my-alias"),
            "meta/llama-3.3-70b-instruct"
        );
        assert_eq!(
            config.models.resolve("gpt-4"),
            "qwen/qwen3-coder-480b-a35b-instruct"
        );
    }

    #[test]
    fn test_empty_yaml_is_noop() {
        let config = RelayConfig::default().with_yaml_str("  \n").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_validate() {
        assert!(RelayConfig::default().validate().is_ok());

        let bad_url = RelayConfig {
            upstream_base_url: "ftp://example.com".to_string(),
            ..RelayConfig::default()
        };
        assert!(bad_url.validate().is_err());

        let zero_timeout = RelayConfig {
            request_timeout_secs: 0,
            ..RelayConfig::default()
        };
        assert!(zero_timeout.validate().is_err());
    }
}
