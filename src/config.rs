use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::error::GptError;

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.7
}

/// Session configuration: endpoint, model and sampling settings.
///
/// Loadable from `~/.gpt-commands/config.yaml`; the API key may instead come
/// from `OPENAI_API_KEY` and the organization from `OPENAI_ORGANIZATION`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub organization: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            organization: None,
            api_base: default_api_base(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl ClientConfig {
    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gpt-commands")
            .join("config.yaml")
    }

    /// Load the config file if present, defaults otherwise.
    pub fn load() -> Result<ClientConfig, GptError> {
        let path = Self::config_path();
        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let config = serde_yml::from_str::<ClientConfig>(&contents)
                .map_err(|e| GptError::Config(format!("parse {}: {}", path.display(), e)))?;
            return Ok(config);
        }
        Ok(ClientConfig::default())
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// The API key from the config or the `OPENAI_API_KEY` environment
    /// variable, whichever is set first.
    pub fn resolve_api_key(&self) -> Result<String, GptError> {
        self.api_key
            .clone()
            .or_else(|| env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                GptError::Config(
                    "no API key configured and OPENAI_API_KEY is not set".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: ClientConfig = serde_yml::from_str("api_key: sk-test\n").unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.api_base, "https://api.openai.com/v1");
        assert_eq!(config.max_tokens, 2000);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn builder_setters_override_defaults() {
        let config = ClientConfig::default()
            .with_model("gpt-4")
            .with_max_tokens(512)
            .with_temperature(0.2);
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.max_tokens, 512);
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn explicit_api_key_wins() {
        let config = ClientConfig::default().with_api_key("sk-explicit");
        assert_eq!(config.resolve_api_key().unwrap(), "sk-explicit");
    }
}
