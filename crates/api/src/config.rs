use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub pipeline: PipelineSettings,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub analysis_model: String,
    pub classification_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0:3000".to_string(),
            },
            backend: BackendConfig {
                base_url: "https://api.groq.com/openai/v1".to_string(),
                api_key: String::new(),
                analysis_model: "meta-llama/llama-4-scout-17b-16e-instruct".to_string(),
                classification_model: "llama-3.3-70b-versatile".to_string(),
            },
            pipeline: PipelineSettings {
                request_timeout_secs: 60,
            },
            // Single attempt per stage unless configured otherwise.
            retry: RetryConfig {
                max_retries: 0,
                initial_backoff_ms: 500,
                max_backoff_ms: 5000,
            },
        }
    }
}

impl AppConfig {
    /// Defaults overlaid with `.env` and process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        config.backend.api_key = lookup("GROQ_API_KEY").context("GROQ_API_KEY must be set")?;
        if let Some(url) = lookup("LLM_BASE_URL") {
            config.backend.base_url = url;
        }
        if let Some(model) = lookup("ANALYSIS_MODEL") {
            config.backend.analysis_model = model;
        }
        if let Some(model) = lookup("CLASSIFICATION_MODEL") {
            config.backend.classification_model = model;
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            config.server.bind_addr = addr;
        }

        parse_into(&lookup, "REQUEST_TIMEOUT_SECS", &mut config.pipeline.request_timeout_secs)?;
        parse_into(&lookup, "BACKEND_MAX_RETRIES", &mut config.retry.max_retries)?;
        parse_into(&lookup, "BACKEND_INITIAL_BACKOFF_MS", &mut config.retry.initial_backoff_ms)?;
        parse_into(&lookup, "BACKEND_MAX_BACKOFF_MS", &mut config.retry.max_backoff_ms)?;

        if config.pipeline.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.request_timeout_secs)
    }
}

fn parse_into<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_api_key() {
        let config = AppConfig::from_lookup(lookup_from(&[("GROQ_API_KEY", "secret")])).unwrap();

        assert_eq!(config.backend.api_key, "secret");
        assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_missing_api_key() {
        assert!(AppConfig::from_lookup(lookup_from(&[])).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("GROQ_API_KEY", "secret"),
            ("LLM_BASE_URL", "http://localhost:8000/v1"),
            ("REQUEST_TIMEOUT_SECS", "15"),
            ("BACKEND_MAX_RETRIES", "2"),
        ]))
        .unwrap();

        assert_eq!(config.backend.base_url, "http://localhost:8000/v1");
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn test_invalid_number() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("GROQ_API_KEY", "secret"),
            ("REQUEST_TIMEOUT_SECS", "soon"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = AppConfig::from_lookup(lookup_from(&[("GROQ_API_KEY", "secret")])).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
