//! Configuration management for ollama-chat
//!
//! Settings are loaded from environment variables with sensible defaults.
//! They cover where to find Ollama, which model to use, the optional
//! OpenAI-compatible fallback provider, and runtime parameters.
//!
//! # Environment Variables
//!
//! - `OLLAMA_CHAT_CONTEXT`: Execution context (local|hosted) - default: "local"
//! - `OLLAMA_HOST`: Local Ollama endpoint - default: "http://localhost:11434"
//! - `OLLAMA_CHAT_REMOTE_HOST`: Remote Ollama endpoint - optional
//! - `OLLAMA_CHAT_MODEL`: Ollama model name - default: "llava"
//! - `OLLAMA_CHAT_MULTIMODAL`: Force image support on/off (true|false) - optional
//! - `OLLAMA_CHAT_STREAM`: Stream replies from Ollama - default: "true"
//! - `OLLAMA_CHAT_AUTO_PULL`: Pull a missing model at startup - default: "true"
//! - `OLLAMA_CHAT_TEMPERATURE`: Sampling temperature - optional
//! - `OLLAMA_CHAT_PROBE_TIMEOUT`: Probe/connect timeout in seconds (1-10) - default: "5"
//! - `OPENAI_API_KEY`: Credential for the fallback provider - optional
//! - `OLLAMA_CHAT_PROVIDER_URL`: Provider base URL - default: "https://api.openai.com/v1"
//! - `OLLAMA_CHAT_PROVIDER_MODEL`: Provider model - default: "gpt-4o-mini"
//! - `OLLAMA_CHAT_PROVIDER_STREAM`: Provider streams replies - default: "true"
//! - `OLLAMA_CHAT_PROVIDER_VISION`: Provider model accepts images - default: "true"
//! - `OLLAMA_CHAT_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use ollama_chat::ChatConfig;
//!
//! let config = ChatConfig::default();
//! config.validate().expect("Invalid configuration");
//! println!("{}", config);
//! ```

use crate::llm::EnvironmentSignals;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const ENV_CONTEXT: &str = "OLLAMA_CHAT_CONTEXT";
pub const ENV_LOCAL_HOST: &str = "OLLAMA_HOST";
pub const ENV_REMOTE_HOST: &str = "OLLAMA_CHAT_REMOTE_HOST";
pub const ENV_MODEL: &str = "OLLAMA_CHAT_MODEL";
pub const ENV_MULTIMODAL: &str = "OLLAMA_CHAT_MULTIMODAL";
pub const ENV_STREAM: &str = "OLLAMA_CHAT_STREAM";
pub const ENV_AUTO_PULL: &str = "OLLAMA_CHAT_AUTO_PULL";
pub const ENV_TEMPERATURE: &str = "OLLAMA_CHAT_TEMPERATURE";
pub const ENV_PROBE_TIMEOUT: &str = "OLLAMA_CHAT_PROBE_TIMEOUT";
pub const ENV_PROVIDER_KEY: &str = "OPENAI_API_KEY";
pub const ENV_PROVIDER_URL: &str = "OLLAMA_CHAT_PROVIDER_URL";
pub const ENV_PROVIDER_MODEL: &str = "OLLAMA_CHAT_PROVIDER_MODEL";
pub const ENV_PROVIDER_STREAM: &str = "OLLAMA_CHAT_PROVIDER_STREAM";
pub const ENV_PROVIDER_VISION: &str = "OLLAMA_CHAT_PROVIDER_VISION";
pub const ENV_LOG_LEVEL: &str = "OLLAMA_CHAT_LOG_LEVEL";

/// Default values for configuration
const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llava";
const DEFAULT_PROVIDER_URL: &str = "https://api.openai.com/v1";
const DEFAULT_PROVIDER_MODEL: &str = "gpt-4o-mini";
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
const MAX_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Where the process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    /// A workstation that may run Ollama itself
    Local,
    /// A hosted deployment with no local inference service
    Hosted,
}

impl ExecutionContext {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "local" => Ok(ExecutionContext::Local),
            "hosted" | "cloud" => Ok(ExecutionContext::Hosted),
            other => Err(ConfigError::ParseError {
                field: ENV_CONTEXT.to_string(),
                error: format!("expected 'local' or 'hosted', got '{}'", other),
            }),
        }
    }
}

/// Provider API key; never printed
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Main configuration structure for ollama-chat
///
/// `Default::default()` loads from environment variables and falls back to
/// defaults for anything unset or unparsable.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub execution_context: ExecutionContext,

    /// Local Ollama endpoint
    pub local_endpoint: String,

    /// Remote Ollama endpoint, probed when the local one is down
    pub remote_endpoint: Option<String>,

    /// Ollama model name
    pub model: String,

    /// Overrides vision detection for Ollama models
    pub multimodal_override: Option<bool>,

    /// Ask Ollama for a streamed reply
    pub stream: bool,

    /// Pull the model at session start when it is missing
    pub auto_pull: bool,

    pub temperature: Option<f32>,

    /// Probe and connect timeout in seconds
    pub probe_timeout_secs: u64,

    /// Credential for the alternate provider
    pub provider_api_key: Option<Credential>,

    pub provider_base_url: String,

    pub provider_model: String,

    /// Whether the provider streams replies
    pub provider_stream: bool,

    /// Whether the provider model accepts images
    pub provider_vision: bool,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        let execution_context = env::var(ENV_CONTEXT)
            .ok()
            .and_then(|v| ExecutionContext::parse(&v).ok())
            .unwrap_or(ExecutionContext::Local);

        let local_endpoint = env::var(ENV_LOCAL_HOST)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| normalize_endpoint(&v))
            .unwrap_or_else(|| DEFAULT_LOCAL_ENDPOINT.to_string());

        let remote_endpoint = env::var(ENV_REMOTE_HOST)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| normalize_endpoint(&v));

        let model = env::var(ENV_MODEL)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let provider_api_key = env::var(ENV_PROVIDER_KEY)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(Credential::new);

        let provider_base_url = env::var(ENV_PROVIDER_URL)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| normalize_endpoint(&v))
            .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string());

        let provider_model = env::var(ENV_PROVIDER_MODEL)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROVIDER_MODEL.to_string());

        let probe_timeout_secs = env::var(ENV_PROBE_TIMEOUT)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS);

        let temperature = env::var(ENV_TEMPERATURE)
            .ok()
            .and_then(|v| v.parse::<f32>().ok());

        let log_level = env::var(ENV_LOG_LEVEL)
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            execution_context,
            local_endpoint,
            remote_endpoint,
            model,
            multimodal_override: env_bool(ENV_MULTIMODAL),
            stream: env_bool(ENV_STREAM).unwrap_or(true),
            auto_pull: env_bool(ENV_AUTO_PULL).unwrap_or(true),
            temperature,
            probe_timeout_secs,
            provider_api_key,
            provider_base_url,
            provider_model,
            provider_stream: env_bool(ENV_PROVIDER_STREAM).unwrap_or(true),
            provider_vision: env_bool(ENV_PROVIDER_VISION).unwrap_or(true),
            log_level,
        }
    }
}

impl ChatConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any validation fails
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Probe timeout must be at least 1 second".to_string(),
            ));
        }
        if self.probe_timeout_secs > MAX_PROBE_TIMEOUT_SECS {
            return Err(ConfigError::ValidationFailed(format!(
                "Probe timeout cannot exceed {} seconds",
                MAX_PROBE_TIMEOUT_SECS
            )));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Model name must not be empty".to_string(),
            ));
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::ValidationFailed(format!(
                    "Temperature must be between 0.0 and 2.0, got {}",
                    temperature
                )));
            }
        }

        for endpoint in std::iter::once(&self.local_endpoint)
            .chain(self.remote_endpoint.iter())
            .chain(std::iter::once(&self.provider_base_url))
        {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::ValidationFailed(format!(
                    "Endpoint must be an http(s) URL: {}",
                    endpoint
                )));
            }
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// The inputs the backend resolver decides on
    pub fn signals(&self) -> EnvironmentSignals {
        EnvironmentSignals {
            hosted: self.execution_context == ExecutionContext::Hosted,
            local_endpoint: self.local_endpoint.clone(),
            remote_endpoint: self.remote_endpoint.clone(),
            provider_endpoint: self.provider_base_url.clone(),
            provider_credential: self.provider_api_key.is_some(),
        }
    }
}

impl fmt::Display for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ollama-chat configuration:")?;
        writeln!(f, "  Context: {:?}", self.execution_context)?;
        writeln!(f, "  Local endpoint: {}", self.local_endpoint)?;
        writeln!(
            f,
            "  Remote endpoint: {}",
            self.remote_endpoint.as_deref().unwrap_or("(none)")
        )?;
        writeln!(f, "  Model: {}", self.model)?;
        writeln!(f, "  Streaming: {}", self.stream)?;
        writeln!(
            f,
            "  Provider: {} ({}, credential {})",
            self.provider_base_url,
            self.provider_model,
            if self.provider_api_key.is_some() {
                "set"
            } else {
                "not set"
            }
        )?;
        writeln!(f, "  Probe timeout: {}s", self.probe_timeout_secs)?;
        writeln!(f, "  Log level: {}", self.log_level)?;
        Ok(())
    }
}

/// Adds a scheme when missing and strips trailing slashes
///
/// `OLLAMA_HOST` is commonly set to a bare `host:port`.
pub fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .and_then(|v| match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn unset(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_configuration() {
        let _guards = vec![
            EnvGuard::unset(ENV_CONTEXT),
            EnvGuard::unset(ENV_LOCAL_HOST),
            EnvGuard::unset(ENV_REMOTE_HOST),
            EnvGuard::unset(ENV_MODEL),
            EnvGuard::unset(ENV_PROVIDER_KEY),
            EnvGuard::unset(ENV_PROBE_TIMEOUT),
            EnvGuard::unset(ENV_STREAM),
            EnvGuard::set(ENV_LOG_LEVEL, DEFAULT_LOG_LEVEL),
        ];

        let config = ChatConfig::default();

        assert_eq!(config.execution_context, ExecutionContext::Local);
        assert_eq!(config.local_endpoint, DEFAULT_LOCAL_ENDPOINT);
        assert!(config.remote_endpoint.is_none());
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.provider_api_key.is_none());
        assert_eq!(config.probe_timeout_secs, DEFAULT_PROBE_TIMEOUT_SECS);
        assert!(config.stream);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _guards = vec![
            EnvGuard::set(ENV_CONTEXT, "hosted"),
            EnvGuard::set(ENV_LOCAL_HOST, "0.0.0.0:11434"),
            EnvGuard::set(ENV_REMOTE_HOST, "https://gpu.example.com/"),
            EnvGuard::set(ENV_MODEL, "llama3.2-vision"),
            EnvGuard::set(ENV_PROVIDER_KEY, "sk-test"),
            EnvGuard::set(ENV_PROBE_TIMEOUT, "8"),
            EnvGuard::set(ENV_STREAM, "false"),
            EnvGuard::set(ENV_MULTIMODAL, "no"),
        ];

        let config = ChatConfig::default();

        assert_eq!(config.execution_context, ExecutionContext::Hosted);
        assert_eq!(config.local_endpoint, "http://0.0.0.0:11434");
        assert_eq!(
            config.remote_endpoint.as_deref(),
            Some("https://gpu.example.com")
        );
        assert_eq!(config.model, "llama3.2-vision");
        assert_eq!(
            config.provider_api_key.as_ref().map(|c| c.expose()),
            Some("sk-test")
        );
        assert_eq!(config.probe_timeout(), Duration::from_secs(8));
        assert!(!config.stream);
        assert_eq!(config.multimodal_override, Some(false));

        let signals = config.signals();
        assert!(signals.hosted);
        assert!(signals.provider_credential);
    }

    #[test]
    fn test_validate_probe_timeout_bounds() {
        let mut config = test_config();
        config.probe_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.probe_timeout_secs = 11;
        assert!(config.validate().is_err());

        config.probe_timeout_secs = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let mut config = test_config();
        config.log_level = "loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_temperature() {
        let mut config = test_config();
        config.temperature = Some(3.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credential_is_redacted() {
        let mut config = test_config();
        config.provider_api_key = Some(Credential::new("sk-secret"));
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        let display = config.to_string();
        assert!(!display.contains("sk-secret"));
        assert!(display.contains("credential set"));
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("localhost:11434"), "http://localhost:11434");
        assert_eq!(
            normalize_endpoint("https://host:11434/"),
            "https://host:11434"
        );
    }

    #[test]
    fn test_execution_context_parse() {
        assert_eq!(
            ExecutionContext::parse("HOSTED").unwrap(),
            ExecutionContext::Hosted
        );
        assert!(ExecutionContext::parse("mars").is_err());
    }

    fn test_config() -> ChatConfig {
        ChatConfig {
            execution_context: ExecutionContext::Local,
            local_endpoint: DEFAULT_LOCAL_ENDPOINT.to_string(),
            remote_endpoint: None,
            model: DEFAULT_MODEL.to_string(),
            multimodal_override: None,
            stream: true,
            auto_pull: true,
            temperature: None,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            provider_api_key: None,
            provider_base_url: DEFAULT_PROVIDER_URL.to_string(),
            provider_model: DEFAULT_PROVIDER_MODEL.to_string(),
            provider_stream: true,
            provider_vision: true,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}
