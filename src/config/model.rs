//! Chat model configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::env::{EnvSource, process_env};
use super::RecordFields;
use crate::error::ConfigError;

/// Prefix every OpenAI API key must carry.
pub const API_KEY_PREFIX: &str = "sk-";

/// Default chat model.
const DEFAULT_MODEL_NAME: &str = "gpt-3.5-turbo";
/// Default sampling temperature.
const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default completion token cap.
const DEFAULT_MAX_TOKENS: u32 = 2000;
/// Default request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
/// Default max retries.
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Highest accepted temperature.
const MAX_TEMPERATURE: f32 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ModelFields {
    model_name: String,
    temperature: f32,
    max_tokens: u32,
    /// Seconds.
    request_timeout: u64,
    max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_base: Option<String>,
}

impl Default for ModelFields {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            api_key: None,
            api_base: None,
        }
    }
}

impl ModelFields {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "model_name",
                message: "must not be empty".to_string(),
            });
        }
        // NaN fails the range check too
        if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(ConfigError::OutOfRange {
                field: "temperature",
                value: self.temperature.to_string(),
                expected: "0.0..=2.0",
            });
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_tokens",
                value: "0".to_string(),
                expected: "> 0",
            });
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::OutOfRange {
                field: "request_timeout",
                value: "0".to_string(),
                expected: "> 0 seconds",
            });
        }
        if let Some(ref key) = self.api_key
            && !key.starts_with(API_KEY_PREFIX)
        {
            return Err(ConfigError::InvalidApiKey {
                prefix: API_KEY_PREFIX,
            });
        }
        if let Some(ref base) = self.api_base {
            let url = reqwest::Url::parse(base).map_err(|e| ConfigError::InvalidValue {
                field: "api_base",
                message: format!("'{base}' is not a URL: {e}"),
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidValue {
                    field: "api_base",
                    message: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
        }
        Ok(())
    }
}

/// Validated chat model parameters.
///
/// Every constructor (builder, deserialization, [`ModelConfig::with_overrides`])
/// runs the same validators, so a `ModelConfig` value always satisfies:
/// temperature in `0.0..=2.0`, `max_tokens > 0`, `request_timeout > 0`,
/// API key (when present) prefixed with [`API_KEY_PREFIX`], and API base
/// (when present) an http(s) URL.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelFields", into = "ModelFields")]
pub struct ModelConfig {
    fields: ModelFields,
}

impl TryFrom<ModelFields> for ModelConfig {
    type Error = ConfigError;

    fn try_from(fields: ModelFields) -> Result<Self, Self::Error> {
        fields.validate()?;
        Ok(Self { fields })
    }
}

impl From<ModelConfig> for ModelFields {
    fn from(config: ModelConfig) -> Self {
        config.fields
    }
}

impl RecordFields for ModelConfig {
    type Fields = ModelFields;

    fn from_fields(fields: ModelFields) -> Result<Self, ConfigError> {
        Self::try_from(fields)
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("model_name", &self.fields.model_name)
            .field("temperature", &self.fields.temperature)
            .field("max_tokens", &self.fields.max_tokens)
            .field("request_timeout", &self.fields.request_timeout)
            .field("max_retries", &self.fields.max_retries)
            .field("api_key", &self.fields.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.fields.api_base)
            .finish()
    }
}

impl ModelConfig {
    /// Creates a new builder for `ModelConfig`.
    #[must_use]
    pub fn builder() -> ModelConfigBuilder {
        ModelConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().from_env()?.build()
    }

    /// Model identifier sent to the provider.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.fields.model_name
    }

    /// Sampling temperature.
    #[must_use]
    pub const fn temperature(&self) -> f32 {
        self.fields.temperature
    }

    /// Maximum tokens to generate.
    #[must_use]
    pub const fn max_tokens(&self) -> u32 {
        self.fields.max_tokens
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.fields.request_timeout)
    }

    /// Retries after the first failed attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.fields.max_retries
    }

    /// API key, if configured.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.fields.api_key.as_deref()
    }

    /// API base URL override, if configured.
    #[must_use]
    pub fn api_base(&self) -> Option<&str> {
        self.fields.api_base.as_deref()
    }

    /// Returns a copy with `overrides` applied, re-validated.
    pub fn with_overrides(&self, overrides: &ModelOverrides) -> Result<Self, ConfigError> {
        let mut fields = self.fields.clone();
        if let Some(ref name) = overrides.model_name {
            fields.model_name.clone_from(name);
        }
        if let Some(t) = overrides.temperature {
            fields.temperature = t;
        }
        if let Some(n) = overrides.max_tokens {
            fields.max_tokens = n;
        }
        if let Some(timeout) = overrides.request_timeout {
            fields.request_timeout = timeout.as_secs();
        }
        if let Some(n) = overrides.max_retries {
            fields.max_retries = n;
        }
        if let Some(ref key) = overrides.api_key {
            fields.api_key = Some(key.clone());
        }
        if let Some(ref base) = overrides.api_base {
            fields.api_base = Some(base.clone());
        }
        Self::try_from(fields)
    }
}

/// Per-call overrides applied on top of the stored [`ModelConfig`].
///
/// Unset fields fall through to the stored record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOverrides {
    /// Model identifier.
    pub model_name: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Per-request timeout (whole seconds are kept).
    pub request_timeout: Option<Duration>,
    /// Retry count.
    pub max_retries: Option<u32>,
    /// API key.
    pub api_key: Option<String>,
    /// API base URL.
    pub api_base: Option<String>,
}

impl ModelOverrides {
    /// Returns `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Builder for [`ModelConfig`].
#[derive(Debug, Clone, Default)]
pub struct ModelConfigBuilder {
    model_name: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    request_timeout: Option<Duration>,
    max_retries: Option<u32>,
    api_key: Option<String>,
    api_base: Option<String>,
}

impl ModelConfigBuilder {
    /// Populates unset fields from the process environment.
    ///
    /// Reads `OPENAI_API_KEY` (or `WANGCHAIN_API_KEY`), `OPENAI_API_BASE`
    /// (or `WANGCHAIN_API_BASE`), and `WANGCHAIN_MODEL_NAME`,
    /// `WANGCHAIN_TEMPERATURE`, `WANGCHAIN_MAX_TOKENS`,
    /// `WANGCHAIN_REQUEST_TIMEOUT` (seconds), `WANGCHAIN_MAX_RETRIES`.
    pub fn from_env(self) -> Result<Self, ConfigError> {
        self.from_source(&EnvSource::new(&process_env))
    }

    pub(crate) fn from_source(mut self, env: &EnvSource<'_>) -> Result<Self, ConfigError> {
        if self.api_key.is_none() {
            self.api_key = env
                .get("OPENAI_API_KEY")
                .or_else(|| env.prefixed("API_KEY"));
        }
        if self.api_base.is_none() {
            self.api_base = env
                .get("OPENAI_API_BASE")
                .or_else(|| env.prefixed("API_BASE"));
        }
        if self.model_name.is_none() {
            self.model_name = env.prefixed("MODEL_NAME");
        }
        if self.temperature.is_none() {
            self.temperature = env.parse("TEMPERATURE")?;
        }
        if self.max_tokens.is_none() {
            self.max_tokens = env.parse("MAX_TOKENS")?;
        }
        if self.request_timeout.is_none() {
            self.request_timeout = env.parse::<u64>("REQUEST_TIMEOUT")?.map(Duration::from_secs);
        }
        if self.max_retries.is_none() {
            self.max_retries = env.parse("MAX_RETRIES")?;
        }
        Ok(self)
    }

    /// Sets the model name.
    #[must_use]
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the completion token cap.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the max retries.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = Some(url.into());
        self
    }

    /// Builds and validates the [`ModelConfig`].
    pub fn build(self) -> Result<ModelConfig, ConfigError> {
        let defaults = ModelFields::default();
        ModelConfig::try_from(ModelFields {
            model_name: self.model_name.unwrap_or(defaults.model_name),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            request_timeout: self
                .request_timeout
                .map_or(defaults.request_timeout, |d| d.as_secs()),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            api_key: self.api_key,
            api_base: self.api_base,
        })
    }
}
