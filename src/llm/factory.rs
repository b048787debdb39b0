//! Provider registry, factory, and fluent builder.
//!
//! Maps provider names to constructors and resolves model parameters from
//! the [`ConfigStore`] plus per-call [`ModelOverrides`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::provider::ChatModel;
use super::providers::{OPENAI_PROVIDER, OpenAiChatModel, SCRIPTED_PROVIDER, ScriptedChatModel};
use crate::config::{ConfigStore, ModelConfig, ModelOverrides};
use crate::error::{Error, LlmError, Result};

/// Builds a chat model from resolved parameters.
pub type ModelConstructor =
    Arc<dyn Fn(ModelConfig) -> std::result::Result<Arc<dyn ChatModel>, LlmError> + Send + Sync>;

/// Creates chat model clients by provider name.
///
/// `openai` and the offline `scripted` echo model are registered by
/// default. Names are matched case-insensitively.
#[derive(Clone)]
pub struct ChatModelFactory {
    store: Arc<ConfigStore>,
    registry: BTreeMap<String, ModelConstructor>,
}

impl fmt::Debug for ChatModelFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatModelFactory")
            .field("providers", &self.providers())
            .finish_non_exhaustive()
    }
}

impl ChatModelFactory {
    /// Creates a factory reading model parameters from `store`.
    #[must_use]
    pub fn new(store: Arc<ConfigStore>) -> Self {
        let mut factory = Self {
            store,
            registry: BTreeMap::new(),
        };
        factory.register(OPENAI_PROVIDER, |config| {
            Ok(Arc::new(OpenAiChatModel::new(config)?) as Arc<dyn ChatModel>)
        });
        factory.register(SCRIPTED_PROVIDER, |config| {
            Ok(Arc::new(ScriptedChatModel::new(config)) as Arc<dyn ChatModel>)
        });
        factory
    }

    /// Registers (or replaces) a provider.
    pub fn register<F>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        F: Fn(ModelConfig) -> std::result::Result<Arc<dyn ChatModel>, LlmError>
            + Send
            + Sync
            + 'static,
    {
        self.registry
            .insert(name.to_ascii_lowercase(), Arc::new(constructor));
        self
    }

    /// Registered provider names, sorted.
    #[must_use]
    pub fn providers(&self) -> Vec<&str> {
        self.registry.keys().map(String::as_str).collect()
    }

    /// The store this factory reads from.
    #[must_use]
    pub const fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Creates a client of provider `kind`.
    ///
    /// Reads the current [`ModelConfig`], applies `overrides`, re-validates,
    /// and constructs the client.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedKind`] for an unknown provider (nothing is
    ///   constructed and the config is not read)
    /// - [`Error::Config`] if the merged parameters are invalid
    /// - [`Error::Llm`] if the client cannot be set up
    pub fn create(&self, kind: &str, overrides: &ModelOverrides) -> Result<Arc<dyn ChatModel>> {
        let key = kind.to_ascii_lowercase();
        let constructor = self
            .registry
            .get(&key)
            .ok_or_else(|| Error::unsupported("model provider", kind))?;

        let config = self.store.model().with_overrides(overrides)?;
        debug!(
            provider = %key,
            model = config.model_name(),
            overridden = !overrides.is_empty(),
            "Creating chat model"
        );
        let model = constructor(config)?;
        info!(provider = %key, model = model.config().model_name(), "Chat model created");
        Ok(model)
    }

    /// Creates an `openai` client from the stored config alone.
    pub fn create_default(&self) -> Result<Arc<dyn ChatModel>> {
        self.create(OPENAI_PROVIDER, &ModelOverrides::default())
    }

    /// Starts a fluent builder on this factory.
    #[must_use]
    pub fn builder(&self) -> ChatModelBuilder<'_> {
        ChatModelBuilder::new(self)
    }
}

/// Accumulates provider choice and overrides, then builds through a
/// [`ChatModelFactory`].
///
/// Setters take `&mut self` and return the same builder, so calls chain.
/// [`ChatModelBuilder::build`] can be called any number of times; each call
/// constructs a new client.
#[derive(Debug, Clone)]
pub struct ChatModelBuilder<'a> {
    factory: &'a ChatModelFactory,
    model_type: String,
    overrides: ModelOverrides,
}

impl<'a> ChatModelBuilder<'a> {
    /// Starts with provider `openai` and no overrides.
    #[must_use]
    pub fn new(factory: &'a ChatModelFactory) -> Self {
        Self {
            factory,
            model_type: OPENAI_PROVIDER.to_string(),
            overrides: ModelOverrides::default(),
        }
    }

    /// Sets the provider name.
    pub fn model_type(&mut self, kind: impl Into<String>) -> &mut Self {
        self.model_type = kind.into();
        self
    }

    /// Sets the model name.
    pub fn model_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.overrides.model_name = Some(name.into());
        self
    }

    /// Sets the temperature.
    pub const fn temperature(&mut self, t: f32) -> &mut Self {
        self.overrides.temperature = Some(t);
        self
    }

    /// Sets the completion cap.
    pub const fn max_tokens(&mut self, n: u32) -> &mut Self {
        self.overrides.max_tokens = Some(n);
        self
    }

    /// Sets the request timeout.
    pub const fn request_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.overrides.request_timeout = Some(timeout);
        self
    }

    /// Sets the retry count.
    pub const fn max_retries(&mut self, n: u32) -> &mut Self {
        self.overrides.max_retries = Some(n);
        self
    }

    /// Sets the API key.
    pub fn api_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.overrides.api_key = Some(key.into());
        self
    }

    /// Sets the API base URL.
    pub fn api_base(&mut self, url: impl Into<String>) -> &mut Self {
        self.overrides.api_base = Some(url.into());
        self
    }

    /// Overrides accumulated so far.
    #[must_use]
    pub const fn overrides(&self) -> &ModelOverrides {
        &self.overrides
    }

    /// Builds a client; same contract as [`ChatModelFactory::create`].
    pub fn build(&self) -> Result<Arc<dyn ChatModel>> {
        self.factory.create(&self.model_type, &self.overrides)
    }
}
