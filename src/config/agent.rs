//! Agent configuration.

use serde::{Deserialize, Serialize};

use super::RecordFields;
use super::env::{EnvSource, process_env};
use crate::error::ConfigError;

const DEFAULT_AGENT_KIND: &str = "zero-shot-react-description";
const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Which built-in tools an agent gets by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[allow(clippy::struct_excessive_bools)]
pub struct ToolFlags {
    /// Web search.
    pub search: bool,
    /// Arithmetic calculator.
    pub calculator: bool,
    /// Wikipedia lookup.
    pub wikipedia: bool,
}

impl Default for ToolFlags {
    fn default() -> Self {
        Self {
            search: true,
            calculator: true,
            wikipedia: true,
        }
    }
}

impl ToolFlags {
    /// Flags with every tool disabled.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            search: false,
            calculator: false,
            wikipedia: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct AgentFields {
    agent_kind: String,
    max_iterations: usize,
    tools: ToolFlags,
    human_approval_required: bool,
}

impl Default for AgentFields {
    fn default() -> Self {
        Self {
            agent_kind: DEFAULT_AGENT_KIND.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tools: ToolFlags::default(),
            human_approval_required: false,
        }
    }
}

impl AgentFields {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_kind.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "agent_kind",
                message: "must not be empty".to_string(),
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_iterations",
                value: "0".to_string(),
                expected: "> 0",
            });
        }
        Ok(())
    }
}

/// Validated agent parameters.
///
/// `agent_kind` is checked against the supported kinds when an executor is
/// built, not here, so new kinds can be configured ahead of use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AgentFields", into = "AgentFields")]
pub struct AgentConfig {
    fields: AgentFields,
}

impl TryFrom<AgentFields> for AgentConfig {
    type Error = ConfigError;

    fn try_from(fields: AgentFields) -> Result<Self, Self::Error> {
        fields.validate()?;
        Ok(Self { fields })
    }
}

impl From<AgentConfig> for AgentFields {
    fn from(config: AgentConfig) -> Self {
        config.fields
    }
}

impl RecordFields for AgentConfig {
    type Fields = AgentFields;

    fn from_fields(fields: AgentFields) -> Result<Self, ConfigError> {
        Self::try_from(fields)
    }
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().from_env()?.build()
    }

    /// Agent strategy identifier.
    #[must_use]
    pub fn agent_kind(&self) -> &str {
        &self.fields.agent_kind
    }

    /// Maximum model turns per run.
    #[must_use]
    pub const fn max_iterations(&self) -> usize {
        self.fields.max_iterations
    }

    /// Built-in tool flags.
    #[must_use]
    pub const fn tools(&self) -> ToolFlags {
        self.fields.tools
    }

    /// Whether tool calls need approval.
    #[must_use]
    pub const fn human_approval_required(&self) -> bool {
        self.fields.human_approval_required
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    agent_kind: Option<String>,
    max_iterations: Option<usize>,
    enable_search: Option<bool>,
    enable_calculator: Option<bool>,
    enable_wikipedia: Option<bool>,
    human_approval_required: Option<bool>,
}

impl AgentConfigBuilder {
    /// Populates unset fields from `WANGCHAIN_AGENT_KIND`,
    /// `WANGCHAIN_MAX_ITERATIONS`, `WANGCHAIN_ENABLE_SEARCH`,
    /// `WANGCHAIN_ENABLE_CALCULATOR`, `WANGCHAIN_ENABLE_WIKIPEDIA` and
    /// `WANGCHAIN_HUMAN_APPROVAL`.
    pub fn from_env(self) -> Result<Self, ConfigError> {
        self.from_source(&EnvSource::new(&process_env))
    }

    pub(crate) fn from_source(mut self, env: &EnvSource<'_>) -> Result<Self, ConfigError> {
        if self.agent_kind.is_none() {
            self.agent_kind = env.prefixed("AGENT_KIND");
        }
        if self.max_iterations.is_none() {
            self.max_iterations = env.parse("MAX_ITERATIONS")?;
        }
        if self.enable_search.is_none() {
            self.enable_search = env.flag("ENABLE_SEARCH")?;
        }
        if self.enable_calculator.is_none() {
            self.enable_calculator = env.flag("ENABLE_CALCULATOR")?;
        }
        if self.enable_wikipedia.is_none() {
            self.enable_wikipedia = env.flag("ENABLE_WIKIPEDIA")?;
        }
        if self.human_approval_required.is_none() {
            self.human_approval_required = env.flag("HUMAN_APPROVAL")?;
        }
        Ok(self)
    }

    /// Sets the agent kind.
    #[must_use]
    pub fn agent_kind(mut self, kind: impl Into<String>) -> Self {
        self.agent_kind = Some(kind.into());
        self
    }

    /// Sets the iteration cap.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets all tool flags at once.
    #[must_use]
    pub const fn tools(mut self, flags: ToolFlags) -> Self {
        self.enable_search = Some(flags.search);
        self.enable_calculator = Some(flags.calculator);
        self.enable_wikipedia = Some(flags.wikipedia);
        self
    }

    /// Enables or disables web search.
    #[must_use]
    pub const fn enable_search(mut self, enabled: bool) -> Self {
        self.enable_search = Some(enabled);
        self
    }

    /// Enables or disables the calculator.
    #[must_use]
    pub const fn enable_calculator(mut self, enabled: bool) -> Self {
        self.enable_calculator = Some(enabled);
        self
    }

    /// Enables or disables Wikipedia lookup.
    #[must_use]
    pub const fn enable_wikipedia(mut self, enabled: bool) -> Self {
        self.enable_wikipedia = Some(enabled);
        self
    }

    /// Requires approval for every tool call.
    #[must_use]
    pub const fn human_approval_required(mut self, required: bool) -> Self {
        self.human_approval_required = Some(required);
        self
    }

    /// Builds and validates the [`AgentConfig`].
    pub fn build(self) -> Result<AgentConfig, ConfigError> {
        let defaults = AgentFields::default();
        AgentConfig::try_from(AgentFields {
            agent_kind: self.agent_kind.unwrap_or(defaults.agent_kind),
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
            tools: ToolFlags {
                search: self.enable_search.unwrap_or(defaults.tools.search),
                calculator: self.enable_calculator.unwrap_or(defaults.tools.calculator),
                wikipedia: self.enable_wikipedia.unwrap_or(defaults.tools.wikipedia),
            },
            human_approval_required: self
                .human_approval_required
                .unwrap_or(defaults.human_approval_required),
        })
    }
}
