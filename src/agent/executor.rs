//! Agent executor and builder.
//!
//! An [`AgentExecutor`] pairs a chat model with a [`ToolSet`] and a system
//! prompt rendered from the agent template, then runs tasks through
//! [`agentic_loop`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::agentic_loop::{AgentRun, agentic_loop, final_answer};
use super::approval::{ApprovalGate, AutoApprove, DenyAll};
use super::tool::{Tool, ToolSet};
use super::tools::default_tools;
use crate::config::{AgentConfig, ConfigStore};
use crate::error::{AgentError, ConfigError, Error, Result};
use crate::llm::message::{system_message, user_message};
use crate::llm::{ChatModel, ChatModelFactory, ChatRequest};
use crate::prompt::{self, PromptSet};

/// Placeholders an agent template must contain.
const REQUIRED_PLACEHOLDERS: [&str; 2] = ["tools", "tool_names"];

/// Runs tasks with a model, tools, and a rendered system prompt.
pub struct AgentExecutor {
    model: Arc<dyn ChatModel>,
    tools: ToolSet,
    template: String,
    system_prompt: String,
    config: AgentConfig,
    gate: Arc<dyn ApprovalGate>,
}

impl fmt::Debug for AgentExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentExecutor")
            .field("model", &self.model.name())
            .field("tools", &self.tools)
            .field("agent_kind", &self.config.agent_kind())
            .field("max_iterations", &self.config.max_iterations())
            .finish_non_exhaustive()
    }
}

impl AgentExecutor {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    /// Runs `task` and returns the final answer.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::EmptyTask`] for a blank task,
    /// [`AgentError::IterationLimit`] if no answer arrives in time, and
    /// model errors as-is.
    pub async fn run(&self, task: &str) -> Result<String> {
        Ok(self.run_detailed(task).await?.output)
    }

    /// Runs `task` and returns the answer with its intermediate steps.
    ///
    /// # Errors
    ///
    /// Same as [`AgentExecutor::run`].
    pub async fn run_detailed(&self, task: &str) -> Result<AgentRun> {
        let task = task.trim();
        if task.is_empty() {
            return Err(AgentError::EmptyTask.into());
        }
        info!(
            model = self.model.name(),
            tools = self.tools.len(),
            max_iterations = self.config.max_iterations(),
            "Agent run started"
        );

        let mut request = ChatRequest::new(vec![
            system_message(&self.system_prompt),
            user_message(task),
        ])
        .with_tools(self.tools.definitions());

        let mut run = agentic_loop(
            self.model.as_ref(),
            &mut request,
            &self.tools,
            self.gate.as_ref(),
            self.config.max_iterations(),
        )
        .await?;
        if self.config.agent_kind() == prompt::REACT_AGENT_KIND {
            run.output = final_answer(&run.output).to_string();
        }

        info!(
            iterations = run.iterations,
            steps = run.steps.len(),
            total_tokens = run.usage.total_tokens,
            "Agent run finished"
        );
        Ok(run)
    }

    /// Adds a tool and re-renders the system prompt.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::DuplicateTool`] if the name is taken; the
    /// executor is unchanged in that case.
    pub fn add_tool(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        self.tools.push(tool)?;
        self.system_prompt = render_system_prompt(&self.template, &self.tools);
        debug!(tools = ?self.tools.names(), "Agent rebuilt");
        Ok(())
    }

    /// The tools available to the model.
    #[must_use]
    pub const fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// The rendered system prompt.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// The configuration snapshot taken at build time.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

fn render_system_prompt(template: &str, tools: &ToolSet) -> String {
    prompt::render(
        template,
        &[
            ("tools", &tools.describe()),
            ("tool_names", &tools.names().join(", ")),
        ],
    )
}

/// The builder's store, falling back to (and caching) the global one.
fn resolve_store(store: &mut Option<Arc<ConfigStore>>) -> Result<Arc<ConfigStore>, ConfigError> {
    if let Some(store) = store {
        return Ok(Arc::clone(store));
    }
    let global = ConfigStore::global()?;
    *store = Some(Arc::clone(&global));
    Ok(global)
}

fn template_error(err: ConfigError) -> AgentError {
    let message = match err {
        ConfigError::InvalidValue { message, .. } => message,
        other => other.to_string(),
    };
    AgentError::Template { message }
}

/// Builder for [`AgentExecutor`].
///
/// Anything left unset is resolved at [`AgentBuilder::build`]: the config
/// from the store, the model from [`ChatModelFactory::create_default`], the
/// tools from [`default_tools`], and the template from [`PromptSet::load`].
#[derive(Default)]
pub struct AgentBuilder {
    model: Option<Arc<dyn ChatModel>>,
    tools: Option<Vec<Arc<dyn Tool>>>,
    extra_tools: Vec<Arc<dyn Tool>>,
    template: Option<String>,
    gate: Option<Arc<dyn ApprovalGate>>,
    store: Option<Arc<ConfigStore>>,
    config: Option<AgentConfig>,
}

impl fmt::Debug for AgentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .field("custom_template", &self.template.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AgentBuilder {
    /// Uses `model` instead of the configured default.
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Replaces the default tools. An empty list keeps the defaults.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Adds a tool on top of the default (or given) tools.
    #[must_use]
    pub fn add_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    /// Uses a custom system template containing `{tools}` and `{tool_names}`.
    #[must_use]
    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Sets the gate consulted before each tool call.
    #[must_use]
    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Resolves defaults from `store` instead of the global store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses `config` instead of the store's agent record.
    #[must_use]
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the executor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedKind`] for an unknown agent kind,
    /// [`AgentError::Template`] for a template missing a placeholder,
    /// [`AgentError::DuplicateTool`] for clashing tool names, and any error
    /// from creating the default model.
    pub fn build(self) -> Result<AgentExecutor> {
        let mut store = self.store;
        let config = match self.config {
            Some(config) => config,
            None => resolve_store(&mut store)?.agent().as_ref().clone(),
        };

        let kind = config.agent_kind();
        let prompts = PromptSet::load(None);
        let default_template = prompts
            .agent_template(kind)
            .ok_or_else(|| Error::unsupported("agent kind", kind))?;
        let template = match self.template {
            Some(custom) => {
                prompt::require_placeholders(&custom, &REQUIRED_PLACEHOLDERS)
                    .map_err(template_error)?;
                custom
            }
            None => default_template.to_string(),
        };

        let model = match self.model {
            Some(model) => model,
            None => ChatModelFactory::new(resolve_store(&mut store)?).create_default()?,
        };

        let base = self
            .tools
            .filter(|tools| !tools.is_empty())
            .unwrap_or_else(|| default_tools(&config));
        let mut tools = ToolSet::new(base)?;
        for tool in self.extra_tools {
            tools.push(tool)?;
        }

        let gate = match self.gate {
            Some(gate) => gate,
            None if config.human_approval_required() => Arc::new(DenyAll),
            None => Arc::new(AutoApprove),
        };

        let system_prompt = render_system_prompt(&template, &tools);
        info!(
            agent_kind = kind,
            model = model.name(),
            tools = ?tools.names(),
            "Agent built"
        );
        Ok(AgentExecutor {
            model,
            tools,
            template,
            system_prompt,
            config,
            gate,
        })
    }
}
