//! Tools the agent can call.
//!
//! A [`Tool`] takes one text input and returns text. Tool definitions are
//! sent to the model for native function-calling; the model's argument
//! JSON is reduced to that input before dispatch.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{AgentError, ToolError};
use crate::llm::{ToolCall, ToolDefinition};

/// Maximum raw byte length of tool argument JSON from the model.
const MAX_TOOL_ARGS_LEN: usize = 100_000;

/// Name of the single argument in the default schema.
pub const INPUT_ARGUMENT: &str = "input";

/// Schema of a tool taking one string named `input`.
#[must_use]
pub fn input_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "input": {
                "type": "string",
                "description": description
            }
        },
        "required": [INPUT_ARGUMENT],
        "additionalProperties": false
    })
}

/// A named capability the agent may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name; letters, digits, `_` and `-` only.
    fn name(&self) -> &str;

    /// What the tool does and what input it expects, shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema of the arguments.
    fn parameters(&self) -> Value {
        input_schema("Input for the tool.")
    }

    /// Runs the tool on the extracted input.
    async fn run(&self, input: &str) -> Result<String, ToolError>;

    /// The definition sent to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// The outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool call this result answers.
    pub tool_call_id: String,
    /// Output text, or the error message.
    pub content: String,
    /// Whether this result represents an error.
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result.
    #[must_use]
    pub fn ok(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            content: content.into(),
            is_error: false,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn error(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            content: content.into(),
            is_error: true,
        }
    }
}

type ToolFn = dyn Fn(&str) -> Result<String, ToolError> + Send + Sync;

/// Adapts a synchronous closure into a [`Tool`].
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    func: Arc<ToolFn>,
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl FnTool {
    /// Wraps `func` under `name`.
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            func: Arc::new(func),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, input: &str) -> Result<String, ToolError> {
        (self.func)(input)
    }
}

/// An ordered set of uniquely named tools.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ToolSet {
    /// Builds a set, rejecting duplicate names.
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Result<Self, AgentError> {
        let mut set = Self::default();
        for tool in tools {
            set.push(tool)?;
        }
        Ok(set)
    }

    /// Appends a tool.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::DuplicateTool`] if the name is taken.
    pub fn push(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        if self.get(tool.name()).is_some() {
            return Err(AgentError::DuplicateTool {
                name: tool.name().to_string(),
            });
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Looks a tool up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Tool names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Definitions sent to the model.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// One `name: description` line per tool.
    #[must_use]
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns `true` if the set holds no tools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Runs a tool call. Failures become error results rather than errors,
    /// so the model can see them and recover.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        if call.arguments.len() > MAX_TOOL_ARGS_LEN {
            return ToolResult::error(
                call,
                format!(
                    "tool arguments too large ({} bytes, max {MAX_TOOL_ARGS_LEN})",
                    call.arguments.len()
                ),
            );
        }
        let Some(tool) = self.get(&call.name) else {
            return ToolResult::error(
                call,
                format!(
                    "unknown tool '{}'; available tools: {}",
                    call.name,
                    self.names().join(", ")
                ),
            );
        };
        let input = match extract_input(&call.arguments) {
            Ok(input) => input,
            Err(e) => return ToolResult::error(call, e.to_string()),
        };
        match tool.run(&input).await {
            Ok(content) => ToolResult::ok(call, content),
            Err(e) => ToolResult::error(call, e.to_string()),
        }
    }
}

/// Reduces model-supplied argument JSON to the tool's text input.
///
/// Accepts `{"input": "..."}`, an object with exactly one string field, or
/// a bare JSON string.
pub fn extract_input(arguments: &str) -> Result<String, ToolError> {
    let value: Value = serde_json::from_str(arguments)
        .map_err(|e| ToolError::InvalidArguments(format!("arguments are not JSON: {e}")))?;
    match value {
        Value::String(s) => Ok(s),
        Value::Object(map) => {
            if let Some(input) = map.get(INPUT_ARGUMENT) {
                return input.as_str().map(str::to_string).ok_or_else(|| {
                    ToolError::InvalidArguments(format!("'{INPUT_ARGUMENT}' must be a string"))
                });
            }
            let mut strings = map.values().filter_map(Value::as_str);
            match (strings.next(), strings.next()) {
                (Some(only), None) => Ok(only.to_string()),
                _ => Err(ToolError::InvalidArguments(format!(
                    "expected a string field '{INPUT_ARGUMENT}'"
                ))),
            }
        }
        other => Err(ToolError::InvalidArguments(format!(
            "expected an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn echo() -> Arc<dyn Tool> {
        Arc::new(FnTool::new("echo", "Repeats its input.", |input| {
            Ok(input.to_string())
        }))
    }

    fn failing() -> Arc<dyn Tool> {
        Arc::new(FnTool::new("fail", "Always fails.", |_| {
            Err(ToolError::Failed("service unavailable".to_string()))
        }))
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test_case(r#"{"input": "2 + 2"}"#, "2 + 2" ; "input field")]
    #[test_case(r#"{"query": "rust"}"#, "rust" ; "single string field")]
    #[test_case(r#""bare""#, "bare" ; "bare string")]
    fn test_extract_input(arguments: &str, expected: &str) {
        assert_eq!(extract_input(arguments).ok().as_deref(), Some(expected));
    }

    #[test_case("not json" ; "not json")]
    #[test_case("42" ; "number")]
    #[test_case(r#"{"input": 3}"#; "input not string")]
    #[test_case(r#"{"a": "x", "b": "y"}"#; "ambiguous")]
    fn test_extract_input_rejects(arguments: &str) {
        assert!(matches!(
            extract_input(arguments),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = ToolSet::new(vec![echo(), echo()]);
        assert!(matches!(err, Err(AgentError::DuplicateTool { ref name }) if name == "echo"));
    }

    #[test]
    fn test_definitions_and_describe() {
        let set = ToolSet::new(vec![echo(), failing()]).unwrap_or_default();
        assert_eq!(set.len(), 2);
        assert_eq!(set.names(), vec!["echo", "fail"]);
        let defs = set.definitions();
        assert_eq!(defs[0].parameters["required"][0], "input");
        assert_eq!(set.describe(), "echo: Repeats its input.\nfail: Always fails.");
    }

    #[tokio::test]
    async fn test_execute_outcomes() {
        let set = ToolSet::new(vec![echo(), failing()]).unwrap_or_default();

        let ok = set.execute(&call("echo", r#"{"input": "hi"}"#)).await;
        assert_eq!(ok.content, "hi");
        assert!(!ok.is_error);
        assert_eq!(ok.tool_call_id, "call_1");

        let failed = set.execute(&call("fail", r#"{"input": "x"}"#)).await;
        assert!(failed.is_error);
        assert_eq!(failed.content, "service unavailable");

        let unknown = set.execute(&call("nope", "{}")).await;
        assert!(unknown.is_error);
        assert!(unknown.content.contains("echo, fail"));

        let malformed = set.execute(&call("echo", "{")).await;
        assert!(malformed.is_error);
        assert!(malformed.content.starts_with("invalid arguments"));

        let huge = "x".repeat(MAX_TOOL_ARGS_LEN + 1);
        assert!(set.execute(&call("echo", &huge)).await.is_error);
    }
}
