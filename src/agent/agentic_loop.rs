//! Agentic tool-calling loop.
//!
//! Drives the model ↔ tool round-trip: sends the request, runs any tool
//! calls in the response, appends the results, and repeats until the model
//! answers in plain text or the iteration limit is reached.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::approval::{ApprovalGate, denied_message};
use super::tool::{ToolResult, ToolSet};
use crate::error::{AgentError, Result};
use crate::llm::message::{assistant_tool_calls_message, tool_message};
use crate::llm::{ChatModel, ChatRequest, TokenUsage};

/// Marker the ReAct template asks the model to put before its answer.
const FINAL_ANSWER_MARKER: &str = "Final Answer:";

/// One executed (or denied) tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStep {
    /// Tool name as requested by the model.
    pub tool: String,
    /// Raw argument JSON.
    pub arguments: String,
    /// What the tool returned, or the error text.
    pub observation: String,
    /// Whether the observation is an error.
    pub is_error: bool,
}

/// The outcome of a completed loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRun {
    /// The model's closing text reply.
    pub output: String,
    /// Tool calls in execution order.
    pub steps: Vec<AgentStep>,
    /// Usage summed over every model call.
    pub usage: TokenUsage,
    /// Number of model calls made.
    pub iterations: usize,
}

/// Extracts the answer from a reply, dropping any `Final Answer:` preamble.
#[must_use]
pub fn final_answer(content: &str) -> &str {
    content
        .rfind(FINAL_ANSWER_MARKER)
        .map_or(content, |at| &content[at + FINAL_ANSWER_MARKER.len()..])
        .trim()
}

/// Runs an agentic loop: model → tool calls → tool results → model → …
///
/// Every call passes through `gate` first; a denied call is reported to the
/// model as an error result. Tool failures never abort the loop.
///
/// # Errors
///
/// Returns [`AgentError::IterationLimit`] if the model is still requesting
/// tools after `max_iterations` calls. Propagates model errors.
pub async fn agentic_loop(
    model: &dyn ChatModel,
    request: &mut ChatRequest,
    tools: &ToolSet,
    gate: &dyn ApprovalGate,
    max_iterations: usize,
) -> Result<AgentRun> {
    let mut run = AgentRun::default();

    for iteration in 0..max_iterations {
        let response = model.chat(request).await?;
        run.usage.accumulate(response.usage);
        run.iterations = iteration + 1;

        if response.tool_calls.is_empty() {
            debug!(iteration, "agentic loop completed with final text response");
            run.output = response.content;
            return Ok(run);
        }

        debug!(
            iteration,
            tool_count = response.tool_calls.len(),
            "executing tool calls"
        );
        request
            .messages
            .push(assistant_tool_calls_message(response.tool_calls.clone()));

        for call in &response.tool_calls {
            let result = if gate.approve(call).await {
                tools.execute(call).await
            } else {
                info!(tool = call.name, call_id = call.id, "tool call denied");
                ToolResult::error(call, denied_message(call))
            };
            debug!(
                tool = call.name,
                call_id = call.id,
                is_error = result.is_error,
                "tool execution complete"
            );
            request
                .messages
                .push(tool_message(&result.tool_call_id, &result.content));
            run.steps.push(AgentStep {
                tool: call.name.clone(),
                arguments: call.arguments.clone(),
                observation: result.content,
                is_error: result.is_error,
            });
        }
    }

    warn!(max_iterations, "agent hit the iteration limit");
    Err(AgentError::IterationLimit { max_iterations }.into())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::agent::approval::{AutoApprove, DenyAll};
    use crate::agent::tools::CalculatorTool;
    use crate::config::ModelConfig;
    use crate::error::{Error, LlmError};
    use crate::llm::message::{system_message, user_message};
    use crate::llm::{ChatResponse, ScriptedChatModel, TextStream, ToolCall};

    /// Mock model that requests the calculator on the first N calls,
    /// then answers.
    struct MockToolModel {
        config: ModelConfig,
        call_count: AtomicUsize,
        tool_rounds: usize,
    }

    impl MockToolModel {
        fn new(tool_rounds: usize) -> Self {
            Self {
                config: ModelConfig::default(),
                call_count: AtomicUsize::new(0),
                tool_rounds,
            }
        }
    }

    #[async_trait]
    impl ChatModel for MockToolModel {
        fn name(&self) -> &str {
            "mock"
        }

        fn config(&self) -> &ModelConfig {
            &self.config
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            let count = self.call_count.fetch_add(1, Ordering::SeqCst);
            if count < self.tool_rounds {
                Ok(ChatResponse::tool_calls(vec![calculator_call(
                    &format!("call_{count}"),
                    "6 * 7",
                )]))
            } else {
                Ok(ChatResponse {
                    content: "Thought: I now know the final answer\nFinal Answer: 42".to_string(),
                    usage: TokenUsage {
                        prompt_tokens: 100,
                        completion_tokens: 20,
                        total_tokens: 120,
                    },
                    tool_calls: Vec::new(),
                    finish_reason: Some("stop".to_string()),
                })
            }
        }

        async fn chat_stream(&self, _request: &ChatRequest) -> Result<TextStream, LlmError> {
            Err(LlmError::Stream {
                message: "not implemented".to_string(),
            })
        }
    }

    fn calculator_call(id: &str, expression: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "calculator".to_string(),
            arguments: serde_json::json!({ "input": expression }).to_string(),
        }
    }

    fn tools() -> ToolSet {
        ToolSet::new(vec![Arc::new(CalculatorTool)]).unwrap_or_default()
    }

    fn request() -> ChatRequest {
        ChatRequest::new(vec![
            system_message("You are a test agent."),
            user_message("What is 6 times 7?"),
        ])
    }

    #[test]
    fn test_final_answer() {
        assert_eq!(final_answer("Final Answer: 42"), "42");
        assert_eq!(final_answer("Thought: done\nFinal Answer:  Paris \n"), "Paris");
        assert_eq!(final_answer("  just text "), "just text");
    }

    #[tokio::test]
    async fn test_single_tool_round() {
        let model = MockToolModel::new(1);
        let mut request = request();

        let run = agentic_loop(&model, &mut request, &tools(), &AutoApprove, 10)
            .await
            .unwrap_or_else(|e| panic!("agentic_loop failed: {e}"));

        assert!(run.output.starts_with("Thought: "));
        assert_eq!(final_answer(&run.output), "42");
        assert_eq!(run.iterations, 2);
        assert_eq!(run.usage.total_tokens, 120);
        assert_eq!(run.steps.len(), 1);
        assert_eq!(run.steps[0].observation, "42");
        assert!(!run.steps[0].is_error);
        // system + user + assistant(tool_calls) + tool(result)
        assert_eq!(request.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_multiple_rounds() {
        let model = MockToolModel::new(3);
        let mut request = request();

        let run = agentic_loop(&model, &mut request, &tools(), &AutoApprove, 10)
            .await
            .unwrap_or_else(|e| panic!("agentic_loop failed: {e}"));

        assert_eq!(run.steps.len(), 3);
        // 2 initial + 3 rounds * 2 (assistant + tool)
        assert_eq!(request.messages.len(), 8);
    }

    #[tokio::test]
    async fn test_exceeds_max_iterations() {
        let model = MockToolModel::new(100);
        let mut request = request();

        let result = agentic_loop(&model, &mut request, &tools(), &AutoApprove, 2).await;
        assert!(
            matches!(
                result,
                Err(Error::Agent(AgentError::IterationLimit { max_iterations: 2 }))
            ),
            "expected IterationLimit, got: {result:?}"
        );
        assert_eq!(model.call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_tools_needed() {
        let model = MockToolModel::new(0);
        let mut request = request();

        let run = agentic_loop(&model, &mut request, &tools(), &AutoApprove, 10)
            .await
            .unwrap_or_else(|e| panic!("agentic_loop failed: {e}"));

        assert_eq!(final_answer(&run.output), "42");
        assert!(run.steps.is_empty());
        assert_eq!(request.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_errors_are_fed_back() {
        let model = ScriptedChatModel::new(ModelConfig::default());
        model.push(ChatResponse::tool_calls(vec![
            ToolCall {
                id: "a".to_string(),
                name: "no_such_tool".to_string(),
                arguments: "{}".to_string(),
            },
            ToolCall {
                id: "b".to_string(),
                name: "calculator".to_string(),
                arguments: "{broken".to_string(),
            },
        ]));
        model.push(ChatResponse::text("I could not compute it."));
        let mut request = request();

        let run = agentic_loop(&model, &mut request, &tools(), &AutoApprove, 5)
            .await
            .unwrap_or_else(|e| panic!("agentic_loop failed: {e}"));

        assert_eq!(run.output, "I could not compute it.");
        assert!(run.steps.iter().all(|s| s.is_error));
        let requests = model.requests();
        let second = &requests[1];
        let tool_ids: Vec<_> = second
            .messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(tool_ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_denied_calls_do_not_run() {
        let model = ScriptedChatModel::new(ModelConfig::default());
        model.push(ChatResponse::tool_calls(vec![calculator_call("a", "1 + 1")]));
        model.push(ChatResponse::text("Not allowed to calculate."));
        let mut request = request();

        let run = agentic_loop(&model, &mut request, &tools(), &DenyAll, 5)
            .await
            .unwrap_or_else(|e| panic!("agentic_loop failed: {e}"));

        assert_eq!(run.steps.len(), 1);
        assert!(run.steps[0].is_error);
        assert!(run.steps[0].observation.contains("denied"));
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let model = ScriptedChatModel::new(ModelConfig::default());
        model.push_error(LlmError::ApiRequest {
            message: "boom".to_string(),
            status: Some(500),
            retryable: true,
        });
        let mut request = request();

        let result = agentic_loop(&model, &mut request, &tools(), &AutoApprove, 5).await;
        assert!(matches!(result, Err(Error::Llm(_))));
    }
}
