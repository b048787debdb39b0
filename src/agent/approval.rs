//! Human-in-the-loop approval of tool calls.

use std::fmt;

use async_trait::async_trait;

use crate::llm::ToolCall;

/// Decides whether a tool call may run.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Returns `true` to let `call` run.
    async fn approve(&self, call: &ToolCall) -> bool;
}

/// Approves every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn approve(&self, _call: &ToolCall) -> bool {
        true
    }
}

/// Denies every call. Used when approval is required but no gate is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl ApprovalGate for DenyAll {
    async fn approve(&self, _call: &ToolCall) -> bool {
        false
    }
}

/// Adapts a synchronous predicate into an [`ApprovalGate`].
pub struct FnApproval<F>(pub F);

impl<F> fmt::Debug for FnApproval<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnApproval")
    }
}

#[async_trait]
impl<F> ApprovalGate for FnApproval<F>
where
    F: Fn(&ToolCall) -> bool + Send + Sync,
{
    async fn approve(&self, call: &ToolCall) -> bool {
        (self.0)(call)
    }
}

/// Tool result text for a denied call.
#[must_use]
pub fn denied_message(call: &ToolCall) -> String {
    format!("Tool call '{}' was denied by the human reviewer.", call.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: "call_0".to_string(),
            name: name.to_string(),
            arguments: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_gates() {
        assert!(AutoApprove.approve(&call("calculator")).await);
        assert!(!DenyAll.approve(&call("calculator")).await);

        let only_calculator = FnApproval(|c: &ToolCall| c.name == "calculator");
        assert!(only_calculator.approve(&call("calculator")).await);
        assert!(!only_calculator.approve(&call("web_search")).await);
    }

    #[test]
    fn test_denied_message_names_tool() {
        assert_eq!(
            denied_message(&call("web_search")),
            "Tool call 'web_search' was denied by the human reviewer."
        );
    }
}
