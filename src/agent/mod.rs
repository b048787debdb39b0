//! Tool-using agent.
//!
//! # Architecture
//!
//! ```text
//! task → AgentExecutor
//!   ├── system prompt (agent template + {tools}, {tool_names})
//!   └── agentic_loop
//!       ├── ChatModel::chat (with tool definitions)
//!       ├── ApprovalGate::approve per tool call
//!       ├── ToolSet::execute → ToolResult (errors fed back to the model)
//!       └── repeat until a text answer or max_iterations
//! ```

pub mod agentic_loop;
pub mod approval;
pub mod executor;
pub mod tool;
pub mod tools;

pub use agentic_loop::{AgentRun, AgentStep, agentic_loop, final_answer};
pub use approval::{ApprovalGate, AutoApprove, DenyAll, FnApproval};
pub use executor::{AgentBuilder, AgentExecutor};
pub use tool::{FnTool, Tool, ToolResult, ToolSet, extract_input, input_schema};
pub use tools::{
    CALCULATOR_TOOL, CalculatorTool, WEB_SEARCH_TOOL, WIKIPEDIA_TOOL, WebSearchTool,
    WikipediaTool, calculate, default_tools,
};
