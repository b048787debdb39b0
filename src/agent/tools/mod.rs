//! Built-in tools.

pub mod calculator;
pub mod search;
pub mod wikipedia;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

pub use calculator::{CALCULATOR_TOOL, CalculatorTool, calculate};
pub use search::{WEB_SEARCH_TOOL, WebSearchTool};
pub use wikipedia::{WIKIPEDIA_TOOL, WikipediaTool};

use super::tool::Tool;
use crate::config::AgentConfig;
use crate::error::ToolError;

/// Request timeout for network-backed tools.
pub(crate) const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = concat!("wangchain/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by the network tools.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Maps a transport failure to a tool error the model can read.
pub(crate) fn request_error(tool: &str, e: &reqwest::Error) -> ToolError {
    warn!(tool, error = %e, "Tool request failed");
    let message = if e.is_timeout() {
        format!("{tool} request timed out")
    } else if e.is_connect() {
        format!("{tool} service unreachable")
    } else {
        format!("{tool} request failed: {e}")
    };
    ToolError::Failed(message)
}

/// The built-in tools enabled in `config`, in the order search, Wikipedia,
/// calculator.
#[must_use]
pub fn default_tools(config: &AgentConfig) -> Vec<Arc<dyn Tool>> {
    let flags = config.tools();
    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
    if flags.search {
        tools.push(Arc::new(WebSearchTool::new()));
    }
    if flags.wikipedia {
        tools.push(Arc::new(WikipediaTool::new()));
    }
    if flags.calculator {
        tools.push(Arc::new(CalculatorTool));
    }
    tools
}
