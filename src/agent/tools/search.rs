//! Web search through the DuckDuckGo Instant Answer API.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{DEFAULT_TOOL_TIMEOUT, http_client, request_error};
use crate::agent::tool::{Tool, input_schema};
use crate::error::ToolError;

/// Registry name of the web search tool.
pub const WEB_SEARCH_TOOL: &str = "web_search";

/// Default API endpoint.
pub const DUCKDUCKGO_ENDPOINT: &str = "https://api.duckduckgo.com/";

/// Text returned when nothing matched.
pub const NO_RESULTS: &str = "No good DuckDuckGo Search Result was found";

/// Related topics included in the output.
const MAX_TOPICS: usize = 5;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstantAnswer {
    #[serde(rename = "Heading")]
    heading: String,
    #[serde(rename = "AbstractText")]
    abstract_text: String,
    #[serde(rename = "Answer")]
    answer: String,
    #[serde(rename = "Definition")]
    definition: String,
    #[serde(rename = "RelatedTopics")]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Result {
        #[serde(rename = "Text")]
        text: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

fn collect_topics<'a>(topics: &'a [RelatedTopic], out: &mut Vec<&'a str>) {
    for topic in topics {
        if out.len() >= MAX_TOPICS {
            return;
        }
        match topic {
            RelatedTopic::Result { text } if !text.is_empty() => out.push(text),
            RelatedTopic::Result { .. } => {}
            RelatedTopic::Group { topics } => collect_topics(topics, out),
        }
    }
}

/// Flattens an instant-answer payload into plain text.
fn summarize(answer: &InstantAnswer) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !answer.answer.is_empty() {
        parts.push(answer.answer.clone());
    }
    if !answer.abstract_text.is_empty() {
        if answer.heading.is_empty() {
            parts.push(answer.abstract_text.clone());
        } else {
            parts.push(format!("{}: {}", answer.heading, answer.abstract_text));
        }
    }
    if !answer.definition.is_empty() {
        parts.push(answer.definition.clone());
    }
    let mut topics = Vec::new();
    collect_topics(&answer.related_topics, &mut topics);
    parts.extend(topics.into_iter().map(str::to_string));

    if parts.is_empty() {
        NO_RESULTS.to_string()
    } else {
        parts.join("\n")
    }
}

/// Searches the web for current information.
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    endpoint: String,
    client: reqwest::Client,
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSearchTool {
    /// A tool querying DuckDuckGo.
    #[must_use]
    pub fn new() -> Self {
        Self::with_endpoint(DUCKDUCKGO_ENDPOINT)
    }

    /// A tool querying an instant-answer compatible `endpoint`.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: http_client(DEFAULT_TOOL_TIMEOUT),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Useful for when you need to search for current information or find online \
         resources. Input should be a search query."
    }

    fn parameters(&self) -> serde_json::Value {
        input_schema("Search query.")
    }

    async fn run(&self, input: &str) -> Result<String, ToolError> {
        let query = input.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("search query is empty".to_string()));
        }
        debug!(tool = WEB_SEARCH_TOOL, query, "Searching");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| request_error(WEB_SEARCH_TOOL, &e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(tool = WEB_SEARCH_TOOL, %status, "Search API returned an error status");
            return Err(ToolError::Failed(format!("search API returned status {status}")));
        }

        let answer: InstantAnswer = response
            .json()
            .await
            .map_err(|e| ToolError::Failed(format!("failed to parse search response: {e}")))?;
        Ok(summarize(&answer))
    }
}
