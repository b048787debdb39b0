//! Wikipedia lookups through the MediaWiki action API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{DEFAULT_TOOL_TIMEOUT, http_client, request_error};
use crate::agent::tool::{Tool, input_schema};
use crate::error::ToolError;

/// Registry name of the Wikipedia tool.
pub const WIKIPEDIA_TOOL: &str = "wikipedia";

/// Text returned when nothing matched.
pub const NO_RESULTS: &str = "No good Wikipedia Search Result was found";

/// Pages summarized per query.
const TOP_PAGES: usize = 3;

/// Maximum characters returned.
const MAX_CONTENT_CHARS: usize = 4000;

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    query: Option<ExtractQuery>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: BTreeMap<String, Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    extract: Option<String>,
}

/// Formats page summaries, truncated to [`MAX_CONTENT_CHARS`].
fn format_pages(pages: &[(String, String)]) -> String {
    let text = pages
        .iter()
        .filter(|(_, summary)| !summary.trim().is_empty())
        .map(|(title, summary)| format!("Page: {title}\nSummary: {}", summary.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    if text.is_empty() {
        return NO_RESULTS.to_string();
    }
    text.chars().take(MAX_CONTENT_CHARS).collect()
}

/// Looks up concepts, people, places, and events on Wikipedia.
#[derive(Debug, Clone)]
pub struct WikipediaTool {
    endpoint: String,
    client: reqwest::Client,
}

impl Default for WikipediaTool {
    fn default() -> Self {
        Self::new()
    }
}

impl WikipediaTool {
    /// English Wikipedia.
    #[must_use]
    pub fn new() -> Self {
        Self::with_language("en")
    }

    /// The Wikipedia edition for `lang` (e.g. `"de"`, `"zh"`).
    #[must_use]
    pub fn with_language(lang: &str) -> Self {
        Self::with_endpoint(format!("https://{lang}.wikipedia.org/w/api.php"))
    }

    /// Any MediaWiki `api.php` endpoint.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: http_client(DEFAULT_TOOL_TIMEOUT),
        }
    }

    async fn get<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T, ToolError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(params)
            .send()
            .await
            .map_err(|e| request_error(WIKIPEDIA_TOOL, &e))?;
        let status = response.status();
        if !status.is_success() {
            warn!(tool = WIKIPEDIA_TOOL, %status, "MediaWiki API returned an error status");
            return Err(ToolError::Failed(format!("wikipedia API returned status {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| ToolError::Failed(format!("failed to parse wikipedia response: {e}")))
    }

    async fn search_titles(&self, query: &str) -> Result<Vec<String>, ToolError> {
        let limit = TOP_PAGES.to_string();
        let response: SearchResponse = self
            .get(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("format", "json"),
            ])
            .await?;
        Ok(response
            .query
            .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
            .unwrap_or_default())
    }

    async fn summary(&self, title: &str) -> Result<Option<(String, String)>, ToolError> {
        let response: ExtractResponse = self
            .get(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
                ("format", "json"),
            ])
            .await?;
        Ok(response
            .query
            .and_then(|q| q.pages.into_values().next())
            .and_then(|page| page.extract.map(|extract| (page.title, extract))))
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        WIKIPEDIA_TOOL
    }

    fn description(&self) -> &str {
        "Useful for when you need to find detailed information about concepts, people, \
         places, or historical events. Input should be a search term."
    }

    fn parameters(&self) -> serde_json::Value {
        input_schema("Search term.")
    }

    async fn run(&self, input: &str) -> Result<String, ToolError> {
        let query = input.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("search term is empty".to_string()));
        }
        let titles = self.search_titles(query).await?;
        debug!(tool = WIKIPEDIA_TOOL, query, hits = titles.len(), "Searched");

        let mut pages = Vec::with_capacity(titles.len());
        for title in &titles {
            if let Some(page) = self.summary(title).await? {
                pages.push(page);
            }
        }
        Ok(format_pages(&pages))
    }
}
