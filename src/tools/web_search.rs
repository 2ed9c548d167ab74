//! Web search tool backed by the Brave Search API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::core::config::WebSearchConfig;
use crate::core::{DocentError, Result, ToolCall, ToolDefinition, WEB_SEARCH_TOOL};
use crate::tools::Tool;

/// Searches the web for information the document does not cover
pub struct WebSearchTool {
    client: Client,
    endpoint: String,
    api_key: String,
    count: u32,
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

impl WebSearchTool {
    /// Build the tool from configuration; `None` when no API key is set
    pub fn from_config(config: &WebSearchConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DocentError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Some(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            count: config.count,
        }))
    }

    fn request_url(&self, query: &str) -> Result<url::Url> {
        url::Url::parse_with_params(
            &self.endpoint,
            &[("q", query.to_string()), ("count", self.count.to_string())],
        )
        .map_err(|e| DocentError::tool(format!("Invalid search endpoint: {}", e)))
    }

    pub fn tool_definition() -> ToolDefinition {
        ToolDefinition::function(
            WEB_SEARCH_TOOL,
            "Search the web for current information and real-world knowledge: known issues, \
             recalls, troubleshooting tips, and anything the document does not cover.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }),
        )
    }
}

fn format_results(query: &str, results: &[BraveResult]) -> String {
    if results.is_empty() {
        return format!("No web results found for: {}", query);
    }

    let mut output = format!("Web search results for '{}':\n", query);
    for (i, result) in results.iter().enumerate() {
        output.push_str(&format!(
            "\n[{}] {}\n{}\n{}\n",
            i + 1,
            result.title,
            result.url,
            result.description
        ));
    }
    output
}

#[async_trait]
impl Tool for WebSearchTool {
    fn definition(&self) -> ToolDefinition {
        Self::tool_definition()
    }

    async fn execute(&self, call: &ToolCall) -> Result<String> {
        let query = call
            .get_string("query")
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| DocentError::tool("search_web requires a 'query' argument"))?;

        tracing::info!(%query, "searching the web");

        let response = self
            .client
            .get(self.request_url(&query)?)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DocentError::tool(format!(
                "Web search failed with status {}",
                response.status()
            )));
        }

        let body: BraveResponse = response.json().await?;
        let results = body.web.map(|w| w.results).unwrap_or_default();
        Ok(format_results(&query, &results))
    }
}
