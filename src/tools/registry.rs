//! Tool registry - the tool schema bound to the model and the executors behind it
//!
//! Manual search is always bound; it has no executor here because the
//! retrieval agent serves it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{
    Config, DocentError, Result, ToolCall, ToolDefinition, ToolKind, MANUAL_SEARCH_TOOL,
};
use crate::tools::web_search::WebSearchTool;
use crate::tools::Tool;

/// Registry of available tools
pub struct ToolRegistry {
    /// Definitions in the order they are bound
    definitions: Vec<ToolDefinition>,
    /// Executors indexed by tool name
    executors: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a registry with only the manual search tool
    pub fn new(document_name: &str) -> Self {
        Self {
            definitions: vec![manual_search_definition(document_name)],
            executors: HashMap::new(),
        }
    }

    /// Create the registry described by configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new(&config.document.name);

        match WebSearchTool::from_config(&config.web_search)? {
            Some(tool) => registry.register(Arc::new(tool)),
            None => tracing::warn!("BRAVE_API_KEY not set; web search is disabled"),
        }

        Ok(registry)
    }

    /// Register an executable tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let definition = tool.definition();
        let name = definition.name().to_string();
        self.definitions.retain(|d| d.name() != name);
        self.definitions.push(definition);
        self.executors.insert(name, tool);
    }

    /// Definitions bound to the orchestrator model
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Whether a tool with this name is bound
    pub fn is_bound(&self, name: &str) -> bool {
        self.definitions.iter().any(|d| d.name() == name)
    }

    /// Execute a non-retrieval tool call
    pub async fn execute(&self, call: &ToolCall) -> Result<String> {
        match call.kind() {
            ToolKind::ManualSearch => Err(DocentError::tool(
                "search_manual is served by the retrieval agent",
            )),
            ToolKind::WebSearch | ToolKind::Unknown(_) => match self.executors.get(&call.name) {
                Some(tool) => tool.execute(call).await,
                None => Err(DocentError::tool(format!(
                    "Unknown or unavailable tool: {}",
                    call.name
                ))),
            },
        }
    }
}

/// Schema of the manual search tool
pub fn manual_search_definition(document_name: &str) -> ToolDefinition {
    ToolDefinition::function(
        MANUAL_SEARCH_TOOL,
        format!(
            "Search the {} for information: features and controls, maintenance, \
             specifications and capacities, safety systems, troubleshooting, fuses.",
            document_name
        ),
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question or topic to search for in the document"
                }
            },
            "required": ["question"]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WEB_SEARCH_TOOL;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            WebSearchTool::tool_definition()
        }

        async fn execute(&self, call: &ToolCall) -> Result<String> {
            Ok(format!("echo {}", call.get_string("query").unwrap_or_default()))
        }
    }

    #[test]
    fn test_manual_search_always_bound() {
        let registry = ToolRegistry::new("Owner's Manual");
        assert!(registry.is_bound(MANUAL_SEARCH_TOOL));
        assert!(!registry.is_bound(WEB_SEARCH_TOOL));
        assert!(registry.definitions()[0]
            .function
            .description
            .contains("Owner's Manual"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ToolRegistry::new("doc");
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.definitions().len(), 2);
    }

    #[tokio::test]
    async fn test_execute_dispatch() {
        let mut registry = ToolRegistry::new("doc");
        registry.register(Arc::new(EchoTool));

        let web = ToolCall::new("c1", WEB_SEARCH_TOOL, serde_json::json!({"query": "latch"}));
        assert_eq!(registry.execute(&web).await.unwrap(), "echo latch");

        let unknown = ToolCall::new("c2", "get_weather", serde_json::json!({}));
        assert!(registry.execute(&unknown).await.is_err());

        let manual = ToolCall::new("c3", MANUAL_SEARCH_TOOL, serde_json::json!({}));
        assert!(registry.execute(&manual).await.is_err());
    }
}
