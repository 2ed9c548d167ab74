//! Tools module - tools the orchestrator model can call
//!
//! Contains the tool registry and the web search tool.

pub mod registry;
pub mod web_search;

use async_trait::async_trait;

use crate::core::{Result, ToolCall, ToolDefinition};

pub use registry::{manual_search_definition, ToolRegistry};
pub use web_search::WebSearchTool;

/// An executable tool
#[async_trait]
pub trait Tool: Send + Sync {
    /// Schema bound to the model
    fn definition(&self) -> ToolDefinition;

    /// Run the call and return the text handed back to the model
    async fn execute(&self, call: &ToolCall) -> Result<String>;
}
