//! Shared types used across Docent modules
//!
//! Contains message structures, tool calls, documents, and thread identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the tool that searches the indexed document
pub const MANUAL_SEARCH_TOOL: &str = "search_manual";

/// Name of the tool that searches the web
pub const WEB_SEARCH_TOOL: &str = "search_web";

/// Stable identity of a conversation thread
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Create a fresh, random thread id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role of a turn in the conversation log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token counts reported by the completion service for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A turn in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: String,
    /// Tool calls requested by an assistant turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Id of the call a tool-result turn answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Name of the tool a tool-result turn came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Token usage reported for the model call that produced this turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            usage: None,
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a tool-result message correlated to `call`
    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(call.name.clone()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// Attach tool calls to an assistant message
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Attach reported token usage
    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// Capability a tool call targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolKind {
    /// Search the indexed document (served by the retrieval agent)
    ManualSearch,
    /// Search the web (served by the tool executor)
    WebSearch,
    /// A name the model invented
    Unknown(String),
}

impl ToolKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            MANUAL_SEARCH_TOOL => ToolKind::ManualSearch,
            WEB_SEARCH_TOOL => ToolKind::WebSearch,
            other => ToolKind::Unknown(other.to_string()),
        }
    }

    pub fn is_retrieval(&self) -> bool {
        matches!(self, ToolKind::ManualSearch)
    }
}

/// A tool call made by the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates the call with its eventual result
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// JSON arguments for the tool
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Create a tool call with a generated id
    pub fn with_generated_id(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::new(format!("call_{}", uuid::Uuid::new_v4().simple()), name, arguments)
    }

    /// Capability this call targets
    pub fn kind(&self) -> ToolKind {
        ToolKind::from_name(&self.name)
    }

    /// Get a string argument by key
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

/// Definition of a tool that can be called by the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Type of tool (always "function" for now)
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function details
    pub function: FunctionDefinition,
}

/// Function definition within a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Name of the function
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON Schema for the parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new function tool definition
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// A chunk of the indexed document. Produced by the retrieval index, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Text of the chunk
    pub content: String,
    /// Page the chunk came from, when known
    #[serde(default)]
    pub page: Option<u32>,
    /// Identifier of the source chunk
    #[serde(default)]
    pub source_id: String,
}

impl Document {
    pub fn new(content: impl Into<String>, page: Option<u32>, source_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            page,
            source_id: source_id.into(),
        }
    }

    /// Page label for citations
    pub fn page_label(&self) -> String {
        match self.page {
            Some(page) => page.to_string(),
            None => "unknown".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_kind_from_name() {
        assert_eq!(ToolKind::from_name(MANUAL_SEARCH_TOOL), ToolKind::ManualSearch);
        assert_eq!(ToolKind::from_name(WEB_SEARCH_TOOL), ToolKind::WebSearch);
        assert_eq!(
            ToolKind::from_name("get_weather"),
            ToolKind::Unknown("get_weather".to_string())
        );
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ToolCall::with_generated_id(MANUAL_SEARCH_TOOL, serde_json::json!({}));
        let b = ToolCall::with_generated_id(MANUAL_SEARCH_TOOL, serde_json::json!({}));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_tool_result_correlates() {
        let call = ToolCall::new("call_1", WEB_SEARCH_TOOL, serde_json::json!({"query": "x"}));
        let result = Message::tool_result(&call, "done");
        assert_eq!(result.role, Role::Tool);
        assert_eq!(result.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(result.tool_name.as_deref(), Some(WEB_SEARCH_TOOL));
    }

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("usage").is_none());
    }

    #[test]
    fn test_page_label() {
        assert_eq!(Document::new("x", Some(42), "c1").page_label(), "42");
        assert_eq!(Document::new("x", None, "c1").page_label(), "unknown");
    }
}
