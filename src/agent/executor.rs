//! Tool executor node
//!
//! Runs approved non-retrieval calls concurrently. Every call gets exactly
//! one correlated tool-result turn, in call order; failures become
//! error-bearing results so the loop can continue.

use std::sync::Arc;

use futures::future::join_all;

use crate::agent::state::{ConversationState, StatePatch};
use crate::core::{Message, ToolCall};
use crate::tools::ToolRegistry;

pub struct ToolExecutor {
    tools: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    /// Graph node: execute the pending batch
    pub async fn run(&self, state: &ConversationState) -> StatePatch {
        let calls: Vec<&ToolCall> = state
            .pending_tool_calls()
            .iter()
            .filter(|call| !call.kind().is_retrieval())
            .collect();

        tracing::debug!(thread_id = %state.thread_id, count = calls.len(), "executing tools");

        let results = join_all(calls.iter().map(|call| self.execute_one(call))).await;

        results
            .into_iter()
            .fold(StatePatch::new(), |patch, message| patch.append(message))
    }

    async fn execute_one(&self, call: &ToolCall) -> Message {
        match self.tools.execute(call).await {
            Ok(output) => {
                tracing::info!(tool = %call.name, call_id = %call.id, "tool succeeded");
                Message::tool_result(call, output)
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "tool failed");
                Message::tool_result(call, format!("Error: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Result, ThreadId, ToolDefinition, WEB_SEARCH_TOOL};
    use crate::tools::{Tool, WebSearchTool};
    use async_trait::async_trait;
    use serde_json::json;

    struct FlakySearch;

    #[async_trait]
    impl Tool for FlakySearch {
        fn definition(&self) -> ToolDefinition {
            WebSearchTool::tool_definition()
        }

        async fn execute(&self, call: &ToolCall) -> Result<String> {
            match call.get_string("query").as_deref() {
                Some("fail") => Err(crate::core::DocentError::tool("upstream 503")),
                Some(q) => Ok(format!("results for {}", q)),
                None => Err(crate::core::DocentError::tool("missing query")),
            }
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new("doc");
        registry.register(Arc::new(FlakySearch));
        ToolExecutor::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_one_correlated_result_per_call() {
        let mut state = ConversationState::new(ThreadId::from("t"), 1000);
        state.begin_turn("any recalls?");
        let calls = vec![
            ToolCall::new("a", WEB_SEARCH_TOOL, json!({"query": "recall"})),
            ToolCall::new("b", WEB_SEARCH_TOOL, json!({"query": "fail"})),
            ToolCall::new("c", "get_weather", json!({})),
        ];
        state.messages.push(Message::assistant("").with_tool_calls(calls));

        let patch = executor().run(&state).await;

        let ids: Vec<_> = patch
            .append
            .iter()
            .map(|m| m.tool_call_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(patch.append[0].content, "results for recall");
        assert!(patch.append[1].content.starts_with("Error:"));
        assert!(patch.append[2].content.contains("get_weather"));
    }
}
