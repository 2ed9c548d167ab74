//! Per-thread conversation state and the patches graph nodes return
//!
//! Nodes never mutate state directly. Each one reads a snapshot and returns a
//! [`StatePatch`]; the engine applies patches in traversal order.

use serde::{Deserialize, Serialize};

use crate::core::{Document, Message, Role, ThreadId, ToolCall};

/// Everything checkpointed for one conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Stable identity of the thread
    pub thread_id: ThreadId,
    /// Canonical conversation log. Never holds retrieval context.
    pub messages: Vec<Message>,
    /// Retrieval context for the next orchestrator call only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_context: Option<String>,
    /// Last retrieval batch, kept for diagnostics
    #[serde(default)]
    pub retrieved_documents: Vec<Document>,
    pub total_tokens: u64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub context_limit: u64,
    /// Set by the pre-filter for the current step only
    #[serde(default)]
    pub bypass_agent: bool,
    /// Orchestrator invocations in the current turn
    #[serde(default)]
    pub iterations: usize,
}

impl ConversationState {
    /// Create an empty state for a new thread
    pub fn new(thread_id: ThreadId, context_limit: u64) -> Self {
        Self {
            thread_id,
            messages: Vec::new(),
            rag_context: None,
            retrieved_documents: Vec::new(),
            total_tokens: 0,
            total_prompt_tokens: 0,
            total_completion_tokens: 0,
            context_limit,
            bypass_agent: false,
            iterations: 0,
        }
    }

    /// Record a new user turn and reset the per-turn fields
    pub fn begin_turn(&mut self, user_text: impl Into<String>) {
        self.messages.push(Message::user(user_text));
        self.bypass_agent = false;
        self.rag_context = None;
        self.iterations = 0;
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Get the last user message
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// Get the last assistant message
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Tool calls carried by the last turn, if it is an assistant turn
    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        match self.last_message() {
            Some(m) if m.is_assistant() => &m.tool_calls,
            _ => &[],
        }
    }

    /// History sent to the model: the log without system-level turns
    pub fn clean_history(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect()
    }

    /// Number of user turns so far
    pub fn interactions(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user()).count()
    }

    /// Share of the context window used, in percent
    pub fn usage_percentage(&self) -> f64 {
        if self.context_limit == 0 {
            return 0.0;
        }
        self.total_tokens as f64 * 100.0 / self.context_limit as f64
    }

    pub fn remaining_tokens(&self) -> u64 {
        self.context_limit.saturating_sub(self.total_tokens)
    }

    /// Apply a node's patch
    pub fn apply(&mut self, patch: StatePatch) {
        if patch.clear_pending_tool_calls {
            if let Some(last) = self.messages.last_mut() {
                if last.is_assistant() {
                    last.tool_calls.clear();
                }
            }
        }

        self.messages.extend(patch.append);

        match patch.rag_context {
            ContextUpdate::Keep => {}
            ContextUpdate::Set(context) => self.rag_context = Some(context),
            ContextUpdate::Clear => self.rag_context = None,
        }

        if let Some(documents) = patch.retrieved_documents {
            self.retrieved_documents = documents;
        }

        if let Some(bypass) = patch.bypass_agent {
            self.bypass_agent = bypass;
        }

        if let Some(totals) = patch.totals {
            // Counters only move forward within a thread.
            self.total_prompt_tokens = self.total_prompt_tokens.max(totals.prompt_tokens);
            self.total_completion_tokens =
                self.total_completion_tokens.max(totals.completion_tokens);
            self.total_tokens = self.total_tokens.max(totals.total_tokens);
        }
    }
}

/// Change to the transient retrieval context
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ContextUpdate {
    #[default]
    Keep,
    Set(String),
    Clear,
}

/// Cumulative token totals after a tracked turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Incremental update produced by a graph node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    /// Turns appended to the log, in order
    pub append: Vec<Message>,
    /// Empty the tool calls of the last assistant turn before appending
    pub clear_pending_tool_calls: bool,
    pub rag_context: ContextUpdate,
    pub retrieved_documents: Option<Vec<Document>>,
    pub bypass_agent: Option<bool>,
    pub totals: Option<TokenTotals>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(mut self, message: Message) -> Self {
        self.append.push(message);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MANUAL_SEARCH_TOOL;

    fn state() -> ConversationState {
        ConversationState::new(ThreadId::from("t1"), 1000)
    }

    #[test]
    fn test_begin_turn_resets_per_turn_fields() {
        let mut state = state();
        state.bypass_agent = true;
        state.rag_context = Some("ctx".to_string());
        state.iterations = 4;

        state.begin_turn("What is fuse 33 for?");

        assert!(!state.bypass_agent);
        assert!(state.rag_context.is_none());
        assert_eq!(state.iterations, 0);
        assert_eq!(state.last_user_message().unwrap().content, "What is fuse 33 for?");
    }

    #[test]
    fn test_pending_tool_calls_only_from_last_assistant() {
        let mut state = state();
        let call = ToolCall::new("c1", MANUAL_SEARCH_TOOL, serde_json::json!({}));
        state.messages.push(Message::assistant("").with_tool_calls(vec![call.clone()]));
        assert_eq!(state.pending_tool_calls().len(), 1);

        state.messages.push(Message::tool_result(&call, "ok"));
        assert!(state.pending_tool_calls().is_empty());
    }

    #[test]
    fn test_clear_pending_tool_calls() {
        let mut state = state();
        let calls = vec![
            ToolCall::new("c1", MANUAL_SEARCH_TOOL, serde_json::json!({})),
            ToolCall::new("c2", MANUAL_SEARCH_TOOL, serde_json::json!({})),
        ];
        state.messages.push(Message::assistant("").with_tool_calls(calls));

        state.apply(StatePatch {
            clear_pending_tool_calls: true,
            ..StatePatch::default()
        });

        assert!(state.pending_tool_calls().is_empty());
    }

    #[test]
    fn test_totals_never_decrease() {
        let mut state = state();
        state.apply(StatePatch {
            totals: Some(TokenTotals {
                prompt_tokens: 100,
                completion_tokens: 20,
                total_tokens: 120,
            }),
            ..StatePatch::default()
        });
        state.apply(StatePatch {
            totals: Some(TokenTotals {
                prompt_tokens: 50,
                completion_tokens: 5,
                total_tokens: 55,
            }),
            ..StatePatch::default()
        });
        assert_eq!(state.total_tokens, 120);
        assert!((state.usage_percentage() - 12.0).abs() < f64::EPSILON);
        assert_eq!(state.remaining_tokens(), 880);
    }

    #[test]
    fn test_clean_history_drops_system_turns() {
        let mut state = state();
        state.begin_turn("hello there");
        state.messages.push(Message::system("WARNING: context high"));
        state.messages.push(Message::assistant("hi"));
        let history = state.clean_history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.role != Role::System));
    }
}
