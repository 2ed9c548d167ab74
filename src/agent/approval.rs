//! Human approval of tool calls
//!
//! The gate is the only suspension point in the graph. A suspended traversal
//! is parked as a [`Suspension`] in the thread's checkpoint and continued by
//! `Engine::resume` with an [`ApprovalDecision`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::state::{ConversationState, StatePatch};
use crate::core::{DocentError, Message, Result, ThreadId, ToolCall};

/// Directive appended when a tool batch is rejected
pub const REJECTION_DIRECTIVE: &str = "[SYSTEM: The requested tool calls were not approved. \
     Please respond to the user's question directly without using tools.]";

/// Structured request surfaced to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub tool_calls: Vec<ToolCall>,
}

/// Marker stored with a parked thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suspension {
    pub token: Uuid,
    pub request: ApprovalRequest,
    pub requested_at: DateTime<Utc>,
}

impl Suspension {
    pub fn new(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            token: Uuid::new_v4(),
            request: ApprovalRequest { tool_calls },
            requested_at: Utc::now(),
        }
    }

    /// Whether this suspension was requested before `cutoff`
    pub fn is_older_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.requested_at < cutoff
    }
}

/// What the caller receives when a traversal suspends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub thread_id: ThreadId,
    /// Pass back in [`ApprovalDecision::token`] to bind the decision to this request
    pub token: Uuid,
    pub tool_calls: Vec<ToolCall>,
    pub requested_at: DateTime<Utc>,
}

impl PendingApproval {
    pub fn from_suspension(thread_id: ThreadId, suspension: &Suspension) -> Self {
        Self {
            thread_id,
            token: suspension.token,
            tool_calls: suspension.request.tool_calls.clone(),
            requested_at: suspension.requested_at,
        }
    }
}

/// Decision for a whole tool batch. Partial approval is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Uuid>,
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            token: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            approved: false,
            token: None,
        }
    }

    pub fn with_token(mut self, token: Uuid) -> Self {
        self.token = Some(token);
        self
    }
}

impl From<bool> for ApprovalDecision {
    fn from(approved: bool) -> Self {
        Self {
            approved,
            token: None,
        }
    }
}

impl TryFrom<serde_json::Value> for ApprovalDecision {
    type Error = DocentError;

    /// Accepts `true`, `false`, or `{"approved": bool, "token"?: uuid}`
    fn try_from(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Bool(approved) => Ok(approved.into()),
            serde_json::Value::Object(_) => serde_json::from_value(value)
                .map_err(|e| DocentError::InvalidDecision(e.to_string())),
            other => Err(DocentError::InvalidDecision(format!(
                "expected a boolean or {{\"approved\": bool}}, got {}",
                other
            ))),
        }
    }
}

/// What the gate does with the current state
#[derive(Debug, Clone, PartialEq)]
pub enum GateAction {
    PassThrough,
    Suspend(Vec<ToolCall>),
}

/// The approval gate node
#[derive(Debug, Clone, Copy)]
pub struct ApprovalGate {
    enabled: bool,
}

impl ApprovalGate {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Decide whether the pending batch needs a human decision
    pub fn evaluate(&self, state: &ConversationState) -> GateAction {
        let calls = state.pending_tool_calls();
        if !self.enabled || calls.is_empty() {
            return GateAction::PassThrough;
        }

        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        tracing::info!(thread_id = %state.thread_id, tools = ?names, "requesting tool approval");
        GateAction::Suspend(calls.to_vec())
    }

    /// Turn a decision into a patch. Approval leaves the batch in place.
    pub fn apply_decision(&self, state: &ConversationState, decision: &ApprovalDecision) -> StatePatch {
        if decision.approved {
            tracing::info!(thread_id = %state.thread_id, "tools approved");
            return StatePatch::new();
        }

        tracing::info!(
            thread_id = %state.thread_id,
            rejected = state.pending_tool_calls().len(),
            "tools rejected, answering without tools"
        );
        StatePatch {
            clear_pending_tool_calls: true,
            ..StatePatch::new().append(Message::assistant(REJECTION_DIRECTIVE))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MANUAL_SEARCH_TOOL, WEB_SEARCH_TOOL};
    use serde_json::json;

    fn state_with_batch(k: usize) -> ConversationState {
        let mut state = ConversationState::new(ThreadId::from("t"), 1000);
        state.begin_turn("Is there a recall on the tailgate latch?");
        let calls = (0..k)
            .map(|i| {
                let name = if i % 2 == 0 { MANUAL_SEARCH_TOOL } else { WEB_SEARCH_TOOL };
                ToolCall::new(format!("c{}", i), name, json!({"question": "tailgate latch"}))
            })
            .collect();
        state.messages.push(Message::assistant("").with_tool_calls(calls));
        state
    }

    #[test]
    fn test_disabled_gate_passes_through() {
        let gate = ApprovalGate::new(false);
        assert_eq!(gate.evaluate(&state_with_batch(2)), GateAction::PassThrough);
    }

    #[test]
    fn test_enabled_gate_suspends_whole_batch() {
        let gate = ApprovalGate::new(true);
        match gate.evaluate(&state_with_batch(3)) {
            GateAction::Suspend(calls) => assert_eq!(calls.len(), 3),
            other => panic!("expected suspension, got {:?}", other),
        }
    }

    #[test]
    fn test_rejection_clears_batch_atomically() {
        let gate = ApprovalGate::new(true);
        let mut state = state_with_batch(4);
        let before = state.messages.len();

        let patch = gate.apply_decision(&state, &ApprovalDecision::reject());
        state.apply(patch);

        assert_eq!(state.messages.len(), before + 1);
        assert!(state.messages[before - 1].tool_calls.is_empty());
        assert_eq!(state.last_message().unwrap().content, REJECTION_DIRECTIVE);
        assert!(state.pending_tool_calls().is_empty());
    }

    #[test]
    fn test_approval_is_noop() {
        let gate = ApprovalGate::new(true);
        let state = state_with_batch(2);
        assert!(gate
            .apply_decision(&state, &ApprovalDecision::approve())
            .is_empty());
    }

    #[test]
    fn test_decision_parsing() {
        assert!(ApprovalDecision::try_from(json!(true)).unwrap().approved);
        assert!(!ApprovalDecision::try_from(json!(false)).unwrap().approved);
        assert!(!ApprovalDecision::try_from(json!({"approved": false})).unwrap().approved);

        let token = Uuid::new_v4();
        let decision =
            ApprovalDecision::try_from(json!({"approved": true, "token": token.to_string()}))
                .unwrap();
        assert_eq!(decision.token, Some(token));

        for bad in [json!("yes"), json!(1), json!(null), json!({"ok": true})] {
            let err = ApprovalDecision::try_from(bad).unwrap_err();
            assert!(matches!(err, DocentError::InvalidDecision(_)));
        }
    }

    #[test]
    fn test_pending_approval_serializes() {
        let suspension = Suspension::new(vec![ToolCall::new("c1", WEB_SEARCH_TOOL, json!({}))]);
        let pending = PendingApproval::from_suspension(ThreadId::from("t"), &suspension);
        let value = serde_json::to_value(&pending).unwrap();
        assert_eq!(value["thread_id"], "t");
        assert_eq!(value["tool_calls"][0]["name"], WEB_SEARCH_TOOL);
        assert_eq!(value["token"], suspension.token.to_string());
    }
}
