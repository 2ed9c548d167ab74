//! Control graph
//!
//! Pure routing functions. The next node depends only on the node that just
//! ran and the conversation state, so a parked thread routes the same way
//! after a process restart.

use std::fmt;

use crate::agent::state::ConversationState;

/// Nodes of the conversation graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    PreFilter,
    Orchestrator,
    ApprovalGate,
    RetrievalAgent,
    ToolExecutor,
    ContextTracker,
}

impl NodeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::PreFilter => "pre_filter",
            NodeId::Orchestrator => "orchestrator",
            NodeId::ApprovalGate => "approval_gate",
            NodeId::RetrievalAgent => "retrieval_agent",
            NodeId::ToolExecutor => "tool_executor",
            NodeId::ContextTracker => "context_tracker",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where traversal goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Node(NodeId),
    Terminate,
}

/// Entry point of every new turn
pub const START: Route = Route::Node(NodeId::PreFilter);

/// Decide the successor of `from`
pub fn route(from: NodeId, state: &ConversationState) -> Route {
    match from {
        NodeId::PreFilter => after_pre_filter(state),
        NodeId::Orchestrator => after_orchestrator(state),
        NodeId::ApprovalGate => after_approval(state),
        NodeId::RetrievalAgent | NodeId::ToolExecutor => Route::Node(NodeId::Orchestrator),
        NodeId::ContextTracker => Route::Terminate,
    }
}

fn after_pre_filter(state: &ConversationState) -> Route {
    if state.bypass_agent {
        Route::Terminate
    } else {
        Route::Node(NodeId::Orchestrator)
    }
}

fn after_orchestrator(state: &ConversationState) -> Route {
    if state.pending_tool_calls().is_empty() {
        Route::Node(NodeId::ContextTracker)
    } else {
        Route::Node(NodeId::ApprovalGate)
    }
}

fn after_approval(state: &ConversationState) -> Route {
    let calls = state.pending_tool_calls();
    if calls.is_empty() {
        // Rejected: the gate cleared the batch.
        return Route::Node(NodeId::Orchestrator);
    }
    if calls.iter().any(|call| call.kind().is_retrieval()) {
        Route::Node(NodeId::RetrievalAgent)
    } else {
        Route::Node(NodeId::ToolExecutor)
    }
}
