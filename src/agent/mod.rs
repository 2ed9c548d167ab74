//! Agent module - the conversation graph and the engine that drives it
//!
//! Nodes (pre-filter, orchestrator, approval gate, retrieval agent, tool
//! executor, context tracker) read a state snapshot and return patches; the
//! router picks the next node; the engine checkpoints threads between calls.

pub mod approval;
pub mod engine;
pub mod executor;
pub mod orchestrator;
pub mod prefilter;
pub mod retrieval;
pub mod router;
pub mod state;
pub mod store;
pub mod tracker;

pub use approval::{ApprovalDecision, ApprovalGate, ApprovalRequest, PendingApproval, Suspension};
pub use engine::{CompletedTurn, Engine, TurnOutcome};
pub use orchestrator::Orchestrator;
pub use prefilter::{Classification, Intent, PreFilter};
pub use retrieval::RetrievalAgent;
pub use router::{NodeId, Route};
pub use state::{ConversationState, StatePatch};
pub use store::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
pub use tracker::{ContextTracker, UsageBand, UsageReport};
