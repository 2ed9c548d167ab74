//! Conversation engine
//!
//! Drives one traversal of the control graph per call. Each traversal works on
//! a local copy of the thread's state and writes the checkpoint only when it
//! completes or suspends, so a failed turn leaves the thread as it was and can
//! simply be retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::agent::approval::{ApprovalDecision, ApprovalGate, GateAction, PendingApproval, Suspension};
use crate::agent::executor::ToolExecutor;
use crate::agent::orchestrator::{default_system_prompt, Orchestrator};
use crate::agent::prefilter::PreFilter;
use crate::agent::retrieval::RetrievalAgent;
use crate::agent::router::{route, NodeId, Route, START};
use crate::agent::state::{ConversationState, StatePatch};
use crate::agent::store::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
use crate::agent::tracker::{ContextTracker, UsageReport};
use crate::core::{Config, DocentError, Result, Role, ThreadId, WEB_SEARCH_TOOL};
use crate::llm::{LLMProvider, OllamaClient};
use crate::retrieval::{LexicalIndex, RetrievalIndex};
use crate::tools::ToolRegistry;

/// A turn that ran to the end of the graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedTurn {
    /// Final assistant text
    pub reply: String,
    /// Context advisory written this turn, if any
    pub advisory: Option<String>,
    /// Token accounting, absent when tracking did not run
    pub usage: Option<UsageReport>,
    /// The pre-filter answered without the model
    pub bypassed: bool,
}

/// Result of `invoke` or `resume`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed(CompletedTurn),
    Suspended(PendingApproval),
}

impl TurnOutcome {
    pub fn is_suspended(&self) -> bool {
        matches!(self, TurnOutcome::Suspended(_))
    }

    /// Final reply text, if the turn completed
    pub fn reply(&self) -> Option<&str> {
        match self {
            TurnOutcome::Completed(turn) => Some(&turn.reply),
            TurnOutcome::Suspended(_) => None,
        }
    }
}

/// Shared, thread-safe conversation engine
pub struct Engine {
    config: Config,
    llm: Arc<dyn LLMProvider>,
    store: Arc<dyn CheckpointStore>,
    pre_filter: PreFilter,
    orchestrator: Orchestrator,
    gate: ApprovalGate,
    retrieval: RetrievalAgent,
    executor: ToolExecutor,
    tracker: ContextTracker,
    /// Serializes traversals of the same thread
    locks: parking_lot::Mutex<HashMap<ThreadId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Engine {
    /// Assemble an engine from explicit collaborators
    pub fn new(
        config: Config,
        llm: Arc<dyn LLMProvider>,
        index: Arc<dyn RetrievalIndex>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn CheckpointStore>,
    ) -> Result<Self> {
        config.validate()?;

        let system_prompt = config.agent.system_prompt.clone().unwrap_or_else(|| {
            default_system_prompt(&config.document.name, tools.is_bound(WEB_SEARCH_TOOL))
        });

        let pre_filter = PreFilter::new(config.document.short_name.clone())?;
        let orchestrator = Orchestrator::new(
            Arc::clone(&llm),
            Arc::clone(&tools),
            config.models.chat.clone(),
            config.models.temperature,
            system_prompt,
        );
        let retrieval = RetrievalAgent::new(
            Arc::clone(&llm),
            index,
            config.models.retrieval.clone(),
            config.models.temperature,
            config.document.name.clone(),
            config.retrieval.clone(),
        );

        Ok(Self {
            gate: ApprovalGate::new(config.approval.enabled),
            executor: ToolExecutor::new(tools),
            tracker: ContextTracker::new(config.tracking.context_limit),
            pre_filter,
            orchestrator,
            retrieval,
            llm,
            store,
            config,
            locks: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// Build the production engine: Ollama, the lexical index, and an in-memory store
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let llm: Arc<dyn LLMProvider> = Arc::new(OllamaClient::from_config(&config)?);
        let index: Arc<dyn RetrievalIndex> = Arc::new(LexicalIndex::load(&config.document.index_path)?);
        let tools = Arc::new(ToolRegistry::from_config(&config)?);
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());

        Self::new(config, llm, index, tools, store)
    }

    /// Check that the completion service is up and both models are pulled
    pub async fn initialize(&self) -> Result<()> {
        let models = self.llm.list_models().await.map_err(|_| {
            DocentError::OllamaNotReachable(self.config.ollama_url(), self.config.models.chat.clone())
        })?;
        tracing::debug!(?models, "available models");

        for model in [&self.config.models.chat, &self.config.models.retrieval] {
            if !self.llm.is_model_available(model).await? {
                return Err(DocentError::ModelNotFound(model.clone()));
            }
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a new user turn from the start of the graph
    pub async fn invoke(&self, thread_id: &ThreadId, user_text: &str) -> Result<TurnOutcome> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let mut checkpoint = self.store.load(thread_id).await?;

        let cutoff = self
            .config
            .approval
            .stale_after()?
            .and_then(|max_age| Utc::now().checked_sub_signed(max_age));
        if let (Some(cp), Some(cutoff)) = (checkpoint.as_mut(), cutoff) {
            if evict_if_stale(cp, cutoff) {
                tracing::info!(thread_id = %thread_id, "evicted stale approval request");
            }
        }

        let mut state = match checkpoint {
            Some(cp) if cp.is_suspended() => {
                return Err(DocentError::ThreadSuspended(thread_id.clone()));
            }
            Some(cp) => cp.state,
            None => {
                tracing::info!(thread_id = %thread_id, "starting new thread");
                ConversationState::new(thread_id.clone(), self.config.tracking.context_limit)
            }
        };

        state.begin_turn(user_text);
        self.traverse(state, START).await
    }

    /// Continue a suspended traversal with the caller's decision
    pub async fn resume(&self, thread_id: &ThreadId, decision: ApprovalDecision) -> Result<TurnOutcome> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let checkpoint = self
            .store
            .load(thread_id)
            .await?
            .ok_or_else(|| DocentError::NoPendingApproval(thread_id.clone()))?;
        let suspension = checkpoint
            .suspension
            .as_ref()
            .ok_or_else(|| DocentError::NoPendingApproval(thread_id.clone()))?;

        if decision.token.is_some_and(|token| token != suspension.token) {
            return Err(DocentError::StaleDecision(thread_id.clone()));
        }

        let mut state = checkpoint.state;
        let patch = self.gate.apply_decision(&state, &decision);
        state.apply(patch);

        let next = route(NodeId::ApprovalGate, &state);
        self.traverse(state, next).await
    }

    /// Read-only snapshot of a thread
    pub async fn get_state(&self, thread_id: &ThreadId) -> Result<Option<ConversationState>> {
        Ok(self.store.load(thread_id).await?.map(|cp| cp.state))
    }

    /// The approval request a thread is parked on, if any
    pub async fn pending_approval(&self, thread_id: &ThreadId) -> Result<Option<PendingApproval>> {
        Ok(self.store.load(thread_id).await?.and_then(|cp| {
            cp.suspension
                .as_ref()
                .map(|s| PendingApproval::from_suspension(thread_id.clone(), s))
        }))
    }

    /// Drop approval requests older than `max_age`. Returns how many were evicted.
    ///
    /// Evicted threads keep their history and accept a fresh `invoke`.
    pub async fn evict_stale(&self, max_age: Duration) -> Result<usize> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| DocentError::config(format!("Invalid eviction age: {}", e)))?;
        // An age reaching past the earliest representable time evicts nothing.
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return Ok(0);
        };

        let mut evicted = 0;
        for thread_id in self.store.threads().await? {
            {
                let lock = self.thread_lock(&thread_id);
                let _guard = lock.lock().await;

                if let Some(mut checkpoint) = self.store.load(&thread_id).await? {
                    if evict_if_stale(&mut checkpoint, cutoff) {
                        self.store.save(checkpoint).await?;
                        tracing::info!(thread_id = %thread_id, "evicted stale approval request");
                        evicted += 1;
                    }
                }
            }
            self.release_lock(&thread_id);
        }
        Ok(evicted)
    }

    /// Forget a thread entirely. Returns whether it existed.
    pub async fn remove_thread(&self, thread_id: &ThreadId) -> Result<bool> {
        let removed = {
            let lock = self.thread_lock(thread_id);
            let _guard = lock.lock().await;
            self.store.remove(thread_id).await?
        };
        self.release_lock(thread_id);
        if removed {
            tracing::info!(thread_id = %thread_id, "removed thread");
        }
        Ok(removed)
    }

    fn thread_lock(&self, thread_id: &ThreadId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(thread_id.clone()).or_default())
    }

    fn release_lock(&self, thread_id: &ThreadId) {
        release_idle_lock(&mut self.locks.lock(), thread_id);
    }

    async fn traverse(&self, mut state: ConversationState, start: Route) -> Result<TurnOutcome> {
        let mut next = start;
        let mut usage = None;
        let mut advisory = None;

        while let Route::Node(node) = next {
            tracing::debug!(thread_id = %state.thread_id, %node, "entering node");

            match node {
                NodeId::PreFilter => {
                    let patch = self.pre_filter.run(&state);
                    state.apply(patch);
                }
                NodeId::Orchestrator => {
                    let tools_enabled = state.iterations < self.config.agent.max_iterations;
                    if !tools_enabled {
                        tracing::warn!(
                            thread_id = %state.thread_id,
                            iterations = state.iterations,
                            "iteration limit reached, forcing final answer"
                        );
                    }
                    let patch = self.orchestrator.respond(&state, tools_enabled).await?;
                    state.iterations += 1;
                    state.apply(patch);
                }
                NodeId::ApprovalGate => match self.gate.evaluate(&state) {
                    GateAction::PassThrough => {}
                    GateAction::Suspend(tool_calls) => {
                        let suspension = Suspension::new(tool_calls);
                        let pending = PendingApproval::from_suspension(state.thread_id.clone(), &suspension);
                        self.store
                            .save(Checkpoint::new(state, Some(suspension)))
                            .await?;
                        return Ok(TurnOutcome::Suspended(pending));
                    }
                },
                NodeId::RetrievalAgent => {
                    let patch = self.retrieval.run(&state).await;
                    state.apply(patch);
                }
                NodeId::ToolExecutor => {
                    let patch = self.executor.run(&state).await;
                    state.apply(patch);
                }
                NodeId::ContextTracker => {
                    if self.config.tracking.enabled {
                        let (patch, report) = self.tracker.update(&state);
                        advisory = patch
                            .append
                            .iter()
                            .find(|m| m.role == Role::System)
                            .map(|m| m.content.clone());
                        state.apply(patch);
                        usage = Some(report);
                    }
                }
            }

            next = route(node, &state);
        }

        let turn = CompletedTurn {
            reply: state
                .last_assistant_message()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
            advisory,
            usage,
            bypassed: state.bypass_agent,
        };
        tracing::debug!(
            thread_id = %state.thread_id,
            messages = state.messages.len(),
            bypassed = turn.bypassed,
            "turn complete"
        );

        self.store.save(Checkpoint::new(state, None)).await?;
        Ok(TurnOutcome::Completed(turn))
    }
}

/// Drop a thread's lock entry unless a traversal still holds a handle to it
fn release_idle_lock(
    locks: &mut HashMap<ThreadId, Arc<tokio::sync::Mutex<()>>>,
    thread_id: &ThreadId,
) -> bool {
    // Handles are only cloned under the map lock, so a count of one is final.
    if locks.get(thread_id).is_some_and(|l| Arc::strong_count(l) == 1) {
        locks.remove(thread_id);
        return true;
    }
    false
}

/// Clear a suspension older than `cutoff` along with the batch it parked
fn evict_if_stale(checkpoint: &mut Checkpoint, cutoff: chrono::DateTime<Utc>) -> bool {
    match &checkpoint.suspension {
        Some(suspension) if suspension.is_older_than(cutoff) => {
            checkpoint.state.apply(StatePatch {
                clear_pending_tool_calls: true,
                ..StatePatch::default()
            });
            checkpoint.suspension = None;
            checkpoint.updated_at = Utc::now();
            true
        }
        _ => false,
    }
}
