//! Checkpoint storage
//!
//! Latest state per thread plus the suspension marker of a parked traversal.
//! The in-memory store lives as long as the process; other backends plug in
//! behind [`CheckpointStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::agent::approval::Suspension;
use crate::agent::state::ConversationState;
use crate::core::{Result, ThreadId};

/// Persisted view of one thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: ConversationState,
    /// Present while the thread waits for an approval decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension: Option<Suspension>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(state: ConversationState, suspension: Option<Suspension>) -> Self {
        Self {
            state,
            suspension,
            updated_at: Utc::now(),
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspension.is_some()
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>>;

    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    async fn remove(&self, thread_id: &ThreadId) -> Result<bool>;

    /// Ids of every stored thread
    async fn threads(&self) -> Result<Vec<ThreadId>>;
}

/// Process-lifetime store keyed by thread id
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: RwLock<HashMap<ThreadId, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.read().is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.read().get(thread_id).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let thread_id = checkpoint.state.thread_id.clone();
        self.checkpoints.write().insert(thread_id, checkpoint);
        Ok(())
    }

    async fn remove(&self, thread_id: &ThreadId) -> Result<bool> {
        Ok(self.checkpoints.write().remove(thread_id).is_some())
    }

    async fn threads(&self) -> Result<Vec<ThreadId>> {
        let mut ids: Vec<ThreadId> = self.checkpoints.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
