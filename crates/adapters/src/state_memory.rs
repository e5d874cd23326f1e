//! In-memory poll-state store for testing and offline mode

use async_trait::async_trait;
use skyrelay_domain::{FeedIdentity, PollCheckpoint, PollStateStore, StateError};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory poll-state store implementation
#[derive(Default)]
pub struct InMemoryStateStore {
    checkpoints: RwLock<HashMap<FeedIdentity, PollCheckpoint>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PollStateStore for InMemoryStateStore {
    async fn load(&self, identity: &FeedIdentity) -> Result<Option<PollCheckpoint>, StateError> {
        let checkpoints = self
            .checkpoints
            .read()
            .map_err(|e| StateError::Database(e.to_string()))?;
        Ok(checkpoints.get(identity).cloned())
    }

    async fn save(&self, checkpoint: &PollCheckpoint) -> Result<(), StateError> {
        let mut checkpoints = self
            .checkpoints
            .write()
            .map_err(|e| StateError::Database(e.to_string()))?;
        checkpoints.insert(checkpoint.identity.clone(), checkpoint.clone());
        Ok(())
    }
}
