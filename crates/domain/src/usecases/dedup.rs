//! Dedup gate - decides whether the latest post still needs to be emitted

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::{FeedIdentity, PollCheckpoint};
use crate::ports::{Clock, PollStateStore};

/// Last emitted post for the active identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollState {
    pub last_emitted_post_id: Option<String>,
}

impl PollState {
    pub fn new(last_emitted_post_id: Option<String>) -> Self {
        Self {
            last_emitted_post_id,
        }
    }

    /// True when forced, or when `post_id` differs from the last emitted post
    /// (including when nothing has been emitted yet)
    pub fn should_emit(&self, post_id: &str, force: bool) -> bool {
        force || self.last_emitted_post_id.as_deref() != Some(post_id)
    }

    pub fn record_emitted(&mut self, post_id: &str) {
        self.last_emitted_post_id = Some(post_id.to_string());
    }
}

#[derive(Debug, Default)]
struct GateState {
    identity: Option<FeedIdentity>,
    poll: PollState,
}

/// Serializes the check → deliver → record sequence of every emission.
///
/// [`DedupGate::enter`] hands out a guard that holds the lock until dropped, so
/// a manual fetch racing a scheduled tick cannot both pass for the same post.
#[derive(Clone)]
pub struct DedupGate {
    state: Arc<Mutex<GateState>>,
    store: Option<Arc<dyn PollStateStore>>,
    clock: Arc<dyn Clock>,
}

impl DedupGate {
    /// Gate with in-memory state only
    pub fn new(initial: PollState, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                identity: None,
                poll: initial,
            })),
            store: None,
            clock,
        }
    }

    /// Gate that loads and saves checkpoints through `store`
    pub fn with_store(store: Arc<dyn PollStateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState::default())),
            store: Some(store),
            clock,
        }
    }

    /// Point the gate at another identity, restoring its persisted checkpoint.
    /// A no-op when the identity is unchanged.
    pub async fn switch_identity(&self, identity: Option<FeedIdentity>) {
        let mut state = self.state.lock().await;
        if state.identity == identity {
            return;
        }

        let restored = match (&self.store, &identity) {
            (Some(store), Some(identity)) => match store.load(identity).await {
                Ok(checkpoint) => checkpoint.map(|c| c.last_emitted_post_id),
                Err(error) => {
                    tracing::warn!(identity = %identity, error = %error, "Failed to load poll state, starting fresh");
                    None
                }
            },
            _ => None,
        };

        tracing::debug!(identity = ?identity, last_emitted = ?restored, "Dedup gate switched identity");
        state.identity = identity;
        state.poll = PollState::new(restored);
    }

    /// Enter the critical section.
    ///
    /// The persisted checkpoint is re-read under the lock, so a post recorded
    /// by another process sharing the store (a manual fetch next to the
    /// running loop) is seen before the next check.
    pub async fn enter(&self) -> GateGuard {
        let mut state = Arc::clone(&self.state).lock_owned().await;

        if let (Some(store), Some(identity)) = (&self.store, state.identity.clone()) {
            match store.load(&identity).await {
                Ok(Some(checkpoint)) => {
                    state.poll.last_emitted_post_id = Some(checkpoint.last_emitted_post_id);
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(identity = %identity, error = %error, "Failed to refresh poll state, using last known");
                }
            }
        }

        GateGuard {
            state,
            store: self.store.clone(),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Snapshot of the current state
    pub async fn snapshot(&self) -> PollState {
        self.state.lock().await.poll.clone()
    }
}

/// Exclusive access to the gate state
pub struct GateGuard {
    state: OwnedMutexGuard<GateState>,
    store: Option<Arc<dyn PollStateStore>>,
    clock: Arc<dyn Clock>,
}

impl GateGuard {
    pub fn should_emit(&self, post_id: &str, force: bool) -> bool {
        self.state.poll.should_emit(post_id, force)
    }

    /// Record a post as emitted. Call only after the delivery succeeded.
    /// Persistence failures are logged; the in-memory state still advances.
    pub async fn record_emitted(&mut self, post_id: &str) {
        self.state.poll.record_emitted(post_id);

        let (Some(store), Some(identity)) = (&self.store, &self.state.identity) else {
            return;
        };

        let checkpoint = PollCheckpoint {
            identity: identity.clone(),
            last_emitted_post_id: post_id.to_string(),
            updated_at: self.clock.now(),
        };
        if let Err(error) = store.save(&checkpoint).await {
            tracing::warn!(post_id = %post_id, error = %error, "Failed to persist poll state");
        }
    }
}
