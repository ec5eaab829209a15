//! Speculative prefetch - generating untaken branches ahead of the player.
//!
//! Every generation, foreground or speculative, goes through the same path:
//! it is registered in the session's [`InFlightRegistry`] under its branch key,
//! runs on its own tokio task, and finishes by committing its candidate node
//! with an insert-if-absent check. Whoever completes first wins the branch.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::{SessionHandle, StoryEngine};
use crate::error::{EngineError, EngineResult};
use crate::generator::{GenerationRequest, Generator, PlayerAction};
use crate::session::CommittedBranch;
use crate::story_graph::{BranchKey, NodeId, OptionId};

/// A generation that any number of callers can await.
pub type PendingGeneration = Shared<BoxFuture<'static, EngineResult<CommittedBranch>>>;

/// One registered generation.
#[derive(Clone)]
pub(crate) struct InFlight {
    pub(crate) pending: PendingGeneration,
    pub(crate) speculative: bool,
    /// Signalled when a foreground caller joins; a queued speculative task
    /// then stops waiting for a prefetch permit.
    promote: Arc<Notify>,
}

impl InFlight {
    pub(crate) fn promote(&self) {
        self.promote.notify_one();
    }
}

/// Branches currently being generated, shared by foreground advances and
/// background prefetches of one session.
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    inner: Arc<Mutex<HashMap<BranchKey, InFlight>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<BranchKey, InFlight>> {
        // The map holds no invariants a panicking holder could break.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self, key: &BranchKey) -> Option<InFlight> {
        self.entries().get(key).cloned()
    }

    fn insert(&self, key: BranchKey, entry: InFlight) {
        self.entries().insert(key, entry);
    }

    fn remove(&self, key: &BranchKey) {
        self.entries().remove(key);
    }

    pub fn contains(&self, key: &BranchKey) -> bool {
        self.entries().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Tally of a finished prefetch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrefetchReport {
    /// Branches this pass added to the graph.
    pub inserted: usize,
    /// Branches that already existed, were already in flight, or were filled
    /// by a faster operation before this pass could commit.
    pub skipped: usize,
    /// Generations that failed; the branches stay empty.
    pub failed: usize,
}

/// A launched prefetch pass. Dropping it does not cancel anything.
pub struct PrefetchPass {
    node_id: NodeId,
    pending: Vec<(OptionId, PendingGeneration)>,
    skipped: usize,
}

impl PrefetchPass {
    /// The node whose branches are being prefetched.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Options this pass started generating.
    pub fn launched(&self) -> Vec<&OptionId> {
        self.pending.iter().map(|(option, _)| option).collect()
    }

    /// Wait for every launched generation to finish.
    pub async fn wait(self) -> PrefetchReport {
        let mut report = PrefetchReport {
            skipped: self.skipped,
            ..Default::default()
        };
        for (_, pending) in self.pending {
            match pending.await {
                Ok(committed) if committed.inserted => report.inserted += 1,
                Ok(_) => report.skipped += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }
}

impl<G: Generator> StoryEngine<G> {
    /// Start generating every option of the current node that has neither a
    /// child nor an in-flight generation. Returns without waiting.
    ///
    /// Terminal nodes offer nothing to prefetch.
    ///
    /// # Panics
    ///
    /// Generations run on spawned tasks, so this must be called from within a
    /// tokio runtime.
    pub fn prefetch_current(&self, handle: &SessionHandle) -> EngineResult<PrefetchPass> {
        let session = handle.lock()?;
        let current = session.current_node()?;
        let node_id = current.id;
        let options = if current.is_terminal {
            Vec::new()
        } else {
            current.available_options.clone()
        };

        let mut pass = PrefetchPass {
            node_id,
            pending: Vec::new(),
            skipped: 0,
        };

        for option in options {
            let key = BranchKey::new(node_id, option.id.clone());
            if session.graph().child_id(node_id, &option.id).is_some() || handle.in_flight.contains(&key) {
                pass.skipped += 1;
                continue;
            }
            let request = self.build_request(&session, node_id, PlayerAction::Choose(option))?;
            let pending = self.start_generation(handle, key.clone(), request, true);
            pass.pending.push((key.option, pending));
        }

        debug!(
            session = %handle.id(),
            node = %node_id,
            launched = pass.pending.len(),
            skipped = pass.skipped,
            "prefetch pass started"
        );
        Ok(pass)
    }

    /// Spawn the generation for `key` and register it as in flight.
    ///
    /// Must be called with the session lock held: the task takes that lock
    /// before it unregisters itself, so it can never unregister before it
    /// was registered.
    ///
    /// Speculative generations wait for a prefetch permit unless a foreground
    /// caller joins them first.
    pub(crate) fn start_generation(
        &self,
        handle: &SessionHandle,
        key: BranchKey,
        request: GenerationRequest,
        speculative: bool,
    ) -> PendingGeneration {
        let generator = Arc::clone(&self.generator);
        let config = Arc::clone(&self.config);
        let permits = speculative.then(|| Arc::clone(&self.prefetch_permits));
        let session = Arc::clone(&handle.session);
        let registry = handle.in_flight.clone();
        let session_id = handle.id();
        let task_key = key.clone();
        let promote = Arc::new(Notify::new());
        let promoted = Arc::clone(&promote);

        let task = async move {
            let generated = async move {
                let _permit = match permits {
                    Some(permits) => tokio::select! {
                        permit = permits.acquire_owned() => {
                            Some(permit.map_err(|err| EngineError::TaskFailed(err.to_string()))?)
                        }
                        _ = promoted.notified() => None,
                    },
                    None => None,
                };
                let output = generator.generate(request).await?;
                Ok::<_, EngineError>(output.sanitize()?)
            }
            .await;

            let outcome = match session.lock() {
                Ok(mut session) => {
                    let outcome = generated.and_then(|output| {
                        session.commit_turn(
                            task_key.node,
                            task_key.option.clone(),
                            output,
                            &config.rules.counters,
                        )
                    });
                    registry.remove(&task_key);
                    outcome
                }
                Err(_) => {
                    registry.remove(&task_key);
                    Err(EngineError::LockPoisoned)
                }
            };

            match &outcome {
                Ok(committed) if !committed.inserted => debug!(
                    session = %session_id,
                    branch = %task_key,
                    "branch already filled, discarding candidate"
                ),
                Ok(committed) => debug!(
                    session = %session_id,
                    branch = %task_key,
                    node = %committed.node_id,
                    speculative,
                    "branch generated"
                ),
                Err(err) if speculative => warn!(
                    session = %session_id,
                    branch = %task_key,
                    error = %err,
                    "prefetch failed"
                ),
                Err(err) => warn!(
                    session = %session_id,
                    branch = %task_key,
                    error = %err,
                    "generation failed"
                ),
            }
            outcome
        };

        let join = tokio::spawn(task);
        let pending = async move {
            join.await
                .unwrap_or_else(|err| Err(EngineError::TaskFailed(err.to_string())))
        }
        .boxed()
        .shared();

        handle.in_flight.insert(
            key,
            InFlight {
                pending: pending.clone(),
                speculative,
                promote,
            },
        );
        pending
    }
}
