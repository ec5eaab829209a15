//! Turn Orchestrator - the session lifecycle.
//!
//! A session's "state" is simply its current node. The orchestrator moves it:
//! 1. **Create**: build the root, no generation
//! 2. **Advance**: reuse an existing branch, join an in-flight generation, or
//!    start a new one; commit node and edge together
//! 3. **Rollback**: jump to any existing node and adopt its stored snapshot
//!
//! All graph mutation happens while holding the session lock, and the lock is
//! never held across an `.await`.

mod prefetch;

pub use prefetch::*;

use prefetch::InFlight;

use std::sync::{Arc, Mutex, MutexGuard};
use story_rules::{Phase, RunningState};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::context_assembler::ContextAssembler;
use crate::error::{EngineError, EngineResult};
use crate::generator::{GenerationRequest, Generator, PlayerAction};
use crate::persistence::{SessionBlob, SessionStore};
use crate::session::{Session, SessionId, SessionParams};
use crate::story_graph::{BranchKey, NodeId, OptionId, StoryNode, StoryOption};

/// Shared access to one live session.
///
/// Cloning the handle shares the session; background prefetches hold clones.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    session: Arc<Mutex<Session>>,
    in_flight: InFlightRegistry,
}

impl SessionHandle {
    fn new(session: Session) -> Self {
        Self {
            id: session.id(),
            session: Arc::new(Mutex::new(session)),
            in_flight: InFlightRegistry::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn lock(&self) -> EngineResult<MutexGuard<'_, Session>> {
        self.session.lock().map_err(|_| EngineError::LockPoisoned)
    }

    /// A point-in-time copy of the whole session.
    pub fn snapshot(&self) -> EngineResult<Session> {
        Ok(self.lock()?.clone())
    }

    /// Branches currently being generated for this session.
    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }
}

/// Where one pass of an advance stands after the critical section.
enum Step {
    Arrived(StoryNode),
    Join(InFlight),
    Generate(PendingGeneration),
}

/// Result of a successful advance.
#[derive(Debug, Clone)]
pub struct AdvanceOutcome {
    /// The node the player is now at.
    pub node: StoryNode,
    /// `true` when this call issued no generator request of its own.
    pub reused: bool,
}

/// The session engine.
pub struct StoryEngine<G: Generator> {
    generator: Arc<G>,
    config: Arc<EngineConfig>,
    assembler: Arc<ContextAssembler>,
    prefetch_permits: Arc<Semaphore>,
}

impl<G: Generator> Clone for StoryEngine<G> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            config: Arc::clone(&self.config),
            assembler: Arc::clone(&self.assembler),
            prefetch_permits: Arc::clone(&self.prefetch_permits),
        }
    }
}

impl<G: Generator> StoryEngine<G> {
    /// Create an engine around `generator`.
    pub fn new(generator: G, config: EngineConfig) -> Self {
        Self::with_shared_generator(Arc::new(generator), config)
    }

    /// Create an engine around a generator shared with other owners.
    pub fn with_shared_generator(generator: Arc<G>, config: EngineConfig) -> Self {
        let assembler = ContextAssembler::new(config.context.clone());
        let permits = config.prefetch.max_concurrent.max(1);
        Self {
            generator,
            config: Arc::new(config),
            assembler: Arc::new(assembler),
            prefetch_permits: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a new session. The root is ready immediately.
    pub fn create_session(&self, params: SessionParams) -> SessionHandle {
        let session = Session::new(params);
        info!(session = %session.id(), root = %session.root_node_id(), "session created");
        SessionHandle::new(session)
    }

    /// Wrap an existing session (e.g. one loaded from storage).
    pub fn resume(&self, session: Session) -> SessionHandle {
        info!(session = %session.id(), node = %session.current_node_id(), "session resumed");
        SessionHandle::new(session)
    }

    /// Take `option_id` out of the current node.
    ///
    /// `free_text` is the player's own action and is used only when
    /// `option_id` is [`OptionId::CUSTOM`]. On error the session is left as it
    /// was, apart from the recorded choice, so retrying is always safe.
    ///
    /// A prefetch already generating the branch is joined and stops waiting
    /// for a prefetch permit. If it fails, this call generates the branch
    /// itself; only the failure of its own generation is returned.
    pub async fn advance(
        &self,
        handle: &SessionHandle,
        option_id: impl Into<OptionId>,
        free_text: Option<String>,
    ) -> EngineResult<AdvanceOutcome> {
        let option_id = option_id.into();

        let (parent_id, action) = {
            let mut session = handle.lock()?;
            let current = session.current_node()?;
            if current.is_terminal {
                return Err(EngineError::SessionEnded(current.id));
            }
            let parent_id = current.id;
            let action = resolve_action(current, &option_id, free_text)?;
            session.mark_chosen(parent_id, action.branch_id())?;
            (parent_id, action)
        };
        let key = BranchKey::new(parent_id, action.branch_id());

        loop {
            let step = {
                let mut session = handle.lock()?;
                if let Some(child_id) = session.graph().child_id(parent_id, &key.option) {
                    Step::Arrived(session.enter(child_id)?.clone())
                } else if let Some(entry) = handle.in_flight.get(&key) {
                    debug!(session = %handle.id(), branch = %key, "joining in-flight generation");
                    entry.promote();
                    Step::Join(entry)
                } else {
                    let request = self.build_request(&session, parent_id, action.clone())?;
                    Step::Generate(self.start_generation(handle, key.clone(), request, false))
                }
            };

            let (committed, joined) = match step {
                Step::Arrived(node) => {
                    info!(
                        session = %handle.id(),
                        node = %node.id,
                        option = %key.option,
                        "advanced along existing branch"
                    );
                    self.auto_prefetch(handle);
                    return Ok(AdvanceOutcome { node, reused: true });
                }
                Step::Join(entry) => match entry.pending.await {
                    Ok(committed) => (committed, true),
                    Err(err) if entry.speculative => {
                        debug!(
                            session = %handle.id(),
                            branch = %key,
                            error = %err,
                            "joined prefetch failed, generating directly"
                        );
                        continue;
                    }
                    Err(err) => return Err(err),
                },
                Step::Generate(pending) => (pending.await?, false),
            };

            let node = {
                let mut session = handle.lock()?;
                session.enter(committed.node_id)?.clone()
            };
            info!(
                session = %handle.id(),
                node = %node.id,
                depth = node.depth,
                turn = node.state_snapshot.turn_count,
                "advanced to new turn"
            );

            self.auto_prefetch(handle);

            return Ok(AdvanceOutcome {
                node,
                reused: joined || !committed.inserted,
            });
        }
    }

    /// Jump to `target`, adopting its stored snapshot. Nothing is deleted or
    /// recomputed.
    pub fn rollback(&self, handle: &SessionHandle, target: NodeId) -> EngineResult<StoryNode> {
        let mut session = handle.lock()?;
        if !session.graph().contains(target) {
            return Err(EngineError::NodeNotFound(target));
        }
        let node = session.enter(target)?.clone();
        info!(session = %handle.id(), node = %target, depth = node.depth, "rolled back");
        Ok(node)
    }

    pub fn current_node(&self, handle: &SessionHandle) -> EngineResult<StoryNode> {
        Ok(handle.lock()?.current_node()?.clone())
    }

    /// Ids from the root down to `node_id`.
    pub fn path_to_root(&self, handle: &SessionHandle, node_id: NodeId) -> EngineResult<Vec<NodeId>> {
        let session = handle.lock()?;
        session.graph().path_to_root(node_id).map_err(|_| EngineError::NodeNotFound(node_id))
    }

    /// Phase of the current position.
    pub fn phase(&self, handle: &SessionHandle) -> EngineResult<Phase> {
        Ok(handle.lock()?.phase(&self.config.rules.phases))
    }

    pub fn running_state(&self, handle: &SessionHandle) -> EngineResult<RunningState> {
        Ok(handle.lock()?.running_state().clone())
    }

    /// Materialized branches out of `node_id`.
    pub fn children_of(
        &self,
        handle: &SessionHandle,
        node_id: NodeId,
    ) -> EngineResult<Vec<(OptionId, StoryNode)>> {
        let session = handle.lock()?;
        session.node(node_id)?;
        Ok(session
            .graph()
            .children_of(node_id)
            .into_iter()
            .map(|(option, node)| (option.clone(), node.clone()))
            .collect())
    }

    /// Encode the session for storage.
    pub fn export(&self, handle: &SessionHandle) -> EngineResult<SessionBlob> {
        handle.lock()?.to_blob(&self.config.rules.phases)
    }

    /// Persist the session to `store`.
    pub async fn save<S: SessionStore + ?Sized>(
        &self,
        store: &S,
        handle: &SessionHandle,
    ) -> EngineResult<()> {
        let blob = self.export(handle)?;
        store.save(handle.id(), blob).await?;
        debug!(session = %handle.id(), "session saved");
        Ok(())
    }

    /// Load a session from `store` and make it live.
    pub async fn load<S: SessionStore + ?Sized>(
        &self,
        store: &S,
        session_id: SessionId,
    ) -> EngineResult<Option<SessionHandle>> {
        match store.load(session_id).await? {
            Some(blob) => Ok(Some(self.resume(Session::from_blob(blob)?))),
            None => Ok(None),
        }
    }

    fn auto_prefetch(&self, handle: &SessionHandle) {
        if !self.config.prefetch.auto {
            return;
        }
        if let Err(err) = self.prefetch_current(handle) {
            warn!(session = %handle.id(), error = %err, "could not start prefetch");
        }
    }

    /// Generator request for leaving `node_id` via `action`.
    pub(crate) fn build_request(
        &self,
        session: &Session,
        node_id: NodeId,
        action: PlayerAction,
    ) -> EngineResult<GenerationRequest> {
        let node = session.node(node_id)?;
        let phase = story_rules::classify(
            node.state_snapshot.turn_count,
            &node.state_snapshot.counters,
            &self.config.rules.phases,
        );
        let context = self.assembler.assemble(session.graph(), node_id, phase)?;
        Ok(GenerationRequest {
            context,
            action,
            phase,
        })
    }
}

/// Work out what the player did.
///
/// Ids not offered by the node are accepted with the id as label, so a fresh
/// root (which offers nothing) can still be left.
fn resolve_action(
    node: &StoryNode,
    option_id: &OptionId,
    free_text: Option<String>,
) -> EngineResult<PlayerAction> {
    if option_id.as_str().trim().is_empty() {
        return Err(EngineError::InvalidAction("option id is blank".to_string()));
    }

    if option_id.is_custom_marker() {
        let text = free_text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| EngineError::InvalidAction("custom action needs text".to_string()))?;
        return Ok(PlayerAction::FreeText(text));
    }

    if let Some(text) = option_id
        .as_str()
        .strip_prefix(&format!("{}:", OptionId::CUSTOM))
    {
        if text.trim().is_empty() {
            return Err(EngineError::InvalidAction("custom action needs text".to_string()));
        }
        return Ok(PlayerAction::FreeText(text.to_string()));
    }

    if free_text.is_some() {
        debug!(option = %option_id, "ignoring free text for a listed option");
    }

    let option = node
        .option(option_id)
        .cloned()
        .unwrap_or_else(|| StoryOption::new(option_id.clone(), option_id.as_str()));
    Ok(PlayerAction::Choose(option))
}
