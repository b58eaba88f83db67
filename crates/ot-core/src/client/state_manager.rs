//! Client-side synchronization state machine.
//!
//! [`OtStateManager`] owns an optimistic local state plus two queues:
//! working operations (applied locally, not yet committed) and the
//! operations of the in-flight commit. All algebra goes through an
//! [`OtSystem`], all transport through an [`OtNode`].
//!
//! While change listeners are registered, a background task long-polls the
//! node and applies remote diffs as they arrive.

use super::config::StateManagerConfig;
use super::serial::SerialGate;
use crate::core::error::{OtError, Result};
use crate::core::traits::{CommitId, FetchData, OtNode, OtOperation, OtSystem};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Handle returned by [`OtStateManager::add_change_listener`].
pub type ListenerId = u64;

type Listener = Arc<dyn Fn() + Send + Sync>;
type StateProvider<S> = Box<dyn Fn() -> S + Send + Sync>;

struct Local<K, O: OtOperation, C> {
    state: O::State,
    revision: Option<K>,
    level: Option<u64>,
    working: Vec<O>,
    pending_commit: Option<Arc<C>>,
    pending_ops: Vec<O>,
}

struct Inner<K, O, N>
where
    K: CommitId,
    O: OtOperation,
    N: OtNode<K, O>,
{
    init_state: StateProvider<O::State>,
    node: N,
    system: Arc<dyn OtSystem<O>>,
    config: StateManagerConfig,
    local: Mutex<Local<K, O, N::Commit>>,
    sync_gate: SerialGate,
    syncing: AtomicBool,
    /// Bumped when a sync ends or the pending commit is dropped.
    poll_wake: watch::Sender<u64>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the syncing flag when a sync run ends, including by cancellation,
/// and wakes a poll loop that deferred its result.
struct SyncingGuard<'a> {
    flag: &'a AtomicBool,
    wake: &'a watch::Sender<u64>,
}

impl<'a> SyncingGuard<'a> {
    /// Must be entered with the `local` lock held.
    fn enter(flag: &'a AtomicBool, wake: &'a watch::Sender<u64>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag, wake }
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        self.wake.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }
}

/// Outcome of offering a long-poll result to the local state.
enum Polled {
    Applied,
    /// The revision moved while the poll was in flight.
    Stale,
    /// A sync is running or a commit is pending. Holds the wake epoch seen
    /// at that point.
    Deferred(u64),
}

/// Synchronizes a local optimistic state with an [`OtNode`].
///
/// # Example
///
/// ```ignore
/// let manager = OtStateManager::new(|| 0, node, Arc::new(counter_system()));
/// manager.checkout().await?;
/// manager.add(vec![CounterOp::add(0, 5)])?;
/// manager.sync().await?;
/// ```
pub struct OtStateManager<K, O, N>
where
    K: CommitId,
    O: OtOperation,
    N: OtNode<K, O>,
{
    inner: Arc<Inner<K, O, N>>,
}

impl<K, O, N> OtStateManager<K, O, N>
where
    K: CommitId,
    O: OtOperation,
    N: OtNode<K, O>,
{
    pub fn new(
        init_state: impl Fn() -> O::State + Send + Sync + 'static,
        node: N,
        system: Arc<dyn OtSystem<O>>,
    ) -> Self {
        Self::with_config(init_state, node, system, StateManagerConfig::default())
    }

    pub fn with_config(
        init_state: impl Fn() -> O::State + Send + Sync + 'static,
        node: N,
        system: Arc<dyn OtSystem<O>>,
        config: StateManagerConfig,
    ) -> Self {
        let local = Local {
            state: init_state(),
            revision: None,
            level: None,
            working: Vec::new(),
            pending_commit: None,
            pending_ops: Vec::new(),
        };
        Self {
            inner: Arc::new(Inner {
                init_state: Box::new(init_state),
                node,
                system,
                config,
                local: Mutex::new(local),
                sync_gate: SerialGate::new(),
                syncing: AtomicBool::new(false),
                poll_wake: watch::Sender::new(0),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                poll_task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &StateManagerConfig {
        &self.inner.config
    }

    pub fn state(&self) -> O::State {
        self.inner.local.lock().state.clone()
    }

    pub fn revision(&self) -> Option<K> {
        self.inner.local.lock().revision.clone()
    }

    pub fn level(&self) -> Option<u64> {
        self.inner.local.lock().level
    }

    pub fn working_operations(&self) -> Vec<O> {
        self.inner.local.lock().working.clone()
    }

    pub fn pending_operations(&self) -> Vec<O> {
        self.inner.local.lock().pending_ops.clone()
    }

    pub fn has_pending_commit(&self) -> bool {
        self.inner.local.lock().pending_commit.is_some()
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::SeqCst)
    }

    pub fn is_polling(&self) -> bool {
        self.inner
            .poll_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Fetch the initial state from the node. A no-op once checked out.
    pub async fn checkout(&self) -> Result<()> {
        if self.inner.local.lock().revision.is_some() {
            return Ok(());
        }

        let data = self.inner.node.checkout().await?;
        {
            let mut local = self.inner.local.lock();
            if local.revision.is_some() {
                debug!("[OtStateManager] concurrent checkout already applied, discarding");
                return Ok(());
            }
            self.inner.apply(&mut local, &data.diffs)?;
            debug!(
                "[OtStateManager] checked out {:?} at level {}",
                data.revision, data.level
            );
            local.revision = Some(data.revision);
            local.level = Some(data.level);
        }

        self.inner.notify();
        Inner::ensure_polling(&self.inner);
        Ok(())
    }

    /// Apply `ops` locally and queue them for the next commit. Empty
    /// operations are skipped.
    pub fn add(&self, ops: impl IntoIterator<Item = O>) -> Result<()> {
        {
            let mut local = self.inner.local.lock();
            for op in ops {
                if self.inner.system.is_empty(&op) {
                    continue;
                }
                self.inner.apply(&mut local, std::slice::from_ref(&op))?;
                local.working.push(op);
            }
        }
        self.inner.notify();
        Ok(())
    }

    /// Reconcile with the node: pull or push, then commit and push any
    /// remaining working operations.
    ///
    /// Concurrent callers are coalesced; those arriving during a run share
    /// one follow-up run and its outcome.
    pub async fn sync(&self) -> Result<()> {
        let inner = &*self.inner;
        inner.sync_gate.run(move || inner.run_sync()).await
    }

    /// Undo all working and in-flight operations locally and drop the
    /// pending commit.
    pub fn reset(&self) -> Result<()> {
        {
            let mut local = self.inner.local.lock();
            let mut ops = local.pending_ops.clone();
            ops.extend(local.working.iter().cloned());
            let inverted = self.inner.system.invert(&ops)?;
            self.inner.apply(&mut local, &inverted)?;

            local.working.clear();
            local.pending_ops.clear();
            local.pending_commit = None;
        }
        self.inner.wake_poller();
        self.inner.notify();
        Ok(())
    }

    /// Register `listener`, called after every local state change. The
    /// first listener starts the poll loop.
    pub fn add_change_listener(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        Inner::ensure_polling(&self.inner);
        id
    }

    /// Unregister a listener. Removing the last one cancels the poll loop.
    pub fn remove_change_listener(&self, id: ListenerId) -> bool {
        let (removed, now_empty) = {
            let mut listeners = self.inner.listeners.lock();
            let before = listeners.len();
            listeners.retain(|(existing, _)| *existing != id);
            (listeners.len() != before, listeners.is_empty())
        };
        if removed && now_empty {
            self.inner.stop_polling();
        }
        removed
    }
}

impl<K, O, N> Drop for OtStateManager<K, O, N>
where
    K: CommitId,
    O: OtOperation,
    N: OtNode<K, O>,
{
    fn drop(&mut self) {
        self.inner.stop_polling();
    }
}

impl<K, O, N> std::fmt::Debug for OtStateManager<K, O, N>
where
    K: CommitId,
    O: OtOperation,
    N: OtNode<K, O>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let local = self.inner.local.lock();
        f.debug_struct("OtStateManager")
            .field("revision", &local.revision)
            .field("level", &local.level)
            .field("working", &local.working.len())
            .field("pending", &local.pending_commit.is_some())
            .finish()
    }
}

impl<K, O, N> Inner<K, O, N>
where
    K: CommitId,
    O: OtOperation,
    N: OtNode<K, O>,
{
    /// Fold `ops` over the local state. On failure the local state is reset
    /// to a fresh, unchecked-out one.
    fn apply(&self, local: &mut Local<K, O, N::Commit>, ops: &[O]) -> Result<()> {
        let mut state = std::mem::replace(&mut local.state, (self.init_state)());
        for op in ops {
            match op.apply(state) {
                Ok(next) => state = next,
                Err(e) => {
                    error!("[OtStateManager] apply failed, invalidating state: {}", e);
                    self.invalidate(local);
                    return Err(e);
                }
            }
        }
        local.state = state;
        Ok(())
    }

    fn invalidate(&self, local: &mut Local<K, O, N::Commit>) {
        local.state = (self.init_state)();
        local.revision = None;
        local.level = None;
        local.working.clear();
        local.pending_commit = None;
        local.pending_ops.clear();
        self.wake_poller();
    }

    fn wake_poller(&self) {
        self.poll_wake.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }

    /// Transform working operations against `data.diffs`, apply the remote
    /// residual and move to the fetched revision.
    fn adopt(&self, local: &mut Local<K, O, N::Commit>, data: FetchData<K, O>) -> Result<()> {
        if local.revision.is_none() {
            return Err(OtError::NotCheckedOut);
        }

        let working = self.system.squash(&local.working);
        let diffs = self.system.squash(&data.diffs);
        let transformed = self.system.transform(&working, &diffs)?;

        self.apply(local, &transformed.left_ops)?;
        local.working = transformed.right_ops;
        local.revision = Some(data.revision);
        local.level = Some(data.level);
        Ok(())
    }

    async fn run_sync(&self) -> Result<()> {
        let (_syncing, revision, pending) = {
            let local = self.local.lock();
            let revision = local.revision.clone().ok_or(OtError::NotCheckedOut)?;
            let guard = SyncingGuard::enter(&self.syncing, &self.poll_wake);
            (guard, revision, local.pending_commit.is_some())
        };

        if pending {
            self.push().await?;
        } else {
            self.pull(revision).await?;
        }

        let has_working = !self.local.lock().working.is_empty();
        if has_working {
            self.commit().await?;
            self.push().await?;
        }
        Ok(())
    }

    async fn pull(&self, revision: K) -> Result<()> {
        let data = self.node.fetch(&revision).await?;
        debug!(
            "[OtStateManager] pulled {} diffs, {:?} -> {:?}",
            data.diffs.len(),
            revision,
            data.revision
        );
        {
            let mut local = self.local.lock();
            if local.revision.as_ref() != Some(&revision) {
                debug!("[OtStateManager] revision moved during fetch, discarding");
                return Ok(());
            }
            self.adopt(&mut local, data)?;
        }
        self.notify();
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let (revision, level, snapshot) = {
            let local = self.local.lock();
            if local.pending_commit.is_some() {
                return Err(OtError::CommitPending);
            }
            let revision = local.revision.clone().ok_or(OtError::NotCheckedOut)?;
            (revision, local.level.unwrap_or(0), local.working.clone())
        };

        let diffs = self.system.squash(&snapshot);
        debug!(
            "[OtStateManager] committing {} ops ({} squashed) on {:?}",
            snapshot.len(),
            diffs.len(),
            revision
        );
        let commit = self.node.create_commit(&revision, diffs, level + 1).await?;

        let mut local = self.local.lock();
        let committed = snapshot.len().min(local.working.len());
        local.working.drain(..committed);
        local.pending_commit = Some(Arc::new(commit));
        local.pending_ops = snapshot;
        Ok(())
    }

    async fn push(&self) -> Result<()> {
        let commit = self
            .local
            .lock()
            .pending_commit
            .clone()
            .ok_or(OtError::NoPendingCommit)?;

        let data = self.node.push(&commit).await?;
        info!(
            "[OtStateManager] pushed commit, now at {:?} (level {})",
            data.revision, data.level
        );
        {
            let mut local = self.local.lock();
            local.pending_commit = None;
            local.pending_ops.clear();
            self.adopt(&mut local, data)?;
        }
        self.notify();
        Ok(())
    }

    fn notify(&self) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }

    fn ensure_polling(self: &Arc<Self>) {
        if !self.config.poll_enabled || self.listeners.lock().is_empty() {
            return;
        }
        if self.local.lock().revision.is_none() {
            return;
        }

        let mut task = self.poll_task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("[OtStateManager] no tokio runtime, polling disabled");
            return;
        };
        debug!("[OtStateManager] starting poll loop");
        *task = Some(runtime.spawn(poll_loop(Arc::downgrade(self))));
    }

    fn stop_polling(&self) {
        if let Some(task) = self.poll_task.lock().take() {
            debug!("[OtStateManager] cancelling poll loop");
            task.abort();
        }
    }

    /// Apply a long-poll result exactly as a pull would. The result is
    /// discarded while a sync is running, while a commit is pending (its
    /// push returns the same diffs), or when the revision moved.
    fn apply_polled(&self, polled_from: &K, data: FetchData<K, O>) -> Result<Polled> {
        // Read before the flags so a sync ending in between still changes it.
        let epoch = *self.poll_wake.borrow();
        let mut local = self.local.lock();
        if self.syncing.load(Ordering::SeqCst) || local.pending_commit.is_some() {
            debug!(
                "[OtStateManager] sync running or commit pending, deferring poll result"
            );
            return Ok(Polled::Deferred(epoch));
        }
        if local.revision.as_ref() != Some(polled_from) {
            debug!("[OtStateManager] revision moved during poll, discarding result");
            return Ok(Polled::Stale);
        }
        self.adopt(&mut local, data)?;
        Ok(Polled::Applied)
    }
}

async fn poll_loop<K, O, N>(inner: Weak<Inner<K, O, N>>)
where
    K: CommitId,
    O: OtOperation,
    N: OtNode<K, O>,
{
    loop {
        let Some(manager) = inner.upgrade() else {
            return;
        };
        let Some(revision) = manager.local.lock().revision.clone() else {
            debug!("[OtStateManager] not checked out, poll loop stopped");
            return;
        };

        match manager.node.poll(&revision).await {
            Ok(data) => match manager.apply_polled(&revision, data) {
                Ok(Polled::Applied) => manager.notify(),
                Ok(Polled::Stale) => {}
                Ok(Polled::Deferred(epoch)) => {
                    let mut wake = manager.poll_wake.subscribe();
                    drop(manager);
                    if wake.wait_for(|current| *current != epoch).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!("[OtStateManager] failed to apply polled diffs: {}", e);
                    return;
                }
            },
            Err(e) if e.is_aborted() => {
                debug!("[OtStateManager] poll aborted");
                return;
            }
            Err(e) => {
                let delay = manager.config.poll_retry_delay();
                warn!(
                    "[OtStateManager] poll failed, retrying in {:?}: {}",
                    delay, e
                );
                drop(manager);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
