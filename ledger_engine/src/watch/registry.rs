use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
        MutexGuard,
    },
};

use dashmap::{mapref::entry::Entry, DashMap};
use log::*;
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
    task::JoinHandle,
};

use super::poller::{ChainPoller, PollerContext};
use crate::{
    db_types::ChainId,
    events::{ConfirmationEvent, EventProducers},
    traits::{ChainOracle, WatchRequest},
    watch::{AppendResult, WatchConfig, WatchKey, WatchState},
};

struct PollerHandle {
    sender: mpsc::UnboundedSender<WatchRequest>,
    task: Option<JoinHandle<()>>,
}

struct RegistryInner<O> {
    ctx: PollerContext<O>,
    pollers: Mutex<HashMap<ChainId, PollerHandle>>,
    shutdown: watch::Receiver<bool>,
    runtime: Handle,
    accepting: AtomicBool,
}

/// The deduplicated set of outstanding watches, and the pollers that serve them.
///
/// Cloning is cheap; all clones share the same state.
pub struct WatchRegistry<O> {
    inner: Arc<RegistryInner<O>>,
}

impl<O> Clone for WatchRegistry<O> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<O> Debug for WatchRegistry<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WatchRegistry ({} outstanding watches)", self.inner.ctx.watches.len())
    }
}

impl<O: ChainOracle> WatchRegistry<O> {
    /// Creates a registry and the stream its confirmations are delivered on.
    ///
    /// Pollers are spawned on the runtime this is called from, so [`append`](Self::append) can be used from any
    /// thread afterwards.
    ///
    /// # Panics
    /// If called outside of a tokio runtime.
    pub fn new(
        oracle: Arc<O>,
        config: WatchConfig,
        shutdown: watch::Receiver<bool>,
        producers: EventProducers,
    ) -> (Self, mpsc::UnboundedReceiver<ConfirmationEvent>) {
        let (events, stream) = mpsc::unbounded_channel();
        let ctx = PollerContext { oracle, watches: Arc::new(DashMap::new()), events, producers, config };
        let inner = RegistryInner {
            ctx,
            pollers: Mutex::new(HashMap::new()),
            shutdown,
            runtime: Handle::current(),
            accepting: AtomicBool::new(true),
        };
        (Self { inner: Arc::new(inner) }, stream)
    }

    /// Registers a watch for the transaction backing a flow. Never blocks, and callers are free to ignore the result.
    ///
    /// An identical `(chain, tx hash, op)` watch that is still being polled makes this a no-op. A parked one is
    /// handed back to its poller.
    pub fn append(&self, request: WatchRequest) -> AppendResult {
        if !self.is_accepting() {
            let (flow_id, chain_id) = (request.flow_id, request.chain_id);
            warn!("👀️ Shutting down. Watch for flow {flow_id} on chain {chain_id} was not registered.");
            return AppendResult::Rejected;
        }
        let key = WatchKey::from(&request);
        // Checked before taking the map entry, so the poller lock is never held under a dedup shard lock.
        let poller_alive = self.poller_alive(request.chain_id);
        let result = match self.inner.ctx.watches.entry(key.clone()) {
            Entry::Occupied(mut entry) => match *entry.get() {
                WatchState::Active if poller_alive => {
                    trace!("👀️ {} ({}) is already being watched", key.tx_hash, key.op);
                    return AppendResult::AlreadyWatching;
                },
                WatchState::Active => {
                    warn!("👀️ The poller for {} ({}) is gone. Watching it again.", key.tx_hash, key.op);
                    AppendResult::Reactivated
                },
                WatchState::Parked => {
                    entry.insert(WatchState::Active);
                    AppendResult::Reactivated
                },
            },
            Entry::Vacant(entry) => {
                entry.insert(WatchState::Active);
                AppendResult::Registered
            },
        };
        let flow_id = request.flow_id;
        if !self.dispatch(request) {
            self.inner.ctx.watches.remove(&key);
            warn!("👀️ Shutting down. Watch for flow {flow_id} was not registered.");
            return AppendResult::Rejected;
        }
        debug!("👀️ Watching {} on chain {} for flow {flow_id} ({result:?})", key.tx_hash, key.chain_id);
        result
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst) && !*self.inner.shutdown.borrow()
    }

    /// The state of the watch for `key`, if it is outstanding.
    pub fn state(&self, key: &WatchKey) -> Option<WatchState> {
        self.inner.ctx.watches.get(key).map(|s| *s.value())
    }

    /// The number of outstanding watches, parked ones included.
    pub fn outstanding(&self) -> usize {
        self.inner.ctx.watches.len()
    }

    pub fn parked(&self) -> usize {
        self.inner.ctx.watches.iter().filter(|s| *s.value() == WatchState::Parked).count()
    }

    pub fn active_pollers(&self) -> usize {
        self.pollers().len()
    }

    /// Refuses all further watches and hands over the poller tasks, so that the caller can wait for them to stop.
    pub fn close(&self) -> Vec<JoinHandle<()>> {
        self.inner.accepting.store(false, Ordering::SeqCst);
        let mut pollers = self.pollers();
        let tasks = pollers.values_mut().filter_map(|p| p.task.take()).collect::<Vec<_>>();
        info!("👀️ Watch registry closed with {} outstanding watches on {} chains", self.outstanding(), pollers.len());
        tasks
    }

    /// Hands the request to its chain's poller, starting one if needed. Returns false if the registry is closed.
    fn dispatch(&self, request: WatchRequest) -> bool {
        let mut pollers = self.pollers();
        // Checked under the lock, so that no poller is started after `close` has collected the tasks.
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return false;
        }
        let chain_id = request.chain_id;
        let request = match pollers.get(&chain_id) {
            Some(poller) => match poller.sender.send(request) {
                Ok(()) => return true,
                Err(mpsc::error::SendError(request)) => {
                    warn!("👀️ Poller for chain {chain_id} has stopped unexpectedly. Starting a new one.");
                    self.park_orphans(chain_id, &WatchKey::from(&request));
                    request
                },
            },
            None => request,
        };
        let (sender, requests) = mpsc::unbounded_channel();
        let poller = ChainPoller::new(chain_id, requests, self.inner.shutdown.clone(), self.inner.ctx.clone());
        let task = self.inner.runtime.spawn(poller.run());
        // The receiver is owned by the poller we just spawned, so this cannot fail.
        let _ = sender.send(request);
        pollers.insert(chain_id, PollerHandle { sender, task: Some(task) });
        true
    }

    /// Parks the watches a dead poller was serving, except `current`, so that the next sweep hands them to its
    /// replacement.
    fn park_orphans(&self, chain_id: ChainId, current: &WatchKey) {
        let mut parked = 0;
        for mut entry in self.inner.ctx.watches.iter_mut() {
            if entry.key().chain_id == chain_id && entry.key() != current && *entry.value() == WatchState::Active {
                *entry.value_mut() = WatchState::Parked;
                parked += 1;
            }
        }
        if parked > 0 {
            warn!("👀️ Parked {parked} watches on chain {chain_id} until the next sweep");
        }
    }

    fn poller_alive(&self, chain_id: ChainId) -> bool {
        self.pollers().get(&chain_id).is_some_and(|p| !p.sender.is_closed())
    }

    fn pollers(&self) -> MutexGuard<'_, HashMap<ChainId, PollerHandle>> {
        self.inner.pollers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
