use std::{panic::AssertUnwindSafe, sync::Arc};

use dashmap::DashMap;
use futures_util::{stream, FutureExt, StreamExt};
use log::*;
use tokio::{
    sync::{mpsc, watch},
    time::{interval, Instant, MissedTickBehavior},
};

use crate::{
    db_types::ChainId,
    events::{ConfirmationEvent, EventProducers, WatchParkedEvent},
    helpers::calculate_backoff,
    traits::{ChainOracle, ChainTxStatus, WatchRequest},
    watch::{WatchConfig, WatchKey, WatchState},
};

/// The state a chain poller shares with the registry.
pub(crate) struct PollerContext<O> {
    pub oracle: Arc<O>,
    pub watches: Arc<DashMap<WatchKey, WatchState>>,
    pub events: mpsc::UnboundedSender<ConfirmationEvent>,
    pub producers: EventProducers,
    pub config: WatchConfig,
}

impl<O> Clone for PollerContext<O> {
    fn clone(&self) -> Self {
        Self {
            oracle: Arc::clone(&self.oracle),
            watches: Arc::clone(&self.watches),
            events: self.events.clone(),
            producers: self.producers.clone(),
            config: self.config.clone(),
        }
    }
}

struct ActiveWatch {
    request: WatchRequest,
    failures: u32,
    next_poll: Instant,
}

impl ActiveWatch {
    fn new(request: WatchRequest) -> Self {
        Self { request, failures: 0, next_poll: Instant::now() }
    }
}

pub(crate) struct ChainPoller<O> {
    chain_id: ChainId,
    requests: mpsc::UnboundedReceiver<WatchRequest>,
    shutdown: watch::Receiver<bool>,
    ctx: PollerContext<O>,
}

impl<O: ChainOracle> ChainPoller<O> {
    pub fn new(
        chain_id: ChainId,
        requests: mpsc::UnboundedReceiver<WatchRequest>,
        shutdown: watch::Receiver<bool>,
        ctx: PollerContext<O>,
    ) -> Self {
        Self { chain_id, requests, shutdown, ctx }
    }

    pub async fn run(self) {
        let Self { chain_id, mut requests, mut shutdown, ctx } = self;
        info!("👀️ Starting poller for chain {chain_id}");
        let mut active: Vec<ActiveWatch> = Vec::new();
        let mut ticker = interval(ctx.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                },
                request = requests.recv() => match request {
                    Some(request) => {
                        trace!("👀️ Chain {chain_id} poller picked up flow {}", request.flow_id);
                        active.push(ActiveWatch::new(request));
                    },
                    None => break,
                },
                _ = ticker.tick(), if !active.is_empty() => {
                    // Oracle round-trips are abandoned if shutdown starts. Nothing is changed until they all return.
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => {},
                        _ = ctx.poll_due(chain_id, &mut active) => {},
                    }
                },
            }
        }
        info!("👀️ Poller for chain {chain_id} has stopped with {} watches outstanding", active.len());
    }
}

impl<O: ChainOracle> PollerContext<O> {
    async fn poll_due(&self, chain_id: ChainId, active: &mut Vec<ActiveWatch>) {
        let now = Instant::now();
        let due = active
            .iter()
            .enumerate()
            .filter(|(_, w)| w.next_poll <= now)
            .map(|(i, w)| (i, w.request.tx_hash.clone()))
            .collect::<Vec<_>>();
        if due.is_empty() {
            return;
        }
        trace!("👀️ Querying {} of {} watches on chain {chain_id}", due.len(), active.len());
        let results = stream::iter(due)
            .map(|(i, tx_hash)| {
                let oracle = Arc::clone(&self.oracle);
                async move {
                    let status = AssertUnwindSafe(oracle.query_status(chain_id, &tx_hash))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            error!("👀️ The oracle panicked while querying {tx_hash} on chain {chain_id}");
                            ChainTxStatus::Unknown
                        });
                    (i, status)
                }
            })
            .buffer_unordered(self.config.oracle_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let now = Instant::now();
        let mut finished = vec![false; active.len()];
        let mut parked = Vec::new();
        for (i, status) in results {
            let watch = &mut active[i];
            let key = WatchKey::from(&watch.request);
            match status.outcome() {
                Some(outcome) => {
                    debug!("👀️ Transaction {} for flow {} is {outcome}", key.tx_hash, watch.request.flow_id);
                    // Removed before sending, so that a consumer retry can register the watch again
                    self.watches.remove(&key);
                    if let Err(e) = self.events.send(ConfirmationEvent::new(watch.request.clone(), outcome)) {
                        warn!("👀️ Confirmation for flow {} was not delivered: {e}", watch.request.flow_id);
                    }
                    finished[i] = true;
                },
                None if status == ChainTxStatus::Pending => {
                    watch.failures = 0;
                    watch.next_poll = now;
                },
                None => {
                    watch.failures += 1;
                    if watch.failures >= self.config.max_oracle_attempts {
                        warn!(
                            "👀️ The oracle failed {} times for {} on chain {chain_id}. Parking the watch for flow {} \
                             until the next sweep.",
                            watch.failures, key.tx_hash, watch.request.flow_id
                        );
                        if let Some(mut state) = self.watches.get_mut(&key) {
                            *state = WatchState::Parked;
                        }
                        parked.push(WatchParkedEvent::new(watch.request.clone(), watch.failures));
                        finished[i] = true;
                    } else {
                        let delay =
                            calculate_backoff(watch.failures, self.config.backoff_base, self.config.backoff_max);
                        debug!(
                            "👀️ Oracle status for {} is unknown (attempt {}). Retrying in {}ms",
                            key.tx_hash,
                            watch.failures,
                            delay.as_millis()
                        );
                        watch.next_poll = now + delay;
                    }
                },
            }
        }
        let mut index = 0;
        active.retain(|_| {
            let keep = !finished[index];
            index += 1;
            keep
        });
        for event in parked {
            self.producers.publish_watch_parked(event).await;
        }
    }
}
