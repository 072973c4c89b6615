use std::{fmt::Debug, pin::pin, sync::Arc, time::Duration};

use futures_util::future::join_all;
use log::*;
use tokio::{sync::watch, task::JoinHandle, time::timeout};

use crate::{
    events::{EventHandlers, EventHooks},
    ledger_api::{account_api::AccountApi, applier::LedgerApplier, flow_api::FlowApi},
    reconciler::{ConfirmationConsumer, ConsumerReport, FlowSweeper, ReconcilerConfig, SweepReport},
    traits::{ChainOracle, LedgerDatabase, LedgerError},
    watch::WatchRegistry,
};

/// Builds and starts the reconciliation tasks.
///
/// ```ignore
/// let handle = Reconciler::new(db, oracle).with_config(config).start();
/// // ...
/// let report = handle.shutdown().await;
/// ```
pub struct Reconciler<B, O> {
    db: B,
    oracle: Arc<O>,
    config: ReconcilerConfig,
    hooks: EventHooks,
}

impl<B, O> Reconciler<B, O>
where
    B: LedgerDatabase,
    O: ChainOracle,
{
    pub fn new(db: B, oracle: O) -> Self {
        Self::with_shared_oracle(db, Arc::new(oracle))
    }

    pub fn with_shared_oracle(db: B, oracle: Arc<O>) -> Self {
        Self { db, oracle, config: ReconcilerConfig::default(), hooks: EventHooks::default() }
    }

    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_hooks(mut self, hooks: EventHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Spawns the hook handlers, the confirmation consumer and the sweeper. The first sweep runs straight away, so
    /// every flow left `Pending` by a previous run is watched again.
    ///
    /// # Panics
    /// If called outside of a tokio runtime.
    pub fn start(self) -> ReconcilerHandle<B, O> {
        let Self { db, oracle, config, hooks } = self;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handlers = EventHandlers::new(config.event_buffer_size, hooks);
        let producers = handlers.producers();
        handlers.start_handlers();

        let (registry, stream) =
            WatchRegistry::new(oracle, config.watch.clone(), shutdown_rx.clone(), producers.clone());
        let applier = LedgerApplier::new(db.clone(), producers);
        let consumer = ConfirmationConsumer::new(applier.clone(), registry.clone(), stream, shutdown_rx.clone());
        let consumer = tokio::spawn(consumer.run());
        let sweeper = FlowSweeper::new(db.clone(), registry.clone(), config.sweep.clone());
        let sweeper = tokio::spawn(sweeper.run(shutdown_rx));
        info!("🛑️ Reconciler started");
        ReconcilerHandle { db, registry, applier, config, shutdown, consumer, sweeper }
    }
}

/// What happened during [`ReconcilerHandle::shutdown`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    /// True if every task stopped before the graceful timeout.
    pub graceful: bool,
    /// Tasks that had to be aborted.
    pub aborted: usize,
    /// `None` if the consumer was aborted or panicked.
    pub consumer: Option<ConsumerReport>,
    /// Watches that were still outstanding. Their flows are `Pending` and are recovered on the next start.
    pub outstanding_watches: usize,
}

/// A running reconciler.
pub struct ReconcilerHandle<B, O> {
    db: B,
    registry: WatchRegistry<O>,
    applier: LedgerApplier<B>,
    config: ReconcilerConfig,
    shutdown: watch::Sender<bool>,
    consumer: JoinHandle<ConsumerReport>,
    sweeper: JoinHandle<()>,
}

impl<B, O: ChainOracle> Debug for ReconcilerHandle<B, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconcilerHandle ({} outstanding watches)", self.registry.outstanding())
    }
}

impl<B, O> ReconcilerHandle<B, O>
where
    B: LedgerDatabase,
    O: ChainOracle,
{
    pub fn registry(&self) -> &WatchRegistry<O> {
        &self.registry
    }

    pub fn applier(&self) -> &LedgerApplier<B> {
        &self.applier
    }

    pub fn flow_api(&self) -> FlowApi<B, O> {
        FlowApi::new(self.db.clone(), self.registry.clone())
    }

    pub fn account_api(&self) -> AccountApi<B> {
        AccountApi::new(self.db.clone())
    }

    /// Runs a sweep now, outside the regular schedule.
    pub async fn sweep_now(&self) -> Result<SweepReport, LedgerError> {
        FlowSweeper::new(self.db.clone(), self.registry.clone(), self.config.sweep.clone()).sweep_once().await
    }

    /// Shuts down using the timeouts from the configuration.
    pub async fn shutdown(self) -> ShutdownReport {
        let graceful = self.config.shutdown_timeout;
        let forced = self.config.forced_shutdown_timeout;
        self.shutdown_with_timeouts(graceful, forced).await
    }

    /// Stops the reconciler.
    ///
    /// The registry stops accepting watches and every task is signalled. The consumer finishes the confirmation it is
    /// applying and leaves the rest of the stream alone. Tasks still running after `graceful` are aborted, and we wait
    /// at most `forced` more for them to go away. Nothing is lost either way: unapplied flows stay `Pending`.
    pub async fn shutdown_with_timeouts(self, graceful: Duration, forced: Duration) -> ShutdownReport {
        info!("🛑️ Shutting down the reconciler");
        self.shutdown.send_replace(true);
        let pollers = self.registry.close();
        let mut abort_handles = vec![self.consumer.abort_handle(), self.sweeper.abort_handle()];
        abort_handles.extend(pollers.iter().map(|p| p.abort_handle()));

        let consumer = self.consumer;
        let sweeper = self.sweeper;
        let mut tasks = pin!(async move {
            let consumer = consumer.await;
            let _ = sweeper.await;
            join_all(pollers).await;
            consumer.ok()
        });

        let mut report = ShutdownReport { graceful: true, ..Default::default() };
        report.consumer = match timeout(graceful, tasks.as_mut()).await {
            Ok(consumer) => consumer,
            Err(_) => {
                warn!(
                    "🛑️ Shutdown did not complete within {}s. Some tasks may not have completed properly and will be \
                     aborted.",
                    graceful.as_secs_f32()
                );
                report.graceful = false;
                report.aborted = abort_handles.iter().filter(|h| !h.is_finished()).count();
                abort_handles.iter().for_each(|h| h.abort());
                match timeout(forced, tasks.as_mut()).await {
                    Ok(consumer) => consumer,
                    Err(_) => {
                        error!("🛑️ Aborted tasks did not stop within {}s", forced.as_secs_f32());
                        None
                    },
                }
            },
        };
        report.outstanding_watches = self.registry.outstanding();
        info!(
            "🛑️ Reconciler stopped. {} watches were outstanding and will be recovered on the next start.",
            report.outstanding_watches
        );
        report
    }
}

#[cfg(test)]
mod test {
    use ledger_common::Amount;

    use super::*;
    use crate::{
        db_types::{BalanceOp, ChainId, FlowId, FlowStatus, NewBalanceFlow},
        test_utils::{
            fixtures::{fast_reconciler_config, new_test_db, pending_flow, random_tx_hash},
            mock_oracle::MockChainOracle,
        },
        traits::{AccountManagement, ChainTxStatus, WatchRequest},
        watch::AppendResult,
        SqliteDatabase,
    };

    async fn wait_until_settled(db: &SqliteDatabase, flow_id: FlowId) -> FlowStatus {
        timeout(Duration::from_secs(5), async {
            loop {
                let flow = db.fetch_flow(flow_id).await.unwrap().unwrap();
                if flow.status.is_terminal() {
                    return flow.status;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("flow was never settled")
    }

    #[tokio::test]
    async fn submitted_flows_are_settled() {
        let db = new_test_db().await;
        let oracle = MockChainOracle::new();
        let handle = Reconciler::new(db.clone(), oracle.clone()).with_config(fast_reconciler_config()).start();
        let api = handle.flow_api();
        let account = api.create_account().await.unwrap();
        let chain = ChainId::new(1).unwrap();

        let hash = random_tx_hash();
        oracle.script(&hash, &[ChainTxStatus::Pending, ChainTxStatus::Confirmed]);
        let recharge = NewBalanceFlow::new(account.id, chain, BalanceOp::Recharge, Amount::from(100)).with_tx_hash(hash);
        let submitted = api.submit_flow(recharge).await.unwrap();
        assert_eq!(submitted.watch, Some(AppendResult::Registered));
        assert_eq!(wait_until_settled(&db, submitted.flow.id).await, FlowStatus::Confirmed);

        // Submitted first, hash attached once the transaction has been broadcast
        let freeze = NewBalanceFlow::new(account.id, chain, BalanceOp::Freeze, Amount::from(40));
        let freeze = api.submit_flow(freeze).await.unwrap();
        assert_eq!(freeze.watch, None);
        let hash = random_tx_hash();
        oracle.set_status(&hash, ChainTxStatus::Confirmed);
        api.attach_tx_hash(freeze.flow.id, &hash).await.unwrap();
        assert_eq!(wait_until_settled(&db, freeze.flow.id).await, FlowStatus::Confirmed);

        let audit = handle.account_api().audit(account.id).await.unwrap();
        assert!(audit.is_consistent());
        assert_eq!((audit.account.available, audit.account.held), (Amount::from(60), Amount::from(40)));

        let report = handle.shutdown().await;
        assert!(report.graceful);
        assert_eq!(report.aborted, 0);
        assert_eq!(report.consumer.map(|c| c.applied), Some(2));
    }

    #[tokio::test]
    async fn pending_flows_are_recovered_at_startup() {
        let db = new_test_db().await;
        let oracle = MockChainOracle::new();
        let account = db.create_account().await.unwrap();
        // Stored by an earlier run that stopped before they were confirmed
        let recharge = pending_flow(&db, account.id, BalanceOp::Recharge, 100, 0).await;
        let failed = pending_flow(&db, account.id, BalanceOp::Recharge, 50, 0).await;
        oracle.set_status(&recharge.watch_target().unwrap().1, ChainTxStatus::Confirmed);
        oracle.set_status(&failed.watch_target().unwrap().1, ChainTxStatus::Failed);

        let handle = Reconciler::new(db.clone(), oracle).with_config(fast_reconciler_config()).start();
        assert_eq!(wait_until_settled(&db, recharge.id).await, FlowStatus::Confirmed);
        assert_eq!(wait_until_settled(&db, failed.id).await, FlowStatus::Failed);
        let account = db.fetch_account(account.id).await.unwrap().unwrap();
        assert_eq!(account.available, Amount::from(100));
        // A manual sweep finds nothing left to do
        assert_eq!(handle.sweep_now().await.unwrap().scanned, 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_leaves_unconfirmed_flows_pending() {
        let db = new_test_db().await;
        let oracle = MockChainOracle::new();
        let handle = Reconciler::new(db.clone(), oracle).with_config(fast_reconciler_config()).start();
        let account = db.create_account().await.unwrap();
        let flow = pending_flow(&db, account.id, BalanceOp::Recharge, 100, 0).await;
        let registry = handle.registry().clone();
        assert_eq!(registry.append(WatchRequest::for_flow(&flow).unwrap()), AppendResult::Registered);
        assert_eq!(format!("{handle:?}"), "ReconcilerHandle (1 outstanding watches)");

        let report = handle.shutdown().await;
        assert!(report.graceful);
        assert_eq!(report.outstanding_watches, 1);
        assert!(!registry.is_accepting());
        let flow = db.fetch_flow(flow.id).await.unwrap().unwrap();
        assert_eq!(flow.status, FlowStatus::Pending);
    }
}
