use log::*;
use tokio::sync::{mpsc, watch};

use crate::{
    events::ConfirmationEvent,
    ledger_api::applier::{ApplyOutcome, LedgerApplier},
    traits::{ChainOracle, LedgerDatabase},
    watch::{AppendResult, WatchRegistry},
};

/// Counts of what the consumer did with the events it pulled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub applied: usize,
    pub duplicates: usize,
    pub malformed: usize,
    /// Events whose apply failed with a retryable error. Their watch was registered again.
    pub retried: usize,
    /// Events that could not be applied and were left `Pending`.
    pub unapplied: usize,
}

/// The single consumer of the confirmation stream.
///
/// Events are applied one at a time, in the order they arrive. Once shutdown starts no further events are pulled, but
/// the one being applied is always finished first.
pub struct ConfirmationConsumer<B, O> {
    applier: LedgerApplier<B>,
    registry: WatchRegistry<O>,
    stream: mpsc::UnboundedReceiver<ConfirmationEvent>,
    shutdown: watch::Receiver<bool>,
}

impl<B, O> ConfirmationConsumer<B, O>
where
    B: LedgerDatabase,
    O: ChainOracle,
{
    pub fn new(
        applier: LedgerApplier<B>,
        registry: WatchRegistry<O>,
        stream: mpsc::UnboundedReceiver<ConfirmationEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { applier, registry, stream, shutdown }
    }

    pub async fn run(mut self) -> ConsumerReport {
        info!("📬️ Confirmation consumer started");
        let mut report = ConsumerReport::default();
        loop {
            if *self.shutdown.borrow_and_update() {
                break;
            }
            let event = tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        warn!("📬️ Shutdown signal was dropped. Stopping the confirmation consumer.");
                        break;
                    }
                    continue;
                },
                event = self.stream.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event, &mut report).await;
        }
        let left = self.stream.len();
        if left > 0 {
            info!("📬️ {left} confirmations were not applied. They will be recovered by the sweeper after restart.");
        }
        info!("📬️ Confirmation consumer stopped. {report:?}");
        report
    }

    async fn handle(&self, event: ConfirmationEvent, report: &mut ConsumerReport) {
        if event.is_malformed() {
            warn!("📬️ Dropping malformed confirmation event: {event:?}");
            report.malformed += 1;
            return;
        }
        let flow_id = event.flow_id();
        match self.applier.apply(flow_id, event.outcome).await {
            Ok(ApplyOutcome::Applied(_)) => report.applied += 1,
            Ok(ApplyOutcome::AlreadySettled(_)) => report.duplicates += 1,
            Err(e) if e.is_retryable() => {
                report.retried += 1;
                warn!("📬️ Could not apply {} for flow {flow_id}: {e}. The transaction will be checked again.", event.outcome);
                if self.registry.append(event.watch) == AppendResult::Rejected {
                    info!("📬️ Flow {flow_id} remains Pending and will be picked up by the next sweep.");
                }
            },
            Err(e) if e.is_integrity_error() => {
                report.unapplied += 1;
                error!("📬️ Flow {flow_id} cannot be settled and is left Pending for review: {e}");
            },
            Err(e) => {
                report.unapplied += 1;
                error!("📬️ Confirmation for flow {flow_id} could not be applied: {e}");
            },
        }
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use ledger_common::Amount;

    use super::*;
    use crate::{
        db_types::{BalanceFlow, BalanceOp, ChainId, ChainOutcome, FlowStatus},
        events::EventProducers,
        test_utils::{
            fixtures::{new_test_db, pending_flow, random_tx_hash},
            mock_oracle::MockChainOracle,
        },
        traits::{AccountManagement, WatchRequest},
        SqliteDatabase,
    };

    struct Harness {
        db: SqliteDatabase,
        events: mpsc::UnboundedSender<ConfirmationEvent>,
        shutdown: watch::Sender<bool>,
        task: tokio::task::JoinHandle<ConsumerReport>,
    }

    /// A consumer fed by a hand-held channel instead of the registry's stream.
    async fn harness() -> Harness {
        let db = new_test_db().await;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let oracle = Arc::new(MockChainOracle::new());
        let (registry, _stream) =
            WatchRegistry::new(oracle, Default::default(), shutdown_rx.clone(), EventProducers::default());
        let applier = LedgerApplier::new(db.clone(), EventProducers::default());
        let (events, stream) = mpsc::unbounded_channel();
        let consumer = ConfirmationConsumer::new(applier, registry, stream, shutdown_rx);
        let task = tokio::spawn(consumer.run());
        Harness { db, events, shutdown, task }
    }

    fn event_for(flow: &BalanceFlow, outcome: ChainOutcome) -> ConfirmationEvent {
        ConfirmationEvent::new(WatchRequest::for_flow(flow).unwrap(), outcome)
    }

    async fn wait_for_status(db: &SqliteDatabase, flow: &BalanceFlow, status: FlowStatus) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while db.fetch_flow(flow.id).await.unwrap().unwrap().status != status {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("flow never reached the expected status");
    }

    #[tokio::test]
    async fn events_are_applied_and_counted() {
        let h = harness().await;
        let account = h.db.create_account().await.unwrap();
        let recharge = pending_flow(&h.db, account.id, BalanceOp::Recharge, 100, 0).await;
        let withdraw = pending_flow(&h.db, account.id, BalanceOp::Withdraw, 500, 0).await;
        let bad = WatchRequest::new(ChainId::new(1).unwrap(), random_tx_hash(), account.id, 0, BalanceOp::Recharge);

        h.events.send(ConfirmationEvent::new(bad, ChainOutcome::Confirmed)).unwrap();
        h.events.send(event_for(&recharge, ChainOutcome::Confirmed)).unwrap();
        h.events.send(event_for(&recharge, ChainOutcome::Confirmed)).unwrap();
        // Overdraws the account, so it is left pending
        h.events.send(event_for(&withdraw, ChainOutcome::Confirmed)).unwrap();
        wait_for_status(&h.db, &recharge, FlowStatus::Confirmed).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        h.shutdown.send(true).unwrap();
        let report = tokio::time::timeout(Duration::from_secs(1), h.task).await.unwrap().unwrap();
        assert_eq!(report, ConsumerReport { applied: 1, duplicates: 1, malformed: 1, retried: 0, unapplied: 1 });
        let account = h.db.fetch_account(account.id).await.unwrap().unwrap();
        assert_eq!(account.available, Amount::from(100));
        let withdraw = h.db.fetch_flow(withdraw.id).await.unwrap().unwrap();
        assert_eq!(withdraw.status, FlowStatus::Pending);
    }

    #[tokio::test]
    async fn nothing_is_pulled_after_shutdown() {
        let h = harness().await;
        let account = h.db.create_account().await.unwrap();
        let flow = pending_flow(&h.db, account.id, BalanceOp::Recharge, 100, 0).await;
        h.shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), h.task).await.unwrap().unwrap();
        // The consumer has stopped, so this event is never applied
        let _ = h.events.send(event_for(&flow, ChainOutcome::Confirmed));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let flow = h.db.fetch_flow(flow.id).await.unwrap().unwrap();
        assert_eq!(flow.status, FlowStatus::Pending);
    }

    #[tokio::test]
    async fn retryable_errors_rewatch_the_transaction() {
        let db = new_test_db().await;
        let oracle = MockChainOracle::new();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (registry, _stream) = WatchRegistry::new(
            Arc::new(oracle.clone()),
            Default::default(),
            shutdown_rx.clone(),
            EventProducers::default(),
        );
        let account = db.create_account().await.unwrap();
        let flow = pending_flow(&db, account.id, BalanceOp::Recharge, 100, 0).await;
        let applier = LedgerApplier::new(db.clone(), EventProducers::default());
        let (events, stream) = mpsc::unbounded_channel();
        let consumer = ConfirmationConsumer::new(applier, registry.clone(), stream, shutdown_rx);
        // A closed pool makes every store call fail with a database error
        db.pool().close().await;
        let task = tokio::spawn(consumer.run());
        events.send(event_for(&flow, ChainOutcome::Confirmed)).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.outstanding() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("the transaction was not watched again");
        shutdown.send(true).unwrap();
        let report = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(report.retried, 1);
    }
}
