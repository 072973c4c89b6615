use std::fmt::Display;

use log::*;
use tokio::{
    sync::watch,
    time::{interval, MissedTickBehavior},
};

use crate::{
    reconciler::SweepConfig,
    traits::{ChainOracle, LedgerDatabase, LedgerError, WatchRequest},
    watch::{AppendResult, WatchRegistry},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    /// Flows whose watch was registered or reactivated by this sweep.
    pub resubmitted: usize,
    pub already_watching: usize,
    pub malformed: usize,
    pub rejected: usize,
}

impl Display for SweepReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} pending flows scanned: {} resubmitted, {} already watched, {} malformed, {} rejected",
            self.scanned, self.resubmitted, self.already_watching, self.malformed, self.rejected
        )
    }
}

/// Re-submits `Pending` flows to the watch registry.
pub struct FlowSweeper<B, O> {
    db: B,
    registry: WatchRegistry<O>,
    config: SweepConfig,
}

impl<B, O> FlowSweeper<B, O>
where
    B: LedgerDatabase,
    O: ChainOracle,
{
    pub fn new(db: B, registry: WatchRegistry<O>, config: SweepConfig) -> Self {
        Self { db, registry, config }
    }

    /// Runs one sweep over a batch of pending flows.
    ///
    /// Only a failure to read the batch is returned as an error. Problems with individual flows are logged and counted
    /// in the report.
    pub async fn sweep_once(&self) -> Result<SweepReport, LedgerError> {
        let flows = self.db.fetch_pending_flows(self.config.batch_size, self.config.min_age).await?;
        let mut report = SweepReport { scanned: flows.len(), ..Default::default() };
        for flow in &flows {
            let request = match WatchRequest::for_flow(flow) {
                Ok(request) => request,
                Err(e) => {
                    warn!("🧹️ Skipping flow {} with chain '{}' and hash '{}': {e}", flow.id, flow.chain_id, flow.tx_hash);
                    report.malformed += 1;
                    continue;
                },
            };
            match self.registry.append(request) {
                AppendResult::Registered | AppendResult::Reactivated => report.resubmitted += 1,
                AppendResult::AlreadyWatching => report.already_watching += 1,
                AppendResult::Rejected => report.rejected += 1,
            }
        }
        let ids = flows.iter().map(|f| f.id).collect::<Vec<_>>();
        if let Err(e) = self.db.mark_flows_swept(&ids).await {
            warn!("🧹️ Could not record the sweep of {} flows: {e}", ids.len());
        }
        Ok(report)
    }

    /// Sweeps immediately, then every `interval`, until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("🧹️ Sweeper started. Sweeping every {}s", self.config.interval.as_secs());
        let mut timer = interval(self.config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
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
                _ = timer.tick() => match self.sweep_once().await {
                    Ok(report) if report.scanned > 0 => info!("🧹️ Sweep complete. {report}"),
                    Ok(_) => debug!("🧹️ Sweep complete. No pending flows."),
                    Err(e) => error!("🧹️ Sweep failed: {e}"),
                },
            }
        }
        info!("🧹️ Sweeper stopped");
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use ledger_common::Amount;

    use super::*;
    use crate::{
        db_types::{BalanceOp, ChainId, ChainOutcome, NewBalanceFlow},
        events::EventProducers,
        test_utils::{
            fixtures::{new_test_db, pending_flow},
            mock_oracle::MockChainOracle,
        },
        SqliteDatabase,
    };

    fn sweeper(
        db: &SqliteDatabase,
        oracle: &MockChainOracle,
    ) -> (FlowSweeper<SqliteDatabase, MockChainOracle>, watch::Sender<bool>) {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (registry, _stream) =
            WatchRegistry::new(Arc::new(oracle.clone()), Default::default(), shutdown_rx, EventProducers::default());
        let config = SweepConfig { interval: Duration::from_secs(3600), batch_size: 10, min_age: Duration::ZERO };
        (FlowSweeper::new(db.clone(), registry, config), shutdown)
    }

    #[tokio::test]
    async fn pending_flows_are_resubmitted() {
        let db = new_test_db().await;
        let oracle = MockChainOracle::new();
        let (sweeper, _shutdown) = sweeper(&db, &oracle);
        let account = db.create_account().await.unwrap();
        let pending = pending_flow(&db, account.id, BalanceOp::Recharge, 10, 0).await;
        let settled = pending_flow(&db, account.id, BalanceOp::Recharge, 20, 0).await;
        db.settle_flow(settled.id, ChainOutcome::Confirmed).await.unwrap();
        // No hash yet, so there is nothing to watch
        let unhashed = NewBalanceFlow::new(account.id, ChainId::new(1).unwrap(), BalanceOp::Recharge, Amount::from(5));
        db.insert_flow(unhashed).await.unwrap();

        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report, SweepReport { scanned: 1, resubmitted: 1, ..Default::default() });
        assert_eq!(sweeper.registry.outstanding(), 1);

        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report, SweepReport { scanned: 1, already_watching: 1, ..Default::default() });
        let flow = db.fetch_flow(pending.id).await.unwrap().unwrap();
        assert_eq!(flow.sweep_count, 2);
        assert!(flow.last_swept_at.is_some());
    }

    #[tokio::test]
    async fn malformed_flows_do_not_stop_the_sweep() {
        let db = new_test_db().await;
        let oracle = MockChainOracle::new();
        let (sweeper, _shutdown) = sweeper(&db, &oracle);
        let account = db.create_account().await.unwrap();
        let broken = pending_flow(&db, account.id, BalanceOp::Recharge, 10, 0).await;
        pending_flow(&db, account.id, BalanceOp::Recharge, 10, 0).await;
        sqlx::query("UPDATE balance_flows SET chain_id = 'not-a-chain' WHERE id = $1")
            .bind(broken.id)
            .execute(db.pool())
            .await
            .unwrap();
        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.resubmitted, 1);
    }

    #[tokio::test]
    async fn closed_registry_rejects_resubmissions() {
        let db = new_test_db().await;
        let oracle = MockChainOracle::new();
        let (sweeper, shutdown) = sweeper(&db, &oracle);
        let account = db.create_account().await.unwrap();
        pending_flow(&db, account.id, BalanceOp::Recharge, 10, 0).await;
        shutdown.send(true).unwrap();
        sweeper.registry.close();
        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report, SweepReport { scanned: 1, rejected: 1, ..Default::default() });
    }

    #[tokio::test]
    async fn run_sweeps_at_startup_and_stops_on_shutdown() {
        let db = new_test_db().await;
        let oracle = MockChainOracle::new();
        let (sweeper, shutdown) = sweeper(&db, &oracle);
        let registry = sweeper.registry.clone();
        let account = db.create_account().await.unwrap();
        pending_flow(&db, account.id, BalanceOp::Recharge, 10, 0).await;
        let task = tokio::spawn(sweeper.run(shutdown.subscribe()));
        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.outstanding() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("the startup sweep never ran");
        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
