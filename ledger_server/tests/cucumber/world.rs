use std::{collections::HashMap, time::Duration};

use cucumber::World;
use ledger_common::Amount;
use ledger_engine::{
    db_types::{AccountId, BalanceFlow, BalanceOp, ChainId, FlowStatus, NewBalanceFlow, TxHash},
    test_utils::{
        fixtures::{fast_reconciler_config, new_test_db, random_tx_hash},
        mock_oracle::MockChainOracle,
    },
    FlowApi,
    LedgerDatabase,
    LedgerError,
    Reconciler,
    ReconcilerHandle,
    SqliteDatabase,
};
use log::*;

#[derive(Debug, Default, World)]
pub struct LedgerWorld {
    pub db: Option<SqliteDatabase>,
    pub oracle: MockChainOracle,
    pub handle: Option<ReconcilerHandle<SqliteDatabase, MockChainOracle>>,
    pub accounts: HashMap<String, AccountId>,
    /// Flows by the name of the transaction behind them.
    pub flows: HashMap<String, BalanceFlow>,
    pub hashes: HashMap<String, TxHash>,
    pub last_error: Option<LedgerError>,
}

impl LedgerWorld {
    pub async fn start_reconciler(&mut self) {
        if self.db.is_none() {
            self.db = Some(new_test_db().await);
        }
        let db = self.database().clone();
        let handle = Reconciler::new(db, self.oracle.clone()).with_config(fast_reconciler_config()).start();
        debug!("🌍️ Reconciler started");
        self.handle = Some(handle);
    }

    pub async fn stop_reconciler(&mut self) {
        if let Some(handle) = self.handle.take() {
            let report = handle.shutdown().await;
            debug!("🌍️ Reconciler stopped: {report:?}");
        }
    }

    pub fn database(&self) -> &SqliteDatabase {
        self.db.as_ref().expect("Database not started")
    }

    pub fn api(&self) -> FlowApi<SqliteDatabase, MockChainOracle> {
        self.handle.as_ref().expect("Reconciler not started").flow_api()
    }

    pub fn account(&self, name: &str) -> AccountId {
        *self.accounts.get(name).unwrap_or_else(|| panic!("No account named {name}"))
    }

    pub fn flow(&self, tx: &str) -> &BalanceFlow {
        self.flows.get(tx).unwrap_or_else(|| panic!("No flow for transaction {tx}"))
    }

    pub fn tx_hash(&mut self, tx: &str) -> TxHash {
        self.hashes.entry(tx.to_string()).or_insert_with(random_tx_hash).clone()
    }

    /// Submits a flow for `tx`. Rejections are kept in `last_error` for later steps to inspect.
    pub async fn submit(&mut self, name: &str, op: BalanceOp, amount: i64, tx: &str, reference: Option<&str>) {
        let account_id = self.account(name);
        let ref_flow_id = reference.map(|r| self.flow(r).id).unwrap_or_default();
        let hash = self.tx_hash(tx);
        let flow = NewBalanceFlow::new(account_id, ChainId::new(1).unwrap(), op, Amount::from(amount))
            .with_tx_hash(hash)
            .with_ref_flow(ref_flow_id);
        match self.api().submit_flow(flow).await {
            Ok(submitted) => {
                self.flows.insert(tx.to_string(), submitted.flow);
                self.last_error = None;
            },
            Err(e) => {
                debug!("🌍️ Flow for {tx} was rejected: {e}");
                self.last_error = Some(e);
            },
        }
    }

    pub async fn wait_for_status(&self, tx: &str, status: FlowStatus) -> BalanceFlow {
        let id = self.flow(tx).id;
        let db = self.database();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let flow = db.fetch_flow(id).await.unwrap().unwrap();
                if flow.status == status {
                    return flow;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("Flow for {tx} never became {status}"))
    }
}
